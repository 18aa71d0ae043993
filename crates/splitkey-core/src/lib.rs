//! Splitkey Protocol Core
//!
//! Sans-IO state machines for a split wireless keyboard: the receiver's
//! packet pipeline and per-half key rotation, and the keyboard half's
//! transmitter. Nothing here touches a radio, a timer or a thread. Callers
//! feed in bytes, ticks and a randomness source and execute the returned
//! actions.
//!
//! # Rotation Lifecycle
//!
//! ```text
//! Receiver                                         Keyboard half
//!    │ gather 15 random bytes                           │
//!    │ derive candidate generation into spare slot      │
//!    │ seal seed under receiver identity                │
//!    │<──────── DataPayload (key_id = k) ───────────────│
//!    │───────── ack + SeedPayload (key_id = k') ───────>│ open seed, rekey
//!    │<──────── DataPayload (key_id = k') ──────────────│
//!    │ confirm k', start gathering the next seed        │
//! ```
//!
//! # Failure Model
//!
//! Nothing fails closed by stalling the link. A packet that does not
//! authenticate is dropped and counted; a rotation step that fails is retried
//! on the next poll; a crypto resource that is busy drops the operation and
//! counts a collision.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod diagnostics;
pub mod env;
pub mod error;
pub mod half;
pub mod keyboard;
pub mod receiver;
pub mod resource;
pub mod rotation;

pub use config::{DEFAULT_INACTIVITY_TICKS, DEFAULT_REKEY_INTERVAL, ReceiverConfig};
pub use diagnostics::{KeyboardDiagnostics, ReceiverDiagnostics};
pub use env::{RandomSource, RngRandom};
pub use error::PacketError;
pub use half::Half;
pub use keyboard::{AckOutcome, KeyboardHalf};
pub use receiver::{HalfSnapshot, Receiver, ReceiverAction, ReceiverSnapshot};
pub use resource::CryptoResource;
pub use rotation::{KeyRotation, RotationState};
