//! Splitkey Cryptographic Primitives
//!
//! Cryptographic building blocks for a split wireless keyboard. Every
//! construction is built on one capability: encrypting a single 16-byte block
//! under a 16-byte key. The capability is a trait so the same code runs on a
//! hardware ECB accelerator or on the software AES used by hosts and tests.
//!
//! # Key Lifecycle
//!
//! ```text
//! Master Secret (build time)          Rotation Seed (15 random bytes)
//!        │                                   │
//!        └──────────────┬────────────────────┘
//!                       ▼
//!        CKDF extract (salt = identity salt)
//!                       │
//!                       ▼
//!        CKDF expand → CTR key, CTR nonce, CMAC key
//!                       │
//!                       ▼
//!        CryptoContext in a KeyGenerationSlot
//! ```
//!
//! Key id 0 is the bootstrap generation derived from the master secret. Every
//! later generation is derived from a seed chosen by the receiver and shipped
//! encrypted under the receiver identity, so the master secret never goes on
//! the air.
//!
//! # Security
//!
//! Confidentiality:
//! - AES-CTR over a single block per packet, one counter value per packet
//! - The counter never wraps; an exhausted counter fails closed
//!
//! Authenticity:
//! - AES-CMAC (OMAC1) over every wire body, including key id and counter
//! - Tags are compared without early exit; nothing is decrypted before the tag
//!   matches
//!
//! Isolation:
//! - Each identity derives its keys under its own salt
//! - Rotated keys depend only on the seed, not on the master secret

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod ckdf;
pub mod cmac;
pub mod context;
pub mod ctr;
pub mod error;
pub mod oracle;
pub mod payload;
pub mod slots;

pub use ckdf::{MAX_OUTPUT_LEN, expand, expand_array, extract};
pub use cmac::{Cmac, TAG_SIZE, Tag, cmac, tags_match};
pub use context::{CryptoContext, Identity, KeyMaterial};
pub use ctr::{AesCtr, NONCE_SIZE, Nonce};
pub use error::{CryptoError, OracleError};
pub use oracle::{
    BLOCK_SIZE, Block, BlockOracle, DEFAULT_POLL_CEILING, EcbPeripheral, EcbStatus, KEY_SIZE, Key,
    PolledOracle, SoftwareAes,
};
pub use payload::{DataPayload, KEYMASK_SIZE, Keymask, SEED_SIZE, Seed, SeedPayload};
pub use slots::{BOOTSTRAP_KEY_ID, Generation, KeyGenerationSlots, Slot, next_key_id};
