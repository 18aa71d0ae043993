//! Deterministic simulation harness for split keyboard link testing.
//!
//! Joins two keyboard halves to one receiver over an in-memory radio with
//! seeded acknowledgement loss, intermittent entropy and keyboard power
//! cycles. Every run is reproducible from a single `u64` seed.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks properties of the rotation protocol after
//! every simulation step. Use [`InvariantRegistry::standard()`] for the
//! rotation protocol invariants.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod invariants;
pub mod sim_env;
pub mod sim_link;

pub use invariants::{
    BootstrapAlwaysPresent, CandidateSlotSeparation, ConfirmedFollowsCandidate, Invariant,
    InvariantRegistry, InvariantResult, PendingPayloadMatchesState, SystemSnapshot, Transition,
    Violation,
};
pub use sim_env::SimEntropy;
pub use sim_link::{LinkStats, SimConfig, SimLink};
