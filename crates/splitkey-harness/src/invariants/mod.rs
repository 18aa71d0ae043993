//! Invariant checking for deterministic simulation testing.
//!
//! Invariants are properties that must always hold while the link runs.
//! Unlike scenario tests that check specific sequences, invariants
//! verify behavioral properties across every packet schedule the simulation
//! produces.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! registry.check_all(&link.snapshot())?;
//! ```

mod checks;
mod snapshot;

pub use checks::{
    BootstrapAlwaysPresent, CandidateSlotSeparation, ConfirmedFollowsCandidate,
    PendingPayloadMatchesState,
};
pub use snapshot::{SystemSnapshot, Transition};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// An invariant that can be checked against system state.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against a snapshot.
    ///
    /// Returns `Ok(())` if the invariant holds, or a [`Violation`]
    /// describing what went wrong.
    fn check(&self, state: &SystemSnapshot<'_>) -> InvariantResult;
}

/// Registry of invariants to check.
///
/// Use [`InvariantRegistry::standard()`] for the rotation protocol
/// invariants.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Create a registry with the rotation protocol invariants.
    ///
    /// Includes:
    /// - [`BootstrapAlwaysPresent`]: key id 0 never leaves its slot
    /// - [`CandidateSlotSeparation`]: a candidate never evicts the live key
    /// - [`PendingPayloadMatchesState`]: sealed seed iff `NewKeyPayloadReady`
    /// - [`ConfirmedFollowsCandidate`]: confirmed ids only move to the
    ///   candidate
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(BootstrapAlwaysPresent);
        registry.add(CandidateSlotSeparation);
        registry.add(PendingPayloadMatchesState);
        registry.add(ConfirmedFollowsCandidate);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants against the given state.
    ///
    /// Returns `Ok(())` if all invariants hold, or all violations found.
    pub fn check_all(&self, state: &SystemSnapshot<'_>) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use splitkey_core::{Half, HalfSnapshot, ReceiverDiagnostics, ReceiverSnapshot, RotationState};
    use splitkey_crypto::Slot;

    use super::*;

    fn half(state: RotationState, key_id: u8, new_key_id: u8) -> HalfSnapshot {
        let mut slot_key_ids = [Some(0), None, None];
        for id in [key_id, new_key_id] {
            match Slot::for_key_id(id) {
                Slot::Bootstrap => {},
                Slot::GenA => slot_key_ids[1] = Some(id),
                Slot::GenB => slot_key_ids[2] = Some(id),
            }
        }
        HalfSnapshot {
            state,
            key_id,
            new_key_id,
            key_id_confirmed: state == RotationState::KeyNotReady,
            has_pending_payload: state == RotationState::NewKeyPayloadReady,
            slot_key_ids,
            high_water: [None; 3],
            inactivity: 0,
        }
    }

    fn snapshot(left: HalfSnapshot, transitions: &[Transition]) -> SystemSnapshot<'_> {
        SystemSnapshot {
            receiver: ReceiverSnapshot {
                halves: [left, half(RotationState::KeyNotReady, 0, 0)],
                diagnostics: ReceiverDiagnostics::default(),
            },
            keyboard_key_ids: [left.key_id, 0],
            transitions,
        }
    }

    #[test]
    fn standard_registry_has_invariants() {
        let registry = InvariantRegistry::standard();
        assert!(!registry.is_empty());
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn fresh_state_passes() {
        let registry = InvariantRegistry::standard();
        let state = snapshot(half(RotationState::KeyNotReady, 0, 0), &[]);
        assert!(registry.check_all(&state).is_ok());
    }

    #[test]
    fn pending_payload_mismatch_is_flagged() {
        let mut left = half(RotationState::NewKeyReady, 0, 1);
        left.has_pending_payload = true;

        let violations = InvariantRegistry::standard()
            .check_all(&snapshot(left, &[]))
            .unwrap_err();

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].invariant, "pending_payload_matches_state");
    }

    #[test]
    fn confirmation_to_non_candidate_is_flagged() {
        let left = half(RotationState::KeyNotReady, 3, 3);
        let transitions = [Transition { half: Half::Left, from: 0, to: 3, candidate: 1 }];

        let violations = InvariantRegistry::standard()
            .check_all(&snapshot(left, &transitions))
            .unwrap_err();

        assert!(violations.iter().any(|v| v.invariant == "confirmed_follows_candidate"));
    }

    #[test]
    fn evicted_bootstrap_is_flagged() {
        let mut left = half(RotationState::KeyNotReady, 0, 0);
        left.slot_key_ids[0] = None;

        let violations = InvariantRegistry::standard()
            .check_all(&snapshot(left, &[]))
            .unwrap_err();

        assert!(violations.iter().any(|v| v.invariant == "bootstrap_always_present"));
    }
}
