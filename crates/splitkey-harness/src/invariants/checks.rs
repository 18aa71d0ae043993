//! Standard invariant checks.
//!
//! These invariants capture properties of the rotation protocol that hold
//! after every simulation step, whatever the packet schedule.

use splitkey_core::{Half, HalfSnapshot, RotationState};
use splitkey_crypto::{BOOTSTRAP_KEY_ID, Slot};

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

fn slot_index(key_id: u8) -> usize {
    let slot = Slot::for_key_id(key_id);
    Slot::ALL.iter().position(|candidate| *candidate == slot).unwrap_or_default()
}

fn halves<'s>(state: &'s SystemSnapshot<'_>) -> impl Iterator<Item = (Half, &'s HalfSnapshot)> {
    Half::ALL.into_iter().map(|half| (half, state.receiver.half(half)))
}

/// The bootstrap generation never leaves its slot.
///
/// A half that loses power comes back on key id 0; if the receiver ever
/// dropped that generation the half could never be steered to a new key.
pub struct BootstrapAlwaysPresent;

impl Invariant for BootstrapAlwaysPresent {
    fn name(&self) -> &'static str {
        "bootstrap_always_present"
    }

    fn check(&self, state: &SystemSnapshot<'_>) -> InvariantResult {
        for (half, snapshot) in halves(state) {
            if snapshot.slot_key_ids[0] != Some(BOOTSTRAP_KEY_ID) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "{half:?}: bootstrap slot holds {:?}",
                        snapshot.slot_key_ids[0]
                    ),
                });
            }
        }
        Ok(())
    }
}

/// The live generation stays installed and a candidate never shares its
/// slot.
pub struct CandidateSlotSeparation;

impl Invariant for CandidateSlotSeparation {
    fn name(&self) -> &'static str {
        "candidate_slot_separation"
    }

    fn check(&self, state: &SystemSnapshot<'_>) -> InvariantResult {
        for (half, snapshot) in halves(state) {
            let live = snapshot.slot_key_ids[slot_index(snapshot.key_id)];
            if live != Some(snapshot.key_id) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "{half:?}: live key id {} evicted, slot holds {live:?}",
                        snapshot.key_id
                    ),
                });
            }

            if snapshot.state != RotationState::KeyNotReady
                && slot_index(snapshot.new_key_id) == slot_index(snapshot.key_id)
            {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "{half:?}: candidate {} shares a slot with live {}",
                        snapshot.new_key_id, snapshot.key_id
                    ),
                });
            }
        }
        Ok(())
    }
}

/// A sealed seed exists exactly while the state says one is waiting.
pub struct PendingPayloadMatchesState;

impl Invariant for PendingPayloadMatchesState {
    fn name(&self) -> &'static str {
        "pending_payload_matches_state"
    }

    fn check(&self, state: &SystemSnapshot<'_>) -> InvariantResult {
        for (half, snapshot) in halves(state) {
            let expected = snapshot.state == RotationState::NewKeyPayloadReady;
            if snapshot.has_pending_payload != expected {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "{half:?}: state {:?} with pending payload = {}",
                        snapshot.state, snapshot.has_pending_payload
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Confirmed key ids only ever move to the candidate that was on offer, and
/// each change starts where the previous one ended.
pub struct ConfirmedFollowsCandidate;

impl Invariant for ConfirmedFollowsCandidate {
    fn name(&self) -> &'static str {
        "confirmed_follows_candidate"
    }

    fn check(&self, state: &SystemSnapshot<'_>) -> InvariantResult {
        let mut current = [BOOTSTRAP_KEY_ID; 2];

        for transition in state.transitions {
            let index = transition.half.index();
            if transition.to != transition.candidate || transition.from != current[index] {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "{:?}: moved {} -> {} with candidate {} after confirmed {}",
                        transition.half,
                        transition.from,
                        transition.to,
                        transition.candidate,
                        current[index]
                    ),
                });
            }
            current[index] = transition.to;
        }

        for (half, snapshot) in halves(state) {
            if snapshot.key_id != current[half.index()] {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "{half:?}: confirmed {} but transitions end at {}",
                        snapshot.key_id,
                        current[half.index()]
                    ),
                });
            }
        }
        Ok(())
    }
}
