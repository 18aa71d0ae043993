//! Receiver packet pipeline.
//!
//! Authenticates and decrypts inbound data packets from both halves, feeds
//! the rotation state machines, and decides when a pending rotation rides on
//! the outgoing acknowledgement. Uses the action pattern: methods take input
//! and return actions for the radio driver to execute.
//!
//! # Contexts
//!
//! [`Receiver::on_packet`] runs from the radio callback and
//! [`Receiver::poll`] from the background loop. Both go through the same
//! non-blocking guard; whichever finds it busy drops its work and counts a
//! collision.
//!
//! # Re-send Policy
//!
//! While a half's rotation is `NewKeyPayloadReady` the sealed seed is
//! attached to its acknowledgement when:
//! - the packet failed authentication, was a replay, or named a generation we
//!   do not hold (the half probably reset)
//! - the packet authenticated under a generation other than the confirmed one
//! - the packet's counter under the confirmed generation exceeds the rekey
//!   interval

use splitkey_crypto::{
    BlockOracle, CryptoContext, CryptoError, DataPayload, Identity, KeyGenerationSlots,
    KeyMaterial, Keymask, SeedPayload, Slot,
};
use tracing::{debug, info, warn};

use crate::{
    config::ReceiverConfig,
    diagnostics::{ReceiverDiagnostics, bump},
    env::RandomSource,
    error::PacketError,
    half::Half,
    resource::CryptoResource,
    rotation::{KeyRotation, RotationState},
};

/// Actions returned by the receiver.
///
/// The driver executes these:
/// - `UpdateKeys`: forward the keymask to the host
/// - `AttachAck`: put the payload on the half's next acknowledgement
/// - `ClearKeys`: release every key of an inactive half
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverAction {
    /// New authenticated keymask
    UpdateKeys {
        /// Sending half
        half: Half,
        /// Decrypted keymask
        keys: Keymask,
    },

    /// Acknowledgement payload for the half
    AttachAck {
        /// Destination half
        half: Half,
        /// Sealed rotation proposal
        payload: [u8; SeedPayload::SIZE],
    },

    /// The half went quiet; treat all its keys as released
    ClearKeys {
        /// Inactive half
        half: Half,
    },
}

/// Read-only view of one half's receiver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HalfSnapshot {
    /// Rotation state
    pub state: RotationState,
    /// Confirmed generation
    pub key_id: u8,
    /// Candidate generation
    pub new_key_id: u8,
    /// False while a proposal is outstanding
    pub key_id_confirmed: bool,
    /// Whether a sealed seed is waiting
    pub has_pending_payload: bool,
    /// Key id held in each slot, in [`Slot::ALL`] order
    pub slot_key_ids: [Option<u8>; 3],
    /// Highest accepted counter per slot, in [`Slot::ALL`] order
    pub high_water: [Option<u32>; 3],
    /// Ticks since the last authenticated packet
    pub inactivity: u32,
}

/// Read-only view of the whole receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverSnapshot {
    /// Per-half state, indexed by [`Half::index`]
    pub halves: [HalfSnapshot; 2],
    /// Diagnostic counters
    pub diagnostics: ReceiverDiagnostics,
}

impl ReceiverSnapshot {
    /// State of `half`.
    pub fn half(&self, half: Half) -> &HalfSnapshot {
        &self.halves[half.index()]
    }
}

/// Receiver for both keyboard halves.
#[derive(Debug)]
pub struct Receiver<O> {
    shared: CryptoResource<ReceiverState<O>>,
}

#[derive(Debug)]
struct ReceiverState<O> {
    oracle: O,
    material: KeyMaterial,
    config: ReceiverConfig,
    seed_context: CryptoContext,
    halves: [HalfState; 2],
    diagnostics: ReceiverDiagnostics,
}

#[derive(Debug)]
struct HalfState {
    half: Half,
    slots: KeyGenerationSlots,
    rotation: KeyRotation,
    inactivity: u32,
}

impl HalfState {
    fn new<O: BlockOracle>(
        oracle: &O,
        material: &KeyMaterial,
        half: Half,
    ) -> Result<Self, CryptoError> {
        Ok(Self {
            half,
            slots: KeyGenerationSlots::init(oracle, material, half.identity())?,
            rotation: KeyRotation::new(),
            inactivity: 0,
        })
    }

    fn snapshot(&self) -> HalfSnapshot {
        HalfSnapshot {
            state: self.rotation.state(),
            key_id: self.rotation.key_id(),
            new_key_id: self.rotation.new_key_id(),
            key_id_confirmed: self.rotation.is_confirmed(),
            has_pending_payload: self.rotation.pending_payload().is_some(),
            slot_key_ids: Slot::ALL.map(|slot| self.slots.slot_key_id(slot)),
            high_water: Slot::ALL
                .map(|slot| self.slots.slot(slot).and_then(|generation| generation.high_water())),
            inactivity: self.inactivity,
        }
    }
}

impl<O: BlockOracle> Receiver<O> {
    /// Derive bootstrap generations for both halves and the receiver
    /// identity context that seals rotation seeds.
    pub fn new(
        oracle: O,
        material: KeyMaterial,
        config: ReceiverConfig,
    ) -> Result<Self, CryptoError> {
        let seed_context = CryptoContext::init(&oracle, &material, Identity::Receiver)?;
        let halves = [
            HalfState::new(&oracle, &material, Half::Left)?,
            HalfState::new(&oracle, &material, Half::Right)?,
        ];

        Ok(Self {
            shared: CryptoResource::new(ReceiverState {
                oracle,
                material,
                config,
                seed_context,
                halves,
                diagnostics: ReceiverDiagnostics::default(),
            }),
        })
    }

    /// Handle an inbound packet from `half`.
    ///
    /// Returns no actions if the packet was dropped and there was nothing to
    /// re-send, or if the crypto resource was busy.
    pub fn on_packet(&self, half: Half, bytes: &[u8]) -> Vec<ReceiverAction> {
        self.shared.try_with(|state| state.on_packet(half, bytes)).unwrap_or_default()
    }

    /// Advance each half's rotation by at most one step.
    ///
    /// Returns true if either half made progress. Returns false without
    /// doing anything if the crypto resource was busy.
    pub fn poll<R: RandomSource + ?Sized>(&self, rng: &mut R) -> bool {
        self.shared.try_with(|state| state.poll(rng)).unwrap_or(false)
    }

    /// Advance the inactivity counters by one tick.
    pub fn tick(&self) -> Vec<ReceiverAction> {
        self.shared.try_with(ReceiverState::tick).unwrap_or_default()
    }

    /// Snapshot of both halves and the diagnostic counters.
    ///
    /// Waits for any operation in flight; call from the background loop only.
    pub fn snapshot(&self) -> ReceiverSnapshot {
        let mut snapshot = self.shared.inspect(|state| ReceiverSnapshot {
            halves: [state.halves[0].snapshot(), state.halves[1].snapshot()],
            diagnostics: state.diagnostics,
        });
        snapshot.diagnostics.collisions = self.shared.collisions();
        snapshot
    }

    /// Diagnostic counters.
    pub fn diagnostics(&self) -> ReceiverDiagnostics {
        self.snapshot().diagnostics
    }
}

impl<O: BlockOracle> ReceiverState<O> {
    fn on_packet(&mut self, half: Half, bytes: &[u8]) -> Vec<ReceiverAction> {
        let mut actions = Vec::new();

        let resend = match self.open(half, bytes) {
            Ok(payload_and_keys) => self.accept(half, payload_and_keys, &mut actions),
            Err(err) => self.reject(half, &err),
        };

        if resend {
            let state = &self.halves[half.index()];
            if let Some(pending) = state.rotation.pending_payload() {
                bump(&mut self.diagnostics.seeds_attached);
                info!(half = ?half, new_key_id = pending.key_id, "attached seed payload");
                actions.push(ReceiverAction::AttachAck { half, payload: pending.to_bytes() });
            }
        }

        actions
    }

    /// Parse, authenticate, replay-check and decrypt.
    fn open(&mut self, half: Half, bytes: &[u8]) -> Result<(DataPayload, Keymask), PacketError> {
        let payload = DataPayload::from_bytes(bytes)?;
        let state = &mut self.halves[half.index()];

        let Some(generation) = state.slots.get_mut(payload.key_id) else {
            return Err(PacketError::UnknownGeneration { key_id: payload.key_id });
        };

        let keys = generation.context_mut().open_data(&self.oracle, &payload)?;

        if !generation.is_fresh(payload.counter) {
            return Err(PacketError::Replay {
                key_id: payload.key_id,
                counter: payload.counter,
                high_water: generation.high_water().unwrap_or_default(),
            });
        }
        generation.record(payload.counter);

        Ok((payload, keys))
    }

    /// Returns whether the pending rotation should be attached.
    fn accept(
        &mut self,
        half: Half,
        (payload, keys): (DataPayload, Keymask),
        actions: &mut Vec<ReceiverAction>,
    ) -> bool {
        let state = &mut self.halves[half.index()];
        bump(&mut self.diagnostics.packets_accepted);
        state.inactivity = 0;
        actions.push(ReceiverAction::UpdateKeys { half, keys });

        if state.rotation.confirm(payload.key_id) {
            bump(&mut self.diagnostics.rotations_confirmed);
            return false;
        }

        payload.key_id != state.rotation.key_id() || payload.counter > self.config.rekey_interval
    }

    /// Count a dropped packet. Returns whether the pending rotation should be
    /// attached.
    fn reject(&mut self, half: Half, err: &PacketError) -> bool {
        match err {
            PacketError::Malformed { .. } => bump(&mut self.diagnostics.malformed),
            PacketError::Authentication => bump(&mut self.diagnostics.cmac_fail),
            PacketError::Replay { .. } => bump(&mut self.diagnostics.replays),
            PacketError::UnknownGeneration { .. } => {
                bump(&mut self.diagnostics.unknown_generation);
            },
            PacketError::Crypto(_) | PacketError::Busy => bump(&mut self.diagnostics.decrypt_fail),
        }

        if err.is_untrusted_input() {
            debug!(half = ?half, reason = %err, "dropped packet");
        } else {
            warn!(half = ?half, error = %err, "failed to open packet");
        }

        err.suggests_stale_peer()
    }

    fn poll<R: RandomSource + ?Sized>(&mut self, rng: &mut R) -> bool {
        let mut progressed = false;

        for state in &mut self.halves {
            match state.rotation.step(
                &self.oracle,
                &self.material,
                &mut state.slots,
                &mut self.seed_context,
                rng,
            ) {
                Ok(stepped) => progressed |= stepped,
                Err(err) => {
                    bump(&mut self.diagnostics.rotation_step_failures);
                    warn!(
                        half = ?state.half,
                        state = ?state.rotation.state(),
                        error = %err,
                        "rotation step failed"
                    );
                },
            }
        }

        progressed
    }

    fn tick(&mut self) -> Vec<ReceiverAction> {
        let mut actions = Vec::new();

        for state in &mut self.halves {
            state.inactivity = state.inactivity.saturating_add(1);
            if state.inactivity > self.config.inactivity_ticks {
                state.inactivity = 0;
                bump(&mut self.diagnostics.inactivity_clears);
                debug!(half = ?state.half, "half inactive, clearing keys");
                actions.push(ReceiverAction::ClearKeys { half: state.half });
            }
        }

        actions
    }
}
