//! In-memory radio link between two keyboard halves and one receiver.
//!
//! Data packets always arrive; acknowledgements are dropped with a seeded
//! probability. Every random choice comes from the link's own `ChaCha8Rng`,
//! so a run is fully determined by [`SimConfig::seed`].

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use splitkey_core::{
    AckOutcome, Half, KeyboardHalf, PacketError, Receiver, ReceiverAction, ReceiverConfig,
};
use splitkey_crypto::{CryptoError, KEYMASK_SIZE, KeyMaterial, Keymask, SeedPayload, SoftwareAes};
use tracing::{debug, warn};

use crate::{
    invariants::{InvariantRegistry, SystemSnapshot, Transition, Violation},
    sim_env::{SimEntropy, chance},
};

/// Upper bound on background polls spent in [`SimLink::settle`].
const SETTLE_POLLS: usize = 100_000;

/// Simulation parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimConfig {
    /// Seed for every random choice in the run
    pub seed: u64,
    /// Receiver tunables
    pub receiver: ReceiverConfig,
    /// Probability that an acknowledgement is lost
    pub ack_loss: f64,
    /// Probability that the entropy source has a byte ready on a poll
    pub entropy_ready: f64,
    /// Probability that a half sends a keymask on a step
    pub press_rate: f64,
    /// Probability that a half loses power on a step
    pub reset_rate: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            receiver: ReceiverConfig::default(),
            ack_loss: 0.0,
            entropy_ready: 1.0,
            press_rate: 0.5,
            reset_rate: 0.0,
        }
    }
}

/// Link-level counters, separate from the receiver and keyboard diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Steps run
    pub steps: u64,
    /// Data packets put on the air
    pub packets_sent: u64,
    /// Sends refused by a keyboard half
    pub send_errors: u64,
    /// Acknowledgements carrying a seed payload
    pub acks_sent: u64,
    /// Acknowledgements dropped by the link
    pub acks_lost: u64,
    /// Acknowledgements that rekeyed a half
    pub acks_adopted: u64,
    /// Acknowledgements a half refused
    pub ack_errors: u64,
    /// Keyboard power cycles
    pub resets: u64,
}

/// Two keyboard halves and a receiver joined by a lossy radio.
#[derive(Debug)]
pub struct SimLink {
    config: SimConfig,
    receiver: Receiver<SoftwareAes>,
    keyboards: [KeyboardHalf<SoftwareAes>; 2],
    entropy: SimEntropy,
    rng: ChaCha8Rng,
    host_keys: [Keymask; 2],
    transitions: Vec<Transition>,
    stats: LinkStats,
}

impl SimLink {
    /// Build a link with every party on its bootstrap generation.
    pub fn new(config: SimConfig) -> Result<Self, CryptoError> {
        let receiver = Receiver::new(SoftwareAes, KeyMaterial::default(), config.receiver)?;
        let keyboards = [
            KeyboardHalf::new(SoftwareAes, KeyMaterial::default(), Half::Left)?,
            KeyboardHalf::new(SoftwareAes, KeyMaterial::default(), Half::Right)?,
        ];

        // Entropy gets its own stream so link choices don't shift it.
        let entropy = SimEntropy::intermittent(config.seed ^ 0x5EED, config.entropy_ready);

        Ok(Self {
            config,
            receiver,
            keyboards,
            entropy,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            host_keys: [[0u8; KEYMASK_SIZE]; 2],
            transitions: Vec::new(),
            stats: LinkStats::default(),
        })
    }

    /// Simulation parameters.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The receiver.
    pub fn receiver(&self) -> &Receiver<SoftwareAes> {
        &self.receiver
    }

    /// The keyboard half `half`.
    pub fn keyboard(&self, half: Half) -> &KeyboardHalf<SoftwareAes> {
        &self.keyboards[half.index()]
    }

    /// Last keymask the host saw from `half`.
    pub fn host_keys(&self, half: Half) -> Keymask {
        self.host_keys[half.index()]
    }

    /// Link-level counters.
    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Confirmed key changes observed so far.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Send `keys` from `half` and deliver the packet.
    ///
    /// # Errors
    ///
    /// Returns the keyboard's error if it refused to seal; nothing reaches
    /// the receiver in that case.
    pub fn press(&mut self, half: Half, keys: Keymask) -> Result<Vec<ReceiverAction>, PacketError> {
        let bytes = self.keyboards[half.index()]
            .send(&keys)
            .inspect_err(|_| self.stats.send_errors += 1)?;
        self.stats.packets_sent += 1;
        Ok(self.deliver(half, &bytes))
    }

    /// Hand raw bytes to the receiver as if they arrived on `half`'s channel,
    /// then execute the returned actions.
    pub fn deliver(&mut self, half: Half, bytes: &[u8]) -> Vec<ReceiverAction> {
        let before = *self.receiver.snapshot().half(half);
        let actions = self.receiver.on_packet(half, bytes);
        let after = *self.receiver.snapshot().half(half);

        if after.key_id != before.key_id {
            self.transitions.push(Transition {
                half,
                from: before.key_id,
                to: after.key_id,
                candidate: before.new_key_id,
            });
        }

        for action in &actions {
            self.execute(action);
        }
        actions
    }

    /// Run one background iteration. Returns true if a rotation advanced.
    pub fn background(&mut self) -> bool {
        self.receiver.poll(&mut self.entropy)
    }

    /// Poll until both halves have a sealed seed waiting.
    ///
    /// Returns false if that did not happen within a bounded number of polls.
    pub fn settle(&mut self) -> bool {
        for _ in 0..SETTLE_POLLS {
            let snapshot = self.receiver.snapshot();
            if snapshot.halves.iter().all(|half| half.has_pending_payload) {
                return true;
            }
            self.background();
        }
        false
    }

    /// Advance the receiver's inactivity timers by one tick.
    pub fn tick(&mut self) {
        for action in self.receiver.tick() {
            self.execute(&action);
        }
    }

    /// Power-cycle `half`: it comes back on the bootstrap generation with a
    /// zero counter.
    pub fn reset_keyboard(&mut self, half: Half) -> Result<(), CryptoError> {
        self.keyboards[half.index()] = KeyboardHalf::new(SoftwareAes, KeyMaterial::default(), half)?;
        self.stats.resets += 1;
        debug!(half = ?half, "keyboard half reset");
        Ok(())
    }

    /// One simulated time slice: a background poll, random presses and
    /// resets for each half, then an inactivity tick.
    pub fn step(&mut self) {
        self.stats.steps += 1;
        self.background();

        for half in Half::ALL {
            if chance(&mut self.rng, self.config.reset_rate)
                && let Err(err) = self.reset_keyboard(half)
            {
                warn!(half = ?half, error = %err, "failed to reset keyboard half");
            }

            if chance(&mut self.rng, self.config.press_rate) {
                let mut keys = [0u8; KEYMASK_SIZE];
                self.rng.fill_bytes(&mut keys);
                if let Err(err) = self.press(half, keys) {
                    debug!(half = ?half, error = %err, "keyboard refused to send");
                }
            }
        }

        self.tick();
    }

    /// Run `steps` steps, checking `registry` after each one.
    ///
    /// # Errors
    ///
    /// Stops at the first step that leaves any invariant violated.
    pub fn run(&mut self, steps: u64, registry: &InvariantRegistry) -> Result<(), Vec<Violation>> {
        for _ in 0..steps {
            self.step();
            registry.check_all(&self.snapshot())?;
        }
        Ok(())
    }

    /// Observable state for invariant checks.
    pub fn snapshot(&self) -> SystemSnapshot<'_> {
        SystemSnapshot {
            receiver: self.receiver.snapshot(),
            keyboard_key_ids: Half::ALL.map(|half| self.keyboards[half.index()].key_id()),
            transitions: &self.transitions,
        }
    }

    fn execute(&mut self, action: &ReceiverAction) {
        match action {
            ReceiverAction::UpdateKeys { half, keys } => self.host_keys[half.index()] = *keys,
            ReceiverAction::AttachAck { half, payload } => self.acknowledge(*half, payload),
            ReceiverAction::ClearKeys { half } => {
                self.host_keys[half.index()] = [0u8; KEYMASK_SIZE];
            },
        }
    }

    fn acknowledge(&mut self, half: Half, payload: &[u8; SeedPayload::SIZE]) {
        self.stats.acks_sent += 1;
        if chance(&mut self.rng, self.config.ack_loss) {
            self.stats.acks_lost += 1;
            debug!(half = ?half, "ack lost");
            return;
        }

        match self.keyboards[half.index()].on_ack(payload) {
            Ok(AckOutcome::Rekeyed { .. }) => self.stats.acks_adopted += 1,
            Ok(AckOutcome::AlreadyCurrent) => {},
            Err(err) => {
                self.stats.ack_errors += 1;
                debug!(half = ?half, error = %err, "keyboard refused ack");
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use splitkey_core::RotationState;

    use super::*;

    fn link(config: SimConfig) -> SimLink {
        SimLink::new(config).unwrap()
    }

    #[test]
    fn press_reaches_host() {
        let mut link = link(SimConfig::default());

        link.press(Half::Right, [0x04, 0, 0x80]).unwrap();

        assert_eq!(link.host_keys(Half::Right), [0x04, 0, 0x80]);
        assert_eq!(link.host_keys(Half::Left), [0, 0, 0]);
        assert_eq!(link.stats().packets_sent, 1);
    }

    #[test]
    fn settle_prepares_both_halves() {
        let mut link = link(SimConfig::default());

        assert!(link.settle());

        let snapshot = link.receiver().snapshot();
        for half in Half::ALL {
            assert_eq!(snapshot.half(half).state, RotationState::NewKeyPayloadReady);
        }
    }

    #[test]
    fn settle_gives_up_without_entropy() {
        let mut link = link(SimConfig { entropy_ready: 0.0, ..SimConfig::default() });
        assert!(!link.settle());
    }

    #[test]
    fn lost_acks_never_reach_keyboard() {
        let receiver = ReceiverConfig { rekey_interval: 0, ..ReceiverConfig::default() };
        let mut link = link(SimConfig { ack_loss: 1.0, receiver, ..SimConfig::default() });
        assert!(link.settle());

        for _ in 0..5 {
            link.press(Half::Left, [1, 1, 1]).unwrap();
        }

        let stats = link.stats();
        assert!(stats.acks_sent > 0);
        assert_eq!(stats.acks_lost, stats.acks_sent);
        assert_eq!(link.keyboard(Half::Left).key_id(), 0);
    }

    #[test]
    fn inactivity_clears_host_keys() {
        let receiver = ReceiverConfig { inactivity_ticks: 2, ..ReceiverConfig::default() };
        let mut link = link(SimConfig { receiver, ..SimConfig::default() });

        link.press(Half::Left, [9, 9, 9]).unwrap();
        for _ in 0..3 {
            link.tick();
        }

        assert_eq!(link.host_keys(Half::Left), [0, 0, 0]);
    }

    #[test]
    fn same_seed_same_run() {
        let config = SimConfig {
            seed: 17,
            ack_loss: 0.3,
            entropy_ready: 0.5,
            receiver: ReceiverConfig { rekey_interval: 4, ..ReceiverConfig::default() },
            ..SimConfig::default()
        };
        let registry = InvariantRegistry::standard();

        let mut a = link(config);
        let mut b = link(config);
        a.run(300, &registry).unwrap();
        b.run(300, &registry).unwrap();

        assert_eq!(a.stats(), b.stats());
        assert_eq!(a.transitions(), b.transitions());
        assert_eq!(a.receiver().diagnostics(), b.receiver().diagnostics());
    }

    #[test]
    fn snapshot_borrows_transition_log() {
        let receiver = ReceiverConfig { rekey_interval: 2, ..ReceiverConfig::default() };
        let mut link = link(SimConfig { receiver, press_rate: 1.0, ..SimConfig::default() });
        link.run(200, &InvariantRegistry::standard()).unwrap();
        assert!(!link.transitions().is_empty());

        let snapshot = link.snapshot();
        assert!(std::ptr::eq(snapshot.transitions, link.transitions()));
    }
}
