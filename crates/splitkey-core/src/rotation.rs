//! Key rotation state machine, one per keyboard half on the receiver.
//!
//! The receiver is always preparing the next key generation while the
//! current one is in use. Each call to [`KeyRotation::step`] does at most one
//! unit of work and returns straight away, so the background loop never
//! stalls waiting for randomness or the accelerator.
//!
//! # State Machine
//!
//! ```text
//!  ┌─────────────┐ 15 random bytes ┌───────────┐ derive candidate ┌─────────────┐
//!  │ KeyNotReady │────────────────>│ SeedReady │─────────────────>│ NewKeyReady │
//!  └─────────────┘                 └───────────┘                  └─────────────┘
//!         ^                                                              │
//!         │ packet under new_key_id                   seal seed payload  │
//!         │                                                              v
//!         │                                                 ┌────────────────────┐
//!         └─────────────────────────────────────────────────│ NewKeyPayloadReady │
//!                                                           └────────────────────┘
//! ```
//!
//! There is no terminal state. Confirmation is driven by the packet pipeline,
//! not by a timer.

use splitkey_crypto::{
    BlockOracle, CryptoContext, CryptoError, KeyGenerationSlots, KeyMaterial, SEED_SIZE, Seed,
    SeedPayload, next_key_id,
};
use tracing::{debug, info};
use zeroize::Zeroize;

use crate::env::RandomSource;

/// Rotation progress for one half.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationState {
    /// Gathering random bytes for the next seed
    KeyNotReady,
    /// Seed complete, candidate key id chosen
    SeedReady,
    /// Candidate generation derived and installed
    NewKeyReady,
    /// Encrypted seed waiting to ride an acknowledgement
    NewKeyPayloadReady,
}

/// Receiver-side rotation state for one keyboard half.
///
/// # Invariants
///
/// - `pending_payload()` is `Some` iff the state is `NewKeyPayloadReady`
/// - `new_key_id` never shares a slot with `key_id` once a seed is ready
/// - Key id 0 starts out confirmed
#[derive(Clone)]
pub struct KeyRotation {
    state: RotationState,
    seed: Seed,
    filled: usize,
    key_id: u8,
    new_key_id: u8,
    key_id_confirmed: bool,
    pending: Option<SeedPayload>,
}

impl KeyRotation {
    /// Start gathering a seed with the bootstrap generation confirmed.
    pub fn new() -> Self {
        Self {
            state: RotationState::KeyNotReady,
            seed: [0u8; SEED_SIZE],
            filled: 0,
            key_id: 0,
            new_key_id: 0,
            key_id_confirmed: true,
            pending: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> RotationState {
        self.state
    }

    /// The generation the half has confirmed it uses.
    pub fn key_id(&self) -> u8 {
        self.key_id
    }

    /// The generation being proposed. Equals `key_id` until a seed is ready.
    pub fn new_key_id(&self) -> u8 {
        self.new_key_id
    }

    /// True unless a proposal is outstanding.
    pub fn is_confirmed(&self) -> bool {
        self.key_id_confirmed
    }

    /// Seed bytes gathered so far.
    pub fn seed_fill(&self) -> usize {
        self.filled
    }

    /// Sealed seed waiting for an acknowledgement.
    pub fn pending_payload(&self) -> Option<&SeedPayload> {
        self.pending.as_ref()
    }

    /// Do one unit of rotation work.
    ///
    /// Returns `Ok(true)` if anything changed. `Ok(false)` means there was
    /// nothing to do: no random byte ready, or a payload already waiting.
    ///
    /// # Errors
    ///
    /// Derivation or sealing failures leave the state where it was; the same
    /// step is retried on the next call. The live generation is never
    /// touched.
    pub fn step<O, R>(
        &mut self,
        oracle: &O,
        material: &KeyMaterial,
        slots: &mut KeyGenerationSlots,
        seed_context: &mut CryptoContext,
        rng: &mut R,
    ) -> Result<bool, CryptoError>
    where
        O: BlockOracle + ?Sized,
        R: RandomSource + ?Sized,
    {
        match self.state {
            RotationState::KeyNotReady => {
                let Some(byte) = rng.poll_byte() else {
                    return Ok(false);
                };
                self.seed[self.filled] = byte;
                self.filled += 1;

                if self.filled == SEED_SIZE {
                    self.new_key_id = next_key_id(self.key_id);
                    self.key_id_confirmed = false;
                    self.state = RotationState::SeedReady;
                    debug!(new_key_id = self.new_key_id, "rotation seed gathered");
                }
                Ok(true)
            },
            RotationState::SeedReady => {
                let candidate =
                    CryptoContext::from_seed(oracle, material, slots.identity(), &self.seed)?;
                slots.install(self.new_key_id, candidate)?;
                self.state = RotationState::NewKeyReady;
                Ok(true)
            },
            RotationState::NewKeyReady => {
                let payload = seed_context.seal_seed(oracle, &self.seed, self.new_key_id)?;
                self.pending = Some(payload);
                self.wipe_seed();
                self.state = RotationState::NewKeyPayloadReady;
                debug!(new_key_id = self.new_key_id, "seed payload ready");
                Ok(true)
            },
            RotationState::NewKeyPayloadReady => Ok(false),
        }
    }

    /// Note that an authenticated packet arrived under `key_id`.
    ///
    /// Returns true if this confirmed the candidate generation, in which
    /// case the machine starts gathering the next seed.
    pub fn confirm(&mut self, key_id: u8) -> bool {
        let candidate_installed =
            matches!(self.state, RotationState::NewKeyReady | RotationState::NewKeyPayloadReady);
        if !candidate_installed || key_id != self.new_key_id || key_id == self.key_id {
            return false;
        }

        info!(from = self.key_id, to = key_id, "key rotation confirmed");
        self.key_id = key_id;
        self.key_id_confirmed = true;
        self.pending = None;
        self.wipe_seed();
        self.state = RotationState::KeyNotReady;
        true
    }

    fn wipe_seed(&mut self) {
        self.seed.zeroize();
        self.filled = 0;
    }
}

impl Drop for KeyRotation {
    fn drop(&mut self) {
        self.seed.zeroize();
    }
}

impl Default for KeyRotation {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KeyRotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRotation")
            .field("state", &self.state)
            .field("filled", &self.filled)
            .field("key_id", &self.key_id)
            .field("new_key_id", &self.new_key_id)
            .field("key_id_confirmed", &self.key_id_confirmed)
            .field("pending", &self.pending.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use splitkey_crypto::{Identity, Slot, SoftwareAes};

    use super::*;

    struct Fixture {
        material: KeyMaterial,
        slots: KeyGenerationSlots,
        seed_context: CryptoContext,
    }

    impl Fixture {
        fn new() -> Self {
            let material = KeyMaterial::default();
            let slots =
                KeyGenerationSlots::init(&SoftwareAes, &material, Identity::LeftKeyboard).unwrap();
            let seed_context =
                CryptoContext::init(&SoftwareAes, &material, Identity::Receiver).unwrap();
            Self { material, slots, seed_context }
        }

        fn step(&mut self, rotation: &mut KeyRotation, rng: &mut impl RandomSource) -> bool {
            rotation
                .step(&SoftwareAes, &self.material, &mut self.slots, &mut self.seed_context, rng)
                .unwrap()
        }
    }

    /// Hands out a fixed budget of bytes, then reports nothing ready.
    struct Budget {
        remaining: usize,
        next: u8,
    }

    impl RandomSource for Budget {
        fn poll_byte(&mut self) -> Option<u8> {
            if self.remaining == 0 {
                return None;
            }
            self.remaining -= 1;
            self.next = self.next.wrapping_add(1);
            Some(self.next)
        }
    }

    fn run_until_idle(fixture: &mut Fixture, rotation: &mut KeyRotation, rng: &mut Budget) {
        while fixture.step(rotation, rng) {}
    }

    #[test]
    fn starts_confirmed_on_bootstrap() {
        let rotation = KeyRotation::new();
        assert_eq!(rotation.state(), RotationState::KeyNotReady);
        assert_eq!(rotation.key_id(), 0);
        assert!(rotation.is_confirmed());
        assert!(rotation.pending_payload().is_none());
    }

    #[test]
    fn empty_source_does_not_advance() {
        let mut fixture = Fixture::new();
        let mut rotation = KeyRotation::new();
        let mut rng = Budget { remaining: 0, next: 0 };

        assert!(!fixture.step(&mut rotation, &mut rng));
        assert_eq!(rotation.seed_fill(), 0);
    }

    #[test]
    fn one_byte_per_step() {
        let mut fixture = Fixture::new();
        let mut rotation = KeyRotation::new();
        let mut rng = Budget { remaining: 100, next: 0 };

        for filled in 1..SEED_SIZE {
            assert!(fixture.step(&mut rotation, &mut rng));
            assert_eq!(rotation.seed_fill(), filled);
            assert_eq!(rotation.state(), RotationState::KeyNotReady);
        }
        assert_eq!(rng.remaining, 100 - (SEED_SIZE - 1));
    }

    #[test]
    fn fifteen_bytes_reach_payload_ready() {
        let mut fixture = Fixture::new();
        let mut rotation = KeyRotation::new();
        let mut rng = Budget { remaining: SEED_SIZE, next: 0 };

        run_until_idle(&mut fixture, &mut rotation, &mut rng);

        assert_eq!(rotation.state(), RotationState::NewKeyPayloadReady);
        assert_eq!(rotation.new_key_id(), 1);
        assert!(!rotation.is_confirmed());
        assert_eq!(rotation.pending_payload().map(|payload| payload.key_id), Some(1));
        assert_eq!(fixture.slots.slot_key_id(Slot::GenB), Some(1));
        assert_eq!(rng.remaining, 0);
    }

    #[test]
    fn fourteen_bytes_stay_gathering() {
        let mut fixture = Fixture::new();
        let mut rotation = KeyRotation::new();
        let mut rng = Budget { remaining: SEED_SIZE - 1, next: 0 };

        run_until_idle(&mut fixture, &mut rotation, &mut rng);

        assert_eq!(rotation.state(), RotationState::KeyNotReady);
        assert_eq!(fixture.slots.slot_key_id(Slot::GenB), None);
    }

    #[test]
    fn pending_seed_decrypts_under_receiver_identity() {
        let mut fixture = Fixture::new();
        let mut rotation = KeyRotation::new();
        let mut rng = Budget { remaining: SEED_SIZE, next: 0 };
        run_until_idle(&mut fixture, &mut rotation, &mut rng);

        let payload = *rotation.pending_payload().unwrap();
        let mut keyboard_view =
            CryptoContext::init(&SoftwareAes, &fixture.material, Identity::Receiver).unwrap();
        let seed = keyboard_view.open_seed(&SoftwareAes, &payload).unwrap();

        let expected: Seed = std::array::from_fn(|index| (index + 1) as u8);
        assert_eq!(seed, expected);
    }

    #[test]
    fn confirm_requires_candidate_id() {
        let mut fixture = Fixture::new();
        let mut rotation = KeyRotation::new();
        let mut rng = Budget { remaining: SEED_SIZE, next: 0 };
        run_until_idle(&mut fixture, &mut rotation, &mut rng);

        assert!(!rotation.confirm(0));
        assert!(!rotation.confirm(2));
        assert_eq!(rotation.state(), RotationState::NewKeyPayloadReady);

        assert!(rotation.confirm(1));
        assert_eq!(rotation.state(), RotationState::KeyNotReady);
        assert_eq!(rotation.key_id(), 1);
        assert!(rotation.is_confirmed());
        assert!(rotation.pending_payload().is_none());
        assert_eq!(rotation.seed_fill(), 0);
    }

    #[test]
    fn confirm_before_candidate_is_ignored() {
        let mut rotation = KeyRotation::new();
        assert!(!rotation.confirm(1));
        assert!(!rotation.confirm(0));
        assert_eq!(rotation.key_id(), 0);
    }

    #[test]
    fn second_rotation_uses_other_slot() {
        let mut fixture = Fixture::new();
        let mut rotation = KeyRotation::new();
        let mut rng = Budget { remaining: 2 * SEED_SIZE, next: 0 };

        run_until_idle(&mut fixture, &mut rotation, &mut rng);
        assert!(rotation.confirm(1));
        run_until_idle(&mut fixture, &mut rotation, &mut rng);

        assert_eq!(rotation.new_key_id(), 2);
        assert_eq!(fixture.slots.slot_key_id(Slot::GenA), Some(2));
        assert_eq!(fixture.slots.slot_key_id(Slot::GenB), Some(1));
    }

    #[test]
    fn failed_derivation_keeps_state_and_live_keys() {
        use splitkey_crypto::OracleError;

        struct Broken;
        impl BlockOracle for Broken {
            fn encrypt_block(
                &self,
                _key: &splitkey_crypto::Key,
                _plaintext: &splitkey_crypto::Block,
            ) -> Result<splitkey_crypto::Block, OracleError> {
                Err(OracleError::HardwareFault)
            }
        }

        let mut fixture = Fixture::new();
        let mut rotation = KeyRotation::new();
        let mut rng = Budget { remaining: SEED_SIZE, next: 0 };
        for _ in 0..SEED_SIZE {
            fixture.step(&mut rotation, &mut rng);
        }
        assert_eq!(rotation.state(), RotationState::SeedReady);

        let result = rotation.step(
            &Broken,
            &fixture.material,
            &mut fixture.slots,
            &mut fixture.seed_context,
            &mut rng,
        );

        assert!(matches!(result, Err(CryptoError::Oracle(OracleError::HardwareFault))));
        assert_eq!(rotation.state(), RotationState::SeedReady);
        assert!(fixture.slots.get(0).is_some());

        run_until_idle(&mut fixture, &mut rotation, &mut rng);
        assert_eq!(rotation.state(), RotationState::NewKeyPayloadReady);
    }
}
