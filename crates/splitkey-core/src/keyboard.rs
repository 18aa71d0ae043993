//! Keyboard-half transmitter pipeline.
//!
//! A half seals every keymask under its current generation and listens for
//! rotation proposals riding on the receiver's acknowledgements. It holds a
//! single generation: once it adopts a new seed the old keys are gone, and
//! the receiver keeps the old generation around until traffic confirms the
//! switch.

use splitkey_crypto::{
    BOOTSTRAP_KEY_ID, BlockOracle, CryptoContext, CryptoError, DataPayload, Identity,
    KeyMaterial, Keymask, SeedPayload, Tag,
};
use tracing::{debug, info, warn};

use crate::{
    diagnostics::{KeyboardDiagnostics, bump},
    error::PacketError,
    half::Half,
    resource::CryptoResource,
};

/// What an acknowledgement did to the half's keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Adopted a new generation
    Rekeyed {
        /// The generation now in use
        key_id: u8,
    },
    /// The same proposal was already adopted
    AlreadyCurrent,
}

/// One keyboard half's crypto state.
#[derive(Debug)]
pub struct KeyboardHalf<O> {
    half: Half,
    shared: CryptoResource<KeyboardState<O>>,
}

#[derive(Debug)]
struct KeyboardState<O> {
    oracle: O,
    material: KeyMaterial,
    context: CryptoContext,
    receiver: CryptoContext,
    key_id: u8,
    adopted: Option<Tag>,
    diagnostics: KeyboardDiagnostics,
}

impl<O: BlockOracle> KeyboardHalf<O> {
    /// Derive `half`'s bootstrap keys and the receiver-identity keys used to
    /// open rotation proposals.
    pub fn new(oracle: O, material: KeyMaterial, half: Half) -> Result<Self, CryptoError> {
        let context = CryptoContext::init(&oracle, &material, half.identity())?;
        let receiver = CryptoContext::init(&oracle, &material, Identity::Receiver)?;

        Ok(Self {
            half,
            shared: CryptoResource::new(KeyboardState {
                oracle,
                material,
                context,
                receiver,
                key_id: BOOTSTRAP_KEY_ID,
                adopted: None,
                diagnostics: KeyboardDiagnostics::default(),
            }),
        })
    }

    /// Which half this is.
    pub fn half(&self) -> Half {
        self.half
    }

    /// Seal `keys` into a data payload under the next counter.
    ///
    /// # Errors
    ///
    /// - `Busy` if the crypto resource was in use; nothing was consumed
    /// - `Crypto` on oracle failure or counter exhaustion
    pub fn send(&self, keys: &Keymask) -> Result<[u8; DataPayload::SIZE], PacketError> {
        let half = self.half;
        self.shared.try_with(|state| state.seal(half, keys)).ok_or(PacketError::Busy)?
    }

    /// Handle an acknowledgement payload from the receiver.
    ///
    /// A valid proposal rekeys this half's context from the carried seed and
    /// switches to the proposed key id. Anything else leaves the keys alone.
    pub fn on_ack(&self, bytes: &[u8]) -> Result<AckOutcome, PacketError> {
        let half = self.half;
        self.shared.try_with(|state| state.adopt(half, bytes)).ok_or(PacketError::Busy)?
    }

    /// Generation currently used for sending.
    pub fn key_id(&self) -> u8 {
        self.shared.inspect(|state| state.key_id)
    }

    /// Counter the next packet will carry.
    pub fn counter(&self) -> u32 {
        self.shared.inspect(|state| state.context.ctr().counter())
    }

    /// Snapshot of the diagnostic counters.
    pub fn diagnostics(&self) -> KeyboardDiagnostics {
        let mut diagnostics = self.shared.inspect(|state| state.diagnostics);
        diagnostics.encrypt_collisions = self.shared.collisions();
        diagnostics
    }
}

impl<O: BlockOracle> KeyboardState<O> {
    fn seal(&mut self, half: Half, keys: &Keymask) -> Result<[u8; DataPayload::SIZE], PacketError> {
        match self.context.seal_data(&self.oracle, keys, self.key_id) {
            Ok(payload) => {
                bump(&mut self.diagnostics.packets_sent);
                Ok(payload.to_bytes())
            },
            Err(err) => {
                bump(&mut self.diagnostics.encrypt_failures);
                warn!(half = ?half, key_id = self.key_id, error = %err, "failed to seal keymask");
                Err(PacketError::from(err))
            },
        }
    }

    fn adopt(&mut self, half: Half, bytes: &[u8]) -> Result<AckOutcome, PacketError> {
        let payload = SeedPayload::from_bytes(bytes).inspect_err(|_| {
            bump(&mut self.diagnostics.malformed_acks);
        })?;

        if payload.key_id == self.key_id && self.adopted == Some(payload.mac) {
            return Ok(AckOutcome::AlreadyCurrent);
        }

        let seed = match self.receiver.open_seed(&self.oracle, &payload) {
            Ok(seed) => {
                bump(&mut self.diagnostics.rekey_cmac_success);
                seed
            },
            Err(CryptoError::Authentication) => {
                bump(&mut self.diagnostics.rekey_cmac_failure);
                debug!(half = ?half, key_id = payload.key_id, "dropped seed payload with bad MAC");
                return Err(PacketError::Authentication);
            },
            Err(err) => {
                bump(&mut self.diagnostics.rekey_cmac_success);
                bump(&mut self.diagnostics.rekey_decrypt_failure);
                warn!(half = ?half, error = %err, "failed to decrypt seed payload");
                return Err(PacketError::from(err));
            },
        };

        if payload.key_id == BOOTSTRAP_KEY_ID {
            bump(&mut self.diagnostics.rekey_decrypt_failure);
            return Err(PacketError::Crypto(CryptoError::ReservedKeyId));
        }

        if let Err(err) = self.context.rekey(&self.oracle, &self.material, &seed) {
            bump(&mut self.diagnostics.rekey_decrypt_failure);
            warn!(half = ?half, error = %err, "failed to derive proposed generation");
            return Err(PacketError::from(err));
        }

        info!(half = ?half, from = self.key_id, to = payload.key_id, "adopted new key generation");
        self.key_id = payload.key_id;
        self.adopted = Some(payload.mac);
        Ok(AckOutcome::Rekeyed { key_id: payload.key_id })
    }
}
