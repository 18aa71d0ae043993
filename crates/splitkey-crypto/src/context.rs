//! Per-identity crypto contexts and their key derivation.
//!
//! Each identity owns one AES-CTR context and one CMAC context, both derived
//! with CKDF:
//!
//! ```text
//! ikm (master secret, or rotation seed)
//!        │
//!        ▼
//! extract(ikm, identity salt) → prk
//!        │
//!        ├─ expand(prk, "encryption key",   16) → CTR key
//!        ├─ expand(prk, "encryption nonce", 12) → CTR nonce
//!        └─ expand(prk, "MAC key",          16) → CMAC key
//! ```
//!
//! Rekeying swaps the master secret for a seed, so rotated session keys never
//! touch the long-term secret and no radio peer ever learns it.

use std::fmt;

use zeroize::Zeroize;

use crate::{
    ckdf::{expand_array, extract},
    cmac::{Cmac, TAG_SIZE},
    ctr::{AesCtr, Nonce},
    error::CryptoError,
    oracle::{BlockOracle, Key},
    payload::{DataPayload, Keymask, Seed, SeedPayload},
};

/// CKDF info label for the CTR key.
pub const ENCRYPTION_KEY_INFO: &[u8] = b"encryption key";

/// CKDF info label for the CTR nonce.
pub const ENCRYPTION_NONCE_INFO: &[u8] = b"encryption nonce";

/// CKDF info label for the CMAC key.
pub const MAC_KEY_INFO: &[u8] = b"MAC key";

/// The three fixed roles on the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Left keyboard half
    LeftKeyboard,
    /// Right keyboard half
    RightKeyboard,
    /// Receiver dongle
    Receiver,
}

/// Process-wide secrets: the master secret and one salt per identity.
#[derive(Clone)]
pub struct KeyMaterial {
    master_secret: Key,
    left_salt: Key,
    right_salt: Key,
    receiver_salt: Key,
}

/// Development master secret. Replace per device pair before deployment.
const DEFAULT_MASTER_SECRET: Key = [
    0x9c, 0x41, 0x0e, 0xd7, 0x6a, 0x13, 0xb8, 0x2f, 0xe5, 0x70, 0x3d, 0x84, 0x1b, 0xc6, 0x59, 0xa2,
];

impl KeyMaterial {
    /// Bundle the master secret with the identity salts.
    ///
    /// # Errors
    ///
    /// - `InvalidKeyMaterial` if any two salts are equal, which would give
    ///   two identities the same keys
    pub fn new(
        master_secret: Key,
        left_salt: Key,
        right_salt: Key,
        receiver_salt: Key,
    ) -> Result<Self, CryptoError> {
        if left_salt == right_salt || left_salt == receiver_salt || right_salt == receiver_salt {
            return Err(CryptoError::InvalidKeyMaterial { reason: "identity salts must differ" });
        }
        Ok(Self { master_secret, left_salt, right_salt, receiver_salt })
    }

    /// The long-term secret shared by all three devices.
    pub fn master_secret(&self) -> &Key {
        &self.master_secret
    }

    /// Domain-separating salt for `identity`.
    pub fn salt(&self, identity: Identity) -> &Key {
        match identity {
            Identity::LeftKeyboard => &self.left_salt,
            Identity::RightKeyboard => &self.right_salt,
            Identity::Receiver => &self.receiver_salt,
        }
    }
}

impl Default for KeyMaterial {
    fn default() -> Self {
        Self {
            master_secret: DEFAULT_MASTER_SECRET,
            left_salt: *b"splitkey:left-kb",
            right_salt: *b"splitkey:rightkb",
            receiver_salt: *b"splitkey:receivr",
        }
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial").finish_non_exhaustive()
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.master_secret.zeroize();
    }
}

/// One identity's CTR and CMAC state.
///
/// # Invariants
///
/// - Right after [`init`](Self::init), [`from_seed`](Self::from_seed) or a
///   successful [`rekey`](Self::rekey) the CTR counter is 0 and the CMAC
///   subkeys are derived
/// - A failed `rekey` leaves the previous keys in place
#[derive(Debug, Clone)]
pub struct CryptoContext {
    identity: Identity,
    ctr: AesCtr,
    cmac: Cmac,
}

impl CryptoContext {
    /// Derive `identity`'s bootstrap context from the master secret.
    pub fn init<O: BlockOracle + ?Sized>(
        oracle: &O,
        material: &KeyMaterial,
        identity: Identity,
    ) -> Result<Self, CryptoError> {
        Self::derive(oracle, material.master_secret(), material.salt(identity), identity)
    }

    /// Derive a context for `identity` with `seed` in place of the master
    /// secret.
    pub fn from_seed<O: BlockOracle + ?Sized>(
        oracle: &O,
        material: &KeyMaterial,
        identity: Identity,
        seed: &[u8],
    ) -> Result<Self, CryptoError> {
        Self::derive(oracle, seed, material.salt(identity), identity)
    }

    /// Replace this context's keys with ones derived from `seed`.
    ///
    /// On error the context is unchanged and keeps working under its current
    /// keys.
    pub fn rekey<O: BlockOracle + ?Sized>(
        &mut self,
        oracle: &O,
        material: &KeyMaterial,
        seed: &[u8],
    ) -> Result<(), CryptoError> {
        *self = Self::from_seed(oracle, material, self.identity, seed)?;
        Ok(())
    }

    fn derive<O: BlockOracle + ?Sized>(
        oracle: &O,
        ikm: &[u8],
        salt: &Key,
        identity: Identity,
    ) -> Result<Self, CryptoError> {
        let mut prk = extract(oracle, ikm, salt)?;
        let derived = Self::expand_keys(oracle, &prk, identity);
        prk.zeroize();
        derived
    }

    fn expand_keys<O: BlockOracle + ?Sized>(
        oracle: &O,
        prk: &Key,
        identity: Identity,
    ) -> Result<Self, CryptoError> {
        let mut key: Key = expand_array(oracle, prk, ENCRYPTION_KEY_INFO)?;
        let mut nonce: Nonce = expand_array(oracle, prk, ENCRYPTION_NONCE_INFO)?;
        let mut mac_key: Key = expand_array(oracle, prk, MAC_KEY_INFO)?;

        let ctr = AesCtr::new(&key, &nonce);
        let cmac = Cmac::new(oracle, &mac_key);

        key.zeroize();
        nonce.zeroize();
        mac_key.zeroize();

        Ok(Self { identity, ctr, cmac: cmac? })
    }

    /// Identity these keys belong to.
    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// CTR state.
    pub fn ctr(&self) -> &AesCtr {
        &self.ctr
    }

    /// Mutable CTR state.
    pub fn ctr_mut(&mut self) -> &mut AesCtr {
        &mut self.ctr
    }

    /// Mutable CMAC state.
    pub fn cmac_mut(&mut self) -> &mut Cmac {
        &mut self.cmac
    }

    /// Encrypt and authenticate a keymask under the next counter.
    ///
    /// The counter is consumed even if the MAC step fails afterwards, so a
    /// keystream block is never reused.
    pub fn seal_data<O: BlockOracle + ?Sized>(
        &mut self,
        oracle: &O,
        keys: &Keymask,
        key_id: u8,
    ) -> Result<DataPayload, CryptoError> {
        let mut data = *keys;
        self.ctr.encrypt(oracle, &mut data)?;
        let counter = self.ctr.advance()?;

        let mut payload = DataPayload { data, key_id, counter, mac: [0u8; TAG_SIZE] };
        payload.mac = self.cmac.compute(oracle, &payload.body())?;
        Ok(payload)
    }

    /// Authenticate a data payload, then decrypt its keymask.
    ///
    /// The CTR counter is moved to the packet's counter before decrypting.
    /// Nothing is decrypted unless the MAC matches.
    pub fn open_data<O: BlockOracle + ?Sized>(
        &mut self,
        oracle: &O,
        payload: &DataPayload,
    ) -> Result<Keymask, CryptoError> {
        self.cmac.verify(oracle, &payload.body(), &payload.mac)?;

        self.ctr.set_counter(payload.counter);
        let mut keys = payload.data;
        self.ctr.decrypt(oracle, &mut keys)?;
        Ok(keys)
    }

    /// Encrypt and authenticate a rotation seed proposing `key_id`.
    ///
    /// The CTR counter is set to `key_id` for this single block.
    pub fn seal_seed<O: BlockOracle + ?Sized>(
        &mut self,
        oracle: &O,
        seed: &Seed,
        key_id: u8,
    ) -> Result<SeedPayload, CryptoError> {
        self.ctr.set_counter(u32::from(key_id));
        let mut ciphertext = *seed;
        self.ctr.encrypt(oracle, &mut ciphertext)?;

        let mut payload = SeedPayload { seed: ciphertext, key_id, mac: [0u8; TAG_SIZE] };
        payload.mac = self.cmac.compute(oracle, &payload.body())?;
        Ok(payload)
    }

    /// Authenticate a seed payload, then decrypt the seed.
    pub fn open_seed<O: BlockOracle + ?Sized>(
        &mut self,
        oracle: &O,
        payload: &SeedPayload,
    ) -> Result<Seed, CryptoError> {
        self.cmac.verify(oracle, &payload.body(), &payload.mac)?;

        self.ctr.set_counter(u32::from(payload.key_id));
        let mut seed = payload.seed;
        self.ctr.decrypt(oracle, &mut seed)?;
        Ok(seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ckdf::expand,
        cmac::cmac,
        oracle::SoftwareAes,
        payload::SEED_SIZE,
    };

    fn init(identity: Identity) -> CryptoContext {
        CryptoContext::init(&SoftwareAes, &KeyMaterial::default(), identity).unwrap()
    }

    #[test]
    fn default_salts_are_distinct() {
        let material = KeyMaterial::default();
        let salts = [
            material.salt(Identity::LeftKeyboard),
            material.salt(Identity::RightKeyboard),
            material.salt(Identity::Receiver),
        ];
        assert_ne!(salts[0], salts[1]);
        assert_ne!(salts[0], salts[2]);
        assert_ne!(salts[1], salts[2]);
    }

    #[test]
    fn duplicate_salts_are_rejected() {
        let result = KeyMaterial::new([0; 16], [1; 16], [1; 16], [2; 16]);
        assert!(matches!(result, Err(CryptoError::InvalidKeyMaterial { .. })));
    }

    #[test]
    fn init_starts_counter_at_zero() {
        assert_eq!(init(Identity::LeftKeyboard).ctr().counter(), 0);
    }

    #[test]
    fn init_matches_manual_derivation() {
        let material = KeyMaterial::default();
        let salt = material.salt(Identity::Receiver);
        let prk = cmac(&SoftwareAes, salt, material.master_secret()).unwrap();
        let mut mac_key = [0u8; 16];
        expand(&SoftwareAes, &prk, MAC_KEY_INFO, &mut mac_key).unwrap();

        let mut context = init(Identity::Receiver);
        let tag = context.cmac_mut().compute(&SoftwareAes, b"probe").unwrap();

        assert_eq!(tag, cmac(&SoftwareAes, &mac_key, b"probe").unwrap());
    }

    #[test]
    fn identities_derive_different_keys() {
        let mut left = init(Identity::LeftKeyboard);
        let mut right = init(Identity::RightKeyboard);

        let left_tag = left.cmac_mut().compute(&SoftwareAes, b"probe").unwrap();
        let right_tag = right.cmac_mut().compute(&SoftwareAes, b"probe").unwrap();

        assert_ne!(left_tag, right_tag);
        assert_ne!(
            left.ctr().keystream(&SoftwareAes).unwrap(),
            right.ctr().keystream(&SoftwareAes).unwrap()
        );
    }

    #[test]
    fn sealed_data_opens_with_peer_context() {
        let mut sender = init(Identity::LeftKeyboard);
        let mut receiver = init(Identity::LeftKeyboard);

        let payload = sender.seal_data(&SoftwareAes, &[0x80, 0x01, 0x42], 0).unwrap();
        let keys = receiver.open_data(&SoftwareAes, &payload).unwrap();

        assert_eq!(keys, [0x80, 0x01, 0x42]);
        assert_eq!(payload.counter, 0);
        assert_eq!(sender.ctr().counter(), 1);
    }

    #[test]
    fn open_data_rejects_tampered_counter() {
        let mut sender = init(Identity::RightKeyboard);
        let mut receiver = init(Identity::RightKeyboard);

        let mut payload = sender.seal_data(&SoftwareAes, &[1, 2, 3], 0).unwrap();
        payload.counter ^= 1;

        assert_eq!(receiver.open_data(&SoftwareAes, &payload), Err(CryptoError::Authentication));
    }

    #[test]
    fn seed_roundtrip_uses_key_id_as_counter() {
        let mut receiver_side = init(Identity::Receiver);
        let mut keyboard_side = init(Identity::Receiver);
        let seed = [0x3C; SEED_SIZE];

        let payload = receiver_side.seal_seed(&SoftwareAes, &seed, 9).unwrap();
        assert_eq!(receiver_side.ctr().counter(), 9);
        assert_ne!(payload.seed, seed);

        assert_eq!(keyboard_side.open_seed(&SoftwareAes, &payload).unwrap(), seed);
    }

    #[test]
    fn open_seed_rejects_forged_key_id() {
        let mut receiver_side = init(Identity::Receiver);
        let mut keyboard_side = init(Identity::Receiver);

        let mut payload = receiver_side.seal_seed(&SoftwareAes, &[7; SEED_SIZE], 4).unwrap();
        payload.key_id = 5;

        assert_eq!(
            keyboard_side.open_seed(&SoftwareAes, &payload),
            Err(CryptoError::Authentication)
        );
    }

    #[test]
    fn rekey_resets_counter_and_changes_keys() {
        let mut context = init(Identity::LeftKeyboard);
        context.ctr_mut().set_counter(41);
        let before = context.cmac_mut().compute(&SoftwareAes, b"probe").unwrap();

        context.rekey(&SoftwareAes, &KeyMaterial::default(), &[0xAB; SEED_SIZE]).unwrap();

        assert_eq!(context.ctr().counter(), 0);
        assert_eq!(context.identity(), Identity::LeftKeyboard);
        assert_ne!(context.cmac_mut().compute(&SoftwareAes, b"probe").unwrap(), before);
    }

    #[test]
    fn rekey_matches_from_seed() {
        let material = KeyMaterial::default();
        let seed = [0x17; SEED_SIZE];

        let mut rekeyed = init(Identity::RightKeyboard);
        rekeyed.rekey(&SoftwareAes, &material, &seed).unwrap();
        let mut fresh =
            CryptoContext::from_seed(&SoftwareAes, &material, Identity::RightKeyboard, &seed)
                .unwrap();

        assert_eq!(
            rekeyed.cmac_mut().compute(&SoftwareAes, b"probe").unwrap(),
            fresh.cmac_mut().compute(&SoftwareAes, b"probe").unwrap()
        );
    }
}
