//! AES-CTR over the block oracle.
//!
//! The counter block is `nonce (12 bytes) || counter (4 bytes, little-endian)`.
//! Only single-block inputs are supported: every payload this link encrypts
//! fits in one keystream block, so there is no multi-block chaining.
//!
//! The context never advances its own counter while encrypting. Callers that
//! produce traffic capture the counter, encrypt, then call
//! [`AesCtr::advance`], so the counter carried on the wire is always the one
//! that generated the keystream.

use std::fmt;

use zeroize::Zeroize;

use crate::{
    error::CryptoError,
    oracle::{BLOCK_SIZE, Block, BlockOracle, Key},
};

/// CTR nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// CTR nonce.
pub type Nonce = [u8; NONCE_SIZE];

/// AES-CTR context: key, nonce and the next counter value.
///
/// # Invariants
///
/// - For a given `(key, nonce)` a counter value is used for at most one
///   outbound block; [`advance`](Self::advance) refuses to wrap
/// - Counters reset only when the owning crypto context is rekeyed
#[derive(Clone)]
pub struct AesCtr {
    key: Key,
    nonce: Nonce,
    counter: u32,
}

impl AesCtr {
    /// Load `key` and `nonce` with the counter at zero.
    pub fn new(key: &Key, nonce: &Nonce) -> Self {
        Self { key: *key, nonce: *nonce, counter: 0 }
    }

    /// Counter value the next keystream block will use.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Overwrite the counter.
    ///
    /// Used on the receive side to line up with an authenticated packet, and
    /// to tag single-block seed encryptions with their key generation.
    pub fn set_counter(&mut self, counter: u32) {
        self.counter = counter;
    }

    /// Return the current counter and step past it.
    ///
    /// Fails with [`CryptoError::CounterExhausted`] once the counter sits at
    /// `u32::MAX`; the context must be rekeyed before it can send again.
    pub fn advance(&mut self) -> Result<u32, CryptoError> {
        let used = self.counter;
        self.counter = used.checked_add(1).ok_or(CryptoError::CounterExhausted)?;
        Ok(used)
    }

    /// The counter block fed to the oracle for the current counter.
    fn counter_block(&self) -> Block {
        let mut block = [0u8; BLOCK_SIZE];
        block[..NONCE_SIZE].copy_from_slice(&self.nonce);
        block[NONCE_SIZE..].copy_from_slice(&self.counter.to_le_bytes());
        block
    }

    /// One keystream block for the current counter.
    pub fn keystream<O: BlockOracle + ?Sized>(&self, oracle: &O) -> Result<Block, CryptoError> {
        Ok(oracle.encrypt_block(&self.key, &self.counter_block())?)
    }

    /// XOR `data` in place with the keystream for the current counter.
    ///
    /// # Errors
    ///
    /// - `InputTooLong` if `data` is longer than one block
    /// - `Oracle` if the keystream block could not be produced
    pub fn apply_keystream<O: BlockOracle + ?Sized>(
        &self,
        oracle: &O,
        data: &mut [u8],
    ) -> Result<(), CryptoError> {
        if data.len() > BLOCK_SIZE {
            return Err(CryptoError::InputTooLong { len: data.len(), max: BLOCK_SIZE });
        }

        let mut keystream = self.keystream(oracle)?;
        for (byte, pad) in data.iter_mut().zip(keystream.iter()) {
            *byte ^= pad;
        }
        keystream.zeroize();

        Ok(())
    }

    /// Encrypt `data` in place under the current counter.
    pub fn encrypt<O: BlockOracle + ?Sized>(
        &self,
        oracle: &O,
        data: &mut [u8],
    ) -> Result<(), CryptoError> {
        self.apply_keystream(oracle, data)
    }

    /// Decrypt `data` in place under the current counter.
    ///
    /// CTR mode is an involution, so this is [`encrypt`](Self::encrypt).
    pub fn decrypt<O: BlockOracle + ?Sized>(
        &self,
        oracle: &O,
        data: &mut [u8],
    ) -> Result<(), CryptoError> {
        self.apply_keystream(oracle, data)
    }
}

impl fmt::Debug for AesCtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesCtr").field("counter", &self.counter).finish_non_exhaustive()
    }
}

impl Drop for AesCtr {
    fn drop(&mut self) {
        self.key.zeroize();
        self.nonce.zeroize();
    }
}
