//! Single-block AES encryption oracle.
//!
//! Every construction in this crate (CTR keystream, CMAC, CKDF) reduces to
//! "encrypt one 16-byte block under one 16-byte key". [`BlockOracle`] is that
//! seam. [`SoftwareAes`] backs it with the `aes` crate; [`PolledOracle`]
//! drives a memory-mapped ECB accelerator through the [`EcbPeripheral`] trait
//! with a bounded completion wait.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use aes::{
    Aes128,
    cipher::{BlockEncrypt, KeyInit, generic_array::GenericArray},
};

use crate::error::OracleError;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// AES-128 key size in bytes.
pub const KEY_SIZE: usize = 16;

/// One AES block.
pub type Block = [u8; BLOCK_SIZE];

/// One AES-128 key.
pub type Key = [u8; KEY_SIZE];

/// Encrypts exactly one block under a given key.
///
/// # Invariants
///
/// - Deterministic: the same `(key, plaintext)` always yields the same block
/// - An `Err` never carries partial output; callers treat it as "this
///   operation did not happen"
pub trait BlockOracle {
    /// AES-128 encrypt `plaintext` under `key`.
    fn encrypt_block(&self, key: &Key, plaintext: &Block) -> Result<Block, OracleError>;
}

impl<O: BlockOracle + ?Sized> BlockOracle for &O {
    fn encrypt_block(&self, key: &Key, plaintext: &Block) -> Result<Block, OracleError> {
        (**self).encrypt_block(key, plaintext)
    }
}

/// Software AES-128 oracle. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareAes;

impl BlockOracle for SoftwareAes {
    fn encrypt_block(&self, key: &Key, plaintext: &Block) -> Result<Block, OracleError> {
        let cipher = Aes128::new(GenericArray::from_slice(key));
        let mut block = *plaintext;
        cipher.encrypt_block(GenericArray::from_mut_slice(&mut block));
        Ok(block)
    }
}

/// Status of an ECB job as seen by one poll of the accelerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcbStatus {
    /// Job still running
    Pending,
    /// Job completed with this ciphertext
    Done(Block),
    /// Accelerator raised its error event
    Fault,
}

/// A hardware ECB accelerator.
///
/// Register access goes through `&self`, the way memory-mapped peripherals
/// are usually exposed. Exclusive use is the caller's concern (see the
/// resource guard in `splitkey-core`).
pub trait EcbPeripheral {
    /// Load `key` and `plaintext` and start a job, clearing stale events.
    fn start(&self, key: &Key, plaintext: &Block);

    /// Sample the completion and error events once.
    fn poll(&self) -> EcbStatus;
}

/// Default number of polls before a job is declared timed out.
pub const DEFAULT_POLL_CEILING: u32 = 0x0100_0000;

/// [`BlockOracle`] over an [`EcbPeripheral`] with a bounded completion wait.
#[derive(Debug)]
pub struct PolledOracle<P> {
    peripheral: P,
    poll_ceiling: u32,
    completed: AtomicU32,
    wait_polls: AtomicU64,
}

impl<P: EcbPeripheral> PolledOracle<P> {
    /// Wrap `peripheral` with the default poll ceiling.
    pub fn new(peripheral: P) -> Self {
        Self::with_poll_ceiling(peripheral, DEFAULT_POLL_CEILING)
    }

    /// Wrap `peripheral`, giving up after `poll_ceiling` polls.
    ///
    /// A ceiling of zero is raised to one so every job is polled at least
    /// once.
    pub fn with_poll_ceiling(peripheral: P, poll_ceiling: u32) -> Self {
        Self {
            peripheral,
            poll_ceiling: poll_ceiling.max(1),
            completed: AtomicU32::new(0),
            wait_polls: AtomicU64::new(0),
        }
    }

    /// Number of jobs that completed successfully.
    pub fn completed_jobs(&self) -> u32 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Total polls spent waiting on successful jobs.
    pub fn wait_polls(&self) -> u64 {
        self.wait_polls.load(Ordering::Relaxed)
    }

    /// The wrapped peripheral.
    pub fn peripheral(&self) -> &P {
        &self.peripheral
    }
}

impl<P: EcbPeripheral> BlockOracle for PolledOracle<P> {
    fn encrypt_block(&self, key: &Key, plaintext: &Block) -> Result<Block, OracleError> {
        self.peripheral.start(key, plaintext);

        for polls in 1..=self.poll_ceiling {
            match self.peripheral.poll() {
                EcbStatus::Pending => {},
                EcbStatus::Done(block) => {
                    self.completed.fetch_add(1, Ordering::Relaxed);
                    self.wait_polls.fetch_add(u64::from(polls), Ordering::Relaxed);
                    return Ok(block);
                },
                EcbStatus::Fault => {
                    tracing::warn!(polls, "ECB accelerator reported a fault");
                    return Err(OracleError::HardwareFault);
                },
            }
        }

        tracing::warn!(polls = self.poll_ceiling, "ECB job did not complete");
        Err(OracleError::Timeout { polls: self.poll_ceiling })
    }
}
