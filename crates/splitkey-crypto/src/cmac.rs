//! AES-CMAC (OMAC1) over the block oracle.
//!
//! # Lifecycle
//!
//! ```text
//! new(key) ──> update(data)* ──> finish() ──> tag
//!    ▲                                  │
//!    └──────────── restart() ───────────┘
//! ```
//!
//! [`Cmac::new`] spends one oracle call deriving the subkeys `K1`/`K2`.
//! [`Cmac::restart`] clears the accumulator but keeps the subkeys, so a
//! context keyed once can authenticate any number of messages. After
//! [`Cmac::finish`] (successful or not) further `update`/`finish` calls fail
//! with [`CryptoError::ContextFinished`] until the context is restarted.
//!
//! Any oracle failure aborts the message; no partial tag is ever returned.

use std::fmt;

use zeroize::Zeroize;

use crate::{
    error::CryptoError,
    oracle::{BLOCK_SIZE, Block, BlockOracle, Key},
};

/// CMAC tag size in bytes.
pub const TAG_SIZE: usize = BLOCK_SIZE;

/// CMAC tag.
pub type Tag = [u8; TAG_SIZE];

/// Reduction constant for doubling in GF(2^128) with 128-bit blocks.
const RB: u8 = 0x87;

/// First padding byte (ISO/IEC 9797-1 padding method 2).
const PAD_START: u8 = 0x80;

/// Multiply `input` by x in GF(2^128).
fn double(input: &Block) -> Block {
    let mut out = [0u8; BLOCK_SIZE];
    let mut carry = 0u8;
    for i in (0..BLOCK_SIZE).rev() {
        out[i] = (input[i] << 1) | carry;
        carry = input[i] >> 7;
    }
    if input[0] & 0x80 != 0 {
        out[BLOCK_SIZE - 1] ^= RB;
    }
    out
}

fn xor_into(target: &mut Block, other: &Block) {
    for (t, o) in target.iter_mut().zip(other.iter()) {
        *t ^= o;
    }
}

/// Compare two tags without an early exit on the first differing byte.
pub fn tags_match(a: &Tag, b: &Tag) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Streaming CMAC context.
#[derive(Clone)]
pub struct Cmac {
    key: Key,
    key1: Block,
    key2: Block,
    /// Bytes of the block currently being filled
    buffer: Block,
    /// Output of the previous block cipher call
    chain: Block,
    /// Bytes buffered in `buffer` (0..=16)
    partial_len: usize,
    /// Whether a full block has already been folded into `chain`
    multiblock: bool,
    finished: bool,
}

impl Cmac {
    /// Key a new context, deriving the subkeys with one oracle call.
    pub fn new<O: BlockOracle + ?Sized>(oracle: &O, key: &Key) -> Result<Self, CryptoError> {
        let mut l = oracle.encrypt_block(key, &[0u8; BLOCK_SIZE])?;
        let key1 = double(&l);
        let key2 = double(&key1);
        l.zeroize();

        Ok(Self {
            key: *key,
            key1,
            key2,
            buffer: [0u8; BLOCK_SIZE],
            chain: [0u8; BLOCK_SIZE],
            partial_len: 0,
            multiblock: false,
            finished: false,
        })
    }

    /// Clear the accumulator so a new message can be authenticated.
    pub fn restart(&mut self) {
        self.buffer.zeroize();
        self.chain.zeroize();
        self.partial_len = 0;
        self.multiblock = false;
        self.finished = false;
    }

    /// Whether `finish` has been called since the last restart.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Absorb `data`.
    ///
    /// A full buffered block is only encrypted once more data arrives, since
    /// the final block needs subkey treatment in [`finish`](Self::finish).
    pub fn update<O: BlockOracle + ?Sized>(
        &mut self,
        oracle: &O,
        data: &[u8],
    ) -> Result<(), CryptoError> {
        if self.finished {
            return Err(CryptoError::ContextFinished);
        }

        let mut rest = data;
        while !rest.is_empty() {
            let take = (BLOCK_SIZE - self.partial_len).min(rest.len());
            self.buffer[self.partial_len..self.partial_len + take].copy_from_slice(&rest[..take]);
            self.partial_len += take;
            rest = &rest[take..];

            if self.partial_len == BLOCK_SIZE && !rest.is_empty() {
                self.fold_block(oracle)?;
            }
        }

        Ok(())
    }

    /// Encrypt the full buffered block into the chaining value.
    fn fold_block<O: BlockOracle + ?Sized>(&mut self, oracle: &O) -> Result<(), CryptoError> {
        if self.multiblock {
            xor_into(&mut self.buffer, &self.chain);
        }

        match oracle.encrypt_block(&self.key, &self.buffer) {
            Ok(ciphertext) => self.chain = ciphertext,
            Err(err) => {
                self.finished = true;
                return Err(err.into());
            },
        }

        self.multiblock = true;
        self.partial_len = 0;
        Ok(())
    }

    /// Complete the message and return its tag.
    pub fn finish<O: BlockOracle + ?Sized>(&mut self, oracle: &O) -> Result<Tag, CryptoError> {
        if self.finished {
            return Err(CryptoError::ContextFinished);
        }
        self.finished = true;

        let mut last = self.buffer;
        let used = self.partial_len;
        if used == BLOCK_SIZE {
            xor_into(&mut last, &self.key1);
        } else {
            for i in 0..used {
                last[i] ^= self.key2[i];
            }
            last[used] = PAD_START ^ self.key2[used];
            last[used + 1..].copy_from_slice(&self.key2[used + 1..]);
        }

        if self.multiblock {
            xor_into(&mut last, &self.chain);
        }

        let tag = oracle.encrypt_block(&self.key, &last);
        last.zeroize();
        Ok(tag?)
    }

    /// Restart, absorb `data` and finish in one call.
    pub fn compute<O: BlockOracle + ?Sized>(
        &mut self,
        oracle: &O,
        data: &[u8],
    ) -> Result<Tag, CryptoError> {
        self.restart();
        self.update(oracle, data)?;
        self.finish(oracle)
    }

    /// Recompute the tag over `data` and compare it to `tag`.
    ///
    /// # Errors
    ///
    /// - `Authentication` if the tags differ
    /// - `Oracle` if the tag could not be computed
    pub fn verify<O: BlockOracle + ?Sized>(
        &mut self,
        oracle: &O,
        data: &[u8],
        tag: &Tag,
    ) -> Result<(), CryptoError> {
        let expected = self.compute(oracle, data)?;
        if tags_match(&expected, tag) { Ok(()) } else { Err(CryptoError::Authentication) }
    }

    #[cfg(test)]
    pub(crate) fn subkeys(&self) -> (&Block, &Block) {
        (&self.key1, &self.key2)
    }
}

/// One-shot CMAC of `data` under `key`.
pub fn cmac<O: BlockOracle + ?Sized>(oracle: &O, key: &Key, data: &[u8]) -> Result<Tag, CryptoError> {
    Cmac::new(oracle, key)?.compute(oracle, data)
}

impl fmt::Debug for Cmac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cmac")
            .field("partial_len", &self.partial_len)
            .field("multiblock", &self.multiblock)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl Drop for Cmac {
    fn drop(&mut self) {
        self.key.zeroize();
        self.key1.zeroize();
        self.key2.zeroize();
        self.buffer.zeroize();
        self.chain.zeroize();
    }
}
