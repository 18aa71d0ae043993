//! Wire payloads exchanged between a keyboard half and the receiver.
//!
//! Both payloads are fixed-size with no padding. Multi-byte integers are
//! little-endian. The MAC always covers the body, which is every byte that
//! precedes it.
//!
//! ```text
//! DataPayload (24 bytes)
//!   0..3    data     keymask ciphertext
//!   3       key_id   key generation used
//!   4..8    counter  CTR counter that produced the keystream (u32 LE)
//!   8..24   mac      CMAC over bytes 0..8
//!
//! SeedPayload (32 bytes)
//!   0..15   seed     ciphertext of the next generation's seed
//!   15      key_id   proposed generation
//!   16..32  mac      CMAC over bytes 0..16
//! ```
//!
//! The `counter` of a data payload is an anti-replay stream counter. A seed
//! payload has no counter on the wire; its seed is encrypted with the CTR
//! counter set to `key_id`, a generation tag rather than a stream position.

use crate::{
    cmac::{TAG_SIZE, Tag},
    error::CryptoError,
};

/// Plaintext keymask size in bytes.
pub const KEYMASK_SIZE: usize = 3;

/// Rotation seed size in bytes.
pub const SEED_SIZE: usize = 15;

/// Keymask sent by a keyboard half.
pub type Keymask = [u8; KEYMASK_SIZE];

/// Seed for a new key generation.
pub type Seed = [u8; SEED_SIZE];

/// Encrypted and authenticated keystroke packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataPayload {
    /// Keymask ciphertext
    pub data: Keymask,
    /// Key generation the packet was sealed under
    pub key_id: u8,
    /// CTR counter used for `data`
    pub counter: u32,
    /// CMAC over the body
    pub mac: Tag,
}

impl DataPayload {
    /// Serialized size.
    pub const SIZE: usize = 24;

    /// Size of the MAC-covered body.
    pub const BODY_SIZE: usize = Self::SIZE - TAG_SIZE;

    /// The MAC-covered body: data, key id and counter.
    pub fn body(&self) -> [u8; Self::BODY_SIZE] {
        let mut body = [0u8; Self::BODY_SIZE];
        body[0..3].copy_from_slice(&self.data);
        body[3] = self.key_id;
        body[4..8].copy_from_slice(&self.counter.to_le_bytes());
        body
    }

    /// Serialize to wire bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[..Self::BODY_SIZE].copy_from_slice(&self.body());
        bytes[Self::BODY_SIZE..].copy_from_slice(&self.mac);
        bytes
    }

    /// Parse wire bytes.
    ///
    /// # Errors
    ///
    /// - `InvalidPayloadLength` unless `bytes` is exactly [`Self::SIZE`] long
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: &[u8; Self::SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidPayloadLength { expected: Self::SIZE, actual: bytes.len() }
        })?;

        let mut data = [0u8; KEYMASK_SIZE];
        data.copy_from_slice(&bytes[0..3]);
        let mut counter = [0u8; 4];
        counter.copy_from_slice(&bytes[4..8]);
        let mut mac = [0u8; TAG_SIZE];
        mac.copy_from_slice(&bytes[Self::BODY_SIZE..]);

        Ok(Self { data, key_id: bytes[3], counter: u32::from_le_bytes(counter), mac })
    }
}

/// Key rotation proposal carried in an acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedPayload {
    /// Seed ciphertext
    pub seed: Seed,
    /// Proposed key generation
    pub key_id: u8,
    /// CMAC over the body
    pub mac: Tag,
}

impl SeedPayload {
    /// Serialized size.
    pub const SIZE: usize = 32;

    /// Size of the MAC-covered body.
    pub const BODY_SIZE: usize = Self::SIZE - TAG_SIZE;

    /// The MAC-covered body: seed ciphertext and key id.
    pub fn body(&self) -> [u8; Self::BODY_SIZE] {
        let mut body = [0u8; Self::BODY_SIZE];
        body[..SEED_SIZE].copy_from_slice(&self.seed);
        body[SEED_SIZE] = self.key_id;
        body
    }

    /// Serialize to wire bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[..Self::BODY_SIZE].copy_from_slice(&self.body());
        bytes[Self::BODY_SIZE..].copy_from_slice(&self.mac);
        bytes
    }

    /// Parse wire bytes.
    ///
    /// # Errors
    ///
    /// - `InvalidPayloadLength` unless `bytes` is exactly [`Self::SIZE`] long
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: &[u8; Self::SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidPayloadLength { expected: Self::SIZE, actual: bytes.len() }
        })?;

        let mut seed = [0u8; SEED_SIZE];
        seed.copy_from_slice(&bytes[..SEED_SIZE]);
        let mut mac = [0u8; TAG_SIZE];
        mac.copy_from_slice(&bytes[Self::BODY_SIZE..]);

        Ok(Self { seed, key_id: bytes[SEED_SIZE], mac })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_data() -> DataPayload {
        DataPayload {
            data: [0xA1, 0xA2, 0xA3],
            key_id: 7,
            counter: 0x0403_0201,
            mac: [0xEE; TAG_SIZE],
        }
    }

    #[test]
    fn sizes_are_wire_exact() {
        assert_eq!(DataPayload::BODY_SIZE, 8);
        assert_eq!(SeedPayload::BODY_SIZE, 16);
    }

    #[test]
    fn data_payload_field_offsets() {
        let bytes = sample_data().to_bytes();

        assert_eq!(&bytes[0..3], &[0xA1, 0xA2, 0xA3]);
        assert_eq!(bytes[3], 7);
        assert_eq!(&bytes[4..8], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[8..24], &[0xEE; 16]);
    }

    #[test]
    fn data_payload_parses_its_own_bytes() {
        let payload = sample_data();
        assert_eq!(DataPayload::from_bytes(&payload.to_bytes()).unwrap(), payload);
    }

    #[test]
    fn seed_payload_field_offsets() {
        let payload = SeedPayload { seed: [0x5E; SEED_SIZE], key_id: 3, mac: [0x11; TAG_SIZE] };
        let bytes = payload.to_bytes();

        assert_eq!(&bytes[0..15], &[0x5E; 15]);
        assert_eq!(bytes[15], 3);
        assert_eq!(&bytes[16..32], &[0x11; 16]);
        assert_eq!(SeedPayload::from_bytes(&bytes).unwrap(), payload);
    }

    #[test]
    fn wrong_lengths_are_rejected() {
        assert_eq!(
            DataPayload::from_bytes(&[0u8; 23]),
            Err(CryptoError::InvalidPayloadLength { expected: 24, actual: 23 })
        );
        assert_eq!(
            SeedPayload::from_bytes(&[0u8; 33]),
            Err(CryptoError::InvalidPayloadLength { expected: 32, actual: 33 })
        );
        assert!(DataPayload::from_bytes(&[]).is_err());
    }
}
