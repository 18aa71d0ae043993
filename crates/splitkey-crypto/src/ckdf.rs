//! CKDF: HKDF-style extract-and-expand with AES-CMAC as the PRF.
//!
//! The salt is used directly as the CMAC key, so it must be exactly one
//! AES-128 key long. The expand step chains blocks as
//! `T(i) = CMAC(prk, T(i-1) || info || i)` with `T(0)` empty and a one-byte
//! block counter, bounding the output at 255 blocks.

use zeroize::Zeroize;

use crate::{
    cmac::{Cmac, cmac},
    error::CryptoError,
    oracle::{BLOCK_SIZE, BlockOracle, Key},
};

/// Largest `expand` output: 255 blocks.
pub const MAX_OUTPUT_LEN: usize = 255 * BLOCK_SIZE;

/// Extract a pseudorandom key from `ikm`, keyed by `salt`.
pub fn extract<O: BlockOracle + ?Sized>(
    oracle: &O,
    ikm: &[u8],
    salt: &Key,
) -> Result<Key, CryptoError> {
    cmac(oracle, salt, ikm)
}

/// Expand `prk` into `okm.len()` bytes bound to `info`.
///
/// # Errors
///
/// - `ProtocolBounds` if `okm` is longer than [`MAX_OUTPUT_LEN`]; `okm` is
///   left untouched
/// - `Oracle` if any CMAC step fails; `okm` contents are then unspecified
pub fn expand<O: BlockOracle + ?Sized>(
    oracle: &O,
    prk: &Key,
    info: &[u8],
    okm: &mut [u8],
) -> Result<(), CryptoError> {
    if okm.len() > MAX_OUTPUT_LEN {
        return Err(CryptoError::ProtocolBounds {
            what: "CKDF expand output",
            requested: okm.len(),
            max: MAX_OUTPUT_LEN,
        });
    }

    let mut mac = Cmac::new(oracle, prk)?;
    let mut previous = [0u8; BLOCK_SIZE];

    for (index, chunk) in okm.chunks_mut(BLOCK_SIZE).enumerate() {
        // Bounded by MAX_OUTPUT_LEN above, so the counter is 1..=255
        let counter = (index + 1) as u8;

        mac.restart();
        if index > 0 {
            mac.update(oracle, &previous)?;
        }
        mac.update(oracle, info)?;
        mac.update(oracle, &[counter])?;
        previous = mac.finish(oracle)?;

        chunk.copy_from_slice(&previous[..chunk.len()]);
    }

    previous.zeroize();
    Ok(())
}

/// [`expand`] into a fixed-size array.
pub fn expand_array<O: BlockOracle + ?Sized, const N: usize>(
    oracle: &O,
    prk: &Key,
    info: &[u8],
) -> Result<[u8; N], CryptoError> {
    let mut okm = [0u8; N];
    expand(oracle, prk, info, &mut okm)?;
    Ok(okm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::SoftwareAes;

    const PRK: Key = [0x5a; 16];

    #[test]
    fn extract_is_cmac_keyed_by_salt() {
        let salt = [0x33; 16];
        let prk = extract(&SoftwareAes, b"input keying material", &salt).unwrap();
        assert_eq!(prk, cmac(&SoftwareAes, &salt, b"input keying material").unwrap());
    }

    #[test]
    fn first_block_omits_previous_output() {
        let okm: [u8; 16] = expand_array(&SoftwareAes, &PRK, b"info").unwrap();

        let mut expected_input = b"info".to_vec();
        expected_input.push(1);
        assert_eq!(okm, cmac(&SoftwareAes, &PRK, &expected_input).unwrap());
    }

    #[test]
    fn second_block_chains_first() {
        let okm: [u8; 32] = expand_array(&SoftwareAes, &PRK, b"info").unwrap();

        let mut second_input = okm[..16].to_vec();
        second_input.extend_from_slice(b"info");
        second_input.push(2);
        assert_eq!(okm[16..], cmac(&SoftwareAes, &PRK, &second_input).unwrap());
    }

    #[test]
    fn short_output_is_prefix_of_longer_output() {
        let short: [u8; 12] = expand_array(&SoftwareAes, &PRK, b"encryption nonce").unwrap();
        let long: [u8; 40] = expand_array(&SoftwareAes, &PRK, b"encryption nonce").unwrap();
        assert_eq!(short, long[..12]);
    }

    #[test]
    fn maximum_output_is_accepted() {
        let mut okm = vec![0u8; MAX_OUTPUT_LEN];
        assert!(expand(&SoftwareAes, &PRK, b"max", &mut okm).is_ok());
    }

    #[test]
    fn oversized_output_is_rejected() {
        let mut okm = vec![0u8; MAX_OUTPUT_LEN + 1];
        let result = expand(&SoftwareAes, &PRK, b"too long", &mut okm);

        assert!(matches!(result, Err(CryptoError::ProtocolBounds { requested, max, .. })
            if requested == MAX_OUTPUT_LEN + 1 && max == MAX_OUTPUT_LEN));
        assert!(okm.iter().all(|&b| b == 0));
    }

    #[test]
    fn empty_output_needs_no_blocks() {
        let mut okm: [u8; 0] = [];
        assert!(expand(&SoftwareAes, &PRK, b"empty", &mut okm).is_ok());
    }

    #[test]
    fn different_info_produces_different_output() {
        let key: [u8; 16] = expand_array(&SoftwareAes, &PRK, b"encryption key").unwrap();
        let mac_key: [u8; 16] = expand_array(&SoftwareAes, &PRK, b"MAC key").unwrap();
        assert_ne!(key, mac_key);
    }
}
