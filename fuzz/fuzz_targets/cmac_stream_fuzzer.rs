//! Fuzz target for streaming CMAC
//!
//! # Strategy
//!
//! - Arbitrary key and message, split into arbitrary chunks
//! - Empty chunks, chunks straddling block boundaries, exact multiples
//!
//! # Invariants
//!
//! - Any chunking of a message yields the one-shot tag
//! - A restarted context reproduces the tag
//! - Update after finish MUST fail

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use splitkey_crypto::{Cmac, CryptoError, SoftwareAes, cmac};

#[derive(Debug, Arbitrary)]
struct Input {
    key: [u8; 16],
    message: Vec<u8>,
    cuts: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let oracle = SoftwareAes;
    let expected = cmac(&oracle, &input.key, &input.message).unwrap();

    let mut mac = Cmac::new(&oracle, &input.key).unwrap();
    let mut rest = input.message.as_slice();
    for cut in &input.cuts {
        let take = usize::from(*cut).min(rest.len());
        mac.update(&oracle, &rest[..take]).unwrap();
        rest = &rest[take..];
    }
    mac.update(&oracle, rest).unwrap();
    assert_eq!(mac.finish(&oracle).unwrap(), expected, "chunked tag differs from one-shot");

    assert!(matches!(mac.update(&oracle, b"x"), Err(CryptoError::ContextFinished)));

    assert_eq!(mac.compute(&oracle, &input.message).unwrap(), expected);
});
