//! Randomness abstraction.
//!
//! Decouples the rotation state machine from the hardware random number
//! generator. The hardware produces one byte at a time and may have nothing
//! ready; the state machine never waits for it.

use rand::RngCore;

/// Non-blocking source of random bytes.
///
/// # Invariants
///
/// - `poll_byte` never blocks; `None` means "nothing ready, ask again later"
/// - Production implementations draw from a hardware entropy source
pub trait RandomSource {
    /// One fresh random byte, if the source has one ready.
    fn poll_byte(&mut self) -> Option<u8>;
}

impl<R: RandomSource + ?Sized> RandomSource for &mut R {
    fn poll_byte(&mut self) -> Option<u8> {
        (**self).poll_byte()
    }
}

/// Adapts any [`RngCore`] into an always-ready [`RandomSource`].
///
/// Hosts use `RngRandom::new(rand::rngs::OsRng)`; tests seed a
/// `ChaCha8Rng` for reproducible seeds.
#[derive(Debug, Clone)]
pub struct RngRandom<R> {
    rng: R,
}

impl<R: RngCore> RngRandom<R> {
    /// Wrap `rng`.
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Unwrap the inner generator.
    pub fn into_inner(self) -> R {
        self.rng
    }
}

impl<R: RngCore> RandomSource for RngRandom<R> {
    fn poll_byte(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        self.rng.fill_bytes(&mut byte);
        Some(byte[0])
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn seeded_source_is_reproducible() {
        let mut first = RngRandom::new(ChaCha8Rng::seed_from_u64(7));
        let mut second = RngRandom::new(ChaCha8Rng::seed_from_u64(7));

        let a: Vec<_> = (0..32).map(|_| first.poll_byte()).collect();
        let b: Vec<_> = (0..32).map(|_| second.poll_byte()).collect();

        assert_eq!(a, b);
        assert!(a.iter().all(Option::is_some));
    }

    #[test]
    fn mutable_reference_forwards() {
        let mut source = RngRandom::new(ChaCha8Rng::seed_from_u64(1));
        let mut reference = RngRandom::new(ChaCha8Rng::seed_from_u64(1));

        let by_ref = (&mut source).poll_byte();
        assert_eq!(by_ref, reference.poll_byte());
    }
}
