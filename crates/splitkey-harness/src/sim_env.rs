//! Seeded randomness for simulation.

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use splitkey_core::RandomSource;

/// Deterministic stand-in for the hardware RNG.
///
/// Each poll has a byte ready with probability `ready`, so simulations
/// exercise the path where rotation stalls waiting for entropy.
#[derive(Debug, Clone)]
pub struct SimEntropy {
    rng: ChaCha8Rng,
    ready: f64,
    served: u64,
}

impl SimEntropy {
    /// Entropy that is always ready.
    pub fn with_seed(seed: u64) -> Self {
        Self::intermittent(seed, 1.0)
    }

    /// Entropy that has a byte ready on a `ready` fraction of polls.
    pub fn intermittent(seed: u64, ready: f64) -> Self {
        Self { rng: ChaCha8Rng::seed_from_u64(seed), ready, served: 0 }
    }

    /// Bytes handed out so far.
    pub fn served(&self) -> u64 {
        self.served
    }
}

impl RandomSource for SimEntropy {
    fn poll_byte(&mut self) -> Option<u8> {
        if !chance(&mut self.rng, self.ready) {
            return None;
        }
        self.served += 1;
        let mut byte = [0u8; 1];
        self.rng.fill_bytes(&mut byte);
        Some(byte[0])
    }
}

/// True with probability `p`. Out-of-range values saturate; NaN never fires.
pub(crate) fn chance<R: Rng>(rng: &mut R, p: f64) -> bool {
    rng.gen_range(0.0..1.0) < p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_ready_serves_every_poll() {
        let mut entropy = SimEntropy::with_seed(3);
        assert!((0..100).all(|_| entropy.poll_byte().is_some()));
        assert_eq!(entropy.served(), 100);
    }

    #[test]
    fn never_ready_serves_nothing() {
        let mut entropy = SimEntropy::intermittent(3, 0.0);
        assert!((0..100).all(|_| entropy.poll_byte().is_none()));
    }

    #[test]
    fn same_seed_same_bytes() {
        let mut a = SimEntropy::intermittent(11, 0.5);
        let mut b = SimEntropy::intermittent(11, 0.5);
        let first: Vec<_> = (0..64).map(|_| a.poll_byte()).collect();
        let second: Vec<_> = (0..64).map(|_| b.poll_byte()).collect();
        assert_eq!(first, second);
    }
}
