use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Deterministic random number generator for the simulation.
///
/// Wraps a seeded ChaCha8 stream. The same seed always yields the same
/// sample sequence, which is what makes runs bit-reproducible. Forking
/// derives independent per-replica streams from a master seed.
#[derive(Clone, Debug)]
pub struct SimRng {
    inner: ChaCha8Rng,
}

impl SimRng {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Derives an independent stream, deterministically, by consuming one
    /// sample from this one.
    pub fn fork(&mut self) -> Self {
        Self::new(self.next_u64())
    }

    pub fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    /// Uniform in `[0.0, 1.0)`.
    pub fn next_f64(&mut self) -> f64 {
        // 53 random mantissa bits.
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Uniform in `[0, bound]`. `bound = 0` consumes a sample and returns 0
    /// so the stream position stays independent of parameter values.
    pub fn next_u64_inclusive(&mut self, bound: u64) -> u64 {
        let sample = self.next_u64();
        if bound == u64::MAX {
            sample
        } else {
            sample % (bound + 1)
        }
    }

    /// Bernoulli sample with probability `p` of `true`.
    pub fn next_bool_with_probability(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
}
