//! Seeded feature sampling for `feature_fraction`
//!
//! Each tree draws its feature subset from a 31-bit linear congruential
//! stream seeded by `seed`, so a given seed picks the same subsets on every
//! platform.

/// Per-learner sampler; one draw sequence per training run
#[derive(Clone, Debug)]
pub struct FeatureSampler {
    state: u32,
}

impl FeatureSampler {
    const MULTIPLIER: u32 = 1_103_515_245;
    const INCREMENT: u32 = 12_345;
    const MASK: u32 = (1 << 31) - 1;

    pub fn new(seed: i64) -> Self {
        // Fold the seed into 31 bits; negative seeds mirror positive ones
        let folded = seed.unsigned_abs() & u64::from(Self::MASK);
        Self {
            state: folded as u32,
        }
    }

    fn step(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(Self::MULTIPLIER)
            .wrapping_add(Self::INCREMENT);
        self.state & Self::MASK
    }

    /// Uniform-ish index in `[0, n)`; 0 when `n` is zero
    fn below(&mut self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        self.step() as usize % n
    }

    /// Pick `k` distinct entries of `pool` (partial Fisher-Yates), returned
    /// in ascending order. Asking for more than the pool holds returns the
    /// whole pool.
    pub fn sample(&mut self, pool: &[usize], k: usize) -> Vec<usize> {
        let mut picked = pool.to_vec();
        let k = k.min(picked.len());
        for i in 0..k {
            let j = i + self.below(picked.len() - i);
            picked.swap(i, j);
        }
        picked.truncate(k);
        picked.sort_unstable();
        picked
    }
}
