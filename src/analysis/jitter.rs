//! Seeded pseudo-random source for confidence jitter and demo data.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Injectable random source. The same seed yields the same sequence.
#[derive(Debug, Clone)]
pub struct Jitter {
    rng: StdRng,
}

impl Jitter {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// `base + [0, spread)`, clamped to 100.
    pub fn confidence(&mut self, base: u8, spread: u8) -> u8 {
        let offset = if spread == 0 {
            0
        } else {
            self.rng.gen_range(0..spread)
        };
        base.saturating_add(offset).min(100)
    }

    /// Uniform value in `[low, high)`; returns `low` for an empty range.
    pub fn range_f64(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        self.rng.gen_range(low..high)
    }

    pub fn range_i64(&mut self, low: i64, high: i64) -> i64 {
        if high <= low {
            return low;
        }
        self.rng.gen_range(low..high)
    }

    /// Index into a collection of `len` items. `len` must be non-zero.
    pub fn index(&mut self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        self.rng.gen_range(0..len)
    }

    pub fn coin(&mut self) -> bool {
        self.rng.gen_bool(0.5)
    }
}
