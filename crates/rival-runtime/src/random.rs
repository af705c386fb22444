//! [`Dice`] – the single source of randomness for every engine decision.
//!
//! Production uses an entropy- or seed-initialised ChaCha8 stream; tests use
//! [`Dice::fixed`] so every roll returns the same value.

use std::sync::Mutex;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

enum Source {
    Stream(ChaCha8Rng),
    Fixed(f64),
}

/// Thread-safe random draws in `[0, 1)`.
pub struct Dice {
    source: Mutex<Source>,
}

impl Dice {
    /// Seed from OS entropy.
    pub fn from_entropy() -> Self {
        Self::with_source(Source::Stream(ChaCha8Rng::from_entropy()))
    }

    /// Reproducible stream for a given seed.
    pub fn seeded(seed: u64) -> Self {
        Self::with_source(Source::Stream(ChaCha8Rng::seed_from_u64(seed)))
    }

    /// Every roll returns `value` (clamped into `[0, 1)`).
    ///
    /// `fixed(0.0)` makes every non-zero chance succeed; `fixed(0.999)`
    /// makes every chance below one fail.
    pub fn fixed(value: f64) -> Self {
        Self::with_source(Source::Fixed(value.clamp(0.0, 0.999_999)))
    }

    fn with_source(source: Source) -> Self {
        Self {
            source: Mutex::new(source),
        }
    }

    /// One uniform draw in `[0, 1)`.
    pub fn roll(&self) -> f64 {
        let mut guard = self.source.lock().unwrap_or_else(|p| p.into_inner());
        match &mut *guard {
            Source::Stream(rng) => rng.r#gen::<f64>(),
            Source::Fixed(v) => *v,
        }
    }

    /// `true` with probability `p`.  `p ≤ 0` never succeeds, `p ≥ 1` always does.
    pub fn chance(&self, p: f64) -> bool {
        if p <= 0.0 {
            return false;
        }
        if p >= 1.0 {
            return true;
        }
        self.roll() < p
    }

    /// Uniform value in `[lo, hi]`; bounds may be given in either order.
    pub fn uniform(&self, lo: f64, hi: f64) -> f64 {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        lo + self.roll() * (hi - lo)
    }

    /// Pick one element, or `None` for an empty slice.
    pub fn pick<'a, T>(&self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let idx = ((self.roll() * items.len() as f64) as usize).min(items.len() - 1);
        items.get(idx)
    }
}

impl Default for Dice {
    fn default() -> Self {
        Self::from_entropy()
    }
}
