//! Injectable randomness for humanizing delays and onboarding picks.

use rand::Rng;
use std::time::Duration;

pub trait Jitter: Send + Sync {
    /// Uniform pick in `[min_ms, max_ms]`; returns `min_ms` when the range is empty.
    fn pick_ms(&self, min_ms: u64, max_ms: u64) -> u64;

    /// Uniform index in `[0, len)`; `len` is never zero.
    fn pick_index(&self, len: usize) -> usize;

    fn delay(&self, min_ms: u64, max_ms: u64) -> Duration {
        Duration::from_millis(self.pick_ms(min_ms, max_ms))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomJitter;

impl Jitter for RandomJitter {
    fn pick_ms(&self, min_ms: u64, max_ms: u64) -> u64 {
        if max_ms <= min_ms {
            return min_ms;
        }
        rand::rng().random_range(min_ms..=max_ms)
    }

    fn pick_index(&self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        rand::rng().random_range(0..len)
    }
}

/// Deterministic jitter: always the lower bound (or a fixed offset into the range).
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedJitter {
    pub offset_ms: u64,
    pub index: usize,
}

impl FixedJitter {
    pub fn lower_bound() -> Self {
        Self::default()
    }
}

impl Jitter for FixedJitter {
    fn pick_ms(&self, min_ms: u64, max_ms: u64) -> u64 {
        min_ms.saturating_add(self.offset_ms).min(max_ms.max(min_ms))
    }

    fn pick_index(&self, len: usize) -> usize {
        self.index.min(len.saturating_sub(1))
    }
}
