//! Random number generator abstraction for determinism.
//!
//! The autonomous writer rolls dice to decide whether to write and whether to
//! finish a story. In production this wraps the thread RNG; in tests a
//! scripted implementation is injected.

use rand::Rng;

/// Abstraction over random number generation.
pub trait DeterministicRng: Send + Sync {
    /// Generate a random `u32` in the range `[min, max]` inclusive.
    fn next_u32_range(&mut self, min: u32, max: u32) -> u32;

    /// Returns true with probability `chances / out_of`.
    ///
    /// `odds(5, 12)` is "a 5 in 12 chance". An `out_of` of zero never hits.
    fn odds(&mut self, chances: u32, out_of: u32) -> bool {
        if out_of == 0 {
            return false;
        }
        self.next_u32_range(0, out_of - 1) < chances
    }
}

/// Production RNG backed by the thread-local generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRng;

impl DeterministicRng for SystemRng {
    fn next_u32_range(&mut self, min: u32, max: u32) -> u32 {
        if min >= max {
            return min;
        }
        rand::rng().random_range(min..=max)
    }
}
