//! Random Replacement Policy.
//!
//! This policy evicts a uniformly chosen way of the set. It draws from the
//! simulator's seeded xorshift generator so runs are reproducible.

use super::ReplacementPolicy;
use crate::common::XorShift64;

/// Random Policy state.
#[derive(Clone, Debug)]
pub struct RandomPolicy {
    /// Number of ways in the cache.
    ways: usize,
    /// Generator used for victim selection.
    rng: XorShift64,
}

impl RandomPolicy {
    /// Creates a new Random policy instance.
    ///
    /// # Arguments
    ///
    /// * `ways` - The associativity (number of ways) of the cache.
    /// * `seed` - Seed of the victim generator.
    pub const fn new(ways: usize, seed: u64) -> Self {
        Self {
            ways,
            rng: XorShift64::new(seed),
        }
    }
}

impl ReplacementPolicy for RandomPolicy {
    /// Access patterns do not affect random replacement.
    fn update(&mut self, _set: usize, _way: usize, _was_invalid: bool) {}

    fn insert(&mut self, _set: usize, _way: usize) {}

    fn get_victim(&mut self, _set: usize) -> usize {
        self.rng.below(self.ways as u64) as usize
    }
}
