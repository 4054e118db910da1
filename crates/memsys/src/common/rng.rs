//! Deterministic pseudo-random numbers.
//!
//! A 64-bit xorshift generator. Simulations must be reproducible, so every
//! random decision (retry jitter, random replacement) draws from a seeded
//! instance of this generator instead of an OS source.

/// Seed used when the configuration does not provide one.
pub const DEFAULT_SEED: u64 = 123_456_789;

/// Xorshift64 generator state.
#[derive(Clone, Debug)]
pub struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    /// Creates a generator; a zero seed is replaced by [`DEFAULT_SEED`]
    /// because xorshift never leaves the all-zero state.
    pub const fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { DEFAULT_SEED } else { seed },
        }
    }

    /// Returns the next value of the sequence.
    pub const fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Returns a value uniformly distributed in `0..bound`.
    ///
    /// `bound` must be non-zero.
    pub const fn below(&mut self, bound: u64) -> u64 {
        self.next_u64() % bound
    }
}

impl Default for XorShift64 {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}
