//! Cache Replacement Policies.
//!
//! Implements the algorithms a set-associative cache uses to pick the way a
//! missing block is installed into.
//!
//! # Policies
//!
//! - `Lru`: Least Recently Used.
//! - `Fifo`: First-In, First-Out.
//! - `Random`: Uniform random selection.
//!
//! LRU and FIFO keep, per set, an ordered list of ways ([`WayList`]). They
//! differ only in *when* a way moves to the head. Both return the tail as the
//! victim and immediately move it to the head, so two replacements issued back
//! to back (before the first victim is overwritten) never pick the same way.

use std::fmt;

/// First-In, First-Out replacement policy.
pub mod fifo;

/// Least Recently Used replacement policy.
pub mod lru;

/// Random replacement policy.
pub mod random;

pub use fifo::FifoPolicy;
pub use lru::LruPolicy;
pub use random::RandomPolicy;

/// Trait for cache replacement policies.
///
/// Defines the interface for updating usage state and selecting victim ways.
pub trait ReplacementPolicy: fmt::Debug {
    /// Updates the policy state when a way is accessed.
    ///
    /// # Arguments
    ///
    /// * `set` - The cache set index.
    /// * `way` - The way index within the set that was accessed.
    /// * `was_invalid` - Whether the block held no valid data before this access.
    fn update(&mut self, set: usize, way: usize, was_invalid: bool);

    /// Notifies the policy that a new tag was written into a way.
    ///
    /// # Arguments
    ///
    /// * `set` - The cache set index.
    /// * `way` - The way whose tag changed.
    fn insert(&mut self, set: usize, way: usize);

    /// Selects a victim way in a specific set.
    ///
    /// # Arguments
    ///
    /// * `set` - The cache set index.
    ///
    /// # Returns
    ///
    /// The index of the way to replace.
    fn get_victim(&mut self, set: usize) -> usize;

    /// Current order of the ways in `set`, head first, for policies that keep one.
    fn order(&self, _set: usize) -> Option<Vec<usize>> {
        None
    }
}

/// Per-set doubly linked list of way indices.
///
/// Links are stored in flat `prev`/`next` arrays indexed by
/// `set * ways + way`, so no block holds a pointer to another.
#[derive(Clone, Debug)]
pub struct WayList {
    ways: usize,
    prev: Vec<Option<usize>>,
    next: Vec<Option<usize>>,
    head: Vec<usize>,
    tail: Vec<usize>,
}

impl WayList {
    /// Creates a list for every set with way 0 at the head and the last way at the tail.
    ///
    /// # Arguments
    ///
    /// * `sets` - The number of sets in the cache.
    /// * `ways` - The associativity (number of ways) of the cache; must be non-zero.
    pub fn new(sets: usize, ways: usize) -> Self {
        let mut prev = Vec::with_capacity(sets * ways);
        let mut next = Vec::with_capacity(sets * ways);
        for _ in 0..sets {
            for way in 0..ways {
                prev.push(way.checked_sub(1));
                next.push(if way + 1 < ways { Some(way + 1) } else { None });
            }
        }
        Self {
            ways,
            prev,
            next,
            head: vec![0; sets],
            tail: vec![ways.saturating_sub(1); sets],
        }
    }

    /// Way at the tail of `set`.
    #[inline]
    pub fn tail(&self, set: usize) -> usize {
        self.tail[set]
    }

    /// Way at the head of `set`.
    #[inline]
    pub fn head(&self, set: usize) -> usize {
        self.head[set]
    }

    /// Moves `way` to the head of `set`.
    pub fn move_to_head(&mut self, set: usize, way: usize) {
        if self.head[set] == way {
            return;
        }
        let base = set * self.ways;
        let idx = base + way;

        // Unlink. `way` is not the head, so it has a predecessor.
        let prev = self.prev[idx];
        let next = self.next[idx];
        if let Some(p) = prev {
            self.next[base + p] = next;
        }
        match next {
            Some(n) => self.prev[base + n] = prev,
            None => {
                if let Some(p) = prev {
                    self.tail[set] = p;
                }
            }
        }

        let old_head = self.head[set];
        self.prev[base + old_head] = Some(way);
        self.prev[idx] = None;
        self.next[idx] = Some(old_head);
        self.head[set] = way;
    }

    /// Ways of `set` from head to tail.
    pub fn order(&self, set: usize) -> Vec<usize> {
        let base = set * self.ways;
        let mut out = Vec::with_capacity(self.ways);
        let mut cursor = Some(self.head[set]);
        while let Some(way) = cursor {
            out.push(way);
            cursor = self.next[base + way];
        }
        out
    }
}
