//! Least Recently Used (LRU) Replacement Policy.
//!
//! Every access moves the way to the head of its set's list; the tail is the
//! least recently used way and is the victim.
//!
//! # Performance
//!
//! - **Time Complexity:**
//!   - `update()`: O(1)
//!   - `get_victim()`: O(1)
//! - **Space Complexity:** O(S × W) where S is the number of sets
//! - **Best Case:** Workloads with good temporal locality
//! - **Worst Case:** Scanning patterns larger than the set (thrashing)

use super::{ReplacementPolicy, WayList};

/// LRU Policy state.
#[derive(Clone, Debug)]
pub struct LruPolicy {
    /// Per-set recency order, head = MRU, tail = LRU.
    list: WayList,
}

impl LruPolicy {
    /// Creates a new LRU policy instance.
    ///
    /// # Arguments
    ///
    /// * `sets` - The number of sets in the cache.
    /// * `ways` - The associativity (number of ways) of the cache.
    pub fn new(sets: usize, ways: usize) -> Self {
        Self {
            list: WayList::new(sets, ways),
        }
    }
}

impl ReplacementPolicy for LruPolicy {
    /// Promotes the accessed way to MRU.
    fn update(&mut self, set: usize, way: usize, _was_invalid: bool) {
        self.list.move_to_head(set, way);
    }

    /// Installing a tag does not change recency; the access that follows does.
    fn insert(&mut self, _set: usize, _way: usize) {}

    /// Returns the LRU way and promotes it so a second replacement picks another way.
    fn get_victim(&mut self, set: usize) -> usize {
        let way = self.list.tail(set);
        self.list.move_to_head(set, way);
        way
    }

    fn order(&self, set: usize) -> Option<Vec<usize>> {
        Some(self.list.order(set))
    }
}
