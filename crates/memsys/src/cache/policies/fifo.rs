//! First-In, First-Out (FIFO) Replacement Policy.
//!
//! This policy evicts the block that was installed earliest, regardless of how
//! recently it was accessed. A way moves to the head of its set's list only
//! when a new tag is installed in it (or on its first access after being
//! invalid); hits on resident blocks leave the order untouched.
//!
//! # Performance
//!
//! - **Time Complexity:**
//!   - `update()`: O(1)
//!   - `get_victim()`: O(1)
//! - **Space Complexity:** O(S × W) where S is the number of sets
//! - **Best Case:** Streaming accesses where all lines have equal importance
//! - **Worst Case:** Workloads with strong temporal locality (may evict frequently-used lines)

use super::{ReplacementPolicy, WayList};

/// FIFO Policy state.
#[derive(Clone, Debug)]
pub struct FifoPolicy {
    /// Per-set insertion order, head = newest, tail = oldest.
    list: WayList,
}

impl FifoPolicy {
    /// Creates a new FIFO policy instance.
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

impl ReplacementPolicy for FifoPolicy {
    /// Only the first access to a freshly filled (previously invalid) block counts as an insertion.
    fn update(&mut self, set: usize, way: usize, was_invalid: bool) {
        if was_invalid {
            self.list.move_to_head(set, way);
        }
    }

    fn insert(&mut self, set: usize, way: usize) {
        self.list.move_to_head(set, way);
    }

    /// Returns the oldest way and promotes it so a second replacement picks another way.
    fn get_victim(&mut self, set: usize) -> usize {
        let way = self.list.tail(set);
        self.list.move_to_head(set, way);
        way
    }

    fn order(&self, set: usize) -> Option<Vec<usize>> {
        Some(self.list.order(set))
    }
}
