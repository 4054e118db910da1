//! Sharer/Owner Directory and Per-Block Locks.
//!
//! This module tracks which upper-level network nodes hold each sub-block of a
//! module's blocks, independently of the block array itself. It provides:
//! 1. **Sharer Bitmap:** One bit per (set, way, sub-block, node) with a cached population count.
//! 2. **Owner Tracking:** At most one owner per sub-block; the protocol keeps it a sharer.
//! 3. **Entry Locks:** One lock per (set, way) held by an access id, with a FIFO wait queue.
//!
//! The directory never schedules anything itself. Waiters are opaque values of
//! type `W` handed back to the caller on unlock; the memory system stores
//! event continuations there.

use std::collections::VecDeque;
use std::ops::Range;

use bitvec::vec::BitVec;

/// Directory state of one sub-block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    owner: Option<usize>,
    num_sharers: usize,
}

impl DirectoryEntry {
    /// Node owning the sub-block, if any.
    pub const fn owner(&self) -> Option<usize> {
        self.owner
    }

    /// Number of nodes holding a copy.
    pub const fn num_sharers(&self) -> usize {
        self.num_sharers
    }
}

/// Lock of one (set, way).
#[derive(Debug)]
struct DirectoryLock<W> {
    access_id: u64,
    waiters: VecDeque<W>,
}

impl<W> Default for DirectoryLock<W> {
    fn default() -> Self {
        Self {
            access_id: 0,
            waiters: VecDeque::new(),
        }
    }
}

/// Sharer/owner directory of one module.
#[derive(Debug)]
pub struct Directory<W> {
    num_sets: usize,
    num_ways: usize,
    num_sub_blocks: usize,
    num_nodes: usize,
    entries: Vec<DirectoryEntry>,
    sharers: BitVec,
    locks: Vec<DirectoryLock<W>>,
}

impl<W> Directory<W> {
    /// Creates an empty, fully unlocked directory.
    ///
    /// # Arguments
    ///
    /// * `num_sets` - Sets of the owning module's cache.
    /// * `num_ways` - Ways of the owning module's cache.
    /// * `num_sub_blocks` - Sub-blocks tracked per block (at least 1).
    /// * `num_nodes` - Nodes of the owning module's upper network (at least 1).
    pub fn new(num_sets: usize, num_ways: usize, num_sub_blocks: usize, num_nodes: usize) -> Self {
        let num_sub_blocks = num_sub_blocks.max(1);
        let num_nodes = num_nodes.max(1);
        let num_entries = num_sets * num_ways * num_sub_blocks;
        let bits = num_entries * num_nodes;
        Self {
            num_sets,
            num_ways,
            num_sub_blocks,
            num_nodes,
            entries: vec![DirectoryEntry::default(); num_entries],
            sharers: BitVec::repeat(false, bits),
            locks: (0..num_sets * num_ways)
                .map(|_| DirectoryLock::default())
                .collect(),
        }
    }

    /// Number of sets.
    pub const fn num_sets(&self) -> usize {
        self.num_sets
    }

    /// Number of ways.
    pub const fn num_ways(&self) -> usize {
        self.num_ways
    }

    /// Sub-blocks per block.
    pub const fn num_sub_blocks(&self) -> usize {
        self.num_sub_blocks
    }

    /// Nodes tracked per sub-block.
    pub const fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    #[inline]
    fn entry_index(&self, set: usize, way: usize, sub: usize) -> usize {
        assert!(
            set < self.num_sets && way < self.num_ways && sub < self.num_sub_blocks,
            "directory entry ({set}, {way}, {sub}) out of range"
        );
        (set * self.num_ways + way) * self.num_sub_blocks + sub
    }

    /// Range of sharer bits of one sub-block, one per node.
    #[inline]
    fn row(&self, set: usize, way: usize, sub: usize) -> Range<usize> {
        let start = self.entry_index(set, way, sub) * self.num_nodes;
        start..start + self.num_nodes
    }

    #[inline]
    fn bit(&self, set: usize, way: usize, sub: usize, node: usize) -> usize {
        assert!(node < self.num_nodes, "node {node} out of range");
        self.row(set, way, sub).start + node
    }

    /// Returns the entry of one sub-block.
    pub fn entry(&self, set: usize, way: usize, sub: usize) -> &DirectoryEntry {
        &self.entries[self.entry_index(set, way, sub)]
    }

    /// Marks `node` as holding a copy; no-op if it already does.
    pub fn set_sharer(&mut self, set: usize, way: usize, sub: usize, node: usize) {
        let bit = self.bit(set, way, sub, node);
        if !self.sharers.replace(bit, true) {
            let idx = self.entry_index(set, way, sub);
            self.entries[idx].num_sharers += 1;
        }
    }

    /// Removes `node` from the sharers; no-op if it is not one.
    pub fn clear_sharer(&mut self, set: usize, way: usize, sub: usize, node: usize) {
        let bit = self.bit(set, way, sub, node);
        if self.sharers.replace(bit, false) {
            let idx = self.entry_index(set, way, sub);
            self.entries[idx].num_sharers -= 1;
        }
    }

    /// Removes every sharer of one sub-block.
    pub fn clear_all_sharers(&mut self, set: usize, way: usize, sub: usize) {
        let row = self.row(set, way, sub);
        self.sharers[row].fill(false);
        let idx = self.entry_index(set, way, sub);
        self.entries[idx].num_sharers = 0;
    }

    /// Checks whether `node` holds a copy of the sub-block.
    pub fn is_sharer(&self, set: usize, way: usize, sub: usize, node: usize) -> bool {
        self.sharers[self.bit(set, way, sub, node)]
    }

    /// Iterates over the nodes sharing one sub-block, in ascending order.
    pub fn sharers(&self, set: usize, way: usize, sub: usize) -> impl Iterator<Item = usize> + '_ {
        self.sharers[self.row(set, way, sub)].iter_ones()
    }

    /// Sets or clears the owner of one sub-block.
    ///
    /// Sharer bits are left untouched.
    pub fn set_owner(&mut self, set: usize, way: usize, sub: usize, owner: Option<usize>) {
        if let Some(node) = owner {
            assert!(node < self.num_nodes, "owner node {node} out of range");
        }
        let idx = self.entry_index(set, way, sub);
        self.entries[idx].owner = owner;
    }

    /// True if any sub-block of the block has a sharer or an owner.
    pub fn is_block_shared_or_owned(&self, set: usize, way: usize) -> bool {
        (0..self.num_sub_blocks).any(|sub| {
            let entry = self.entry(set, way, sub);
            entry.num_sharers > 0 || entry.owner.is_some()
        })
    }

    /// Tries to lock the entry of (set, way) for `access_id`.
    ///
    /// # Arguments
    ///
    /// * `access_id` - Non-zero id of the requesting access.
    /// * `waiter` - Value queued when the entry is already locked.
    ///
    /// # Returns
    ///
    /// `true` when the lock was taken; `false` when the waiter was queued.
    ///
    /// # Panics
    ///
    /// Panics if `access_id` is 0.
    pub fn lock_entry(&mut self, set: usize, way: usize, access_id: u64, waiter: W) -> bool {
        assert!(access_id != 0, "directory lock requested with access id 0");
        let lock = &mut self.locks[set * self.num_ways + way];
        if lock.access_id != 0 {
            lock.waiters.push_back(waiter);
            return false;
        }
        lock.access_id = access_id;
        true
    }

    /// Releases the entry of (set, way) and returns every queued waiter in FIFO order.
    ///
    /// # Panics
    ///
    /// Panics if the entry is not held by `access_id`.
    pub fn unlock_entry(&mut self, set: usize, way: usize, access_id: u64) -> Vec<W> {
        let lock = &mut self.locks[set * self.num_ways + way];
        assert_eq!(
            lock.access_id, access_id,
            "entry ({set}, {way}) unlocked by access {access_id} but held by {}",
            lock.access_id
        );
        lock.access_id = 0;
        lock.waiters.drain(..).collect()
    }

    /// Id of the access holding (set, way), 0 when unlocked.
    pub fn entry_access_id(&self, set: usize, way: usize) -> u64 {
        self.locks[set * self.num_ways + way].access_id
    }

    /// True while (set, way) is locked.
    pub fn is_entry_locked(&self, set: usize, way: usize) -> bool {
        self.entry_access_id(set, way) != 0
    }
}
