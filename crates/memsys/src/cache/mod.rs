//! Set-Associative Block Array.
//!
//! This module implements the storage half of a memory module: a fixed-geometry
//! array of blocks holding a tag and a coherence state, plus the per-set
//! replacement order. It has no knowledge of the coherence protocol; the
//! protocol layer decides which states to write.

/// Cache replacement policy implementations (LRU, FIFO, Random).
pub mod policies;

use std::fmt;

use self::policies::{FifoPolicy, LruPolicy, RandomPolicy, ReplacementPolicy};
use crate::common::addr::exact_log2;
use crate::common::{Address, ConfigError};
use crate::config::ReplacementPolicy as PolicyType;

/// NMOESI coherence state of a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum BlockState {
    /// No valid data.
    #[default]
    Invalid,
    /// Written without coherence; other copies may exist.
    NonCoherent,
    /// Only copy, dirty.
    Modified,
    /// Dirty, possibly shared; this copy is responsible for the write-back.
    Owned,
    /// Only copy, clean.
    Exclusive,
    /// Clean, possibly shared.
    Shared,
}

impl BlockState {
    /// True for every state except `Invalid`.
    #[inline]
    pub const fn is_valid(self) -> bool {
        !matches!(self, Self::Invalid)
    }

    /// True for the states holding data newer than the level below (M, O, N).
    #[inline]
    pub const fn is_dirty(self) -> bool {
        matches!(self, Self::Modified | Self::Owned | Self::NonCoherent)
    }

    /// One-letter protocol name.
    pub const fn letter(self) -> char {
        match self {
            Self::Invalid => 'I',
            Self::NonCoherent => 'N',
            Self::Modified => 'M',
            Self::Owned => 'O',
            Self::Exclusive => 'E',
            Self::Shared => 'S',
        }
    }
}

impl fmt::Display for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// One block slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Block {
    /// Block-aligned address of the data held.
    pub tag: Address,
    /// Tag of the block being brought into this slot; meaningful only while
    /// the slot's directory entry is locked.
    pub transient_tag: Address,
    /// Coherence state.
    pub state: BlockState,
}

/// Set-associative array of blocks.
#[derive(Debug)]
pub struct Cache {
    name: String,
    num_sets: usize,
    num_ways: usize,
    block_size: u64,
    log_block_size: u32,
    block_mask: u64,
    blocks: Vec<Block>,
    policy: Box<dyn ReplacementPolicy>,
}

impl Cache {
    /// Creates an empty cache; every block starts Invalid.
    ///
    /// # Arguments
    ///
    /// * `name` - Owner name, used in error messages.
    /// * `num_sets` - Number of sets (power of two).
    /// * `num_ways` - Associativity (power of two).
    /// * `block_size` - Block size in bytes (power of two).
    /// * `policy` - Replacement policy.
    /// * `seed` - Seed for the random policy.
    ///
    /// # Returns
    ///
    /// The cache, or `ConfigError::NotPowerOfTwo` for an invalid geometry.
    pub fn new(
        name: &str,
        num_sets: usize,
        num_ways: usize,
        block_size: u64,
        policy: PolicyType,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        let check = |field: &'static str, value: u64| {
            exact_log2(value).ok_or_else(|| ConfigError::NotPowerOfTwo {
                owner: name.to_string(),
                field,
                value,
            })
        };
        let _ = check("sets", num_sets as u64)?;
        let _ = check("assoc", num_ways as u64)?;
        let log_block_size = check("block_size", block_size)?;

        let policy: Box<dyn ReplacementPolicy> = match policy {
            PolicyType::Lru => Box::new(LruPolicy::new(num_sets, num_ways)),
            PolicyType::Fifo => Box::new(FifoPolicy::new(num_sets, num_ways)),
            PolicyType::Random => Box::new(RandomPolicy::new(num_ways, seed)),
        };

        Ok(Self {
            name: name.to_string(),
            num_sets,
            num_ways,
            block_size,
            log_block_size,
            block_mask: block_size - 1,
            blocks: vec![Block::default(); num_sets * num_ways],
            policy,
        })
    }

    /// Name of the owning module.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of sets.
    pub const fn num_sets(&self) -> usize {
        self.num_sets
    }

    /// Associativity.
    pub const fn num_ways(&self) -> usize {
        self.num_ways
    }

    /// Block size in bytes.
    pub const fn block_size(&self) -> u64 {
        self.block_size
    }

    /// `log2(block_size)`.
    pub const fn log_block_size(&self) -> u32 {
        self.log_block_size
    }

    /// Splits an address into set index, tag and offset within the block.
    ///
    /// # Arguments
    ///
    /// * `addr` - The address to decode.
    ///
    /// # Returns
    ///
    /// `(set, tag, block_offset)` with `tag = addr & !block_mask`.
    pub const fn decode_address(&self, addr: Address) -> (usize, Address, u64) {
        let set = ((addr >> self.log_block_size) % self.num_sets as u64) as usize;
        (set, addr & !self.block_mask, addr & self.block_mask)
    }

    /// Looks a block up by address.
    ///
    /// A hit needs a tag match on a block that is not Invalid.
    ///
    /// # Returns
    ///
    /// `Some((set, way, state))` on a hit.
    pub fn find_block(&self, addr: Address) -> Option<(usize, usize, BlockState)> {
        let (set, tag, _) = self.decode_address(addr);
        (0..self.num_ways).find_map(|way| {
            let block = self.block(set, way);
            (block.tag == tag && block.state.is_valid()).then_some((set, way, block.state))
        })
    }

    /// Returns the block stored at `(set, way)`.
    #[inline]
    pub fn block(&self, set: usize, way: usize) -> &Block {
        &self.blocks[set * self.num_ways + way]
    }

    /// Overwrites the tag and state of one block.
    ///
    /// FIFO moves the way to the head of its set when the tag changes.
    pub fn set_block(&mut self, set: usize, way: usize, tag: Address, state: BlockState) {
        let idx = set * self.num_ways + way;
        if self.blocks[idx].tag != tag {
            self.policy.insert(set, way);
        }
        let block = &mut self.blocks[idx];
        block.tag = tag;
        block.state = state;
    }

    /// Overwrites only the state of one block.
    pub fn set_state(&mut self, set: usize, way: usize, state: BlockState) {
        self.blocks[set * self.num_ways + way].state = state;
    }

    /// Records the tag of the block being fetched into `(set, way)`.
    pub fn set_transient_tag(&mut self, set: usize, way: usize, tag: Address) {
        self.blocks[set * self.num_ways + way].transient_tag = tag;
    }

    /// Updates the replacement order for an access to `(set, way)`.
    pub fn access_block(&mut self, set: usize, way: usize) {
        let was_invalid = !self.block(set, way).state.is_valid();
        self.policy.update(set, way, was_invalid);
    }

    /// Picks the way a new block of `set` is installed into.
    pub fn replace_block(&mut self, set: usize) -> usize {
        self.policy.get_victim(set)
    }

    /// Replacement order of `set`, head first (LRU/FIFO only).
    pub fn way_order(&self, set: usize) -> Option<Vec<usize>> {
        self.policy.order(set)
    }

    /// Iterates over `(set, way, block)` for every valid block.
    pub fn valid_blocks(&self) -> impl Iterator<Item = (usize, usize, &Block)> + '_ {
        self.blocks.iter().enumerate().filter_map(|(idx, block)| {
            block
                .state
                .is_valid()
                .then_some((idx / self.num_ways, idx % self.num_ways, block))
        })
    }
}
