//! Memory Modules.
//!
//! A module is one node of the hierarchy: a cache, a main memory or a local
//! scratchpad. It owns the block array and directory of that node, its ports,
//! its neighbours and the bookkeeping of the accesses it is running. It
//! provides:
//! 1. **Address Mapping:** Range membership, set index and lower-module selection.
//! 2. **Back-Pressure:** Port and MSHR limits checked by [`Module::can_access`].
//! 3. **Lookup:** Block lookup that also sees blocks being brought in.
//! 4. **Wiring:** Setters used by the builder to connect the hierarchy.
//!
//! Modules never schedule events; the protocol handlers in
//! [`crate::protocol`] drive them through the system.

/// In-flight access indices and coalescing.
pub mod access;
/// Port pool with down-up priority.
pub mod port;

use std::ops::Range;

use crate::cache::{BlockState, Cache};
use crate::common::addr::block_align;
use crate::common::{Address, AddressRange, SimError, XorShift64};
use crate::config::ModuleKind;
use crate::directory::Directory;
use crate::engine::Continuation;
use crate::network::{NetworkId, NodeId};
use crate::stats::ModuleStats;

pub use access::InFlight;
pub use port::PortPool;

/// Index of a module within the system.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub(crate) usize);

impl ModuleId {
    /// Position in the system's module list.
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Attachment of a module side to a network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkLink {
    /// Network the module is attached to.
    pub network: NetworkId,
    /// End node of the module in that network.
    pub node: NodeId,
}

/// Result of a block lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockLookup {
    /// Set the address maps to.
    pub set: usize,
    /// Block-aligned address.
    pub tag: Address,
    /// Way holding the block, on a hit.
    pub way: Option<usize>,
    /// State of the block, `Invalid` on a miss.
    pub state: BlockState,
}

impl BlockLookup {
    /// True when the block was found.
    pub const fn is_hit(&self) -> bool {
        self.way.is_some()
    }
}

/// One node of the memory hierarchy.
#[derive(Debug)]
pub struct Module {
    name: String,
    kind: ModuleKind,
    block_size: u64,
    log_block_size: u32,
    range: AddressRange,
    data_latency: u64,
    directory_latency: u64,
    mshr_size: usize,
    pub(crate) cache: Cache,
    pub(crate) directory: Directory<Continuation>,
    pub(crate) ports: PortPool,
    high_modules: Vec<ModuleId>,
    low_modules: Vec<ModuleId>,
    high_link: Option<NetworkLink>,
    low_link: Option<NetworkLink>,
    sub_block_size: u64,
    pub(crate) in_flight: InFlight,
    pub(crate) stats: ModuleStats,
}

impl Module {
    /// Creates an unwired module serving the whole address space.
    ///
    /// # Arguments
    ///
    /// * `name` - Unique module name.
    /// * `kind` - Cache, main memory or local memory.
    /// * `cache` - Block array; its block size becomes the module's block size.
    /// * `data_latency` - Data array access latency in cycles.
    /// * `directory_latency` - Directory access latency in cycles.
    /// * `mshr_size` - Maximum non-coalesced in-flight accesses (0 = unlimited).
    /// * `num_ports` - Number of access ports (at least 1).
    pub fn new(
        name: &str,
        kind: ModuleKind,
        cache: Cache,
        data_latency: u64,
        directory_latency: u64,
        mshr_size: usize,
        num_ports: usize,
    ) -> Self {
        let block_size = cache.block_size();
        let directory = Directory::new(cache.num_sets(), cache.num_ways(), 1, 1);
        Self {
            name: name.to_string(),
            kind,
            block_size,
            log_block_size: cache.log_block_size(),
            range: AddressRange::All,
            data_latency,
            directory_latency,
            mshr_size,
            cache,
            directory,
            ports: PortPool::new(num_ports.max(1)),
            high_modules: Vec::new(),
            low_modules: Vec::new(),
            high_link: None,
            low_link: None,
            sub_block_size: block_size,
            in_flight: InFlight::new(block_size),
            stats: ModuleStats::default(),
        }
    }

    /// Module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Module kind.
    pub const fn kind(&self) -> ModuleKind {
        self.kind
    }

    /// Block size in bytes.
    pub const fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Served address range.
    pub const fn range(&self) -> AddressRange {
        self.range
    }

    /// Data array latency in cycles.
    pub const fn data_latency(&self) -> u64 {
        self.data_latency
    }

    /// Directory latency in cycles.
    pub const fn directory_latency(&self) -> u64 {
        self.directory_latency
    }

    /// MSHR size (0 = unlimited).
    pub const fn mshr_size(&self) -> usize {
        self.mshr_size
    }

    /// Block array.
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Sharer/owner directory.
    pub fn directory(&self) -> &Directory<Continuation> {
        &self.directory
    }

    /// Port pool.
    pub fn ports(&self) -> &PortPool {
        &self.ports
    }

    /// In-flight accesses.
    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Counters.
    pub const fn stats(&self) -> &ModuleStats {
        &self.stats
    }

    /// Modules directly above.
    pub fn high_modules(&self) -> &[ModuleId] {
        &self.high_modules
    }

    /// Modules directly below.
    pub fn low_modules(&self) -> &[ModuleId] {
        &self.low_modules
    }

    /// Attachment to the network towards the processor.
    pub const fn high_link(&self) -> Option<NetworkLink> {
        self.high_link
    }

    /// Attachment to the network towards main memory.
    pub const fn low_link(&self) -> Option<NetworkLink> {
        self.low_link
    }

    /// Size of the unit tracked by the directory.
    pub const fn sub_block_size(&self) -> u64 {
        self.sub_block_size
    }

    /// Block-aligned address of `addr`.
    #[inline]
    pub const fn block_tag(&self, addr: Address) -> Address {
        block_align(addr, self.block_size)
    }

    /// Set index of `addr`.
    ///
    /// Interleaved modules drop the interleaving factor from the block index
    /// so that their sets are evenly used.
    #[inline]
    pub fn set_index(&self, addr: Address) -> usize {
        let block = addr >> self.log_block_size;
        ((block / self.range.set_divisor()) % self.cache.num_sets() as u64) as usize
    }

    /// Checks whether this module serves `addr`.
    pub const fn serves_address(&self, addr: Address) -> bool {
        self.range.contains(addr)
    }

    /// Finds the only lower module serving `addr`.
    ///
    /// # Returns
    ///
    /// The module, or a `SimError` when none or several serve the address.
    pub fn low_module_serving(&self, modules: &[Module], addr: Address) -> Result<ModuleId, SimError> {
        let mut serving = self
            .low_modules
            .iter()
            .copied()
            .filter(|id| modules[id.0].serves_address(addr));
        let first = serving.next().ok_or_else(|| SimError::NoServingModule {
            module: self.name.clone(),
            address: addr,
        })?;
        if serving.next().is_some() {
            return Err(SimError::AmbiguousServingModule {
                module: self.name.clone(),
                address: addr,
            });
        }
        Ok(first)
    }

    /// Checks whether a new access can be issued right now.
    ///
    /// False when every port is locked, or when the MSHR is enabled and the
    /// non-coalesced in-flight accesses fill it.
    pub fn can_access(&self) -> bool {
        if self.ports.all_locked() {
            return false;
        }
        self.mshr_size == 0 || self.in_flight.num_non_coalesced() < self.mshr_size
    }

    /// Looks a block up.
    ///
    /// Besides a tag match on a valid block, a transient-tag match on a slot
    /// whose directory entry is locked also hits: the block is being brought
    /// in and the access must serialize on that entry.
    pub fn find_block(&self, addr: Address) -> BlockLookup {
        let set = self.set_index(addr);
        let tag = self.block_tag(addr);
        for way in 0..self.cache.num_ways() {
            let block = self.cache.block(set, way);
            if block.tag == tag && block.state.is_valid() {
                return BlockLookup {
                    set,
                    tag,
                    way: Some(way),
                    state: block.state,
                };
            }
            if block.transient_tag == tag && self.directory.is_entry_locked(set, way) {
                return BlockLookup {
                    set,
                    tag,
                    way: Some(way),
                    state: block.state,
                };
            }
        }
        BlockLookup {
            set,
            tag,
            way: None,
            state: BlockState::Invalid,
        }
    }

    /// Jittered delay before retrying after a conflict.
    pub fn retry_latency(&self, rng: &mut XorShift64) -> u64 {
        rng.below(self.data_latency + 2)
    }

    /// Sub-blocks of the block at `block_tag` covered by an upper block.
    ///
    /// # Arguments
    ///
    /// * `block_tag` - Tag of this module's block.
    /// * `upper_addr` - Block-aligned address of the upper module's block.
    /// * `upper_block_size` - Block size of the upper module.
    pub fn sub_blocks_of(&self, block_tag: Address, upper_addr: Address, upper_block_size: u64) -> Range<usize> {
        let num = self.directory.num_sub_blocks();
        let start = (upper_addr.saturating_sub(block_tag) / self.sub_block_size) as usize;
        let count = (upper_block_size / self.sub_block_size).max(1) as usize;
        start.min(num)..(start + count).min(num)
    }

    /// Address of sub-block `z` of the block at `block_tag`.
    #[inline]
    pub const fn sub_block_tag(&self, block_tag: Address, z: usize) -> Address {
        block_tag + z as u64 * self.sub_block_size
    }

    /// Serves only `low..=high`.
    pub fn set_range_bounds(&mut self, low: Address, high: Address) {
        self.range = AddressRange::Bounds { low, high };
    }

    /// Serves only addresses with `(addr / div) % modulo == eq`.
    pub fn set_range_interleaved(&mut self, div: u64, modulo: u64, eq: u64) {
        self.range = AddressRange::Interleaved { div, modulo, eq };
    }

    /// Adds a module directly below.
    pub fn add_low_module(&mut self, module: ModuleId) {
        if !self.low_modules.contains(&module) {
            self.low_modules.push(module);
        }
    }

    /// Adds a module directly above.
    pub fn add_high_module(&mut self, module: ModuleId) {
        if !self.high_modules.contains(&module) {
            self.high_modules.push(module);
        }
    }

    /// Attaches the module to the network towards main memory.
    pub fn set_low_network(&mut self, link: NetworkLink) {
        self.low_link = Some(link);
    }

    /// Attaches the module to the network towards the processor.
    pub fn set_high_network(&mut self, link: NetworkLink) {
        self.high_link = Some(link);
    }

    /// Rebuilds the directory once the hierarchy is wired.
    ///
    /// # Arguments
    ///
    /// * `sub_block_size` - Smallest block size of the upper modules.
    /// * `num_nodes` - End nodes of the upper network.
    pub(crate) fn finalize_directory(&mut self, sub_block_size: u64, num_nodes: usize) {
        self.sub_block_size = sub_block_size.min(self.block_size).max(1);
        let num_sub_blocks = (self.block_size / self.sub_block_size) as usize;
        self.directory = Directory::new(
            self.cache.num_sets(),
            self.cache.num_ways(),
            num_sub_blocks,
            num_nodes,
        );
    }
}
