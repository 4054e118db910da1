//! Configuration system for the memory-system simulator.
//!
//! This module defines all configuration structures and enums used to describe
//! a memory hierarchy. It provides:
//! 1. **Defaults:** Baseline geometry, latency and network constants.
//! 2. **Structures:** General settings, cache geometries, modules and networks.
//! 3. **Enums:** Module kinds, replacement policies and address-range forms.
//!
//! Configuration is supplied as JSON (see [`crate::sim::loader`]) and turned
//! into a wired [`crate::System`] by [`crate::sim::builder`].

use std::collections::BTreeMap;

use serde::Deserialize;

/// Default configuration constants for the simulator.
///
/// These values define the baseline hierarchy when a field is not
/// explicitly present in the JSON configuration.
mod defaults {
    /// Number of sets of a cache geometry.
    pub const SETS: usize = 16;

    /// Associativity of a cache geometry.
    pub const ASSOC: usize = 2;

    /// Block size of a cache geometry in bytes.
    pub const CACHE_BLOCK_SIZE: u64 = 256;

    /// Directory access latency in cycles.
    ///
    /// Paid after a directory entry is locked, before the access proceeds.
    pub const DIRECTORY_LATENCY: u64 = 1;

    /// Maximum number of non-coalesced in-flight accesses (0 disables the limit).
    pub const MSHR: usize = 16;

    /// Number of access ports of a module.
    pub const PORTS: usize = 2;

    /// Block size of main memory in bytes.
    pub const MEMORY_BLOCK_SIZE: u64 = 64;

    /// Number of blocks tracked by a main-memory directory.
    pub const DIRECTORY_SIZE: usize = 1024;

    /// Associativity of a main-memory directory.
    pub const DIRECTORY_ASSOC: usize = 8;

    /// Per-hop link latency of a network in cycles.
    pub const LINK_LATENCY: u64 = 1;

    /// Input and output buffer capacity of a network node in bytes.
    pub const BUFFER_SIZE: u64 = 1024;
}

/// Replacement policies for cache blocks.
///
/// Specifies the algorithm used to select which way receives a new block
/// when a set is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplacementPolicy {
    /// Least Recently Used replacement policy.
    ///
    /// Evicts the block that was accessed least recently.
    #[default]
    #[serde(alias = "Lru", alias = "lru")]
    Lru,
    /// First In First Out replacement policy.
    ///
    /// Evicts the block that was installed earliest.
    #[serde(alias = "Fifo", alias = "fifo")]
    Fifo,
    /// Random replacement policy.
    ///
    /// Evicts a uniformly selected way of the set.
    #[serde(alias = "Random", alias = "random")]
    Random,
}

/// Kind of a memory module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    /// Coherent cache with a lower-level module beneath it.
    #[default]
    #[serde(alias = "Cache")]
    Cache,
    /// Last level; misses are filled locally without further traffic.
    #[serde(alias = "MainMemory")]
    MainMemory,
    /// Scratchpad with no coherence traffic.
    #[serde(alias = "LocalMemory")]
    LocalMemory,
}

/// Root configuration for a simulated memory hierarchy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SystemConfig {
    /// General simulation settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Named cache geometries referenced by modules.
    #[serde(default)]
    pub geometries: BTreeMap<String, CacheGeometry>,

    /// Memory modules, in any order.
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,

    /// Interconnects between levels.
    #[serde(default)]
    pub networks: Vec<NetworkConfig>,
}

/// General simulation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    /// Seed of the generator used for retry jitter and random replacement.
    #[serde(default = "GeneralConfig::default_seed")]
    pub seed: u64,
}

impl GeneralConfig {
    /// Returns the default random seed.
    const fn default_seed() -> u64 {
        crate::common::rng::DEFAULT_SEED
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            seed: Self::default_seed(),
        }
    }
}

/// Geometry and timing of a cache or local memory.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheGeometry {
    /// Number of sets (power of two).
    #[serde(default = "CacheGeometry::default_sets")]
    pub sets: usize,

    /// Associativity (power of two).
    #[serde(default = "CacheGeometry::default_assoc")]
    pub assoc: usize,

    /// Block size in bytes (power of two).
    #[serde(default = "CacheGeometry::default_block_size")]
    pub block_size: u64,

    /// Data access latency in cycles.
    pub latency: u64,

    /// Directory access latency in cycles.
    #[serde(default = "CacheGeometry::default_directory_latency")]
    pub directory_latency: u64,

    /// Replacement policy.
    #[serde(default)]
    pub policy: ReplacementPolicy,

    /// MSHR size (0 = unlimited).
    #[serde(default = "CacheGeometry::default_mshr")]
    pub mshr: usize,

    /// Number of access ports.
    #[serde(default = "CacheGeometry::default_ports")]
    pub ports: usize,
}

impl CacheGeometry {
    /// Returns the default number of sets.
    const fn default_sets() -> usize {
        defaults::SETS
    }

    /// Returns the default associativity.
    const fn default_assoc() -> usize {
        defaults::ASSOC
    }

    /// Returns the default cache block size.
    const fn default_block_size() -> u64 {
        defaults::CACHE_BLOCK_SIZE
    }

    /// Returns the default directory latency.
    const fn default_directory_latency() -> u64 {
        defaults::DIRECTORY_LATENCY
    }

    /// Returns the default MSHR size.
    const fn default_mshr() -> usize {
        defaults::MSHR
    }

    /// Returns the default number of ports.
    const fn default_ports() -> usize {
        defaults::PORTS
    }
}

/// Address range served by a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeConfig {
    /// Inclusive `low..=high`.
    Bounds {
        /// First address (multiple of the block size).
        low: u64,
        /// Last address (`high + 1` multiple of the block size).
        high: u64,
    },
    /// Addresses with `(addr / div) % modulo == eq`.
    Interleaved {
        /// Granularity in bytes (multiple of the block size).
        div: u64,
        /// Number of interleaved slots.
        #[serde(alias = "mod")]
        modulo: u64,
        /// Slot served (`eq < modulo`).
        eq: u64,
    },
}

/// One memory module.
///
/// Fields that only apply to some kinds are optional; the builder checks that
/// each kind gets what it needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleConfig {
    /// Unique module name.
    pub name: String,

    /// Module kind.
    #[serde(default, rename = "type", alias = "kind")]
    pub kind: ModuleKind,

    /// Geometry name (caches and local memories).
    #[serde(default)]
    pub geometry: Option<String>,

    /// Block size in bytes (main memory).
    #[serde(default = "ModuleConfig::default_block_size")]
    pub block_size: u64,

    /// Data access latency in cycles (main memory; required there).
    #[serde(default)]
    pub latency: Option<u64>,

    /// Number of ports (main memory).
    #[serde(default = "ModuleConfig::default_ports")]
    pub ports: usize,

    /// Number of blocks tracked by the directory (main memory).
    #[serde(default = "ModuleConfig::default_directory_size")]
    pub directory_size: usize,

    /// Directory associativity (main memory).
    #[serde(default = "ModuleConfig::default_directory_assoc")]
    pub directory_assoc: usize,

    /// Directory latency in cycles (main memory).
    #[serde(default = "ModuleConfig::default_directory_latency")]
    pub directory_latency: u64,

    /// Network towards the lower level.
    #[serde(default)]
    pub low_network: Option<String>,

    /// Network towards the upper level.
    #[serde(default)]
    pub high_network: Option<String>,

    /// Names of the modules directly below.
    #[serde(default)]
    pub low_modules: Vec<String>,

    /// Served address range; absent means the whole address space.
    #[serde(default)]
    pub range: Option<RangeConfig>,
}

impl ModuleConfig {
    /// Returns the default main-memory block size.
    const fn default_block_size() -> u64 {
        defaults::MEMORY_BLOCK_SIZE
    }

    /// Returns the default number of ports.
    const fn default_ports() -> usize {
        defaults::PORTS
    }

    /// Returns the default main-memory directory size.
    const fn default_directory_size() -> usize {
        defaults::DIRECTORY_SIZE
    }

    /// Returns the default main-memory directory associativity.
    const fn default_directory_assoc() -> usize {
        defaults::DIRECTORY_ASSOC
    }

    /// Returns the default main-memory directory latency.
    const fn default_directory_latency() -> u64 {
        defaults::DIRECTORY_LATENCY
    }
}

/// One interconnect.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Unique network name.
    pub name: String,

    /// Link bandwidth in bytes per cycle (at least 1).
    pub bandwidth: u64,

    /// Per-hop latency in cycles.
    #[serde(default = "NetworkConfig::default_latency")]
    pub latency: u64,

    /// Input buffer capacity of every node in bytes.
    #[serde(default = "NetworkConfig::default_buffer_size")]
    pub input_buffer_size: u64,

    /// Output buffer capacity of every node in bytes.
    #[serde(default = "NetworkConfig::default_buffer_size")]
    pub output_buffer_size: u64,
}

impl NetworkConfig {
    /// Returns the default link latency.
    const fn default_latency() -> u64 {
        defaults::LINK_LATENCY
    }

    /// Returns the default buffer size.
    const fn default_buffer_size() -> u64 {
        defaults::BUFFER_SIZE
    }
}
