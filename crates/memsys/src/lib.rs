//! NMOESI cache-coherence memory-system simulator library.
//!
//! This crate implements an event-driven model of a multi-level cache hierarchy with the following:
//! 1. **Storage:** Set-associative block arrays with LRU, FIFO and random replacement.
//! 2. **Coherence:** Sharer/owner directories, per-block locks and the NMOESI protocol.
//! 3. **Modules:** Caches, main memories and local memories with ports, MSHRs and coalescing.
//! 4. **Interconnect:** Bandwidth- and buffer-limited networks between levels.
//! 5. **Simulation:** JSON topologies, trace replay and statistics.

/// Common types (addresses, access kinds, errors, witness, random numbers).
pub mod common;
/// Topology configuration (defaults, enums, JSON structures).
pub mod config;
/// Block arrays and replacement policies.
pub mod cache;
/// Sharer/owner directory and per-block locks.
pub mod directory;
/// Discrete-event queue.
pub mod engine;
/// Access frames and their arena.
pub mod frame;
/// Memory modules, ports and in-flight tracking.
pub mod module;
/// Interconnect between hierarchy levels.
pub mod network;
/// NMOESI protocol event chains.
pub mod protocol;
/// System, topology builder, loader and trace replay.
pub mod sim;
/// Simulation statistics collection and reporting.
pub mod stats;

/// Access kinds, completion witness and error types used by callers.
pub use crate::common::{AccessKind, ConfigError, SimError, Witness};
/// Root configuration type; deserialize from JSON with [`sim::loader::parse_config`].
pub use crate::config::SystemConfig;
/// A wired memory hierarchy; build with [`System::from_config`].
pub use crate::sim::System;
