//! Simulation driver.
//!
//! Provides the [`System`] that owns a wired hierarchy, its construction from
//! a JSON topology, and trace replay.

/// Topology validation and construction.
pub mod builder;
/// Configuration file loading.
pub mod loader;
/// The memory system and its event loop.
pub mod system;
/// Access trace replay.
pub mod trace;

pub use system::System;
