//! Memory Access Kinds.
//!
//! This module defines the classification of accesses external callers issue to a module.
//! These kinds are used for the following:
//! 1. **Protocol Selection:** Choosing the first event of the access's state machine.
//! 2. **Ordering:** Deciding which in-flight accesses a new access must wait for or may coalesce with.
//! 3. **Statistics Tracking:** Categorizing accesses for the per-module counters.

use serde::Deserialize;
use std::fmt;

/// Kind of access issued to a memory module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    /// Coherent read of a block.
    Load,

    /// Coherent write; requires exclusive ownership of the block.
    Store,

    /// Non-coherent write; the block ends in the NonCoherent state without
    /// invalidating other sharers.
    #[serde(alias = "ncstore", alias = "nc-store")]
    NcStore,

    /// Speculative read that is dropped instead of retried on conflict.
    Prefetch,

    /// Write the block back to the lower level and invalidate every copy at or above this module.
    Flush,
}

impl AccessKind {
    /// Returns true for the kinds that modify the block.
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Store | Self::NcStore)
    }
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Load => "load",
            Self::Store => "store",
            Self::NcStore => "nc_store",
            Self::Prefetch => "prefetch",
            Self::Flush => "flush",
        };
        f.write_str(name)
    }
}
