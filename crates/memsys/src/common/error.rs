//! Configuration and simulation error definitions.
//!
//! This module defines the fatal error paths of the simulator. It provides:
//! 1. **Configuration Errors:** Everything that can be wrong with a topology before simulation starts.
//! 2. **Simulation Errors:** Topology holes only discovered when a particular address is accessed.
//!
//! Lock conflicts are not errors at this level: they are retried inside the
//! protocol. Protocol invariant violations panic.

use std::path::PathBuf;

use thiserror::Error;

use super::addr::Address;
use super::data::AccessKind;

/// Errors raised while loading or validating a memory-system configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read configuration '{}': {source}", path.display())]
    Io {
        /// Path that failed to open.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid JSON or does not match the schema.
    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// Two modules share a name.
    #[error("duplicate module '{0}'")]
    DuplicateModule(String),

    /// Two networks share a name.
    #[error("duplicate network '{0}'")]
    DuplicateNetwork(String),

    /// A module references a module that does not exist.
    #[error("module '{module}': unknown low module '{reference}'")]
    UnknownModule {
        /// Referencing module.
        module: String,
        /// Missing name.
        reference: String,
    },

    /// A module references a geometry that does not exist.
    #[error("module '{module}': unknown geometry '{geometry}'")]
    UnknownGeometry {
        /// Referencing module.
        module: String,
        /// Missing geometry name.
        geometry: String,
    },

    /// A module references a network that does not exist.
    #[error("module '{module}': unknown network '{network}'")]
    UnknownNetwork {
        /// Referencing module.
        module: String,
        /// Missing network name.
        network: String,
    },

    /// A field required for this module kind is absent.
    #[error("module '{module}': missing required field '{field}'")]
    MissingField {
        /// Module being configured.
        module: String,
        /// Name of the absent field.
        field: &'static str,
    },

    /// A geometric parameter is not a power of two (or is zero).
    #[error("{owner}: {field} = {value} must be a non-zero power of two")]
    NotPowerOfTwo {
        /// Module or geometry the value belongs to.
        owner: String,
        /// Parameter name.
        field: &'static str,
        /// Offending value.
        value: u64,
    },

    /// A numeric parameter is out of its valid range.
    #[error("{owner}: invalid {field} ({reason})")]
    InvalidValue {
        /// Module, geometry or network the value belongs to.
        owner: String,
        /// Parameter name.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// An address range is malformed.
    #[error("module '{module}': invalid address range ({reason})")]
    InvalidRange {
        /// Module whose range is malformed.
        module: String,
        /// Explanation.
        reason: String,
    },

    /// Two connected modules do not agree on the network between them.
    #[error("modules '{upper}' and '{lower}' are not connected through the same network")]
    NetworkMismatch {
        /// Upper (closer to the processor) module.
        upper: String,
        /// Lower (closer to memory) module.
        lower: String,
    },

    /// A lower-level module has smaller blocks than one of its upper modules.
    #[error("block size of '{lower}' ({lower_size}) is smaller than that of its upper module '{upper}' ({upper_size})")]
    BlockSizeInversion {
        /// Upper module.
        upper: String,
        /// Upper module block size.
        upper_size: u64,
        /// Lower module.
        lower: String,
        /// Lower module block size.
        lower_size: u64,
    },

    /// A cache or local memory has no module below it, or main memory has one.
    #[error("module '{module}': {reason}")]
    InvalidHierarchy {
        /// Module at fault.
        module: String,
        /// Explanation.
        reason: &'static str,
    },

    /// A network buffer cannot hold the largest message crossing it.
    #[error("network '{network}': {which} buffer of {size} bytes cannot hold a {needed}-byte message")]
    BufferTooSmall {
        /// Network name.
        network: String,
        /// "input" or "output".
        which: &'static str,
        /// Configured buffer size.
        size: u64,
        /// Largest message size on the network.
        needed: u64,
    },
}

/// Fatal errors raised while a simulation is running.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimError {
    /// No lower-level module serves an address that missed in `module`.
    #[error("module '{module}': no lower-level module serves address {address:#x}")]
    NoServingModule {
        /// Module looking for a lower level.
        module: String,
        /// Address that missed.
        address: Address,
    },

    /// More than one lower-level module serves the same address.
    #[error("module '{module}': address {address:#x} is served by more than one lower-level module")]
    AmbiguousServingModule {
        /// Module looking for a lower level.
        module: String,
        /// Address that missed.
        address: Address,
    },

    /// The module kind cannot execute this access kind.
    #[error("module '{module}' does not support {kind} accesses")]
    UnsupportedAccess {
        /// Target module.
        module: String,
        /// Requested access kind.
        kind: AccessKind,
    },

    /// A named module does not exist.
    #[error("unknown module '{0}'")]
    UnknownModule(String),
}
