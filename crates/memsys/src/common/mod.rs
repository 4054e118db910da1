//! Common utilities and types used throughout the memory-system simulator.
//!
//! This module provides fundamental building blocks that are shared across all components
//! of the simulator. It includes:
//! 1. **Addresses:** The address type, block arithmetic and address ranges.
//! 2. **Access Kinds:** Classification of the accesses external callers issue.
//! 3. **Error Handling:** Configuration and run-time error types.
//! 4. **Randomness:** A seeded generator for reproducible jitter and replacement.
//! 5. **Witness:** The completion counter shared with the caller.

/// Address type, block helpers and address ranges.
pub mod addr;

/// Access kind definitions.
pub mod data;

/// Error types.
pub mod error;

/// Seeded xorshift generator.
pub mod rng;

/// Caller-owned completion counter.
pub mod witness;

pub use addr::{Address, AddressRange};
pub use data::AccessKind;
pub use error::{ConfigError, SimError};
pub use rng::XorShift64;
pub use witness::Witness;
