//! Addresses, block arithmetic and address ranges.
//!
//! This module defines how the memory system reasons about physical addresses. It provides:
//! 1. **Address Type:** A single flat address space shared by every module.
//! 2. **Block Arithmetic:** Power-of-two checks and block alignment helpers.
//! 3. **Address Ranges:** The set of addresses a module serves (bounds or interleaved).

/// A physical address in the simulated memory space.
pub type Address = u64;

/// Returns `log2(value)` if `value` is a non-zero power of two.
///
/// # Arguments
///
/// * `value` - The quantity to test (a set count, associativity or block size).
///
/// # Returns
///
/// `Some(shift)` such that `1 << shift == value`, or `None` otherwise.
pub const fn exact_log2(value: u64) -> Option<u32> {
    if value.is_power_of_two() {
        Some(value.trailing_zeros())
    } else {
        None
    }
}

/// Aligns `addr` down to the start of its block.
///
/// `block_size` must be a power of two.
#[inline(always)]
pub const fn block_align(addr: Address, block_size: u64) -> Address {
    addr & !(block_size - 1)
}

/// Set of addresses served by a module.
///
/// A module with no configured range serves the whole address space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AddressRange {
    /// Every address.
    #[default]
    All,
    /// Contiguous inclusive range `low..=high`.
    Bounds {
        /// First address served.
        low: Address,
        /// Last address served.
        high: Address,
    },
    /// Addresses for which `(addr / div) % modulo == eq`.
    Interleaved {
        /// Interleaving granularity in bytes.
        div: u64,
        /// Number of interleaved modules.
        modulo: u64,
        /// Slot served by this module.
        eq: u64,
    },
}

impl AddressRange {
    /// Checks whether `addr` belongs to this range.
    ///
    /// # Arguments
    ///
    /// * `addr` - The address to test.
    ///
    /// # Returns
    ///
    /// `true` if the range serves `addr`.
    pub const fn contains(&self, addr: Address) -> bool {
        match *self {
            Self::All => true,
            Self::Bounds { low, high } => low <= addr && addr <= high,
            Self::Interleaved { div, modulo, eq } => (addr / div) % modulo == eq,
        }
    }

    /// Number of interleaved slots the block index is divided by when
    /// computing a set index (1 for non-interleaved ranges).
    pub const fn set_divisor(&self) -> u64 {
        match *self {
            Self::Interleaved { modulo, .. } => modulo,
            _ => 1,
        }
    }
}
