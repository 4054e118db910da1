//! Completion witness shared between a caller and the memory system.

use std::cell::Cell;
use std::rc::Rc;

/// Integer counter owned by the issuer of an access.
///
/// The memory system increments it exactly once when the access completes
/// (for stores: as soon as write permission is granted). Callers poll it to
/// detect completion; a counter started at `-n` reaches zero after `n`
/// accesses complete.
///
/// Clones share the same counter.
#[derive(Clone, Debug, Default)]
pub struct Witness(Rc<Cell<i64>>);

impl Witness {
    /// Creates a witness starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a witness starting at `value`.
    pub fn with_value(value: i64) -> Self {
        Self(Rc::new(Cell::new(value)))
    }

    /// Current counter value.
    pub fn get(&self) -> i64 {
        self.0.get()
    }

    /// Increments the counter.
    pub fn increment(&self) {
        self.0.set(self.0.get() + 1);
    }
}
