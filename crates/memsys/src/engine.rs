//! Discrete-Event Queue.
//!
//! This module implements the timer half of the event engine: a min-heap of
//! continuations keyed by `(cycle, sequence)`. Continuations scheduled for the
//! same cycle run in the order they were scheduled. Call/return bookkeeping
//! lives with the frames in [`crate::sim::System`].

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::frame::FrameId;
use crate::protocol::Event;

/// A suspended step of one frame's event chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Continuation {
    /// Step to run.
    pub event: Event,
    /// Frame the step runs on.
    pub frame: FrameId,
}

impl Continuation {
    /// Creates a continuation.
    pub const fn new(event: Event, frame: FrameId) -> Self {
        Self { event, frame }
    }
}

#[derive(Debug)]
struct Scheduled {
    cycle: u64,
    seq: u64,
    cont: Continuation,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cycle == other.cycle && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.cycle, self.seq).cmp(&(other.cycle, other.seq))
    }
}

/// Time-ordered queue of continuations.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<Scheduled>>,
    now: u64,
    seq: u64,
}

impl EventQueue {
    /// Creates an empty queue at cycle 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulated cycle.
    pub const fn now(&self) -> u64 {
        self.now
    }

    /// Schedules `cont` to run `delay` cycles from now.
    pub fn schedule(&mut self, cont: Continuation, delay: u64) {
        self.seq += 1;
        self.heap.push(Reverse(Scheduled {
            cycle: self.now + delay,
            seq: self.seq,
            cont,
        }));
    }

    /// Cycle of the earliest pending continuation.
    pub fn peek_cycle(&self) -> Option<u64> {
        self.heap.peek().map(|Reverse(s)| s.cycle)
    }

    /// Removes the earliest continuation and advances time to its cycle.
    pub fn pop(&mut self) -> Option<Continuation> {
        let Reverse(next) = self.heap.pop()?;
        self.now = next.cycle;
        Some(next.cont)
    }

    /// Advances time to `cycle` without running anything.
    ///
    /// Time never moves backwards.
    pub fn advance_to(&mut self, cycle: u64) {
        self.now = self.now.max(cycle);
    }

    /// Number of pending continuations.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// True when nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
