//! Access Port Arbitration.
//!
//! A module has a fixed number of ports. A lookup holds one port from the
//! moment it starts until its directory latency has elapsed. When every port
//! is busy, requesters queue in two classes: down-up requests (probes and
//! invalidations coming from below) are served before up-down requests, and
//! each class is FIFO.
//!
//! Ports are handed over directly on release: the next waiter owns the port
//! before its continuation runs, so no other requester can take it in between.

use std::collections::VecDeque;

use crate::engine::Continuation;
use crate::frame::{FrameId, RequestDirection};

/// Port pool of one module.
#[derive(Debug)]
pub struct PortPool {
    owners: Vec<Option<FrameId>>,
    down_up: VecDeque<Continuation>,
    up_down: VecDeque<Continuation>,
}

impl PortPool {
    /// Creates `num_ports` free ports.
    pub fn new(num_ports: usize) -> Self {
        Self {
            owners: vec![None; num_ports],
            down_up: VecDeque::new(),
            up_down: VecDeque::new(),
        }
    }

    /// Number of ports.
    pub fn num_ports(&self) -> usize {
        self.owners.len()
    }

    /// Number of ports currently held.
    pub fn num_locked(&self) -> usize {
        self.owners.iter().filter(|owner| owner.is_some()).count()
    }

    /// True when no port is free.
    pub fn all_locked(&self) -> bool {
        self.owners.iter().all(Option::is_some)
    }

    /// Number of queued requesters.
    pub fn num_waiting(&self) -> usize {
        self.down_up.len() + self.up_down.len()
    }

    /// Grabs a free port for `waiter.frame`, or queues `waiter`.
    ///
    /// # Returns
    ///
    /// `Some(port)` when a port was free; `None` when the requester was
    /// queued and will be handed a port by [`PortPool::unlock_port`].
    pub fn lock_port(&mut self, waiter: Continuation, direction: RequestDirection) -> Option<usize> {
        if let Some(port) = self.owners.iter().position(Option::is_none) {
            self.owners[port] = Some(waiter.frame);
            return Some(port);
        }
        match direction {
            RequestDirection::DownUp => self.down_up.push_back(waiter),
            RequestDirection::UpDown => self.up_down.push_back(waiter),
        }
        None
    }

    /// Releases `port` and hands it to the next queued requester.
    ///
    /// # Returns
    ///
    /// The continuation now owning the port, to be resumed by the caller.
    ///
    /// # Panics
    ///
    /// Panics if `port` is not held by `frame`.
    pub fn unlock_port(&mut self, port: usize, frame: FrameId) -> Option<Continuation> {
        assert_eq!(
            self.owners[port],
            Some(frame),
            "port {port} released by a frame that does not hold it"
        );
        let next = self.down_up.pop_front().or_else(|| self.up_down.pop_front());
        self.owners[port] = next.map(|cont| cont.frame);
        next
    }
}
