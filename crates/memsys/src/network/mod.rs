//! Interconnect Between Hierarchy Levels.
//!
//! This module defines the contract between the coherence protocol and the
//! networks carrying its messages. It provides:
//! 1. **Network Trait:** `try_send`/`receive` over end nodes, one per module side.
//! 2. **Messages:** Sized messages with an arrival cycle.
//! 3. **Traffic Counters:** Per-node message and byte counts in both directions.
//!
//! The default implementation is [`SwitchNetwork`].

/// Single-switch network with per-link bandwidth, latency and buffers.
pub mod switch;

use std::fmt;

use serde::Serialize;

use crate::module::ModuleId;

pub use switch::SwitchNetwork;

/// Index of an end node within its network.
pub type NodeId = usize;

/// Index of a network within the system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkId(pub(crate) usize);

impl NetworkId {
    /// Position in the system's network list.
    pub const fn index(self) -> usize {
        self.0
    }
}

/// A message accepted by a network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Message {
    /// Network-wide message id.
    pub id: u64,
    /// Sending node.
    pub src: NodeId,
    /// Receiving node.
    pub dst: NodeId,
    /// Size in bytes.
    pub size: u64,
    /// Cycle at which the message reaches `dst`.
    pub arrival: u64,
}

/// The network cannot accept a message right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkBusy {
    /// Cycles to wait before trying again (at least 1).
    pub retry_after: u64,
}

/// Traffic counters of one end node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NodeStats {
    /// Messages sent from the node.
    pub messages_sent: u64,
    /// Bytes sent from the node.
    pub bytes_sent: u64,
    /// Messages delivered to the node.
    pub messages_received: u64,
    /// Bytes delivered to the node.
    pub bytes_received: u64,
}

/// An interconnect between two levels of the hierarchy.
pub trait Network: fmt::Debug {
    /// Network name.
    fn name(&self) -> &str;

    /// Adds an end node attached to `module`.
    ///
    /// # Returns
    ///
    /// The index of the new node.
    fn add_node(&mut self, name: &str, module: ModuleId) -> NodeId;

    /// Number of end nodes.
    fn num_nodes(&self) -> usize;

    /// Module attached to `node`.
    fn node_module(&self, node: NodeId) -> Option<ModuleId>;

    /// Name of `node`.
    fn node_name(&self, node: NodeId) -> Option<String>;

    /// Largest message the network can ever accept.
    fn max_message_size(&self) -> u64;

    /// Tries to inject a message.
    ///
    /// # Arguments
    ///
    /// * `src` - Sending node.
    /// * `dst` - Receiving node.
    /// * `size` - Message size in bytes.
    /// * `now` - Current cycle.
    ///
    /// # Returns
    ///
    /// The accepted message, or `LinkBusy` when a link or buffer is occupied.
    fn try_send(&mut self, src: NodeId, dst: NodeId, size: u64, now: u64) -> Result<Message, LinkBusy>;

    /// Consumes a delivered message at `node`, freeing its buffer space.
    fn receive(&mut self, node: NodeId, message: &Message);

    /// Traffic counters of `node`.
    fn node_stats(&self, node: NodeId) -> NodeStats;
}
