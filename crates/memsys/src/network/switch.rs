//! Single-Switch Network.
//!
//! Every end node has one bidirectional link to a central switch. A message
//! crosses two links (source to switch, switch to destination); each hop costs
//! the link latency plus `ceil(size / bandwidth)` transfer cycles. A link stays
//! busy for the transfer cycles of the message it carries.
//!
//! Buffers are counted in bytes: a message occupies the source's output buffer
//! until it leaves the first link and the destination's input buffer until the
//! protocol receives it.

use tracing::trace;

use super::{LinkBusy, Message, Network, NodeId, NodeStats};
use crate::module::ModuleId;

#[derive(Debug)]
struct Node {
    name: String,
    module: ModuleId,
    out_busy_until: u64,
    in_busy_until: u64,
    /// `(release_cycle, bytes)` of messages still in the output buffer.
    output: Vec<(u64, u64)>,
    input_bytes: u64,
    stats: NodeStats,
}

impl Node {
    fn output_bytes(&mut self, now: u64) -> u64 {
        self.output.retain(|&(release, _)| release > now);
        self.output.iter().map(|&(_, bytes)| bytes).sum()
    }
}

/// Network with a single switch and one link per end node.
#[derive(Debug)]
pub struct SwitchNetwork {
    name: String,
    bandwidth: u64,
    latency: u64,
    input_buffer_size: u64,
    output_buffer_size: u64,
    nodes: Vec<Node>,
    next_message_id: u64,
}

impl SwitchNetwork {
    /// Creates a network with no nodes.
    ///
    /// # Arguments
    ///
    /// * `name` - Network name.
    /// * `bandwidth` - Bytes per cycle of every link (at least 1).
    /// * `latency` - Cycles per hop.
    /// * `input_buffer_size` - Input buffer capacity of every node in bytes.
    /// * `output_buffer_size` - Output buffer capacity of every node in bytes.
    pub fn new(
        name: &str,
        bandwidth: u64,
        latency: u64,
        input_buffer_size: u64,
        output_buffer_size: u64,
    ) -> Self {
        Self {
            name: name.to_string(),
            bandwidth: bandwidth.max(1),
            latency,
            input_buffer_size,
            output_buffer_size,
            nodes: Vec::new(),
            next_message_id: 0,
        }
    }

    /// Returns the number of cycles one hop takes for `bytes`.
    ///
    /// # Returns
    ///
    /// Cycles = link latency plus ceiling(bytes / bandwidth) transfers.
    pub const fn hop_time(&self, bytes: u64) -> u64 {
        self.latency + self.transfer_time(bytes)
    }

    const fn transfer_time(&self, bytes: u64) -> u64 {
        bytes.div_ceil(self.bandwidth)
    }
}

impl Network for SwitchNetwork {
    fn name(&self) -> &str {
        &self.name
    }

    fn add_node(&mut self, name: &str, module: ModuleId) -> NodeId {
        self.nodes.push(Node {
            name: name.to_string(),
            module,
            out_busy_until: 0,
            in_busy_until: 0,
            output: Vec::new(),
            input_bytes: 0,
            stats: NodeStats::default(),
        });
        self.nodes.len() - 1
    }

    fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    fn node_module(&self, node: NodeId) -> Option<ModuleId> {
        self.nodes.get(node).map(|n| n.module)
    }

    fn node_name(&self, node: NodeId) -> Option<String> {
        self.nodes.get(node).map(|n| n.name.clone())
    }

    fn max_message_size(&self) -> u64 {
        self.input_buffer_size.min(self.output_buffer_size)
    }

    fn try_send(&mut self, src: NodeId, dst: NodeId, size: u64, now: u64) -> Result<Message, LinkBusy> {
        let transfer = self.transfer_time(size);
        let hop = self.hop_time(size);
        let output_limit = self.output_buffer_size;
        let input_limit = self.input_buffer_size;

        {
            let source = &mut self.nodes[src];
            if source.out_busy_until > now {
                return Err(LinkBusy {
                    retry_after: source.out_busy_until - now,
                });
            }
            if source.output_bytes(now) + size > output_limit {
                return Err(LinkBusy { retry_after: 1 });
            }
        }
        {
            let dest = &self.nodes[dst];
            if dest.input_bytes + size > input_limit {
                return Err(LinkBusy { retry_after: 1 });
            }
        }

        // Second hop starts once the switch has the message and the
        // destination link is free.
        let at_switch = now + hop;
        let second_start = at_switch.max(self.nodes[dst].in_busy_until);
        let arrival = second_start + hop;

        let source = &mut self.nodes[src];
        source.out_busy_until = now + transfer;
        source.output.push((now + transfer, size));
        source.stats.messages_sent += 1;
        source.stats.bytes_sent += size;

        let dest = &mut self.nodes[dst];
        dest.in_busy_until = second_start + transfer;
        dest.input_bytes += size;

        self.next_message_id += 1;
        let message = Message {
            id: self.next_message_id,
            src,
            dst,
            size,
            arrival,
        };
        trace!(
            target: "mem.net",
            net = %self.name,
            msg = message.id,
            src,
            dst,
            size,
            arrival,
            "send"
        );
        Ok(message)
    }

    fn receive(&mut self, node: NodeId, message: &Message) {
        assert_eq!(
            node, message.dst,
            "message {} received at node {node} but sent to {}",
            message.id, message.dst
        );
        let dest = &mut self.nodes[node];
        dest.input_bytes = dest.input_bytes.saturating_sub(message.size);
        dest.stats.messages_received += 1;
        dest.stats.bytes_received += message.size;
        trace!(target: "mem.net", net = %self.name, msg = message.id, node, "receive");
    }

    fn node_stats(&self, node: NodeId) -> NodeStats {
        self.nodes.get(node).map(|n| n.stats).unwrap_or_default()
    }
}
