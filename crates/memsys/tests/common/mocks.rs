use std::fmt;

use memsys_core::module::ModuleId;
use memsys_core::network::{LinkBusy, Message, Network, NodeId, NodeStats};
use mockall::mock;

mock! {
    pub Net {}
    impl Network for Net {
        fn name(&self) -> &str;
        fn add_node(&mut self, name: &str, module: ModuleId) -> NodeId;
        fn num_nodes(&self) -> usize;
        fn node_module(&self, node: NodeId) -> Option<ModuleId>;
        fn node_name(&self, node: NodeId) -> Option<String>;
        fn max_message_size(&self) -> u64;
        fn try_send(&mut self, src: NodeId, dst: NodeId, size: u64, now: u64) -> Result<Message, LinkBusy>;
        fn receive(&mut self, node: NodeId, message: &Message);
        fn node_stats(&self, node: NodeId) -> NodeStats;
    }
}

impl fmt::Debug for MockNet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockNet").finish_non_exhaustive()
    }
}

/// Expects `modules` to be attached in order, node `i` belonging to `modules[i]`.
pub fn expect_nodes(net: &mut MockNet, modules: &[ModuleId]) {
    let mut next = 0;
    let _ = net.expect_add_node().times(modules.len()).returning(move |_, _| {
        next += 1;
        next - 1
    });
    let _ = net.expect_num_nodes().return_const(modules.len());
    let owned = modules.to_vec();
    let _ = net
        .expect_node_module()
        .returning(move |node| owned.get(node).copied());
}

/// A mocked network over `modules` that delivers everything `latency`
/// cycles after it is sent.
pub fn instant_network(modules: &[ModuleId], latency: u64) -> MockNet {
    let mut net = MockNet::new();
    expect_nodes(&mut net, modules);
    let _ = net.expect_receive().returning(|_, _| ());
    let mut id = 0;
    let _ = net
        .expect_try_send()
        .returning(move |src, dst, size, now| {
            id += 1;
            Ok(Message {
                id,
                src,
                dst,
                size,
                arrival: now + latency,
            })
        });
    net
}
