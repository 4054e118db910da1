use memsys_core::cache::{BlockState, Cache};
use memsys_core::config::{ModuleKind, ReplacementPolicy};
use memsys_core::module::{Module, ModuleId};
use memsys_core::network::{LinkBusy, Message, Network, SwitchNetwork};
use memsys_core::{AccessKind, System, Witness};
use pretty_assertions::assert_eq;

use crate::common::harness::TestSystem;
use crate::common::mocks::{MockNet, expect_nodes, instant_network};

fn module(name: &str, kind: ModuleKind, latency: u64) -> Module {
    let cache = Cache::new(name, 16, 4, 64, ReplacementPolicy::Lru, 1).unwrap_or_else(|e| panic!("{e}"));
    Module::new(name, kind, cache, latency, 1, 4, 2)
}

/// One cache directly over main memory, joined by the network `make` returns.
fn cache_over_memory(make: impl FnOnce(&[ModuleId]) -> MockNet) -> (System, ModuleId, ModuleId) {
    let mut sys = System::new(1);
    let l1 = sys.add_module(module("l1", ModuleKind::Cache, 2));
    let mm = sys.add_module(module("mm", ModuleKind::MainMemory, 10));
    let net = sys.add_network(Box::new(make(&[l1, mm])));
    sys.set_low_network(l1, net);
    sys.set_high_network(mm, net);
    sys.connect(l1, mm);
    sys.finalize();
    (sys, l1, mm)
}

#[test]
fn switch_counts_traffic_per_node() {
    let mut t = TestSystem::two_level();
    t.load("l1a", 0x40);

    let stats = t.sys.stats();
    let net = &stats.networks[0];
    assert_eq!(net.name, "net-l1-l2");
    let l1a = &net.nodes[0];
    let l2 = &net.nodes[2];
    assert_eq!(l1a.name, "l1a");
    assert_eq!(l2.name, "l2");

    // One 8-byte request up, one 72-byte data reply down.
    assert_eq!((l1a.stats.messages_sent, l1a.stats.bytes_sent), (1, 8));
    assert_eq!((l1a.stats.messages_received, l1a.stats.bytes_received), (1, 72));
    assert_eq!((l2.stats.messages_sent, l2.stats.bytes_sent), (1, 72));
    assert_eq!(net.nodes[1].stats.messages_sent, 0);

    let below = &stats.networks[1];
    assert_eq!(below.nodes[0].stats.bytes_sent, 8);
    assert_eq!(below.nodes[1].stats.bytes_sent, 136);
}

#[test]
fn switch_serializes_a_busy_destination_link() {
    let mut net = SwitchNetwork::new("n", 16, 2, 1024, 1024);
    let a = net.add_node("a", Default::default());
    let b = net.add_node("b", Default::default());
    let c = net.add_node("c", Default::default());

    // hop = latency 2 + 64/16 transfer cycles.
    let first = net.try_send(a, c, 64, 0).unwrap_or_else(|e| panic!("{e:?}"));
    assert_eq!(first.arrival, 12);
    // b's link is free but c's input link is busy until cycle 10.
    let second = net.try_send(b, c, 64, 0).unwrap_or_else(|e| panic!("{e:?}"));
    assert_eq!(second.arrival, 16);
    assert_ne!(first.id, second.id);
    assert_eq!(net.max_message_size(), 1024);
}

#[test]
fn output_buffer_limits_injection() {
    let mut net = SwitchNetwork::new("n", 1, 0, 1024, 16);
    let a = net.add_node("a", Default::default());
    let b = net.add_node("b", Default::default());
    assert!(net.try_send(a, b, 16, 0).is_ok());
    // The link is busy for 16 cycles and the buffer is full until then.
    assert_eq!(net.try_send(a, b, 8, 4), Err(LinkBusy { retry_after: 12 }));
    assert!(net.try_send(a, b, 8, 16).is_ok());
}

#[test]
fn load_through_a_mocked_network() {
    let (mut sys, l1, mm) = cache_over_memory(|ids| instant_network(ids, 3));
    let w = Witness::new();
    let _ = sys
        .access(l1, AccessKind::Load, 0x1040, Some(&w))
        .unwrap_or_else(|e| panic!("{e}"));
    let _ = sys.run().unwrap_or_else(|e| panic!("{e}"));

    assert_eq!(w.get(), 1);
    assert_eq!(sys.block_state(l1, 0x1040), BlockState::Exclusive);
    assert_eq!(sys.block_state(mm, 0x1040), BlockState::Exclusive);
    assert_eq!(sys.owner(mm, 0x1040), Some(l1));
}

#[test]
fn mocked_network_is_a_debuggable_network() {
    let net: Box<dyn Network> = Box::new(MockNet::new());
    assert_eq!(format!("{net:?}"), "MockNet { .. }");
}

#[test]
fn busy_link_is_retried() {
    let refusing = |ids: &[ModuleId]| {
        let mut net = MockNet::new();
        expect_nodes(&mut net, ids);
        let _ = net.expect_receive().times(2).returning(|_, _| ());
        let mut calls = 0;
        let _ = net
            .expect_try_send()
            .times(3)
            .returning(move |src, dst, size, now| {
                calls += 1;
                if calls == 1 {
                    Err(LinkBusy { retry_after: 5 })
                } else {
                    Ok(Message {
                        id: calls,
                        src,
                        dst,
                        size,
                        arrival: now + 1,
                    })
                }
            });
        net
    };

    let (mut sys, l1, _) = cache_over_memory(refusing);
    let w = Witness::new();
    let _ = sys
        .access(l1, AccessKind::Load, 0x80, Some(&w))
        .unwrap_or_else(|e| panic!("{e}"));
    let end = sys.run().unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(w.get(), 1);

    // Same load without the refusal finishes five cycles earlier.
    let (mut fast, l1, _) = cache_over_memory(|ids| instant_network(ids, 1));
    let _ = fast
        .access(l1, AccessKind::Load, 0x80, None)
        .unwrap_or_else(|e| panic!("{e}"));
    let fast_end = fast.run().unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(end, fast_end + 5);
}
