use memsys_core::AccessKind;
use memsys_core::cache::BlockState::{Exclusive, Invalid, Modified, NonCoherent, Owned, Shared};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::common::harness::{TestSystem, two_level};

const X: u64 = 0x1000;

#[test]
fn cold_load_fills_every_level() {
    let mut t = TestSystem::two_level();
    t.load("l1a", X);

    assert_eq!(t.state("l1a", X), Exclusive);
    assert_eq!(t.state("l2", X), Exclusive);
    assert_eq!(t.state("mm", X), Exclusive);
    assert_eq!(t.owner("l2", X).as_deref(), Some("l1a"));
    assert_eq!(t.sharers("l2", X), vec!["l1a"]);
    assert_eq!(t.owner("mm", X).as_deref(), Some("l2"));
    // The other half of the L2 block has no upper copy.
    assert!(t.sharers("l2", X + 64).is_empty());

    let l1a = t.stats("l1a");
    assert_eq!((l1a.accesses, l1a.hits, l1a.reads), (1, 0, 1));
    assert_eq!(t.sys.drain_completed(), vec![1]);
    t.assert_quiescent();
}

#[test]
fn repeated_load_hits_locally() {
    let mut t = TestSystem::two_level();
    t.load("l1a", X);
    let cold = t.sys.now();
    t.load("l1a", X + 8);

    let l1a = t.stats("l1a");
    assert_eq!((l1a.accesses, l1a.hits, l1a.read_hits), (2, 1, 1));
    assert_eq!(t.stats("l2").accesses, 1);
    // Hit cost: directory latency plus data latency.
    assert_eq!(t.sys.now() - cold, 3);
}

#[test]
fn store_after_load_upgrades_silently() {
    let mut t = TestSystem::two_level();
    t.load("l1a", X);
    t.store("l1a", X);

    assert_eq!(t.state("l1a", X), Modified);
    assert_eq!(t.state("l2", X), Exclusive);
    assert_eq!(t.owner("l2", X).as_deref(), Some("l1a"));
    assert_eq!(t.stats("l2").accesses, 1);
    assert_eq!(t.stats("l1a").write_hits, 1);
}

#[test]
fn cold_store_gains_exclusive_ownership() {
    let mut t = TestSystem::two_level();
    t.store("l1a", X);

    assert_eq!(t.state("l1a", X), Modified);
    assert_eq!(t.state("l2", X), Exclusive);
    assert_eq!(t.owner("l2", X).as_deref(), Some("l1a"));
    assert_eq!(t.sharers("l2", X), vec!["l1a"]);
    t.assert_quiescent();
}

#[test]
fn second_reader_demotes_exclusive_copy() {
    let mut t = TestSystem::two_level();
    t.load("l1a", X);
    t.load("l1b", X);

    assert_eq!(t.state("l1a", X), Shared);
    assert_eq!(t.state("l1b", X), Shared);
    assert_eq!(t.state("l2", X), Exclusive);
    assert_eq!(t.owner("l2", X), None);
    assert_eq!(t.sharers("l2", X), vec!["l1a", "l1b"]);
    assert_eq!(t.stats("l1a").probes, 1);
}

#[test]
fn reader_of_dirty_block_leaves_it_owned() {
    let mut t = TestSystem::two_level();
    t.store("l1a", X);
    t.load("l1b", X);

    assert_eq!(t.state("l1a", X), Owned);
    assert_eq!(t.state("l1b", X), Shared);
    assert_eq!(t.owner("l2", X).as_deref(), Some("l1a"));
    assert_eq!(t.sharers("l2", X), vec!["l1a", "l1b"]);
}

#[test]
fn store_invalidates_other_sharers() {
    let mut t = TestSystem::two_level();
    t.load("l1a", X);
    t.load("l1b", X);
    t.store("l1b", X);

    assert_eq!(t.state("l1a", X), Invalid);
    assert_eq!(t.state("l1b", X), Modified);
    assert_eq!(t.owner("l2", X).as_deref(), Some("l1b"));
    assert_eq!(t.sharers("l2", X), vec!["l1b"]);
    t.assert_quiescent();
}

#[test]
fn store_to_peer_dirty_block_moves_the_data_down() {
    let mut t = TestSystem::two_level();
    t.store("l1a", X);
    t.store("l1b", X);

    assert_eq!(t.state("l1a", X), Invalid);
    assert_eq!(t.state("l1b", X), Modified);
    assert_eq!(t.state("l2", X), Modified);
    assert_eq!(t.owner("l2", X).as_deref(), Some("l1b"));
}

#[test]
fn dirty_eviction_writes_back() {
    let mut t = TestSystem::two_level();
    // 0x0, 0x400 and 0x800 share L1 set 0 (two ways) and L2 set 0 (four ways).
    t.store("l1a", 0x0);
    t.load("l1a", 0x400);
    t.load("l1a", 0x800);

    assert_eq!(t.state("l1a", 0x0), Invalid);
    assert_eq!(t.state("l1a", 0x400), Exclusive);
    assert_eq!(t.state("l1a", 0x800), Exclusive);
    assert_eq!(t.state("l2", 0x0), Modified);
    assert!(t.sharers("l2", 0x0).is_empty());
    assert_eq!(t.owner("l2", 0x0), None);

    let l1a = t.stats("l1a");
    assert_eq!(l1a.evictions, 1);
    assert_eq!(l1a.conflict_invalidations, 1);
    t.assert_quiescent();
}

#[test]
fn clean_eviction_is_silent() {
    let mut t = TestSystem::two_level();
    t.load("l1a", 0x0);
    t.load("l1a", 0x400);
    let sent = t.sys.stats().networks[0].nodes[0].stats.messages_sent;
    t.load("l1a", 0x800);

    assert_eq!(t.state("l1a", 0x0), Invalid);
    assert_eq!(t.state("l2", 0x0), Exclusive);
    // Only the read request for 0x800 left l1a.
    assert_eq!(t.sys.stats().networks[0].nodes[0].stats.messages_sent, sent + 1);
}

#[test]
fn clean_fill_through_l2_is_not_written_back() {
    let mut t = TestSystem::two_level();
    t.load("l1a", X);
    assert_eq!(t.state("l2", X), Exclusive);

    // Four more blocks of the same L2 set push X out of the L2.
    for addr in [X + 0x200, X + 0x400, X + 0x600, X + 0x800] {
        t.load("l1b", addr);
    }

    assert_eq!(t.state("l2", X), Invalid);
    assert_eq!(t.state("l1a", X), Invalid);
    assert_eq!(t.state("mm", X), Exclusive);
    assert_eq!(t.stats("l2").evictions, 1);
    // A write-back would be a down-up lookup in main memory.
    assert_eq!(t.stats("mm").probes, 0);
    t.assert_quiescent();
}

#[test]
fn lower_level_eviction_recalls_upper_copies() {
    let mut t = TestSystem::two_level();
    // Five blocks of L2 set 0; the dirty one is the least recently used.
    t.store("l1a", 0x0);
    for addr in [0x200, 0x400, 0x600, 0x800] {
        t.load("l1b", addr);
    }

    assert_eq!(t.state("l1a", 0x0), Invalid);
    assert_eq!(t.state("l2", 0x0), Invalid);
    assert_eq!(t.state("mm", 0x0), Modified);
    assert_eq!(t.stats("l2").evictions, 1);
    assert_eq!(t.stats("l1a").probes, 1);
    t.assert_quiescent();
}

#[test]
fn nc_store_on_missing_block() {
    let mut t = TestSystem::two_level();
    t.nc_store("l1a", X);

    assert_eq!(t.state("l1a", X), NonCoherent);
    assert_eq!(t.owner("l2", X), None);
    assert_eq!(t.sharers("l2", X), vec!["l1a"]);
    assert_eq!(t.stats("l1a").nc_writes, 1);
}

#[test]
fn nc_store_on_exclusive_block_drops_ownership() {
    let mut t = TestSystem::two_level();
    t.load("l1a", X);
    assert_eq!(t.owner("l2", X).as_deref(), Some("l1a"));
    t.nc_store("l1a", X);

    assert_eq!(t.state("l1a", X), NonCoherent);
    assert_eq!(t.owner("l2", X), None);
    assert_eq!(t.sharers("l2", X), vec!["l1a"]);
}

#[test]
fn nc_store_keeps_other_sharers() {
    let mut t = TestSystem::two_level();
    t.load("l1a", X);
    t.load("l1b", X);
    t.nc_store("l1a", X);

    assert_eq!(t.state("l1a", X), NonCoherent);
    assert_eq!(t.state("l1b", X), Shared);
    assert_eq!(t.stats("l1a").nc_write_hits, 1);
}

#[test]
fn nc_store_on_modified_block_writes_back_first() {
    let mut t = TestSystem::two_level();
    t.store("l1a", X);
    t.nc_store("l1a", X);

    assert_eq!(t.state("l1a", X), NonCoherent);
    assert_eq!(t.state("l2", X), Modified);
    assert_eq!(t.owner("l2", X), None);
    t.assert_quiescent();
}

#[test]
fn loads_to_one_block_coalesce() {
    let mut t = TestSystem::two_level();
    let _ = t.issue("l1a", AccessKind::Load, X);
    let _ = t.issue("l1a", AccessKind::Load, X + 32);
    let _ = t.issue("l1a", AccessKind::Load, X + 16);
    let _ = t.run();

    assert_eq!(t.witness.get(), 3);
    assert_eq!(t.stats("l1a").coalesced_reads, 2);
    assert_eq!(t.stats("l1a").accesses, 1);
    assert_eq!(t.stats("l2").accesses, 1);
    let mut done = t.sys.drain_completed();
    done.sort_unstable();
    assert_eq!(done, vec![1, 2, 3]);
    t.assert_quiescent();
}

#[test]
fn stores_to_one_block_coalesce() {
    let mut t = TestSystem::two_level();
    let _ = t.issue("l1a", AccessKind::Store, X);
    let _ = t.issue("l1a", AccessKind::Store, X + 8);
    let _ = t.run();

    assert_eq!(t.witness.get(), 2);
    assert_eq!(t.stats("l1a").coalesced_writes, 1);
    assert_eq!(t.state("l1a", X), Modified);
    t.assert_quiescent();
}

#[test]
fn load_waits_for_older_store() {
    let mut t = TestSystem::two_level();
    let _ = t.issue("l1a", AccessKind::Store, X);
    let _ = t.issue("l1a", AccessKind::Load, X);
    let _ = t.run();

    assert_eq!(t.witness.get(), 2);
    assert_eq!(t.stats("l1a").coalesced_reads, 0);
    assert_eq!(t.stats("l1a").read_hits, 1);
    assert_eq!(t.state("l1a", X), Modified);
}

#[test]
fn mshr_limits_outstanding_accesses() {
    let mut topo = two_level();
    topo["geometries"]["l1"]["mshr"] = json!(2);
    topo["geometries"]["l1"]["ports"] = json!(4);
    let mut t = TestSystem::new(&topo);
    let l1a = t.id("l1a");

    let _ = t.issue("l1a", AccessKind::Load, 0x0);
    let _ = t.issue("l1a", AccessKind::Load, 0x40);
    t.sys.run_until(0).unwrap_or_else(|e| panic!("{e}"));
    assert!(!t.sys.can_access(l1a));
    assert!(t.sys.can_access(t.id("l1b")));

    let _ = t.run();
    assert!(t.sys.can_access(l1a));
    assert_eq!(t.witness.get(), 2);
}

#[test]
fn busy_ports_refuse_new_accesses() {
    let mut topo = two_level();
    topo["geometries"]["l1"]["ports"] = json!(1);
    topo["geometries"]["l1"]["mshr"] = json!(0);
    let mut t = TestSystem::new(&topo);
    let l1a = t.id("l1a");

    let _ = t.issue("l1a", AccessKind::Load, 0x0);
    t.sys.run_until(0).unwrap_or_else(|e| panic!("{e}"));
    assert!(!t.sys.can_access(l1a));
    let _ = t.run();
    assert!(t.sys.can_access(l1a));
}

#[test]
fn racing_stores_leave_a_single_writer() {
    let mut t = TestSystem::two_level();
    let _ = t.issue("l1a", AccessKind::Store, X);
    let _ = t.issue("l1b", AccessKind::Store, X);
    let _ = t.run();

    assert_eq!(t.witness.get(), 2);
    let states = [t.state("l1a", X), t.state("l1b", X)];
    let winner = match states {
        [Modified, Invalid] => "l1a",
        [Invalid, Modified] => "l1b",
        other => panic!("unexpected states {other:?}"),
    };
    assert_eq!(t.owner("l2", X).as_deref(), Some(winner));
    t.assert_quiescent();
}

#[test]
fn mixed_traffic_drains() {
    let mut t = TestSystem::two_level();
    let kinds = [AccessKind::Load, AccessKind::Store, AccessKind::NcStore, AccessKind::Load];
    let mut issued = 0;
    for round in 0..4u64 {
        for (i, kind) in kinds.iter().enumerate() {
            let module = if (round + i as u64) % 2 == 0 { "l1a" } else { "l1b" };
            let addr = ((round * 7 + i as u64 * 3) % 12) * 0x200;
            let _ = t.issue(module, *kind, addr);
            issued += 1;
        }
        t.sys.run_until(t.sys.now() + 5).unwrap_or_else(|e| panic!("{e}"));
    }
    let _ = t.run();

    assert_eq!(t.witness.get(), issued);
    let stats = t.sys.stats();
    assert_eq!(stats.accesses_issued, issued as u64);
    assert_eq!(stats.accesses_completed, issued as u64);
    t.assert_quiescent();

    // No two upper copies may both be writable.
    for block in 0..12u64 {
        let addr = block * 0x200;
        let writable = ["l1a", "l1b"]
            .iter()
            .filter(|m| matches!(t.state(m, addr), Modified | Exclusive))
            .count();
        assert!(writable <= 1, "block {addr:#x} writable in {writable} caches");
    }
}
