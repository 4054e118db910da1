use memsys_core::cache::BlockState::{Exclusive, Invalid, Modified, Shared};
use memsys_core::{AccessKind, SimError};
use pretty_assertions::assert_eq;

use crate::common::harness::{TestSystem, scratchpad};

const X: u64 = 0x1000;

#[test]
fn local_memory_fills_without_traffic() {
    let mut t = TestSystem::new(&scratchpad());
    t.load("lm", 0x100);
    assert_eq!(t.state("lm", 0x100), Exclusive);
    t.store("lm", 0x100);
    assert_eq!(t.state("lm", 0x100), Modified);
    t.store("lm", 0x140);
    assert_eq!(t.state("lm", 0x140), Modified);

    let lm = t.stats("lm");
    assert_eq!((lm.accesses, lm.hits), (3, 1));
    assert_eq!((lm.reads, lm.writes, lm.write_hits), (1, 2, 1));
    assert_eq!(t.sys.num_networks(), 0);
    t.assert_quiescent();
}

#[test]
fn local_memory_replaces_in_place() {
    let mut t = TestSystem::new(&scratchpad());
    // Set 0 of an 8-set, 2-way array.
    for addr in [0x0, 0x200, 0x400] {
        t.load("lm", addr);
    }
    assert_eq!(t.state("lm", 0x0), Invalid);
    assert_eq!(t.state("lm", 0x400), Exclusive);
    assert_eq!(t.stats("lm").evictions, 1);
}

#[test]
fn local_memory_coalesces_loads() {
    let mut t = TestSystem::new(&scratchpad());
    let _ = t.issue("lm", AccessKind::Load, 0x80);
    let _ = t.issue("lm", AccessKind::Load, 0x88);
    let _ = t.run();
    assert_eq!(t.witness.get(), 2);
    assert_eq!(t.stats("lm").coalesced_reads, 1);
    t.assert_quiescent();
}

#[test]
fn local_memory_rejects_flush() {
    let mut t = TestSystem::new(&scratchpad());
    let lm = t.id("lm");
    let err = t.sys.access(lm, AccessKind::Flush, 0x0, None).err();
    assert!(matches!(
        err,
        Some(SimError::UnsupportedAccess { kind: AccessKind::Flush, ref module }) if module == "lm"
    ));
    assert!(t.sys.is_idle());
}

#[test]
fn prefetch_brings_block_in() {
    let mut t = TestSystem::two_level();
    t.complete("l1a", AccessKind::Prefetch, X);
    assert_eq!(t.state("l1a", X), Exclusive);
    assert_eq!(t.state("l2", X), Exclusive);

    t.complete("l1a", AccessKind::Prefetch, X);
    let l1a = t.stats("l1a");
    assert_eq!((l1a.prefetches, l1a.useless_prefetches, l1a.dropped_prefetches), (2, 1, 0));
    t.assert_quiescent();
}

#[test]
fn prefetch_behind_in_flight_access_is_dropped() {
    let mut t = TestSystem::two_level();
    let _ = t.issue("l1a", AccessKind::Load, X);
    let _ = t.issue("l1a", AccessKind::Prefetch, X + 8);
    let _ = t.run();

    assert_eq!(t.witness.get(), 2);
    let l1a = t.stats("l1a");
    assert_eq!((l1a.prefetches, l1a.dropped_prefetches), (1, 1));
    assert_eq!(l1a.accesses, 1);
    t.assert_quiescent();
}

#[test]
fn flush_of_clean_block_invalidates_it() {
    let mut t = TestSystem::two_level();
    t.load("l1a", X);
    t.complete("l1a", AccessKind::Flush, X);

    assert_eq!(t.state("l1a", X), Invalid);
    assert_eq!(t.state("l2", X), Exclusive);
    assert_eq!(t.stats("l1a").flushes, 1);
    t.assert_quiescent();
}

#[test]
fn flush_of_dirty_block_writes_back() {
    let mut t = TestSystem::two_level();
    t.store("l1a", X);
    t.complete("l1a", AccessKind::Flush, X);

    assert_eq!(t.state("l1a", X), Invalid);
    assert_eq!(t.state("l2", X), Modified);
    assert_eq!(t.owner("l2", X), None);
    assert!(t.sharers("l2", X).is_empty());
}

#[test]
fn flush_of_absent_block_completes() {
    let mut t = TestSystem::two_level();
    t.complete("l1a", AccessKind::Flush, X);
    assert_eq!(t.stats("l1a").flushes, 1);
    assert_eq!(t.stats("l2").accesses, 0);
    t.assert_quiescent();
}

#[test]
fn flush_of_lower_level_recalls_upper_copies() {
    let mut t = TestSystem::two_level();
    t.store("l1a", X);
    t.load("l1b", X + 64);
    t.complete("l2", AccessKind::Flush, X);

    assert_eq!(t.state("l1a", X), Invalid);
    assert_eq!(t.state("l1b", X + 64), Invalid);
    assert_eq!(t.state("l2", X), Invalid);
    assert_eq!(t.state("mm", X), Modified);
    t.assert_quiescent();
}

#[test]
fn flush_all_empties_a_cache() {
    let mut t = TestSystem::two_level();
    for addr in [0x0, 0x40, 0x80] {
        t.load("l1a", addr);
    }
    t.load("l1b", 0x80);
    assert_eq!(t.state("l1a", 0x80), Shared);

    let before = t.witness.get();
    let l1a = t.id("l1a");
    let flushes = t
        .sys
        .flush_all(l1a, Some(&t.witness))
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(flushes.len(), 3);
    let _ = t.run();

    assert_eq!(t.witness.get(), before + 3);
    for addr in [0x0, 0x40, 0x80] {
        assert_eq!(t.state("l1a", addr), Invalid);
    }
    assert_eq!(t.state("l1b", 0x80), Shared);
    t.assert_quiescent();
}
