use std::io::Write;

use memsys_core::AccessKind;
use memsys_core::cache::BlockState;
use memsys_core::sim::trace::{ReplayError, TraceEntry, load_trace, parse_trace, replay};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::common::harness::{TestSystem, two_level};

fn entry(cycle: u64, module: &str, kind: AccessKind, addr: u64) -> TraceEntry {
    TraceEntry {
        cycle,
        module: module.to_string(),
        kind,
        addr,
    }
}

#[test]
fn addresses_accept_numbers_and_strings() {
    let entries = parse_trace(
        r#"[
            { "cycle": 4, "module": "l1a", "kind": "load", "addr": "0x40" },
            { "module": "l2", "kind": "nc_store", "addr": 4096 },
            { "cycle": 9, "module": "l1b", "kind": "ncstore", "addr": "128" },
            { "module": "l1b", "kind": "flush", "addr": "0XFF" }
        ]"#,
    )
    .unwrap_or_else(|e| panic!("{e}"));

    assert_eq!(
        entries,
        vec![
            entry(4, "l1a", AccessKind::Load, 0x40),
            entry(0, "l2", AccessKind::NcStore, 4096),
            entry(9, "l1b", AccessKind::NcStore, 128),
            entry(0, "l1b", AccessKind::Flush, 0xff),
        ]
    );
}

#[test]
fn malformed_entries_are_rejected() {
    for text in [
        r#"[ { "module": "l1a", "kind": "load", "addr": "0xzz" } ]"#,
        r#"[ { "module": "l1a", "kind": "swap", "addr": 0 } ]"#,
        r#"[ { "module": "l1a", "kind": "load" } ]"#,
        r#"{ "module": "l1a" }"#,
    ] {
        assert!(matches!(parse_trace(text), Err(ReplayError::Json(_))), "{text}");
    }
}

#[test]
fn replay_drains_every_access() {
    let mut t = TestSystem::two_level();
    let entries = vec![
        entry(0, "l1a", AccessKind::Load, 0x1000),
        entry(5, "l1b", AccessKind::Store, 0x1000),
        entry(5, "l1a", AccessKind::Load, 0x2000),
        entry(2, "l1b", AccessKind::Prefetch, 0x3000),
    ];
    let summary = replay(&mut t.sys, &entries, None).unwrap_or_else(|e| panic!("{e}"));

    assert_eq!((summary.issued, summary.completed, summary.not_issued), (4, 4, 0));
    assert!(!summary.truncated);
    assert_eq!(summary.stall_cycles, 0);
    assert_eq!(summary.cycles, t.sys.now());
    assert_eq!(t.state("l1b", 0x1000), BlockState::Modified);
    assert_eq!(t.state("l1a", 0x1000), BlockState::Invalid);
    assert_eq!(t.sys.stats().accesses_completed, 4);
    t.assert_quiescent();
}

#[test]
fn unknown_module_stops_before_issuing() {
    let mut t = TestSystem::two_level();
    let entries = vec![
        entry(0, "l1a", AccessKind::Load, 0x0),
        entry(1, "l3", AccessKind::Load, 0x0),
    ];
    let err = replay(&mut t.sys, &entries, None).err();
    assert!(matches!(err, Some(ReplayError::UnknownModule { index: 1, ref module }) if module == "l3"));
    assert!(t.sys.is_idle());
    assert_eq!(t.sys.stats().accesses_issued, 0);
}

#[test]
fn full_mshr_stalls_the_trace() {
    let mut topo = two_level();
    topo["geometries"]["l1"]["mshr"] = json!(1);
    let mut t = TestSystem::new(&topo);
    let entries = vec![
        entry(0, "l1a", AccessKind::Load, 0x0),
        entry(1, "l1a", AccessKind::Load, 0x40),
        entry(2, "l1a", AccessKind::Load, 0x80),
    ];
    let summary = replay(&mut t.sys, &entries, None).unwrap_or_else(|e| panic!("{e}"));

    assert_eq!((summary.issued, summary.completed), (3, 3));
    assert!(summary.stall_cycles > 0);
    for addr in [0x0, 0x40, 0x80] {
        assert_eq!(t.state("l1a", addr), BlockState::Exclusive);
    }
    t.assert_quiescent();
}

#[test]
fn cycle_limit_truncates() {
    let mut t = TestSystem::two_level();
    let entries = vec![
        entry(0, "l1a", AccessKind::Load, 0x0),
        entry(10_000, "l1a", AccessKind::Load, 0x40),
    ];
    let summary = replay(&mut t.sys, &entries, Some(50)).unwrap_or_else(|e| panic!("{e}"));

    assert!(summary.truncated);
    assert_eq!((summary.issued, summary.completed, summary.not_issued), (1, 0, 1));
    assert!(summary.cycles <= 50);
    assert!(!t.sys.is_idle());
}

#[test]
fn trace_loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap_or_else(|e| panic!("{e}"));
    write!(file, r#"[ {{ "module": "l1a", "kind": "store", "addr": "0x80" }} ]"#)
        .unwrap_or_else(|e| panic!("{e}"));
    let entries = load_trace(file.path()).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(entries, vec![entry(0, "l1a", AccessKind::Store, 0x80)]);

    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
    let err = load_trace(&dir.path().join("none.json")).err();
    assert!(matches!(err, Some(ReplayError::Io { .. })));
}
