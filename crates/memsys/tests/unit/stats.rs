use memsys_core::AccessKind;
use memsys_core::stats::{ModuleStats, STATS_SECTIONS};
use pretty_assertions::assert_eq;
use serde_json::Value;

use crate::common::harness::TestSystem;

#[test]
fn hit_ratio_of_an_idle_module_is_zero() {
    assert!(ModuleStats::default().hit_ratio().abs() < f64::EPSILON);

    let stats = ModuleStats {
        accesses: 4,
        hits: 3,
        ..ModuleStats::default()
    };
    assert!((stats.hit_ratio() - 0.75).abs() < f64::EPSILON);
}

#[test]
fn issued_and_completed_are_tracked() {
    let mut t = TestSystem::two_level();
    let _ = t.issue("l1a", AccessKind::Load, 0x40);
    let _ = t.issue("l1b", AccessKind::Store, 0x2000);

    let before = t.sys.stats();
    assert_eq!((before.accesses_issued, before.accesses_completed), (2, 0));

    let end = t.run();
    let after = t.sys.stats();
    assert_eq!((after.accesses_issued, after.accesses_completed), (2, 2));
    assert_eq!(after.cycles, end);
}

#[test]
fn report_lists_every_module_and_network() {
    let mut t = TestSystem::two_level();
    t.load("l1a", 0x40);
    t.load("l1a", 0x40);

    let stats = t.sys.stats();
    let names: Vec<&str> = stats.modules.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, ["l1a", "l1b", "l2", "mm"]);
    assert_eq!(stats.networks.len(), 2);
    assert!((stats.modules[0].stats.hit_ratio() - 0.5).abs() < f64::EPSILON);
}

#[test]
fn json_snapshot_flattens_counters() {
    let mut t = TestSystem::two_level();
    t.load("l1a", 0x40);
    t.load("l1a", 0x40);

    let text = t.sys.stats().to_json().unwrap_or_else(|e| panic!("{e}"));
    assert!(text.contains("\"name\": \"l1a\""));

    let json: Value = serde_json::from_str(&text).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(json["accesses_issued"], 2);
    assert_eq!(json["modules"][0]["name"], "l1a");
    assert_eq!(json["modules"][0]["accesses"], 2);
    assert_eq!(json["modules"][0]["hits"], 1);
    assert_eq!(json["modules"][3]["name"], "mm");
    assert_eq!(json["networks"][0]["name"], "net-l1-l2");
    assert_eq!(json["networks"][0]["nodes"][0]["name"], "l1a");
    assert_eq!(json["networks"][0]["nodes"][0]["messages_sent"], 1);
}

#[test]
fn known_sections() {
    assert_eq!(STATS_SECTIONS, ["summary", "modules", "networks"]);
}
