use std::io::Write;

use memsys_core::config::{ModuleKind, RangeConfig, ReplacementPolicy};
use memsys_core::sim::loader::{load_config, parse_config};
use memsys_core::{ConfigError, System};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::{Value, json};

use crate::common::harness::two_level;

fn build(topology: &Value) -> Result<System, ConfigError> {
    let config = parse_config(&topology.to_string())?;
    System::from_config(&config)
}

fn module_mut<'a>(topology: &'a mut Value, name: &str) -> &'a mut Value {
    let modules = topology["modules"]
        .as_array_mut()
        .unwrap_or_else(|| panic!("modules is not a list"));
    modules
        .iter_mut()
        .find(|m| m["name"] == name)
        .unwrap_or_else(|| panic!("no module '{name}'"))
}

#[test]
fn defaults_fill_missing_fields() {
    let config = parse_config(
        r#"{
            "geometries": { "g": { "latency": 4 } },
            "modules": [ { "name": "mm", "type": "main_memory", "latency": 100 } ],
            "networks": [ { "name": "n", "bandwidth": 32 } ]
        }"#,
    )
    .unwrap_or_else(|e| panic!("{e}"));

    let g = &config.geometries["g"];
    assert_eq!((g.sets, g.assoc, g.block_size), (16, 2, 256));
    assert_eq!((g.directory_latency, g.mshr, g.ports), (1, 16, 2));
    assert_eq!(g.policy, ReplacementPolicy::Lru);

    let mm = &config.modules[0];
    assert_eq!(mm.kind, ModuleKind::MainMemory);
    assert_eq!((mm.block_size, mm.directory_size, mm.directory_assoc), (64, 1024, 8));
    assert_eq!(mm.range, None);

    let n = &config.networks[0];
    assert_eq!((n.latency, n.input_buffer_size, n.output_buffer_size), (1, 1024, 1024));
}

#[test]
fn enum_spellings_and_ranges_parse() {
    let config = parse_config(
        r#"{
            "geometries": { "g": { "latency": 1, "policy": "fifo" } },
            "modules": [
                { "name": "a", "kind": "MainMemory", "latency": 1,
                  "range": { "bounds": { "low": 0, "high": 4095 } } },
                { "name": "b", "type": "main_memory", "latency": 1,
                  "range": { "interleaved": { "div": 64, "mod": 2, "eq": 1 } } }
            ]
        }"#,
    )
    .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(config.geometries["g"].policy, ReplacementPolicy::Fifo);
    assert_eq!(config.modules[0].range, Some(RangeConfig::Bounds { low: 0, high: 4095 }));
    assert_eq!(
        config.modules[1].range,
        Some(RangeConfig::Interleaved { div: 64, modulo: 2, eq: 1 })
    );
}

#[test]
fn two_level_topology_builds() {
    let sys = build(&two_level()).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(sys.modules().len(), 4);
    assert_eq!(sys.num_networks(), 2);

    let l2 = sys.module_by_name("l2").unwrap_or_else(|| panic!("no l2"));
    assert_eq!(l2.block_size(), 128);
    assert_eq!(l2.sub_block_size(), 64);
    assert_eq!(l2.high_modules().len(), 2);
    assert_eq!(l2.directory().num_sub_blocks(), 2);
    assert_eq!(l2.directory().num_nodes(), 3);

    let mm = sys.module_by_name("mm").unwrap_or_else(|| panic!("no mm"));
    assert_eq!(mm.cache().num_sets(), 128);
    assert_eq!(mm.cache().num_ways(), 8);
}

#[test]
fn duplicate_module_is_rejected() {
    let mut topo = two_level();
    let copy = module_mut(&mut topo, "l1b").clone();
    topo["modules"]
        .as_array_mut()
        .unwrap_or_else(|| panic!("modules is not a list"))
        .push(copy);
    assert!(matches!(build(&topo), Err(ConfigError::DuplicateModule(name)) if name == "l1b"));
}

#[test]
fn unknown_references_are_rejected() {
    let mut topo = two_level();
    module_mut(&mut topo, "l1a")["low_modules"] = json!(["l3"]);
    assert!(matches!(
        build(&topo),
        Err(ConfigError::UnknownModule { module, reference }) if module == "l1a" && reference == "l3"
    ));

    let mut topo = two_level();
    module_mut(&mut topo, "l1a")["geometry"] = json!("huge");
    assert!(matches!(build(&topo), Err(ConfigError::UnknownGeometry { .. })));

    let mut topo = two_level();
    module_mut(&mut topo, "l2")["low_network"] = json!("nowhere");
    assert!(matches!(build(&topo), Err(ConfigError::UnknownNetwork { .. })));
}

#[rstest]
#[case("sets", json!(12))]
#[case("assoc", json!(3))]
#[case("block_size", json!(100))]
fn geometry_must_be_powers_of_two(#[case] field: &str, #[case] value: Value) {
    let mut topo = two_level();
    topo["geometries"]["l2"][field] = value;
    assert!(matches!(build(&topo), Err(ConfigError::NotPowerOfTwo { .. })));
}

#[rstest]
#[case(json!({ "bounds": { "low": 32, "high": 1023 } }))]
#[case(json!({ "bounds": { "low": 0, "high": 1000 } }))]
#[case(json!({ "bounds": { "low": 1024, "high": 127 } }))]
#[case(json!({ "interleaved": { "div": 100, "modulo": 2, "eq": 0 } }))]
#[case(json!({ "interleaved": { "div": 128, "modulo": 0, "eq": 0 } }))]
#[case(json!({ "interleaved": { "div": 128, "modulo": 2, "eq": 2 } }))]
fn malformed_ranges_are_rejected(#[case] range: Value) {
    let mut topo = two_level();
    module_mut(&mut topo, "mm")["range"] = range;
    assert!(matches!(build(&topo), Err(ConfigError::InvalidRange { module, .. }) if module == "mm"));
}

#[test]
fn lower_blocks_must_not_be_smaller() {
    let mut topo = two_level();
    topo["geometries"]["l2"]["block_size"] = json!(32);
    assert!(matches!(
        build(&topo),
        Err(ConfigError::BlockSizeInversion { upper, lower, .. }) if upper == "l1a" && lower == "l2"
    ));
}

#[test]
fn connected_modules_must_share_a_network() {
    let mut topo = two_level();
    module_mut(&mut topo, "l1a")["low_network"] = json!("net-l2-mm");
    assert!(matches!(build(&topo), Err(ConfigError::NetworkMismatch { .. })));
}

#[test]
fn cache_needs_a_lower_level() {
    let mut topo = two_level();
    module_mut(&mut topo, "l1b")["low_modules"] = json!([]);
    assert!(matches!(build(&topo), Err(ConfigError::InvalidHierarchy { module, .. }) if module == "l1b"));

    let mut topo = two_level();
    module_mut(&mut topo, "mm")["low_modules"] = json!(["l2"]);
    assert!(matches!(build(&topo), Err(ConfigError::InvalidHierarchy { module, .. }) if module == "mm"));
}

#[test]
fn main_memory_needs_a_latency() {
    let mut topo = two_level();
    let _ = module_mut(&mut topo, "mm")
        .as_object_mut()
        .unwrap_or_else(|| panic!("module is not an object"))
        .remove("latency");
    assert!(matches!(
        build(&topo),
        Err(ConfigError::MissingField { module, field: "latency" }) if module == "mm"
    ));
}

#[test]
fn buffers_must_hold_the_largest_message() {
    let mut topo = two_level();
    topo["networks"][1]["input_buffer_size"] = json!(100);
    assert!(matches!(
        build(&topo),
        Err(ConfigError::BufferTooSmall { network, which: "input", size: 100, needed: 136 }) if network == "net-l2-mm"
    ));
}

#[test]
fn zero_bandwidth_is_rejected() {
    let mut topo = two_level();
    topo["networks"][0]["bandwidth"] = json!(0);
    assert!(matches!(build(&topo), Err(ConfigError::InvalidValue { field: "bandwidth", .. })));
}

#[test]
fn malformed_json_is_reported() {
    assert!(matches!(parse_config("{ \"modules\": [ }"), Err(ConfigError::Json(_))));
    assert!(matches!(parse_config("{ \"modules\": [ { \"type\": \"cache\" } ] }"), Err(ConfigError::Json(_))));
}

#[test]
fn loads_topology_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap_or_else(|e| panic!("{e}"));
    write!(file, "{}", two_level()).unwrap_or_else(|e| panic!("{e}"));
    let config = load_config(file.path()).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(config.modules.len(), 4);
    assert_eq!(config.general.seed, 7);
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
    let err = load_config(&dir.path().join("absent.json")).err();
    assert!(matches!(err, Some(ConfigError::Io { .. })));
}
