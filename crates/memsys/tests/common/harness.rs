use memsys_core::cache::BlockState;
use memsys_core::module::ModuleId;
use memsys_core::sim::loader::parse_config;
use memsys_core::stats::ModuleStats;
use memsys_core::{AccessKind, System, Witness};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

/// Routes protocol traces to the test output when `RUST_LOG` is set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Two private L1 caches over a shared L2 over main memory.
///
/// - `l1a`, `l1b`: 16 sets x 2 ways x 64 B, latency 2.
/// - `l2`: 4 sets x 4 ways x 128 B, latency 20.
/// - `mm`: 128 B blocks, latency 200.
pub fn two_level() -> Value {
    json!({
        "general": { "seed": 7 },
        "geometries": {
            "l1": { "sets": 16, "assoc": 2, "block_size": 64, "latency": 2 },
            "l2": { "sets": 4, "assoc": 4, "block_size": 128, "latency": 20 }
        },
        "modules": [
            { "name": "l1a", "type": "cache", "geometry": "l1",
              "low_network": "net-l1-l2", "low_modules": ["l2"] },
            { "name": "l1b", "type": "cache", "geometry": "l1",
              "low_network": "net-l1-l2", "low_modules": ["l2"] },
            { "name": "l2", "type": "cache", "geometry": "l2",
              "high_network": "net-l1-l2", "low_network": "net-l2-mm", "low_modules": ["mm"] },
            { "name": "mm", "type": "main_memory", "block_size": 128, "latency": 200,
              "high_network": "net-l2-mm" }
        ],
        "networks": [
            { "name": "net-l1-l2", "bandwidth": 256 },
            { "name": "net-l2-mm", "bandwidth": 256 }
        ]
    })
}

/// A single local memory with no lower level.
pub fn scratchpad() -> Value {
    json!({
        "geometries": {
            "lm": { "sets": 8, "assoc": 2, "block_size": 64, "latency": 3 }
        },
        "modules": [
            { "name": "lm", "type": "local_memory", "geometry": "lm" }
        ]
    })
}

/// A built system plus one witness shared by every access it issues.
pub struct TestSystem {
    pub sys: System,
    pub witness: Witness,
}

impl TestSystem {
    /// Builds the system described by `topology`.
    pub fn new(topology: &Value) -> Self {
        init_tracing();
        let config = parse_config(&topology.to_string()).unwrap_or_else(|e| panic!("bad topology: {e}"));
        let sys = System::from_config(&config).unwrap_or_else(|e| panic!("cannot build: {e}"));
        Self {
            sys,
            witness: Witness::new(),
        }
    }

    /// Default two-level hierarchy.
    pub fn two_level() -> Self {
        Self::new(&two_level())
    }

    pub fn id(&self, name: &str) -> ModuleId {
        self.sys.module_id(name).unwrap_or_else(|| panic!("no module '{name}'"))
    }

    /// Issues an access without running anything.
    pub fn issue(&mut self, module: &str, kind: AccessKind, addr: u64) -> u64 {
        let id = self.id(module);
        self.sys
            .access(id, kind, addr, Some(&self.witness))
            .unwrap_or_else(|e| panic!("{kind} {addr:#x} on {module}: {e}"))
    }

    /// Runs every pending event.
    pub fn run(&mut self) -> u64 {
        self.sys.run().unwrap_or_else(|e| panic!("simulation failed: {e}"))
    }

    /// Issues one access and runs it to completion.
    pub fn complete(&mut self, module: &str, kind: AccessKind, addr: u64) {
        let before = self.witness.get();
        let _ = self.issue(module, kind, addr);
        let _ = self.run();
        assert_eq!(self.witness.get(), before + 1, "{kind} {addr:#x} on {module} did not complete");
    }

    pub fn load(&mut self, module: &str, addr: u64) {
        self.complete(module, AccessKind::Load, addr);
    }

    pub fn store(&mut self, module: &str, addr: u64) {
        self.complete(module, AccessKind::Store, addr);
    }

    pub fn nc_store(&mut self, module: &str, addr: u64) {
        self.complete(module, AccessKind::NcStore, addr);
    }

    pub fn state(&self, module: &str, addr: u64) -> BlockState {
        self.sys.block_state(self.id(module), addr)
    }

    pub fn owner(&self, module: &str, addr: u64) -> Option<String> {
        self.sys
            .owner(self.id(module), addr)
            .map(|id| self.sys.module(id).name().to_string())
    }

    pub fn sharers(&self, module: &str, addr: u64) -> Vec<String> {
        self.sys
            .sharers(self.id(module), addr)
            .into_iter()
            .map(|id| self.sys.module(id).name().to_string())
            .collect()
    }

    pub fn stats(&self, module: &str) -> ModuleStats {
        *self.sys.module(self.id(module)).stats()
    }

    /// Checks that no access, port or entry lock was left behind.
    pub fn assert_quiescent(&self) {
        assert!(self.sys.is_idle());
        assert_eq!(self.sys.live_frames(), 0);
        for module in self.sys.modules() {
            assert!(module.in_flight().is_empty(), "{} has accesses in flight", module.name());
            assert_eq!(module.ports().num_locked(), 0, "{} holds a port", module.name());
            let dir = module.directory();
            for set in 0..dir.num_sets() {
                for way in 0..dir.num_ways() {
                    assert!(
                        !dir.is_entry_locked(set, way),
                        "{} entry ({set}, {way}) still locked",
                        module.name()
                    );
                }
            }
        }
    }
}
