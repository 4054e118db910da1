//! Simulation statistics collection and reporting.
//!
//! This module tracks the counters of the memory hierarchy. It provides:
//! 1. **Module Counters:** Accesses, hits, evictions and retries per module.
//! 2. **Access Mix:** Reads, writes and non-coherent writes with their hit counts.
//! 3. **Coherence Traffic:** Directory conflicts, probes and conflict invalidations.
//! 4. **Network Traffic:** Messages and bytes in both directions per network node.
//! 5. **Reporting:** A sectioned text report and a JSON snapshot.

use serde::Serialize;

use crate::network::NodeStats;

/// Counters of one memory module.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ModuleStats {
    /// Up-down lookups (demand accesses and requests from above).
    pub accesses: u64,
    /// Lookups that were retries after a conflict.
    pub retry_accesses: u64,
    /// Up-down lookups that hit.
    pub hits: u64,
    /// Valid victims evicted to make room.
    pub evictions: u64,

    /// Read lookups.
    pub reads: u64,
    /// Read lookups that hit.
    pub read_hits: u64,
    /// Write lookups.
    pub writes: u64,
    /// Write lookups that hit.
    pub write_hits: u64,
    /// Non-coherent write lookups.
    pub nc_writes: u64,
    /// Non-coherent write lookups that hit.
    pub nc_write_hits: u64,

    /// Prefetches issued.
    pub prefetches: u64,
    /// Prefetches that found the block already present.
    pub useless_prefetches: u64,
    /// Prefetches dropped on an in-flight block or a lock conflict.
    pub dropped_prefetches: u64,
    /// Flushes issued.
    pub flushes: u64,

    /// Loads merged into an in-flight load.
    pub coalesced_reads: u64,
    /// Stores merged into an in-flight store.
    pub coalesced_writes: u64,
    /// Non-coherent stores merged into an in-flight one.
    pub coalesced_nc_writes: u64,

    /// Directory entries locked.
    pub directory_accesses: u64,
    /// Non-blocking lookups that found the entry locked.
    pub directory_entry_conflicts: u64,
    /// Entry conflicts hit by lookups that were already retries.
    pub retry_directory_entry_conflicts: u64,
    /// Valid blocks evicted because another block needed their slot.
    pub conflict_invalidations: u64,
    /// Data array accesses.
    pub data_accesses: u64,
    /// Down-up lookups (probes and invalidations from below).
    pub probes: u64,
}

impl ModuleStats {
    /// Hit ratio of up-down lookups.
    pub fn hit_ratio(&self) -> f64 {
        if self.accesses == 0 {
            0.0
        } else {
            self.hits as f64 / self.accesses as f64
        }
    }
}

/// Snapshot of one module's counters, for reports.
#[derive(Clone, Debug, Serialize)]
pub struct ModuleReport {
    /// Module name.
    pub name: String,
    /// Counters.
    #[serde(flatten)]
    pub stats: ModuleStats,
}

/// Snapshot of one network node's counters, for reports.
#[derive(Clone, Debug, Serialize)]
pub struct NodeReport {
    /// Node name.
    pub name: String,
    /// Counters.
    #[serde(flatten)]
    pub stats: NodeStats,
}

/// Snapshot of one network, for reports.
#[derive(Clone, Debug, Serialize)]
pub struct NetworkReport {
    /// Network name.
    pub name: String,
    /// Per-node counters.
    pub nodes: Vec<NodeReport>,
}

/// Statistics of a whole simulation.
#[derive(Clone, Debug, Serialize)]
pub struct SimStats {
    /// Final simulated cycle.
    pub cycles: u64,
    /// Accesses issued by the caller.
    pub accesses_issued: u64,
    /// Accesses completed.
    pub accesses_completed: u64,
    /// Per-module counters.
    pub modules: Vec<ModuleReport>,
    /// Per-network counters.
    pub networks: Vec<NetworkReport>,
}

/// Sections printed by [`SimStats::print`].
pub const STATS_SECTIONS: &[&str] = &["summary", "modules", "networks"];

impl SimStats {
    /// Prints the selected statistics sections to stdout.
    ///
    /// Known sections are "summary", "modules" and "networks"; unknown names
    /// are ignored.
    pub fn print_sections(&self, sections: &[String]) {
        let want = |s: &str| sections.iter().any(|x| x == s);

        if want("summary") {
            println!("\n==========================================================");
            println!("MEMORY SYSTEM SIMULATION STATISTICS");
            println!("==========================================================");
            println!("sim_cycles               {}", self.cycles);
            println!("accesses_issued          {}", self.accesses_issued);
            println!("accesses_completed       {}", self.accesses_completed);
            println!("----------------------------------------------------------");
        }

        if want("modules") {
            println!("MODULES");
            for module in &self.modules {
                let s = &module.stats;
                println!("  [{}]", module.name);
                println!(
                    "    accesses             {:<10} hits {:<10} ratio {:.2}%",
                    s.accesses,
                    s.hits,
                    s.hit_ratio() * 100.0
                );
                println!(
                    "    reads                {:<10} hits {}",
                    s.reads, s.read_hits
                );
                println!(
                    "    writes               {:<10} hits {}",
                    s.writes, s.write_hits
                );
                println!(
                    "    nc_writes            {:<10} hits {}",
                    s.nc_writes, s.nc_write_hits
                );
                println!(
                    "    evictions            {:<10} retries {}",
                    s.evictions, s.retry_accesses
                );
                println!(
                    "    coalesced            r {} / w {} / nc {}",
                    s.coalesced_reads, s.coalesced_writes, s.coalesced_nc_writes
                );
                println!(
                    "    directory            accesses {} conflicts {} (retry {})",
                    s.directory_accesses,
                    s.directory_entry_conflicts,
                    s.retry_directory_entry_conflicts
                );
                println!(
                    "    probes               {:<10} conflict_inval {}",
                    s.probes, s.conflict_invalidations
                );
                if s.prefetches > 0 || s.flushes > 0 {
                    println!(
                        "    prefetch             {} (useless {}, dropped {}) flushes {}",
                        s.prefetches, s.useless_prefetches, s.dropped_prefetches, s.flushes
                    );
                }
            }
            println!("----------------------------------------------------------");
        }

        if want("networks") {
            println!("NETWORKS");
            for net in &self.networks {
                println!("  [{}]", net.name);
                for node in &net.nodes {
                    let s = &node.stats;
                    println!(
                        "    {:<20} out {:>6} msgs {:>10} B   in {:>6} msgs {:>10} B",
                        node.name,
                        s.messages_sent,
                        s.bytes_sent,
                        s.messages_received,
                        s.bytes_received
                    );
                }
            }
        }

        println!("==========================================================");
    }

    /// Prints every section.
    pub fn print(&self) {
        let all: Vec<String> = STATS_SECTIONS.iter().map(|s| (*s).to_string()).collect();
        self.print_sections(&all);
    }

    /// Serializes the statistics as pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
