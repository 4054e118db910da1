//! NMOESI memory-system simulator CLI.
//!
//! This binary is the entry point for running the simulator outside of tests. It performs:
//! 1. **Trace run:** Build a hierarchy from a JSON topology, replay a JSON access trace, print statistics.
//! 2. **Topology check:** Build a hierarchy and report the first configuration error, if any.
//!
//! Protocol traces are enabled through `RUST_LOG`, e.g. `RUST_LOG=mem.access=trace`.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use memsys_core::System;
use memsys_core::sim::{loader, trace};
use memsys_core::stats::STATS_SECTIONS;

#[derive(Parser, Debug)]
#[command(
    name = "msim",
    author,
    version,
    about = "Event-driven NMOESI cache-coherence simulator",
    long_about = "Replay an access trace on a memory hierarchy described in JSON.\n\nExamples:\n  msim run --config topo.json --trace accesses.json\n  msim run --config topo.json --trace accesses.json --stats-json\n  msim check --config topo.json\n\nSet RUST_LOG=mem.access=trace to follow every protocol step."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a trace and print statistics.
    Run {
        /// Topology (JSON).
        #[arg(short, long)]
        config: PathBuf,

        /// Access trace (JSON list of {cycle, module, kind, addr}).
        #[arg(short, long)]
        trace: PathBuf,

        /// Stop after this many cycles.
        #[arg(long)]
        max_cycles: Option<u64>,

        /// Print statistics as JSON instead of text.
        #[arg(long)]
        stats_json: bool,

        /// Statistics sections to print (summary, modules, networks).
        #[arg(long, value_delimiter = ',')]
        stats: Vec<String>,
    },

    /// Validate a topology without running anything.
    Check {
        /// Topology (JSON).
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            trace,
            max_cycles,
            stats_json,
            stats,
        } => cmd_run(&config, &trace, max_cycles, stats_json, &stats),
        Commands::Check { config } => cmd_check(&config),
    }
}

/// Builds the system described by `path`, exiting with code 1 on any configuration error.
fn build_system(path: &Path) -> System {
    let config = loader::load_config(path).unwrap_or_else(|e| {
        eprintln!("[!] {e}");
        process::exit(1);
    });
    System::from_config(&config).unwrap_or_else(|e| {
        eprintln!("[!] {e}");
        process::exit(1);
    })
}

/// Replays the trace and prints the statistics.
fn cmd_run(config: &Path, trace_path: &Path, max_cycles: Option<u64>, stats_json: bool, stats: &[String]) {
    let mut system = build_system(config);
    let entries = trace::load_trace(trace_path).unwrap_or_else(|e| {
        eprintln!("[!] {e}");
        process::exit(1);
    });

    println!("[*] Topology: {}", config.display());
    println!("[*] Trace: {} ({} accesses)", trace_path.display(), entries.len());
    info!(modules = system.modules().len(), max_cycles, "starting replay");

    let summary = match trace::replay(&mut system, &entries, max_cycles) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("\n[!] FATAL: {e}");
            system.stats().print();
            process::exit(1);
        }
    };

    println!(
        "[*] Issued {} / completed {} in {} cycles ({} stall cycles)",
        summary.issued, summary.completed, summary.cycles, summary.stall_cycles
    );
    if summary.truncated {
        println!("[!] Cycle limit reached; {} accesses not issued", summary.not_issued);
    }

    let report = system.stats();
    if stats_json {
        match report.to_json() {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("[!] cannot serialize statistics: {e}");
                process::exit(1);
            }
        }
    } else if stats.is_empty() {
        report.print();
    } else {
        for section in stats {
            if !STATS_SECTIONS.contains(&section.as_str()) {
                eprintln!("[!] unknown statistics section '{section}'");
            }
        }
        report.print_sections(stats);
    }

    if summary.truncated {
        process::exit(2);
    }
}

/// Builds the topology and reports its shape.
fn cmd_check(config: &Path) {
    let system = build_system(config);
    println!("[*] {} is valid", config.display());
    for module in system.modules() {
        let cache = module.cache();
        println!(
            "    {:<16} {:?}  {} sets x {} ways x {} B  latency {}",
            module.name(),
            module.kind(),
            cache.num_sets(),
            cache.num_ways(),
            module.block_size(),
            module.data_latency()
        );
    }
}
