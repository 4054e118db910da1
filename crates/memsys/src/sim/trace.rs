//! Access Trace Replay.
//!
//! This module drives a [`System`] from a recorded list of accesses. It provides:
//! 1. **Trace Format:** A JSON array of `{cycle, module, kind, addr}` entries; addresses may be
//!    numbers or `"0x"`-prefixed strings.
//! 2. **Replay:** In-order issue at or after each entry's cycle, honouring
//!    [`System::can_access`] back-pressure, until every access has completed.
//! 3. **Summary:** Issue, completion and stall counts of a replay.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{debug, warn};

use crate::common::{AccessKind, Address, SimError, Witness};
use crate::module::ModuleId;
use crate::sim::System;

/// One recorded access.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TraceEntry {
    /// Earliest cycle the access may be issued at.
    #[serde(default)]
    pub cycle: u64,
    /// Name of the module receiving the access.
    pub module: String,
    /// Access kind.
    pub kind: AccessKind,
    /// Accessed address.
    #[serde(deserialize_with = "deserialize_address")]
    pub addr: Address,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AddressRepr {
    Number(u64),
    Text(String),
}

fn deserialize_address<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Address, D::Error> {
    match AddressRepr::deserialize(deserializer)? {
        AddressRepr::Number(n) => Ok(n),
        AddressRepr::Text(s) => {
            let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"));
            let parsed = match digits {
                Some(hex) => u64::from_str_radix(hex, 16),
                None => s.parse(),
            };
            parsed.map_err(|e| serde::de::Error::custom(format!("bad address '{s}': {e}")))
        }
    }
}

/// Errors raised while loading or replaying a trace.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// The trace file could not be read.
    #[error("cannot read trace '{}': {source}", path.display())]
    Io {
        /// Path that failed to open.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The trace is not a valid JSON list of entries.
    #[error("malformed trace: {0}")]
    Json(#[from] serde_json::Error),

    /// An entry names a module that does not exist.
    #[error("trace entry {index}: unknown module '{module}'")]
    UnknownModule {
        /// Position of the entry in the trace.
        index: usize,
        /// Missing module name.
        module: String,
    },

    /// The simulation stopped on a fatal error.
    #[error(transparent)]
    Sim(#[from] SimError),
}

/// Outcome of a replay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Accesses issued.
    pub issued: u64,
    /// Accesses whose witness was signalled.
    pub completed: u64,
    /// Entries never issued because the cycle limit was reached.
    pub not_issued: u64,
    /// Cycles in which the next entry was due but its module refused it.
    pub stall_cycles: u64,
    /// Final cycle.
    pub cycles: u64,
    /// The cycle limit stopped the replay before it drained.
    pub truncated: bool,
}

/// Parses a JSON trace.
pub fn parse_trace(text: &str) -> Result<Vec<TraceEntry>, ReplayError> {
    Ok(serde_json::from_str(text)?)
}

/// Reads and parses a JSON trace file.
pub fn load_trace(path: &Path) -> Result<Vec<TraceEntry>, ReplayError> {
    let text = fs::read_to_string(path).map_err(|source| ReplayError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_trace(&text)
}

/// Replays `entries` on `system`.
///
/// Entries are issued in cycle order (ties keep trace order). An entry that is
/// due but refused by its module blocks the entries behind it until the
/// module accepts it.
///
/// # Arguments
///
/// * `system` - A freshly built system.
/// * `entries` - The trace.
/// * `max_cycles` - Optional cycle limit.
///
/// # Returns
///
/// The replay summary, or the first fatal error.
pub fn replay(system: &mut System, entries: &[TraceEntry], max_cycles: Option<u64>) -> Result<ReplaySummary, ReplayError> {
    let mut queue: Vec<(u64, ModuleId, AccessKind, Address)> = entries
        .iter()
        .enumerate()
        .map(|(index, e)| {
            system
                .module_id(&e.module)
                .map(|id| (e.cycle, id, e.kind, e.addr))
                .ok_or_else(|| ReplayError::UnknownModule {
                    index,
                    module: e.module.clone(),
                })
        })
        .collect::<Result<_, _>>()?;
    queue.sort_by_key(|&(cycle, ..)| cycle);
    let mut queue: VecDeque<_> = queue.into();

    let witness = Witness::new();
    let mut summary = ReplaySummary::default();

    loop {
        let now = system.now();
        while let Some(&(cycle, module, kind, addr)) = queue.front() {
            if cycle > now {
                break;
            }
            if !system.can_access(module) {
                summary.stall_cycles += 1;
                break;
            }
            let _ = system.access(module, kind, addr, Some(&witness))?;
            let _ = queue.pop_front();
            summary.issued += 1;
        }
        system.run_until(now)?;

        let head = queue.front().map(|&(cycle, ..)| cycle.max(now + 1));
        let next = match (system.next_event_cycle(), head) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => break,
        };
        if max_cycles.is_some_and(|limit| next > limit) {
            warn!(cycle = now, pending = queue.len(), "cycle limit reached");
            summary.truncated = true;
            break;
        }
        system.advance_to(next)?;
    }

    summary.completed = witness.get() as u64;
    summary.not_issued = queue.len() as u64;
    summary.cycles = system.now();
    debug!(?summary, "replay done");
    Ok(summary)
}
