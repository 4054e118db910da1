//! Topology Construction.
//!
//! This module turns a [`SystemConfig`] into a wired [`System`]. It performs:
//! 1. **Networks:** One [`SwitchNetwork`] per configured network.
//! 2. **Modules:** Block arrays, directories and ports from geometries or main-memory fields.
//! 3. **Wiring:** Network attachment and upper/lower links, in configuration order.
//! 4. **Validation:** Names, geometry, ranges, network agreement, block sizes and buffer capacity.
//!
//! Every problem is reported as a [`ConfigError`] before the first access.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::cache::Cache;
use crate::common::addr::exact_log2;
use crate::common::ConfigError;
use crate::config::{ModuleConfig, ModuleKind, NetworkConfig, RangeConfig, SystemConfig};
use crate::module::{Module, ModuleId};
use crate::network::{NetworkId, SwitchNetwork};
use crate::sim::System;

/// Bytes added to every data payload for the message header.
const HEADER_SIZE: u64 = 8;

impl System {
    /// Builds a wired system from a configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Parsed topology.
    ///
    /// # Returns
    ///
    /// The system, or the first `ConfigError` found.
    pub fn from_config(config: &SystemConfig) -> Result<Self, ConfigError> {
        build(config)
    }
}

/// Builds a wired system from a configuration.
///
/// See [`System::from_config`].
pub fn build(config: &SystemConfig) -> Result<System, ConfigError> {
    let mut system = System::new(config.general.seed);

    let mut networks: HashMap<&str, NetworkId> = HashMap::new();
    for net in &config.networks {
        validate_network(net)?;
        let id = system.add_network(Box::new(SwitchNetwork::new(
            &net.name,
            net.bandwidth,
            net.latency,
            net.input_buffer_size,
            net.output_buffer_size,
        )));
        if networks.insert(net.name.as_str(), id).is_some() {
            return Err(ConfigError::DuplicateNetwork(net.name.clone()));
        }
    }

    let mut modules: HashMap<&str, ModuleId> = HashMap::new();
    for (idx, cfg) in config.modules.iter().enumerate() {
        let module = build_module(config, cfg, config.general.seed.wrapping_add(idx as u64))?;
        let id = system.add_module(module);
        if modules.insert(cfg.name.as_str(), id).is_some() {
            return Err(ConfigError::DuplicateModule(cfg.name.clone()));
        }
    }

    for cfg in &config.modules {
        let id = modules[cfg.name.as_str()];
        let lookup = |network: &str| {
            networks
                .get(network)
                .copied()
                .ok_or_else(|| ConfigError::UnknownNetwork {
                    module: cfg.name.clone(),
                    network: network.to_string(),
                })
        };
        if let Some(name) = &cfg.low_network {
            system.set_low_network(id, lookup(name)?);
        }
        if let Some(name) = &cfg.high_network {
            system.set_high_network(id, lookup(name)?);
        }
    }

    for cfg in &config.modules {
        let upper = modules[cfg.name.as_str()];
        check_hierarchy(cfg)?;
        for low in &cfg.low_modules {
            let lower = modules
                .get(low.as_str())
                .copied()
                .ok_or_else(|| ConfigError::UnknownModule {
                    module: cfg.name.clone(),
                    reference: low.clone(),
                })?;
            check_link(&system, upper, lower)?;
            system.connect(upper, lower);
        }
    }

    check_buffers(&system, config)?;
    system.finalize();

    info!(
        modules = config.modules.len(),
        networks = config.networks.len(),
        "memory system built"
    );
    Ok(system)
}

fn validate_network(net: &NetworkConfig) -> Result<(), ConfigError> {
    if net.bandwidth == 0 {
        return Err(ConfigError::InvalidValue {
            owner: format!("network '{}'", net.name),
            field: "bandwidth",
            reason: "must be at least 1 byte per cycle".to_string(),
        });
    }
    Ok(())
}

fn check_power_of_two(owner: &str, field: &'static str, value: u64) -> Result<(), ConfigError> {
    exact_log2(value)
        .map(|_| ())
        .ok_or_else(|| ConfigError::NotPowerOfTwo {
            owner: owner.to_string(),
            field,
            value,
        })
}

fn check_ports(owner: &str, ports: usize) -> Result<(), ConfigError> {
    if ports == 0 {
        return Err(ConfigError::InvalidValue {
            owner: owner.to_string(),
            field: "ports",
            reason: "a module needs at least one port".to_string(),
        });
    }
    Ok(())
}

fn build_module(config: &SystemConfig, cfg: &ModuleConfig, seed: u64) -> Result<Module, ConfigError> {
    let name = cfg.name.as_str();
    let module = match cfg.kind {
        ModuleKind::Cache | ModuleKind::LocalMemory => {
            let geometry_name = cfg.geometry.as_ref().ok_or_else(|| ConfigError::MissingField {
                module: name.to_string(),
                field: "geometry",
            })?;
            let geo = config
                .geometries
                .get(geometry_name)
                .ok_or_else(|| ConfigError::UnknownGeometry {
                    module: name.to_string(),
                    geometry: geometry_name.clone(),
                })?;
            check_ports(name, geo.ports)?;
            let cache = Cache::new(name, geo.sets, geo.assoc, geo.block_size, geo.policy, seed)?;
            Module::new(
                name,
                cfg.kind,
                cache,
                geo.latency,
                geo.directory_latency,
                geo.mshr,
                geo.ports,
            )
        }
        ModuleKind::MainMemory => {
            let latency = cfg.latency.ok_or_else(|| ConfigError::MissingField {
                module: name.to_string(),
                field: "latency",
            })?;
            check_ports(name, cfg.ports)?;
            check_power_of_two(name, "directory_size", cfg.directory_size as u64)?;
            check_power_of_two(name, "directory_assoc", cfg.directory_assoc as u64)?;
            if cfg.directory_assoc > cfg.directory_size {
                return Err(ConfigError::InvalidValue {
                    owner: name.to_string(),
                    field: "directory_assoc",
                    reason: format!("exceeds directory_size {}", cfg.directory_size),
                });
            }
            let sets = cfg.directory_size / cfg.directory_assoc;
            let cache = Cache::new(
                name,
                sets,
                cfg.directory_assoc,
                cfg.block_size,
                crate::config::ReplacementPolicy::Lru,
                seed,
            )?;
            Module::new(
                name,
                cfg.kind,
                cache,
                latency,
                cfg.directory_latency,
                0,
                cfg.ports,
            )
        }
    };
    apply_range(module, cfg)
}

fn apply_range(mut module: Module, cfg: &ModuleConfig) -> Result<Module, ConfigError> {
    let bs = module.block_size();
    let invalid = |reason: String| ConfigError::InvalidRange {
        module: cfg.name.clone(),
        reason,
    };
    match cfg.range {
        None => {}
        Some(RangeConfig::Bounds { low, high }) => {
            if low % bs != 0 {
                return Err(invalid(format!("low {low:#x} is not a multiple of the block size {bs}")));
            }
            if high.wrapping_add(1) % bs != 0 {
                return Err(invalid(format!("high {high:#x} + 1 is not a multiple of the block size {bs}")));
            }
            if low > high {
                return Err(invalid(format!("low {low:#x} is above high {high:#x}")));
            }
            module.set_range_bounds(low, high);
        }
        Some(RangeConfig::Interleaved { div, modulo, eq }) => {
            if div == 0 || div % bs != 0 {
                return Err(invalid(format!("div {div} is not a multiple of the block size {bs}")));
            }
            if modulo == 0 {
                return Err(invalid("modulo must be at least 1".to_string()));
            }
            if eq >= modulo {
                return Err(invalid(format!("eq {eq} must be below modulo {modulo}")));
            }
            module.set_range_interleaved(div, modulo, eq);
        }
    }
    Ok(module)
}

fn check_hierarchy(cfg: &ModuleConfig) -> Result<(), ConfigError> {
    let fail = |reason: &'static str| {
        Err(ConfigError::InvalidHierarchy {
            module: cfg.name.clone(),
            reason,
        })
    };
    match cfg.kind {
        ModuleKind::Cache => {
            if cfg.low_modules.is_empty() {
                return fail("a cache needs at least one low module");
            }
            if cfg.low_network.is_none() {
                return Err(ConfigError::MissingField {
                    module: cfg.name.clone(),
                    field: "low_network",
                });
            }
        }
        ModuleKind::MainMemory => {
            if !cfg.low_modules.is_empty() {
                return fail("main memory cannot have low modules");
            }
        }
        ModuleKind::LocalMemory => {
            if !cfg.low_modules.is_empty() {
                return fail("a local memory cannot have low modules");
            }
        }
    }
    Ok(())
}

fn check_link(system: &System, upper: ModuleId, lower: ModuleId) -> Result<(), ConfigError> {
    let up = system.module(upper);
    let low = system.module(lower);
    let agree = match (up.low_link(), low.high_link()) {
        (Some(a), Some(b)) => a.network == b.network,
        _ => false,
    };
    if !agree {
        return Err(ConfigError::NetworkMismatch {
            upper: up.name().to_string(),
            lower: low.name().to_string(),
        });
    }
    if low.block_size() < up.block_size() {
        return Err(ConfigError::BlockSizeInversion {
            upper: up.name().to_string(),
            upper_size: up.block_size(),
            lower: low.name().to_string(),
            lower_size: low.block_size(),
        });
    }
    debug!(upper = %up.name(), lower = %low.name(), "connected");
    Ok(())
}

/// The largest message on a network is a data message of its largest upper block.
fn check_buffers(system: &System, config: &SystemConfig) -> Result<(), ConfigError> {
    for (idx, net) in config.networks.iter().enumerate() {
        let needed = system
            .modules()
            .iter()
            .filter(|m| m.low_link().is_some_and(|link| link.network.index() == idx))
            .map(|m| m.block_size() + HEADER_SIZE)
            .max()
            .unwrap_or(HEADER_SIZE);
        for (which, size) in [("input", net.input_buffer_size), ("output", net.output_buffer_size)] {
            if size < needed {
                return Err(ConfigError::BufferTooSmall {
                    network: net.name.clone(),
                    which,
                    size,
                    needed,
                });
            }
        }
    }
    Ok(())
}
