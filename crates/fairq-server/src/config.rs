//! # Server Configuration
//!
//! TOML-backed configuration for the scheduler server. Raw input structs are
//! deserialized leniently (`#[serde(default)]`), then `resolve()` validates
//! and fills defaults from the reference deployment. The flow list doubles as
//! the admission allowlist: sources not listed here are dropped silently at
//! ingress.

use std::collections::HashSet;
use std::net::SocketAddr;

use serde::Deserialize;

use fairq_sched::buffer::CapacityPolicy;
use fairq_sched::scheduler::SchedulerConfig;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:4000";
pub const DEFAULT_CAPACITY_PPS: f64 = 10.0;
pub const DEFAULT_MAX_DATAGRAM: usize = 1024;
pub const DEFAULT_BUFFER_CAPACITY: usize = 10;

// ─── Raw input ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfigInput {
    pub listen: Option<String>,
    pub capacity_pps: Option<f64>,
    pub max_datagram_size: Option<usize>,
    pub buffer: BufferConfigInput,
    pub flows: Vec<FlowConfigInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BufferConfigInput {
    /// "global" (default) or "per-flow".
    pub policy: Option<String>,
    pub capacity: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FlowConfigInput {
    pub addr: String,
    pub weight: Option<f64>,
}

// ─── Resolved configuration ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the scheduler listens on.
    pub listen: SocketAddr,
    /// Link service rate in packets per second.
    pub capacity_pps: f64,
    /// Largest accepted datagram; anything bigger is rejected at ingress.
    pub max_datagram_size: usize,
    /// Buffer bound and overflow behavior.
    pub policy: CapacityPolicy,
    /// Admitted flows: source address and weight.
    pub flows: Vec<(SocketAddr, f64)>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen: DEFAULT_LISTEN.parse().expect("default listen address parses"),
            capacity_pps: DEFAULT_CAPACITY_PPS,
            max_datagram_size: DEFAULT_MAX_DATAGRAM,
            policy: CapacityPolicy::Global(DEFAULT_BUFFER_CAPACITY),
            flows: Vec::new(),
        }
    }
}

impl ServerConfigInput {
    pub fn resolve(self) -> Result<ServerConfig, String> {
        let defaults = ServerConfig::default();

        let listen = match self.listen {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| format!("invalid listen address '{}': {}", raw.trim(), e))?,
            None => defaults.listen,
        };

        let capacity_pps = self.capacity_pps.unwrap_or(defaults.capacity_pps);
        if !(capacity_pps > 0.0) {
            return Err(format!("capacity_pps must be positive, got {}", capacity_pps));
        }

        let max_datagram_size = self.max_datagram_size.unwrap_or(defaults.max_datagram_size);
        if max_datagram_size == 0 {
            return Err("max_datagram_size must be positive".to_string());
        }

        let buffer_capacity = self
            .buffer
            .capacity
            .unwrap_or(DEFAULT_BUFFER_CAPACITY)
            .max(1);
        let policy = match self.buffer.policy.as_deref() {
            None | Some("global") => CapacityPolicy::Global(buffer_capacity),
            Some("per-flow") => CapacityPolicy::PerFlow(buffer_capacity),
            Some(other) => {
                return Err(format!(
                    "unknown buffer policy '{}', expected 'global' or 'per-flow'",
                    other
                ))
            }
        };

        let mut seen = HashSet::new();
        let mut flows = Vec::new();
        for flow in self.flows {
            let raw = flow.addr.trim();
            if raw.is_empty() {
                continue;
            }
            let addr: SocketAddr = raw
                .parse()
                .map_err(|e| format!("invalid flow address '{}': {}", raw, e))?;
            if !seen.insert(addr) {
                continue;
            }
            let weight = flow.weight.unwrap_or(1.0);
            if !(weight > 0.0) {
                return Err(format!("flow '{}' has non-positive weight {}", raw, weight));
            }
            flows.push((addr, weight));
        }
        if flows.is_empty() {
            return Err("no flows configured; at least one [[flows]] entry is required".to_string());
        }

        Ok(ServerConfig {
            listen,
            capacity_pps,
            max_datagram_size,
            policy,
            flows,
        })
    }
}

impl ServerConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, String> {
        let parsed: ServerConfigInput =
            toml::from_str(input).map_err(|e| format!("Invalid config TOML: {}", e))?;
        parsed.resolve()
    }

    /// The core scheduler's view of this configuration.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            capacity_pps: self.capacity_pps,
            policy: self.policy,
        }
    }
}
