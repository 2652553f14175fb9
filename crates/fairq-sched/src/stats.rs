//! # Scheduler Statistics
//!
//! Aggregate and per-flow counters. All stats derive `Serialize` for JSON
//! export; drop accounting lives on the flow entry, not in a side table.

use serde::Serialize;

// ─── Aggregate ──────────────────────────────────────────────────────────────

/// Aggregate scheduler-side statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStats {
    /// Datagrams offered at ingress (configured flows or not).
    pub packets_offered: u64,
    /// Packets that entered the buffer.
    pub packets_admitted: u64,
    /// Packets removed by the service loop.
    pub packets_served: u64,
    /// Buffered packets displaced under the global capacity policy.
    pub packets_evicted: u64,
    /// Arrivals refused under the per-flow capacity policy.
    pub packets_rejected: u64,
    /// Datagrams from sources with no configured weight.
    pub unconfigured_drops: u64,
    /// Payload bytes handed to the service loop.
    pub bytes_served: u64,
}

impl SchedulerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of offered packets dropped for any reason.
    pub fn drop_rate(&self) -> f64 {
        if self.packets_offered == 0 {
            0.0
        } else {
            let dropped = self.packets_evicted + self.packets_rejected + self.unconfigured_drops;
            dropped as f64 / self.packets_offered as f64
        }
    }
}

// ─── Per-flow ───────────────────────────────────────────────────────────────

/// Counters for one configured flow.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FlowStats {
    /// Packets of this flow that entered the buffer.
    pub admitted: u64,
    /// Packets of this flow handed to the service loop.
    pub served: u64,
    /// Packets of this flow displaced by the global policy.
    pub evicted: u64,
    /// Arrivals of this flow refused by the per-flow policy.
    pub rejected: u64,
    /// Payload bytes served for this flow.
    pub bytes_served: u64,
}

impl FlowStats {
    /// Fraction of this flow's admitted packets later displaced.
    pub fn eviction_rate(&self) -> f64 {
        if self.admitted == 0 {
            0.0
        } else {
            self.evicted as f64 / self.admitted as f64
        }
    }
}
