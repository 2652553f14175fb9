//! # Flow Table
//!
//! Per-flow configuration and scheduling state. A flow is a distinguishable
//! stream of datagrams identified by its transport source address; the table
//! is the admission gate — sources without an entry never reach the buffer.
//!
//! Flows are created when their weight is configured and never destroyed
//! during a run. `last_vft` is mutated only on the ingress path, under the
//! scheduler lock.

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::clock::Vft;
use crate::stats::FlowStats;

/// Stable flow identifier: the transport-layer source address of the flow's
/// datagrams. The reply address is the same value.
pub type FlowId = SocketAddr;

// ─── FlowState ──────────────────────────────────────────────────────────────

/// Scheduling state for one configured flow.
#[derive(Debug)]
pub struct FlowState {
    /// Relative bandwidth share. Positive, immutable at runtime.
    weight: f64,
    /// VFT most recently assigned to a packet of this flow. Monotonically
    /// non-decreasing; never rolled back on eviction.
    last_vft: Vft,
    /// Live count of this flow's packets currently buffered. Drives the
    /// per-flow capacity policy.
    buffered: usize,
    /// Per-flow accounting.
    pub stats: FlowStats,
}

impl FlowState {
    fn new(weight: f64) -> Self {
        FlowState {
            weight,
            last_vft: Vft::ZERO,
            buffered: 0,
            stats: FlowStats::default(),
        }
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn last_vft(&self) -> Vft {
        self.last_vft
    }

    /// Record the VFT just assigned to this flow's newest packet.
    pub fn set_last_vft(&mut self, vft: Vft) {
        debug_assert!(vft >= self.last_vft, "per-flow VFT must not regress");
        self.last_vft = vft;
    }

    pub fn buffered(&self) -> usize {
        self.buffered
    }

    pub fn note_buffered(&mut self) {
        self.buffered += 1;
    }

    pub fn note_unbuffered(&mut self) {
        debug_assert!(self.buffered > 0, "buffered count underflow");
        self.buffered = self.buffered.saturating_sub(1);
    }
}

// ─── FlowTable ──────────────────────────────────────────────────────────────

/// The set of flows admitted to the link, keyed by source address.
#[derive(Debug, Default)]
pub struct FlowTable {
    flows: HashMap<FlowId, FlowState>,
}

impl FlowTable {
    pub fn new() -> Self {
        FlowTable {
            flows: HashMap::new(),
        }
    }

    /// Register a flow with the given weight. Re-registering an existing flow
    /// keeps its scheduling state and only the first weight wins, matching
    /// static configuration semantics.
    pub fn add_flow(&mut self, id: FlowId, weight: f64) {
        self.flows.entry(id).or_insert_with(|| FlowState::new(weight));
    }

    /// Weight of a configured flow, or `None` for unconfigured sources.
    pub fn weight_of(&self, id: &FlowId) -> Option<f64> {
        self.flows.get(id).map(|f| f.weight)
    }

    pub fn get(&self, id: &FlowId) -> Option<&FlowState> {
        self.flows.get(id)
    }

    pub fn get_mut(&mut self, id: &FlowId) -> Option<&mut FlowState> {
        self.flows.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FlowId, &FlowState)> {
        self.flows.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> FlowId {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn unconfigured_flow_has_no_weight() {
        let table = FlowTable::new();
        assert_eq!(table.weight_of(&addr(5001)), None);
    }

    #[test]
    fn configured_flow_reports_weight() {
        let mut table = FlowTable::new();
        table.add_flow(addr(5001), 2.0);
        assert_eq!(table.weight_of(&addr(5001)), Some(2.0));
    }

    #[test]
    fn reregistering_keeps_first_weight() {
        let mut table = FlowTable::new();
        table.add_flow(addr(5001), 2.0);
        table.add_flow(addr(5001), 9.0);
        assert_eq!(table.weight_of(&addr(5001)), Some(2.0));
    }

    #[test]
    fn last_vft_starts_at_zero_and_advances() {
        let mut table = FlowTable::new();
        table.add_flow(addr(5001), 1.0);

        let flow = table.get_mut(&addr(5001)).unwrap();
        assert_eq!(flow.last_vft(), Vft::ZERO);

        flow.set_last_vft(Vft::new(0.1));
        flow.set_last_vft(Vft::new(0.2));
        assert_eq!(flow.last_vft(), Vft::new(0.2));
    }

    #[test]
    fn buffered_count_tracks_occupancy() {
        let mut table = FlowTable::new();
        table.add_flow(addr(5001), 1.0);

        let flow = table.get_mut(&addr(5001)).unwrap();
        flow.note_buffered();
        flow.note_buffered();
        assert_eq!(flow.buffered(), 2);
        flow.note_unbuffered();
        assert_eq!(flow.buffered(), 1);
    }
}
