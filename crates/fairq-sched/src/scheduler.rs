//! # WFQ Scheduler
//!
//! Pure logic — no I/O, no clocks, no sockets. Composes the flow table,
//! virtual clock, and priority buffer into the weighted-fair-queuing
//! discipline: arrivals are stamped with a virtual finish time and admitted;
//! service always takes the smallest VFT and advances virtual time to it.
//!
//! For a packet arriving on flow `f` while the clock reads `now`:
//!
//! ```text
//! vft = max(now, last_vft[f]) + 1 / (capacity * weight[f])
//! ```
//!
//! A flow's next packet can finish neither before the flow's previous packet
//! would have under its reserved share, nor before the packet itself arrives.
//! Higher weight shrinks the increment, giving that flow more frequent turns.
//! Using the live clock as the arrival reference lets a late-starting flow
//! interleave immediately with flows already draining.
//!
//! The caller provides mutual exclusion: one lock around `offer` and
//! `take_next` serializes the `last_vft` read-modify-write and the clock
//! write, which is what keeps concurrent VFT assignments strictly ordered.

use bytes::Bytes;

use crate::buffer::{Admission, CapacityPolicy, Packet, PriorityBuffer};
use crate::clock::{Vft, VirtualClock};
use crate::flow::{FlowId, FlowTable};
use crate::stats::{FlowStats, SchedulerStats};

// ─── Configuration ──────────────────────────────────────────────────────────

/// Scheduler parameters, fixed for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Link service rate in packets per second.
    pub capacity_pps: f64,
    /// Buffer bound and overflow behavior.
    pub policy: CapacityPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            capacity_pps: 10.0,
            policy: CapacityPolicy::Global(10),
        }
    }
}

// ─── Offer outcome ──────────────────────────────────────────────────────────

/// What happened to a datagram offered at ingress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Admitted to the buffer.
    Admitted,
    /// Admitted, displacing the largest-VFT buffered packet of `victim`
    /// (which may be the arriving flow itself).
    Evicted { victim: FlowId },
    /// Refused by the per-flow capacity policy; never buffered.
    Rejected,
    /// Source has no configured weight; silently ignored by policy.
    Unconfigured,
}

// ─── WfqScheduler ───────────────────────────────────────────────────────────

/// Weighted fair queuing scheduler state.
#[derive(Debug)]
pub struct WfqScheduler {
    config: SchedulerConfig,
    flows: FlowTable,
    clock: VirtualClock,
    buffer: PriorityBuffer,
    stats: SchedulerStats,
}

impl WfqScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let buffer = PriorityBuffer::new(config.policy);
        WfqScheduler {
            config,
            flows: FlowTable::new(),
            clock: VirtualClock::new(),
            buffer,
            stats: SchedulerStats::new(),
        }
    }

    /// Register a flow with its relative bandwidth share. Weights are static
    /// configuration; re-registration keeps the first weight.
    pub fn add_flow(&mut self, id: FlowId, weight: f64) {
        debug_assert!(weight > 0.0, "flow weight must be positive");
        self.flows.add_flow(id, weight);
    }

    /// Offer an arriving datagram for admission.
    ///
    /// Computes the VFT against the current virtual time, updates the flow's
    /// `last_vft`, and runs the capacity policy. Must be called under the
    /// same lock as [`take_next`](Self::take_next).
    pub fn offer(&mut self, src: FlowId, payload: Bytes) -> Offer {
        self.stats.packets_offered += 1;

        let now = self.clock.now();
        let capacity = self.config.capacity_pps;
        let flow = match self.flows.get_mut(&src) {
            Some(flow) => flow,
            None => {
                self.stats.unconfigured_drops += 1;
                tracing::trace!(src = %src, "datagram from unconfigured source ignored");
                return Offer::Unconfigured;
            }
        };

        let vft = now.max(flow.last_vft()) + 1.0 / (capacity * flow.weight());
        flow.set_last_vft(vft);
        let flow_buffered = flow.buffered();

        let packet = Packet {
            flow: src,
            vft,
            payload,
        };

        match self.buffer.try_admit(packet, flow_buffered) {
            Admission::Admitted => {
                flow.note_buffered();
                flow.stats.admitted += 1;
                self.stats.packets_admitted += 1;
                Offer::Admitted
            }
            Admission::Evicted(victim) => {
                flow.note_buffered();
                flow.stats.admitted += 1;
                self.stats.packets_admitted += 1;
                self.stats.packets_evicted += 1;

                let victim_id = victim.flow;
                if let Some(victim_flow) = self.flows.get_mut(&victim_id) {
                    victim_flow.note_unbuffered();
                    victim_flow.stats.evicted += 1;
                }
                Offer::Evicted { victim: victim_id }
            }
            Admission::Rejected => {
                flow.stats.rejected += 1;
                self.stats.packets_rejected += 1;
                Offer::Rejected
            }
        }
    }

    /// Remove the packet next in service order (smallest VFT, ties by
    /// admission order) and advance virtual time to its VFT. Returns `None`
    /// when the buffer is empty; an empty buffer never advances the clock.
    pub fn take_next(&mut self) -> Option<Packet> {
        let packet = self.buffer.take_min()?;
        self.clock.advance_to(packet.vft);

        self.stats.packets_served += 1;
        self.stats.bytes_served += packet.payload.len() as u64;
        if let Some(flow) = self.flows.get_mut(&packet.flow) {
            flow.note_unbuffered();
            flow.stats.served += 1;
            flow.stats.bytes_served += packet.payload.len() as u64;
        }

        Some(packet)
    }

    /// Current system virtual time.
    pub fn virtual_time(&self) -> Vft {
        self.clock.now()
    }

    /// Total packets currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn flow_stats(&self, id: &FlowId) -> Option<FlowStats> {
        self.flows.get(id).map(|f| f.stats)
    }

    /// Last VFT assigned to the given flow.
    pub fn flow_last_vft(&self, id: &FlowId) -> Option<Vft> {
        self.flows.get(id).map(|f| f.last_vft())
    }

    /// Live buffered-packet count for the given flow.
    pub fn flow_buffered(&self, id: &FlowId) -> Option<usize> {
        self.flows.get(id).map(|f| f.buffered())
    }
}
