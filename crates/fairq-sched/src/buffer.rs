//! # Admission-Controlled Priority Buffer
//!
//! Bounded collection of pending packets ordered by virtual finish time.
//! `try_admit` and `take_min` are the only mutation points; the capacity
//! policy decides what happens when the bound would be exceeded.
//!
//! The buffer is a `BTreeMap` keyed by `(Vft, admission sequence)`. The
//! sequence number makes keys unique and breaks VFT ties in admission order
//! (first admitted wins), and the ordered map serves both ends: `pop_first`
//! removes the next packet to serve, `pop_last` evicts the packet furthest
//! from service. Eviction is O(log n), not a linear scan.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::clock::Vft;
use crate::flow::FlowId;

// ─── Packet ─────────────────────────────────────────────────────────────────

/// A datagram pending service. Owned exclusively by the buffer from admission
/// until popped; ownership then transfers to the outbound send.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Owning flow (and reply address).
    pub flow: FlowId,
    /// Virtual finish time assigned at admission. Immutable.
    pub vft: Vft,
    /// Opaque application payload, bounded by the transport's maximum
    /// datagram size.
    pub payload: Bytes,
}

// ─── Capacity policy ────────────────────────────────────────────────────────

/// How the buffer bound is enforced.
///
/// The two policies produce materially different drop behavior under
/// overload; a deployment selects exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityPolicy {
    /// One bound on total occupancy. Overflow evicts the buffered packet
    /// with the largest VFT — drop from the back of the effective queue,
    /// never blindly the newcomer (though the newcomer is evicted when its
    /// VFT is the largest).
    Global(usize),
    /// One bound per flow. A flow at its cap has its new arrival rejected
    /// outright; other flows' packets are never touched.
    PerFlow(usize),
}

// ─── Admission outcome ──────────────────────────────────────────────────────

/// Result of offering a packet to the buffer.
#[derive(Debug)]
pub enum Admission {
    /// Buffered without displacing anything.
    Admitted,
    /// Buffered, and the capacity bound forced out the largest-VFT packet
    /// (possibly the arrival itself).
    Evicted(Packet),
    /// Per-flow cap reached: the arrival never entered the buffer.
    Rejected,
}

// ─── PriorityBuffer ─────────────────────────────────────────────────────────

/// VFT-ordered bounded packet buffer.
#[derive(Debug)]
pub struct PriorityBuffer {
    packets: BTreeMap<(Vft, u64), Packet>,
    policy: CapacityPolicy,
    /// Monotone admission counter; tiebreak for equal VFTs.
    next_seq: u64,
}

impl PriorityBuffer {
    pub fn new(policy: CapacityPolicy) -> Self {
        PriorityBuffer {
            packets: BTreeMap::new(),
            policy,
            next_seq: 0,
        }
    }

    pub fn policy(&self) -> CapacityPolicy {
        self.policy
    }

    /// Offer a packet for admission.
    ///
    /// `flow_buffered` is the caller's live occupancy count for
    /// `packet.flow` (authoritative on the flow-table entry); it drives the
    /// per-flow policy and is ignored under the global policy.
    pub fn try_admit(&mut self, packet: Packet, flow_buffered: usize) -> Admission {
        match self.policy {
            CapacityPolicy::PerFlow(cap) => {
                if flow_buffered >= cap {
                    tracing::trace!(flow = %packet.flow, cap, "per-flow cap reached, rejecting arrival");
                    return Admission::Rejected;
                }
                self.insert(packet);
                Admission::Admitted
            }
            CapacityPolicy::Global(cap) => {
                self.insert(packet);
                if self.packets.len() > cap {
                    // Invariant restored before returning: len() <= cap.
                    let (_, evicted) = self
                        .packets
                        .pop_last()
                        .expect("buffer over capacity implies non-empty");
                    tracing::trace!(flow = %evicted.flow, vft = evicted.vft.value(), "buffer full, evicted largest VFT");
                    return Admission::Evicted(evicted);
                }
                Admission::Admitted
            }
        }
    }

    /// Remove and return the packet with the smallest VFT (ties: first
    /// admitted), or `None` if the buffer is empty.
    pub fn take_min(&mut self) -> Option<Packet> {
        self.packets.pop_first().map(|(_, p)| p)
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// VFT of the packet that `take_min` would return.
    pub fn min_vft(&self) -> Option<Vft> {
        self.packets.keys().next().map(|(vft, _)| *vft)
    }

    fn insert(&mut self, packet: Packet) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.packets.insert((packet.vft, seq), packet);
    }
}
