//! # Virtual Time
//!
//! Logical clock primitives for GPS-approximating fair queuing. Virtual time
//! advances only when a packet is served, never with wall-clock time, so
//! fairness comparisons are independent of transmission pacing.

use std::cmp::Ordering;
use std::ops::Add;

use serde::Serialize;

// ─── Vft ────────────────────────────────────────────────────────────────────

/// A virtual finish time: the virtual-time instant at which a packet would
/// complete service under ideal fluid sharing.
///
/// Wraps `f64` with a *total* order (`f64::total_cmp`) so it can key an
/// ordered collection. Values produced by the scheduler are always finite
/// and non-negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Vft(f64);

impl Vft {
    /// The origin of virtual time.
    pub const ZERO: Vft = Vft(0.0);

    pub fn new(value: f64) -> Self {
        Vft(value)
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Eq for Vft {}

impl Ord for Vft {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl PartialOrd for Vft {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Add<f64> for Vft {
    type Output = Vft;

    fn add(self, increment: f64) -> Vft {
        Vft(self.0 + increment)
    }
}

// ─── VirtualClock ───────────────────────────────────────────────────────────

/// System virtual time.
///
/// Written only by the service path (advanced to the VFT of the packet just
/// served); read by the ingress path to timestamp new arrivals. Monotonically
/// non-decreasing.
#[derive(Debug, Default)]
pub struct VirtualClock {
    now: Vft,
}

impl VirtualClock {
    pub fn new() -> Self {
        VirtualClock { now: Vft::ZERO }
    }

    /// Current virtual time.
    pub fn now(&self) -> Vft {
        self.now
    }

    /// Advance to `vft` if it is ahead of the current value. Advancing to a
    /// value in the virtual past is a no-op, which keeps the clock monotone
    /// even if callers race service completions.
    pub fn advance_to(&mut self, vft: Vft) {
        if vft > self.now {
            self.now = vft;
        }
    }
}
