//! # fairq-sched
//!
//! Weighted Fair Queuing scheduler core.
//!
//! Pure logic — no sockets, no threads, no wall clocks. A link-capacity-
//! limited server feeds arrivals in through [`WfqScheduler::offer`] and
//! drains service order out through [`WfqScheduler::take_next`]; everything
//! between — virtual time, per-flow finish-time bookkeeping, and the bounded
//! buffer's admission/eviction policy — lives in this crate.
//!
//! ## Crate structure
//!
//! - [`clock`] — virtual time: `Vft` and the service-driven `VirtualClock`
//! - [`flow`] — per-flow weight, finish-time state, and counters
//! - [`buffer`] — admission-controlled VFT-ordered priority buffer
//! - [`scheduler`] — the WFQ discipline tying the pieces together
//! - [`stats`] — aggregate and per-flow statistics
//!
//! [`WfqScheduler::offer`]: scheduler::WfqScheduler::offer
//! [`WfqScheduler::take_next`]: scheduler::WfqScheduler::take_next

pub mod buffer;
pub mod clock;
pub mod flow;
pub mod scheduler;
pub mod stats;
