//! Property-based tests for the WFQ scheduler core.
//!
//! These drive random admission/service sequences and check the invariants
//! that hold at every step: virtual-clock and per-flow VFT monotonicity, the
//! buffer capacity bound, and the retained-set property of the global
//! eviction policy.

use bytes::Bytes;
use fairq_sched::buffer::CapacityPolicy;
use fairq_sched::clock::Vft;
use fairq_sched::flow::FlowId;
use fairq_sched::scheduler::{SchedulerConfig, WfqScheduler};
use proptest::prelude::*;

const FLOW_PORTS: [u16; 3] = [5001, 5002, 5003];
const FLOW_WEIGHTS: [f64; 3] = [1.0, 2.0, 8.0];

fn addr(port: u16) -> FlowId {
    format!("127.0.0.1:{port}").parse().unwrap()
}

fn sched(policy: CapacityPolicy) -> WfqScheduler {
    let mut s = WfqScheduler::new(SchedulerConfig {
        capacity_pps: 4.0,
        policy,
    });
    for (port, weight) in FLOW_PORTS.iter().zip(FLOW_WEIGHTS) {
        s.add_flow(addr(*port), weight);
    }
    s
}

#[derive(Debug, Clone)]
enum Op {
    Offer(usize),
    Take,
}

/// Random interleavings of arrivals (on one of three flows) and services.
fn op_sequence() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![(0usize..3).prop_map(Op::Offer), Just(Op::Take)],
        1..200,
    )
}

proptest! {
    #[test]
    fn invariants_hold_under_global_policy(ops in op_sequence()) {
        let cap = 8;
        let mut s = sched(CapacityPolicy::Global(cap));
        let mut last_clock = Vft::ZERO;
        let mut last_vfts = [Vft::ZERO; 3];
        let mut last_served = Vft::ZERO;

        for op in ops {
            match op {
                Op::Offer(i) => {
                    s.offer(addr(FLOW_PORTS[i]), Bytes::from_static(b"x"));
                    let lv = s.flow_last_vft(&addr(FLOW_PORTS[i])).unwrap();
                    prop_assert!(lv >= last_vfts[i], "per-flow VFT regressed");
                    last_vfts[i] = lv;
                }
                Op::Take => {
                    if let Some(p) = s.take_next() {
                        prop_assert!(p.vft >= last_served, "service order regressed");
                        last_served = p.vft;
                    }
                }
            }
            prop_assert!(s.buffered() <= cap, "capacity bound violated");
            prop_assert!(s.virtual_time() >= last_clock, "virtual clock regressed");
            last_clock = s.virtual_time();
        }
    }

    #[test]
    fn invariants_hold_under_per_flow_policy(ops in op_sequence()) {
        let cap = 4;
        let mut s = sched(CapacityPolicy::PerFlow(cap));
        let mut last_clock = Vft::ZERO;

        for op in ops {
            match op {
                Op::Offer(i) => {
                    s.offer(addr(FLOW_PORTS[i]), Bytes::from_static(b"x"));
                }
                Op::Take => {
                    s.take_next();
                }
            }
            for port in FLOW_PORTS {
                prop_assert!(
                    s.flow_buffered(&addr(port)).unwrap() <= cap,
                    "per-flow bound violated"
                );
            }
            prop_assert!(s.buffered() <= cap * FLOW_PORTS.len());
            prop_assert!(s.virtual_time() >= last_clock);
            last_clock = s.virtual_time();
        }
    }

    #[test]
    fn global_policy_retains_smallest_vfts(flows in prop::collection::vec(0usize..3, 1..120)) {
        let cap = 8;
        let mut s = sched(CapacityPolicy::Global(cap));

        // Offer-only sequence: incremental evict-max must leave exactly the
        // `cap` smallest VFTs ever offered.
        let mut offered = Vec::new();
        for i in flows {
            s.offer(addr(FLOW_PORTS[i]), Bytes::from_static(b"x"));
            offered.push(s.flow_last_vft(&addr(FLOW_PORTS[i])).unwrap());
        }

        let mut retained = Vec::new();
        while let Some(p) = s.take_next() {
            retained.push(p.vft);
        }

        offered.sort();
        offered.truncate(cap);
        prop_assert_eq!(retained, offered);
    }
}
