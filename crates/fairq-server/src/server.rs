//! # Scheduler Server
//!
//! UDP front end for the WFQ core. Two long-lived threads share one
//! `Arc<Mutex<WfqScheduler>>`:
//!
//! - **Ingress** blocks on `recv_from`, classifies each datagram by source
//!   address, and offers it for admission. It never blocks on transmission.
//! - **Service** pops the smallest-VFT packet, paces departures to
//!   `1 / capacity` seconds apart, and echoes the payload to the flow's
//!   source address. It never blocks on reception.
//!
//! The lock covers buffer insert/remove, the `last_vft` read-modify-write,
//! and the virtual-clock write — never socket I/O or pacing sleeps, so
//! admissions are not queued behind transmission pacing. Backpressure is
//! expressed entirely by the buffer's eviction/rejection policy.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, Sender};
use quanta::Instant;

use fairq_sched::buffer::Packet;
use fairq_sched::flow::FlowId;
use fairq_sched::scheduler::{Offer, WfqScheduler};
use fairq_sched::stats::SchedulerStats;

use crate::config::ServerConfig;

/// Socket read timeout; bounds how long shutdown waits on an idle ingress.
const INGRESS_POLL: Duration = Duration::from_millis(100);
/// Idle re-check period of the service loop when the buffer is empty.
const IDLE_POLL: Duration = Duration::from_millis(5);
/// Events buffered for a slow consumer before they are dropped.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

// ─── Events ─────────────────────────────────────────────────────────────────

/// Per-packet outcomes, published on a bounded channel with `try_send` — a
/// slow or absent consumer never blocks the packet path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerEvent {
    /// Payload echoed to its flow's source address.
    Served { flow: FlowId, bytes: usize },
    /// A buffered packet of `victim` was displaced by the global policy.
    Evicted { victim: FlowId },
    /// An arrival was refused by the per-flow policy.
    Rejected { flow: FlowId },
    /// Datagram from a source with no configured weight.
    Ignored { src: SocketAddr },
    /// Datagram larger than `max_datagram_size`.
    Oversized { src: SocketAddr, len: usize },
    /// `send_to` failed; the packet still counts as served.
    SendFailed { flow: FlowId },
}

// ─── SchedulerServer ────────────────────────────────────────────────────────

/// Handle to a running scheduler server.
///
/// Dropping the handle shuts both worker threads down.
pub struct SchedulerServer {
    scheduler: Arc<Mutex<WfqScheduler>>,
    shutdown: Arc<AtomicBool>,
    local_addr: SocketAddr,
    ingress: Option<thread::JoinHandle<()>>,
    service: Option<thread::JoinHandle<()>>,
    /// Per-packet outcome stream for stats/logging consumers.
    pub events_rx: Receiver<ServerEvent>,
}

impl SchedulerServer {
    /// Bind the listen socket and start the ingress and service threads.
    pub fn start(config: ServerConfig) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(config.listen)?;
        socket.set_read_timeout(Some(INGRESS_POLL))?;
        let local_addr = socket.local_addr()?;
        let send_socket = socket.try_clone()?;

        let mut scheduler = WfqScheduler::new(config.scheduler_config());
        for (addr, weight) in &config.flows {
            scheduler.add_flow(*addr, *weight);
        }

        tracing::info!(
            listen = %local_addr,
            capacity_pps = config.capacity_pps,
            policy = ?config.policy,
            flows = config.flows.len(),
            "scheduler server starting"
        );

        let scheduler = Arc::new(Mutex::new(scheduler));
        let shutdown = Arc::new(AtomicBool::new(false));
        let (events_tx, events_rx) = bounded(EVENT_CHANNEL_CAPACITY);

        let ingress = {
            let scheduler = scheduler.clone();
            let shutdown = shutdown.clone();
            let events = events_tx.clone();
            let max_datagram = config.max_datagram_size;
            thread::Builder::new()
                .name("fairq-ingress".into())
                .spawn(move || ingress_loop(socket, scheduler, shutdown, events, max_datagram))?
        };

        let service = {
            let scheduler = scheduler.clone();
            let shutdown = shutdown.clone();
            let interval = Duration::from_secs_f64(1.0 / config.capacity_pps);
            thread::Builder::new()
                .name("fairq-service".into())
                .spawn(move || service_loop(send_socket, scheduler, shutdown, events_tx, interval))?
        };

        Ok(SchedulerServer {
            scheduler,
            shutdown,
            local_addr,
            ingress: Some(ingress),
            service: Some(service),
            events_rx,
        })
    }

    /// Address the server actually bound (useful when listening on port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Snapshot of the aggregate scheduler statistics.
    pub fn stats(&self) -> SchedulerStats {
        self.scheduler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .stats()
            .clone()
    }

    /// Current buffer occupancy and virtual time.
    pub fn queue_snapshot(&self) -> (usize, f64) {
        let sched = self.scheduler.lock().unwrap_or_else(|e| e.into_inner());
        (sched.buffered(), sched.virtual_time().value())
    }

    /// Stop both worker threads and wait for them. Idempotent.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.ingress.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.service.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SchedulerServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ─── Ingress loop ───────────────────────────────────────────────────────────

fn ingress_loop(
    socket: UdpSocket,
    scheduler: Arc<Mutex<WfqScheduler>>,
    shutdown: Arc<AtomicBool>,
    events: Sender<ServerEvent>,
    max_datagram: usize,
) {
    // One spare byte distinguishes an oversized datagram from one that is
    // exactly max_datagram long.
    let mut buf = vec![0u8; max_datagram + 1];

    while !shutdown.load(Ordering::Relaxed) {
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(recv) => recv,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue
            }
            Err(e) => {
                tracing::error!(error = %e, "ingress receive failed");
                continue;
            }
        };

        if len > max_datagram {
            tracing::debug!(src = %src, len, max_datagram, "oversized datagram rejected");
            let _ = events.try_send(ServerEvent::Oversized { src, len });
            continue;
        }

        // The receive happened outside the lock; only admission runs under it.
        let payload = Bytes::copy_from_slice(&buf[..len]);
        let outcome = {
            let mut sched = scheduler.lock().unwrap_or_else(|e| e.into_inner());
            sched.offer(src, payload)
        };

        match outcome {
            Offer::Admitted => {}
            Offer::Evicted { victim } => {
                let _ = events.try_send(ServerEvent::Evicted { victim });
            }
            Offer::Rejected => {
                let _ = events.try_send(ServerEvent::Rejected { flow: src });
            }
            Offer::Unconfigured => {
                let _ = events.try_send(ServerEvent::Ignored { src });
            }
        }
    }
}

// ─── Service loop ───────────────────────────────────────────────────────────

fn service_loop(
    socket: UdpSocket,
    scheduler: Arc<Mutex<WfqScheduler>>,
    shutdown: Arc<AtomicBool>,
    events: Sender<ServerEvent>,
    interval: Duration,
) {
    let mut next_departure = Instant::now();

    while !shutdown.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now < next_departure {
            thread::sleep(next_departure.duration_since(now));
        }

        // Hold the lock only to pop; pacing sleeps and sends stay outside.
        let packet = {
            let mut sched = scheduler.lock().unwrap_or_else(|e| e.into_inner());
            sched.take_next()
        };

        match packet {
            Some(packet) => {
                transmit(&socket, &packet, &events);
                next_departure = next_departure + interval;
                let now = Instant::now();
                if next_departure < now {
                    // A stalled send must not be repaid with a burst.
                    next_departure = now;
                }
            }
            None => {
                // Idle without advancing the clock or accruing departure
                // credit; the next packet is served as soon as it appears.
                thread::sleep(interval.min(IDLE_POLL));
                next_departure = Instant::now();
            }
        }
    }
}

fn transmit(socket: &UdpSocket, packet: &Packet, events: &Sender<ServerEvent>) {
    match socket.send_to(&packet.payload, packet.flow) {
        Ok(n) => {
            let _ = events.try_send(ServerEvent::Served {
                flow: packet.flow,
                bytes: n,
            });
        }
        Err(e) => {
            // Not retried: the virtual clock has already advanced, so an
            // unreachable flow cannot head-of-line block the others.
            tracing::warn!(flow = %packet.flow, error = %e, "send failed");
            let _ = events.try_send(ServerEvent::SendFailed { flow: packet.flow });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fairq_sched::buffer::CapacityPolicy;

    fn test_config(flows: Vec<(SocketAddr, f64)>, capacity_pps: f64) -> ServerConfig {
        ServerConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            capacity_pps,
            max_datagram_size: 1024,
            policy: CapacityPolicy::Global(64),
            flows,
        }
    }

    fn client_socket() -> UdpSocket {
        let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
        sock.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        sock
    }

    #[test]
    fn server_binds_ephemeral_port() {
        let client = client_socket();
        let mut server = SchedulerServer::start(test_config(
            vec![(client.local_addr().unwrap(), 1.0)],
            100.0,
        ))
        .unwrap();

        assert_ne!(server.local_addr().port(), 0);
        server.shutdown();
    }

    #[test]
    fn shutdown_is_idempotent() {
        let client = client_socket();
        let mut server = SchedulerServer::start(test_config(
            vec![(client.local_addr().unwrap(), 1.0)],
            100.0,
        ))
        .unwrap();

        server.shutdown();
        server.shutdown();
    }

    #[test]
    fn echoes_payload_to_source() {
        let client = client_socket();
        let mut server = SchedulerServer::start(test_config(
            vec![(client.local_addr().unwrap(), 1.0)],
            500.0,
        ))
        .unwrap();

        client.send_to(b"hello scheduler", server.local_addr()).unwrap();

        let mut buf = [0u8; 64];
        let (len, from) = client.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"hello scheduler");
        assert_eq!(from, server.local_addr());

        server.shutdown();
    }

    #[test]
    fn oversized_datagram_is_not_echoed() {
        let client = client_socket();
        client
            .set_read_timeout(Some(Duration::from_millis(300)))
            .unwrap();
        let mut config = test_config(vec![(client.local_addr().unwrap(), 1.0)], 500.0);
        config.max_datagram_size = 16;
        let mut server = SchedulerServer::start(config).unwrap();

        client.send_to(&[0u8; 64], server.local_addr()).unwrap();

        let mut buf = [0u8; 128];
        assert!(client.recv_from(&mut buf).is_err());
        assert_eq!(server.stats().packets_offered, 0);

        server.shutdown();
    }
}
