//! # fairq Server Binary
//!
//! Standalone WFQ scheduler daemon. Listens for datagrams from the configured
//! flows, schedules them by virtual finish time, and echoes each served
//! payload to its flow's source address at the configured link capacity.
//!
//! ## Usage
//!
//! ```bash
//! # Reference deployment: three equal flows at 10 packets/sec
//! fairq-server --config fairq.toml
//!
//! # Override the listen address and capacity from the command line
//! fairq-server --config fairq.toml --listen 0.0.0.0:4000 --capacity 50
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fairq_server::config::ServerConfig;
use fairq_server::server::{SchedulerServer, ServerEvent};

fn main() -> anyhow::Result<()> {
    // ── Logging ─────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .compact()
        .init();

    // ── Configuration ───────────────────────────────────────────
    let args = parse_args()?;
    let raw = std::fs::read_to_string(&args.config_path)
        .map_err(|e| anyhow::anyhow!("cannot read config '{}': {}", args.config_path, e))?;
    let mut config = ServerConfig::from_toml_str(&raw).map_err(|e| anyhow::anyhow!(e))?;

    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(capacity) = args.capacity_pps {
        if capacity <= 0.0 {
            anyhow::bail!("--capacity must be positive, got {capacity}");
        }
        config.capacity_pps = capacity;
    }

    // ── Server ──────────────────────────────────────────────────
    let mut server = SchedulerServer::start(config)?;

    // ── Graceful shutdown ───────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::handle(move || {
            tracing::info!("shutting down...");
            running.store(false, Ordering::Relaxed);
        });
    }

    // ── Event loop + periodic stats ─────────────────────────────
    let mut served: u64 = 0;
    let mut bytes: u64 = 0;
    let mut evicted: u64 = 0;
    let mut rejected: u64 = 0;
    let mut ignored: u64 = 0;
    let mut oversized: u64 = 0;
    let mut send_failures: u64 = 0;
    let mut last_stats_log = std::time::Instant::now();
    let stats_interval = Duration::from_secs(5);

    while running.load(Ordering::Relaxed) {
        match server.events_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => match event {
                ServerEvent::Served { bytes: n, .. } => {
                    served += 1;
                    bytes += n as u64;
                }
                ServerEvent::Evicted { .. } => evicted += 1,
                ServerEvent::Rejected { .. } => rejected += 1,
                ServerEvent::Ignored { .. } => ignored += 1,
                ServerEvent::Oversized { .. } => oversized += 1,
                ServerEvent::SendFailed { .. } => send_failures += 1,
            },
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }

        if last_stats_log.elapsed() >= stats_interval {
            let (buffered, virtual_time) = server.queue_snapshot();
            tracing::info!(
                served,
                bytes,
                evicted,
                rejected,
                ignored,
                oversized,
                send_failures,
                buffered,
                virtual_time,
                "scheduler stats"
            );
            last_stats_log = std::time::Instant::now();
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────
    server.shutdown();
    let stats = server.stats();
    tracing::info!(
        offered = stats.packets_offered,
        served = stats.packets_served,
        evicted = stats.packets_evicted,
        rejected = stats.packets_rejected,
        drop_rate = stats.drop_rate(),
        "fairq-server stopped"
    );

    Ok(())
}

// ─── CLI Parsing ────────────────────────────────────────────────────────────

struct Args {
    config_path: String,
    listen: Option<std::net::SocketAddr>,
    capacity_pps: Option<f64>,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut listen = None;
    let mut capacity_pps = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                config_path = Some(
                    args.get(i)
                        .ok_or_else(|| anyhow::anyhow!("--config requires a value"))?
                        .clone(),
                );
            }
            "--listen" | "-l" => {
                i += 1;
                let val = args
                    .get(i)
                    .ok_or_else(|| anyhow::anyhow!("--listen requires a value"))?;
                listen = Some(
                    val.parse()
                        .map_err(|e| anyhow::anyhow!("invalid listen address '{}': {}", val, e))?,
                );
            }
            "--capacity" | "-r" => {
                i += 1;
                let val = args
                    .get(i)
                    .ok_or_else(|| anyhow::anyhow!("--capacity requires a value"))?;
                capacity_pps = Some(
                    val.parse()
                        .map_err(|e| anyhow::anyhow!("invalid capacity '{}': {}", val, e))?,
                );
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => {
                anyhow::bail!("unknown argument: {other}\nRun with --help for usage.");
            }
        }
        i += 1;
    }

    // Fallback: env vars
    if config_path.is_none() {
        config_path = std::env::var("FAIRQ_CONFIG").ok().filter(|s| !s.is_empty());
    }
    if listen.is_none() {
        if let Ok(val) = std::env::var("FAIRQ_LISTEN") {
            listen = Some(val.parse()?);
        }
    }
    if capacity_pps.is_none() {
        if let Ok(val) = std::env::var("FAIRQ_CAPACITY") {
            capacity_pps = val.parse().ok();
        }
    }

    let config_path = config_path.ok_or_else(|| {
        anyhow::anyhow!("no config file specified. Use --config or FAIRQ_CONFIG.\nRun with --help for usage.")
    })?;

    Ok(Args {
        config_path,
        listen,
        capacity_pps,
    })
}

fn print_help() {
    eprintln!(
        r#"fairq-server — Weighted fair queuing datagram scheduler

USAGE:
  fairq-server --config <FILE> [OPTIONS]

OPTIONS:
  --config, -c <file>     TOML configuration file (required)
  --listen, -l <addr>     Override the listen address, e.g. 0.0.0.0:4000
  --capacity, -r <pps>    Override the service rate in packets/sec
  --help, -h              Show this help

ENVIRONMENT VARIABLES:
  FAIRQ_CONFIG    Config file path (fallback for --config)
  FAIRQ_LISTEN    Listen address (fallback for --listen)
  FAIRQ_CAPACITY  Service rate (fallback for --capacity)
  RUST_LOG        Log level filter (e.g. info, debug, fairq_server=trace)

CONFIG FILE:
  listen = "127.0.0.1:4000"
  capacity_pps = 10.0
  max_datagram_size = 1024

  [buffer]
  policy = "global"        # or "per-flow"
  capacity = 10

  [[flows]]                # admission allowlist: unlisted sources are dropped
  addr = "127.0.0.1:5001"
  weight = 1.0
"#
    );
}

// ─── Signal Handling ────────────────────────────────────────────────────────

mod ctrlc {
    use std::sync::atomic::{AtomicBool, Ordering};

    static HANDLER_SET: AtomicBool = AtomicBool::new(false);

    /// Run `f` once the process receives SIGINT or SIGTERM.
    pub fn handle(f: impl Fn() + Send + 'static) {
        if HANDLER_SET.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = std::thread::Builder::new()
            .name("signal".into())
            .spawn(move || {
                wait_for_signal();
                f();
            });
    }

    #[cfg(unix)]
    fn wait_for_signal() {
        unsafe {
            let mut mask: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut mask);
            libc::sigaddset(&mut mask, libc::SIGINT);
            libc::sigaddset(&mut mask, libc::SIGTERM);
            let mut sig: libc::c_int = 0;
            libc::sigwait(&mask, &mut sig);
        }
    }

    #[cfg(not(unix))]
    fn wait_for_signal() {
        loop {
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
    }
}
