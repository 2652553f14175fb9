//! # fairq-server
//!
//! UDP front end for the fairq WFQ scheduler: configuration, the
//! ingress/service thread pair, and the `fairq-server` binary.
//!
//! The scheduling discipline itself lives in [`fairq_sched`]; this crate owns
//! everything that touches the outside world — the socket, pacing, the
//! shutdown path, and the TOML configuration surface.
//!
//! ## Crate structure
//!
//! - [`config`] — TOML input structs and resolution/validation
//! - [`server`] — the running server: two worker threads over one lock

pub mod config;
pub mod server;
