//! # porthop Node
//!
//! Server and client of the porthop forwarder.
//!
//! The server keeps listeners open exactly on the ports the schedule marks
//! active, reconciling on a fixed tick, and relays accepted traffic to the
//! protected service. The client listens on a fixed local port and relays
//! to whichever server candidate answers first.
//!
//! ## Example
//!
//! ```no_run
//! use porthop_core::HopConfig;
//! use porthop_node::{NodeSettings, Server};
//!
//! # async fn run() -> porthop_node::Result<()> {
//! let config = HopConfig {
//!     secret: "JBSWY3DPEHPK3PXP".to_string(),
//!     ..HopConfig::default()
//! };
//! let server = Server::new(config, NodeSettings::default())?;
//! server.start().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod dialer;
pub mod error;
pub mod forwarder;
pub mod probe;
pub mod reconciler;
pub mod registry;
pub mod serve;
pub mod server;

pub use client::Client;
pub use config::NodeSettings;
pub use dialer::{Candidate, CandidateDialer};
pub use error::{CandidateAttempt, NodeError, Result};
pub use forwarder::Forwarder;
pub use probe::{PROBE_PAYLOAD, ProbeOutcome};
pub use reconciler::{Reconciler, TickReport};
pub use registry::{ListenerEntry, ListenerInfo, ListenerRegistry};
pub use serve::{AcceptAction, classify_accept_error, serve_tcp, serve_udp, spawn_listener};
pub use server::Server;
