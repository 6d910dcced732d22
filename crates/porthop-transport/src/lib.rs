//! # porthop Transport
//!
//! Network plumbing for the porthop forwarder.
//!
//! This crate provides:
//! - TCP and UDP listener binding with address reuse
//! - Bounded-time TCP dialing and host resolution
//! - Per-stream socket tuning
//! - A bidirectional byte relay with half-close propagation
//! - Single-exchange UDP forwarding on ephemeral sockets

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod relay;
pub mod socket;
pub mod udp;

pub use error::{TransportError, TransportResult};
pub use relay::{RelayStats, relay, relay_tcp};
pub use socket::{
    StreamTuning, bind_tcp, bind_udp, connect_tcp, host_port, resolve, unspecified_for,
};
pub use udp::{MAX_DATAGRAM_SIZE, exchange_datagram};
