//! One-shot connectivity probes used by test mode.

use crate::error::Result;
use porthop_transport::{connect_tcp, exchange_datagram, host_port, resolve};
use std::fmt;
use std::time::Duration;

/// Payload of a UDP probe
pub const PROBE_PAYLOAD: &[u8] = b"test";

/// Result of a successful probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// A TCP connection was established or a UDP reply arrived
    Connected(String),
    /// The UDP probe was sent but nothing answered; many UDP services never
    /// reply to unknown payloads, so this is not a failure
    Unconfirmed(String),
}

impl ProbeOutcome {
    /// Address the probe went to
    #[must_use]
    pub fn addr(&self) -> &str {
        match self {
            Self::Connected(addr) | Self::Unconfirmed(addr) => addr,
        }
    }

    /// Whether the remote end was positively seen
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Connected(_))
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected(addr) => write!(f, "{addr} reachable"),
            Self::Unconfirmed(addr) => write!(f, "{addr} sent, no reply"),
        }
    }
}

/// Open and immediately drop a TCP connection to `host:port`.
///
/// # Errors
///
/// Returns the dial failure.
pub async fn probe_tcp(host: &str, port: u16, timeout: Duration) -> Result<ProbeOutcome> {
    let stream = connect_tcp(host, port, timeout).await?;
    drop(stream);
    Ok(ProbeOutcome::Connected(host_port(host, port)))
}

/// Send [`PROBE_PAYLOAD`] to `host:port` and wait briefly for a reply.
///
/// # Errors
///
/// Returns resolution and socket errors, including an ICMP-reported refusal.
/// A missing reply is not an error.
pub async fn probe_udp(host: &str, port: u16, timeout: Duration) -> Result<ProbeOutcome> {
    let addr = resolve(host, port).await?;
    match exchange_datagram(PROBE_PAYLOAD, addr, timeout).await {
        Ok(_) => Ok(ProbeOutcome::Connected(host_port(host, port))),
        Err(e) if e.is_timeout() => Ok(ProbeOutcome::Unconfirmed(host_port(host, port))),
        Err(e) => Err(e.into()),
    }
}
