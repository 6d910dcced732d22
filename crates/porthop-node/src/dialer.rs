//! Client-side candidate dialing.
//!
//! Client and server never exchange time. Instead the client derives the
//! port of every configured offset and tries them in order; as long as the
//! clocks differ by less than the offsets span, one candidate is a port the
//! server currently listens on.

use crate::error::{CandidateAttempt, NodeError, Result};
use crate::probe::{ProbeOutcome, probe_tcp, probe_udp};
use porthop_core::{PortSchedule, Protocol, unix_now};
use porthop_transport::{TransportError, connect_tcp, exchange_datagram, host_port, resolve};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

/// One server address to try
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Offset the port was derived for
    pub offset: i64,
    /// Derived server port
    pub port: u16,
    /// `host:port` to dial
    pub addr: String,
}

/// Reason text for an attempt list, without repeating the address
fn failure_reason(err: &TransportError) -> String {
    match err {
        TransportError::ConnectFailed { source, .. } => source.to_string(),
        TransportError::Timeout {
            operation, after, ..
        } => format!("{operation} timed out after {after:?}"),
        other => other.to_string(),
    }
}

/// Dials the server through the currently valid candidate ports
#[derive(Debug, Clone)]
pub struct CandidateDialer {
    schedule: Arc<PortSchedule>,
    host: String,
    dial_timeout: Duration,
    reply_timeout: Duration,
}

impl CandidateDialer {
    /// Create a dialer for the server at `host`
    #[must_use]
    pub fn new(
        schedule: Arc<PortSchedule>,
        host: impl Into<String>,
        dial_timeout: Duration,
        reply_timeout: Duration,
    ) -> Self {
        Self {
            schedule,
            host: host.into(),
            dial_timeout,
            reply_timeout,
        }
    }

    /// Server host
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Candidates at `now`, in configured offset order
    #[must_use]
    pub fn candidates(&self, now: i64) -> Vec<Candidate> {
        self.schedule
            .valid_ports(now)
            .into_iter()
            .map(|assignment| Candidate {
                offset: assignment.offset(),
                port: assignment.port,
                addr: host_port(&self.host, assignment.port),
            })
            .collect()
    }

    /// Connect to the first reachable candidate.
    ///
    /// Candidates are recomputed from the clock on every call.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::NoReachableCandidate`] listing every attempt if
    /// all candidates fail.
    pub async fn connect(&self) -> Result<(TcpStream, Candidate)> {
        self.connect_at(unix_now()).await
    }

    /// Connect using the candidates of `now`.
    ///
    /// # Errors
    ///
    /// See [`CandidateDialer::connect`].
    pub async fn connect_at(&self, now: i64) -> Result<(TcpStream, Candidate)> {
        let mut attempted = Vec::new();

        for candidate in self.candidates(now) {
            match connect_tcp(&self.host, candidate.port, self.dial_timeout).await {
                Ok(stream) => {
                    tracing::debug!(
                        "Connected to {} (offset {:+})",
                        candidate.addr,
                        candidate.offset
                    );
                    return Ok((stream, candidate));
                }
                Err(e) => {
                    tracing::debug!("Candidate {} unreachable: {}", candidate.addr, e);
                    attempted.push(CandidateAttempt {
                        offset: candidate.offset,
                        addr: candidate.addr,
                        reason: failure_reason(&e),
                    });
                }
            }
        }

        Err(NodeError::NoReachableCandidate { attempted })
    }

    /// Exchange one datagram with the first candidate that replies.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::NoReachableCandidate`] if no candidate replied
    /// within the reply timeout.
    pub async fn exchange(&self, payload: &[u8]) -> Result<(Vec<u8>, Candidate)> {
        self.exchange_at(payload, unix_now()).await
    }

    /// Exchange one datagram using the candidates of `now`.
    ///
    /// # Errors
    ///
    /// See [`CandidateDialer::exchange`].
    pub async fn exchange_at(&self, payload: &[u8], now: i64) -> Result<(Vec<u8>, Candidate)> {
        let mut attempted = Vec::new();

        for candidate in self.candidates(now) {
            let result = match resolve(&self.host, candidate.port).await {
                Ok(upstream) => exchange_datagram(payload, upstream, self.reply_timeout).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(reply) => {
                    tracing::debug!(
                        "Datagram answered via {} (offset {:+})",
                        candidate.addr,
                        candidate.offset
                    );
                    return Ok((reply, candidate));
                }
                Err(e) => {
                    tracing::debug!("Candidate {} did not answer: {}", candidate.addr, e);
                    attempted.push(CandidateAttempt {
                        offset: candidate.offset,
                        addr: candidate.addr,
                        reason: failure_reason(&e),
                    });
                }
            }
        }

        Err(NodeError::NoReachableCandidate { attempted })
    }

    /// Probe the current candidates once without relaying anything.
    ///
    /// TCP stops at the first candidate that accepts a connection. UDP stops
    /// at the first candidate a probe could be sent to; a missing reply is
    /// reported as [`ProbeOutcome::Unconfirmed`].
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::NoReachableCandidate`] if every probe failed.
    pub async fn probe(
        &self,
        protocol: Protocol,
        tcp_timeout: Duration,
        udp_timeout: Duration,
    ) -> Result<ProbeOutcome> {
        let mut attempted = Vec::new();

        for candidate in self.candidates(unix_now()) {
            tracing::info!("Probing {} (offset {:+})", candidate.addr, candidate.offset);
            let result = match protocol {
                Protocol::Tcp => probe_tcp(&self.host, candidate.port, tcp_timeout).await,
                Protocol::Udp => probe_udp(&self.host, candidate.port, udp_timeout).await,
            };

            match result {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    tracing::info!("Probe of {} failed: {}", candidate.addr, e);
                    attempted.push(CandidateAttempt {
                        offset: candidate.offset,
                        addr: candidate.addr,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Err(NodeError::NoReachableCandidate { attempted })
    }
}
