//! Client mode: a fixed local port forwarding to the rotating server ports.
//!
//! The client has no control loop. Each accepted connection or received
//! datagram dials the server through the candidates valid at that moment.

use crate::config::NodeSettings;
use crate::dialer::{Candidate, CandidateDialer};
use crate::error::{NodeError, Result};
use crate::forwarder::Forwarder;
use crate::probe::ProbeOutcome;
use crate::serve::spawn_listener;
use async_trait::async_trait;
use porthop_core::{HopConfig, unix_now};
use porthop_transport::relay_tcp;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

/// Forwards local traffic to a server candidate
struct ClientForwarder {
    dialer: CandidateDialer,
    settings: NodeSettings,
}

#[async_trait]
impl Forwarder for ClientForwarder {
    async fn forward_stream(&self, inbound: TcpStream, peer: SocketAddr) -> Result<()> {
        let (outbound, candidate) = self.dialer.connect().await?;
        tracing::debug!(
            "Relaying {} via {} (offset {:+})",
            peer,
            candidate.addr,
            candidate.offset
        );

        let stats = relay_tcp(inbound, outbound, &self.settings.tuning).await;
        tracing::debug!(
            "Connection from {} closed ({} bytes out, {} bytes in)",
            peer,
            stats.a_to_b,
            stats.b_to_a
        );
        Ok(())
    }

    async fn forward_datagram(&self, payload: Vec<u8>, peer: SocketAddr) -> Result<Vec<u8>> {
        let (reply, candidate) = self.dialer.exchange(&payload).await?;
        tracing::debug!(
            "Datagram from {} answered via {} (offset {:+})",
            peer,
            candidate.addr,
            candidate.offset
        );
        Ok(reply)
    }
}

/// Client node
pub struct Client {
    config: HopConfig,
    settings: NodeSettings,
    dialer: CandidateDialer,
    token: CancellationToken,
    running: AtomicBool,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl Client {
    /// Create a client from a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::InvalidConfig`] if the configuration does not
    /// validate.
    pub fn new(config: HopConfig, settings: NodeSettings) -> Result<Self> {
        let schedule = Arc::new(config.schedule()?);
        let dialer = CandidateDialer::new(
            schedule,
            config.host.clone(),
            settings.dial_timeout,
            settings.udp_reply_timeout,
        );

        Ok(Self {
            config,
            settings,
            dialer,
            token: CancellationToken::new(),
            running: AtomicBool::new(false),
            local_addr: Mutex::new(None),
        })
    }

    /// Bind the local port and forward until [`Client::stop`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Bind`] if the local port cannot be bound, which
    /// leaves the client unable to operate, and [`NodeError::InvalidState`]
    /// if it is already running or has been stopped.
    pub async fn start(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(NodeError::invalid_state("client has been stopped"));
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(NodeError::invalid_state("client is already running"));
        }

        let addr = SocketAddr::new(self.config.listen_addr, self.config.port);
        let forwarder = Arc::new(ClientForwarder {
            dialer: self.dialer.clone(),
            settings: self.settings.clone(),
        });

        let (local, task) = match spawn_listener(
            self.config.protocol,
            addr,
            self.token.child_token(),
            forwarder,
            self.settings.accept_backoff,
        )
        .await
        {
            Ok(bound) => bound,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        self.set_local_addr(Some(local));

        tracing::info!(
            "Client started: {} {} -> {} ports {}-{}",
            self.config.protocol,
            local,
            self.config.host,
            self.config.base_port,
            self.config.last_port()
        );

        if let Err(e) = task.await {
            tracing::warn!("Client listener task ended abnormally: {}", e);
        }

        self.set_local_addr(None);
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("Client stopped");
        Ok(())
    }

    /// Stop accepting on the local port.
    ///
    /// Idempotent, and safe whether or not `start` ever ran. Relays already
    /// in progress are left to finish.
    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            tracing::info!("Stopping client");
            self.token.cancel();
        }
    }

    /// Whether the local listener is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Address of the local listener while running
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self.local_addr.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_local_addr(&self, addr: Option<SocketAddr>) {
        match self.local_addr.lock() {
            Ok(mut guard) => *guard = addr,
            Err(poisoned) => *poisoned.into_inner() = addr,
        }
    }

    /// Configuration the client was built from
    #[must_use]
    pub fn config(&self) -> &HopConfig {
        &self.config
    }

    /// Current server candidates, in configured offset order
    #[must_use]
    pub fn server_ports(&self) -> Vec<Candidate> {
        self.dialer.candidates(unix_now())
    }

    /// Probe the current server candidates once.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::NoReachableCandidate`] if no candidate could be
    /// probed.
    pub async fn probe(&self) -> Result<ProbeOutcome> {
        self.dialer
            .probe(
                self.config.protocol,
                self.settings.probe_timeout,
                self.settings.udp_probe_timeout,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn config(local_port: u16) -> HopConfig {
        HopConfig {
            secret: "JBSWY3DPEHPK3PXP".to_string(),
            base_port: 24_000,
            port_range: 1000,
            offsets: vec![-15, 0, 15],
            port: local_port,
            mode: porthop_core::Mode::Client,
            listen_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ..HopConfig::default()
        }
    }

    async fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_server_ports_follow_offsets() {
        let client = Client::new(config(8080), NodeSettings::default()).unwrap();
        let ports = client.server_ports();
        assert_eq!(ports.len(), 3);
        let offsets: Vec<i64> = ports.iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![-15, 0, 15]);
    }

    #[tokio::test]
    async fn test_local_bind_failure_is_fatal() {
        let blocker = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = blocker.local_addr().unwrap().port();

        let client = Client::new(config(port), NodeSettings::default()).unwrap();
        let err = client.start().await.unwrap_err();
        assert!(matches!(err, NodeError::Bind { .. }));
        assert!(!client.is_running());
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let port = free_port().await;
        let client = Arc::new(Client::new(config(port), NodeSettings::default()).unwrap());

        let runner = Arc::clone(&client);
        let task = tokio::spawn(async move { runner.start().await });

        tokio::time::timeout(Duration::from_secs(5), async {
            while client.local_addr().is_none() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("client must bind its local port");
        assert_eq!(client.local_addr().unwrap().port(), port);

        client.stop();
        client.stop();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("start must return after stop")
            .unwrap()
            .unwrap();
        assert!(client.local_addr().is_none());
        assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
    }

    #[tokio::test]
    async fn test_probe_without_server_fails() {
        let client = Client::new(config(8080), NodeSettings::default()).unwrap();
        let err = client.probe().await.unwrap_err();
        assert!(matches!(err, NodeError::NoReachableCandidate { .. }));
    }
}
