//! Server mode: rotating listeners in front of the protected service.

use crate::config::NodeSettings;
use crate::error::{NodeError, Result};
use crate::forwarder::Forwarder;
use crate::probe::{ProbeOutcome, probe_tcp, probe_udp};
use crate::reconciler::Reconciler;
use crate::registry::{ListenerInfo, ListenerRegistry};
use async_trait::async_trait;
use porthop_core::{HopConfig, PortSchedule, Protocol};
use porthop_transport::{connect_tcp, exchange_datagram, relay_tcp, resolve};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

/// Forwards accepted traffic to the protected service
struct TargetForwarder {
    host: String,
    port: u16,
    settings: NodeSettings,
}

#[async_trait]
impl Forwarder for TargetForwarder {
    async fn forward_stream(&self, inbound: TcpStream, peer: SocketAddr) -> Result<()> {
        let outbound = connect_tcp(&self.host, self.port, self.settings.dial_timeout).await?;
        tracing::debug!("Relaying {} to {}:{}", peer, self.host, self.port);

        let stats = relay_tcp(inbound, outbound, &self.settings.tuning).await;
        tracing::debug!(
            "Connection from {} closed ({} bytes in, {} bytes out)",
            peer,
            stats.a_to_b,
            stats.b_to_a
        );
        Ok(())
    }

    async fn forward_datagram(&self, payload: Vec<u8>, _peer: SocketAddr) -> Result<Vec<u8>> {
        let upstream = resolve(&self.host, self.port).await?;
        let reply = exchange_datagram(&payload, upstream, self.settings.udp_reply_timeout).await?;
        Ok(reply)
    }
}

/// Server node
pub struct Server {
    config: HopConfig,
    settings: NodeSettings,
    schedule: Arc<PortSchedule>,
    registry: Arc<ListenerRegistry>,
    token: CancellationToken,
    running: AtomicBool,
}

impl Server {
    /// Create a server from a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::InvalidConfig`] if the configuration does not
    /// validate.
    pub fn new(config: HopConfig, settings: NodeSettings) -> Result<Self> {
        let schedule = Arc::new(config.schedule()?);

        Ok(Self {
            config,
            settings,
            schedule,
            registry: Arc::new(ListenerRegistry::new()),
            token: CancellationToken::new(),
            running: AtomicBool::new(false),
        })
    }

    /// Run the reconciliation loop until [`Server::stop`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::InvalidState`] if the server is already running
    /// or has been stopped.
    pub async fn start(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(NodeError::invalid_state("server has been stopped"));
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(NodeError::invalid_state("server is already running"));
        }

        if self.settings.tick_exceeds(self.config.extend) {
            tracing::warn!(
                "Tick interval {:?} exceeds the {}s extension; newly valid ports may open late",
                self.settings.tick_interval,
                self.config.extend
            );
        }

        tracing::info!(
            "Server started: {} ports {}-{} on {} -> {}:{}",
            self.config.protocol,
            self.config.base_port,
            self.config.last_port(),
            self.config.listen_addr,
            self.config.host,
            self.config.port
        );

        let forwarder = Arc::new(TargetForwarder {
            host: self.config.host.clone(),
            port: self.config.port,
            settings: self.settings.clone(),
        });
        let reconciler = Reconciler::new(
            Arc::clone(&self.schedule),
            Arc::clone(&self.registry),
            self.config.protocol,
            self.config.listen_addr,
            forwarder,
            self.settings.clone(),
            self.token.clone(),
        );

        reconciler.run().await;
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Stop the server and close every listener.
    ///
    /// Idempotent, and safe whether or not `start` ever ran. Relays already
    /// in progress are left to finish.
    pub async fn stop(&self) {
        if !self.token.is_cancelled() {
            tracing::info!("Stopping server");
            self.token.cancel();
        }
        self.registry.shutdown().await;
    }

    /// Whether the reconciliation loop is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Configuration the server was built from
    #[must_use]
    pub fn config(&self) -> &HopConfig {
        &self.config
    }

    /// Port schedule
    #[must_use]
    pub fn schedule(&self) -> &PortSchedule {
        &self.schedule
    }

    /// Registry of open listeners
    #[must_use]
    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    /// Snapshot of the open listeners, ordered by offset
    pub async fn active_listeners(&self) -> Vec<ListenerInfo> {
        self.registry.snapshot().await
    }

    /// Check that the protected service answers.
    ///
    /// # Errors
    ///
    /// Returns the dial or socket failure.
    pub async fn probe_target(&self) -> Result<ProbeOutcome> {
        match self.config.protocol {
            Protocol::Tcp => {
                probe_tcp(&self.config.host, self.config.port, self.settings.probe_timeout).await
            }
            Protocol::Udp => {
                probe_udp(
                    &self.config.host,
                    self.config.port,
                    self.settings.udp_probe_timeout,
                )
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use porthop_core::ConfigError;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn config(target_port: u16) -> HopConfig {
        HopConfig {
            secret: "JBSWY3DPEHPK3PXP".to_string(),
            base_port: 23_000,
            port_range: 1000,
            offsets: vec![0],
            port: target_port,
            listen_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ..HopConfig::default()
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut bad = config(8080);
        bad.offsets.clear();
        let err = Server::new(bad, NodeSettings::default()).err().unwrap();
        assert!(matches!(
            err,
            NodeError::InvalidConfig(ConfigError::NoOffsets)
        ));
    }

    #[tokio::test]
    async fn test_stop_without_start_is_idempotent() {
        let server = Server::new(config(8080), NodeSettings::default()).unwrap();
        server.stop().await;
        server.stop().await;
        assert!(!server.is_running());
        assert!(matches!(
            server.start().await,
            Err(NodeError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_start_opens_listener_and_stop_closes_it() {
        let settings = NodeSettings {
            tick_interval: Duration::from_millis(50),
            ..NodeSettings::default()
        };
        let server = Arc::new(Server::new(config(8080), settings).unwrap());

        let runner = Arc::clone(&server);
        let task = tokio::spawn(async move { runner.start().await });

        tokio::time::timeout(Duration::from_secs(5), async {
            while server.active_listeners().await.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("server must open a listener");
        assert!(server.is_running());
        assert!(matches!(
            server.start().await,
            Err(NodeError::InvalidState(_))
        ));

        server.stop().await;
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("start must return after stop")
            .unwrap()
            .unwrap();
        assert!(server.active_listeners().await.is_empty());
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_probe_target() {
        let target = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = target.local_addr().unwrap().port();
        let server = Server::new(config(port), NodeSettings::default()).unwrap();
        assert!(server.probe_target().await.unwrap().is_confirmed());

        drop(target);
        assert!(server.probe_target().await.is_err());
    }
}
