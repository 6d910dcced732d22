//! Forwarding seam between listeners and upstreams.
//!
//! Listeners only accept; what happens to an accepted stream or a received
//! datagram is decided by a [`Forwarder`]. The server forwards to the
//! protected service, the client forwards to a server candidate.

use crate::error::Result;
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::TcpStream;

/// Handles traffic arriving on a listener.
///
/// Every call runs on its own task; an error ends only that connection or
/// exchange.
#[async_trait]
pub trait Forwarder: Send + Sync + 'static {
    /// Relay an accepted stream until both directions are done
    async fn forward_stream(&self, inbound: TcpStream, peer: SocketAddr) -> Result<()>;

    /// Forward one datagram from `peer` and return the single reply.
    ///
    /// The listener sends the reply back to `peer` if it is still open.
    async fn forward_datagram(&self, payload: Vec<u8>, peer: SocketAddr) -> Result<Vec<u8>>;
}

/// Forwarder that answers every stream and datagram itself
#[cfg(test)]
pub(crate) struct EchoForwarder;

#[cfg(test)]
#[async_trait]
impl Forwarder for EchoForwarder {
    async fn forward_stream(&self, inbound: TcpStream, _peer: SocketAddr) -> Result<()> {
        let (mut reader, mut writer) = inbound.into_split();
        tokio::io::copy(&mut reader, &mut writer)
            .await
            .map_err(porthop_transport::TransportError::from)?;
        Ok(())
    }

    async fn forward_datagram(&self, payload: Vec<u8>, _peer: SocketAddr) -> Result<Vec<u8>> {
        Ok(payload)
    }
}
