//! Accept and receive loops of a single listener.
//!
//! A loop runs until its cancellation token fires; that is its only exit.
//! Every accepted connection or received datagram is handed to the
//! [`Forwarder`] on a task of its own, without a concurrency limit.

use crate::error::{NodeError, Result};
use crate::forwarder::Forwarder;
use porthop_core::Protocol;
use porthop_transport::{MAX_DATAGRAM_SIZE, TransportError, bind_tcp, bind_udp};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// What to do after a failed accept or receive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptAction {
    /// Harmless; try again immediately
    Retry,
    /// Unexpected; log it and pause before trying again
    Backoff,
}

/// Classify an accept or receive error.
///
/// Failures caused by one peer (an aborted handshake, a reset before accept)
/// or by the wait itself are retried at once. Anything else, such as an
/// exhausted descriptor table, gets a pause so the loop does not spin.
#[must_use]
pub fn classify_accept_error(err: &io::Error) -> AcceptAction {
    match err.kind() {
        io::ErrorKind::TimedOut
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset => AcceptAction::Retry,
        _ => AcceptAction::Backoff,
    }
}

/// Handle an accept error; returns `false` if cancellation arrived during
/// the backoff.
async fn recover(
    err: &io::Error,
    what: &str,
    token: &CancellationToken,
    backoff: Duration,
) -> bool {
    match classify_accept_error(err) {
        AcceptAction::Retry => {
            tracing::debug!("{} interrupted, retrying: {}", what, err);
            true
        }
        AcceptAction::Backoff => {
            tracing::warn!("{} failed, retrying in {:?}: {}", what, backoff, err);
            tokio::select! {
                () = token.cancelled() => false,
                () = tokio::time::sleep(backoff) => true,
            }
        }
    }
}

/// Accept connections on `listener` until `token` is cancelled.
///
/// The listener is dropped on return, which closes the port. Connections
/// already handed to the forwarder keep running.
pub async fn serve_tcp(
    listener: TcpListener,
    token: CancellationToken,
    forwarder: Arc<dyn Forwarder>,
    backoff: Duration,
) {
    let local = listener.local_addr().ok();

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!("Accepted {} on {:?}", peer, local);
                    let forwarder = Arc::clone(&forwarder);
                    tokio::spawn(async move {
                        if let Err(e) = forwarder.forward_stream(stream, peer).await {
                            tracing::warn!("Connection from {} failed: {}", peer, e);
                        }
                    });
                }
                Err(e) => {
                    if !recover(&e, "Accept", &token, backoff).await {
                        break;
                    }
                }
            },
        }
    }

    tracing::debug!("TCP listener on {:?} stopped", local);
}

/// Receive datagrams on `socket` until `token` is cancelled.
///
/// Each datagram becomes one independent exchange; no per-peer state is
/// kept between datagrams. The socket is closed as soon as the loop ends.
pub async fn serve_udp(
    socket: Arc<UdpSocket>,
    token: CancellationToken,
    forwarder: Arc<dyn Forwarder>,
    backoff: Duration,
) {
    let local = socket.local_addr().ok();
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, peer)) => {
                    tracing::debug!("Received {} bytes from {} on {:?}", len, peer, local);
                    let payload = buf[..len].to_vec();
                    let listener = Arc::downgrade(&socket);
                    let token = token.clone();
                    let forwarder = Arc::clone(&forwarder);
                    tokio::spawn(async move {
                        match forwarder.forward_datagram(payload, peer).await {
                            Ok(reply) => send_reply(&listener, &token, &reply, peer).await,
                            Err(e) => tracing::warn!("Datagram from {} failed: {}", peer, e),
                        }
                    });
                }
                Err(e) => {
                    if !recover(&e, "Receive", &token, backoff).await {
                        break;
                    }
                }
            },
        }
    }

    tracing::debug!("UDP listener on {:?} stopped", local);
}

/// Send `reply` to `peer` unless the listener has been closed meanwhile.
///
/// Exchanges only hold a weak handle, so a closed listener releases its port
/// at once instead of when the last pending reply arrives.
async fn send_reply(
    listener: &Weak<UdpSocket>,
    token: &CancellationToken,
    reply: &[u8],
    peer: SocketAddr,
) {
    let socket = match listener.upgrade() {
        Some(socket) if !token.is_cancelled() => socket,
        _ => {
            tracing::debug!("Listener closed, dropping reply to {}", peer);
            return;
        }
    };

    if let Err(e) = socket.send_to(reply, peer).await {
        tracing::warn!("Reply to {} failed: {}", peer, e);
    }
}

/// Bind `addr` for `protocol` and spawn its serve loop.
///
/// Returns the bound address and the serve task, which ends once `token`
/// is cancelled.
///
/// # Errors
///
/// Returns [`NodeError::Bind`] if the socket cannot be bound.
pub async fn spawn_listener(
    protocol: Protocol,
    addr: SocketAddr,
    token: CancellationToken,
    forwarder: Arc<dyn Forwarder>,
    backoff: Duration,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let bind_err = |source: TransportError| NodeError::Bind { addr, source };

    match protocol {
        Protocol::Tcp => {
            let listener = bind_tcp(addr).await.map_err(bind_err)?;
            let local = listener.local_addr().map_err(TransportError::from)?;
            let task = tokio::spawn(serve_tcp(listener, token, forwarder, backoff));
            Ok((local, task))
        }
        Protocol::Udp => {
            let socket = bind_udp(addr).await.map_err(bind_err)?;
            let local = socket.local_addr().map_err(TransportError::from)?;
            let task = tokio::spawn(serve_udp(Arc::new(socket), token, forwarder, backoff));
            Ok((local, task))
        }
    }
}
