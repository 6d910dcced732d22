//! Socket setup: binding, dialing, tuning.
//!
//! Listeners are created through `socket2` so options can be set before the
//! bind; tokio takes over once the socket is configured.

use crate::error::{TransportError, TransportResult};
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, UdpSocket};

/// Pending-connection backlog for TCP listeners
const LISTEN_BACKLOG: i32 = 1024;

/// Receive/send buffer requested for UDP listeners
const UDP_BUFFER_SIZE: usize = 256 * 1024;

/// Per-stream socket options applied before relaying.
///
/// All options are best effort: a platform refusing one is logged and the
/// stream is used as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamTuning {
    /// Disable Nagle's algorithm
    pub nodelay: bool,
    /// OS receive buffer size
    pub recv_buffer_size: Option<usize>,
    /// OS send buffer size
    pub send_buffer_size: Option<usize>,
}

impl Default for StreamTuning {
    fn default() -> Self {
        Self {
            nodelay: true,
            recv_buffer_size: Some(64 * 1024),
            send_buffer_size: Some(64 * 1024),
        }
    }
}

impl StreamTuning {
    /// Apply the options to `stream`
    pub fn apply(&self, stream: &TcpStream) {
        if self.nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!("Failed to set TCP_NODELAY: {}", e);
            }
        }

        let sock = SockRef::from(stream);
        if let Some(size) = self.recv_buffer_size {
            if let Err(e) = sock.set_recv_buffer_size(size) {
                tracing::debug!("Failed to set receive buffer to {}: {}", size, e);
            }
        }
        if let Some(size) = self.send_buffer_size {
            if let Err(e) = sock.set_send_buffer_size(size) {
                tracing::debug!("Failed to set send buffer to {}: {}", size, e);
            }
        }
    }
}

/// Bind a TCP listener with `SO_REUSEADDR`.
///
/// Reusing the address lets a rotated-out port be bound again while
/// connections from its previous life linger in `TIME_WAIT`.
///
/// # Errors
///
/// Returns [`TransportError::BindFailed`] if any step of socket setup fails.
pub async fn bind_tcp(addr: SocketAddr) -> TransportResult<TcpListener> {
    let bind_err = |source: std::io::Error| TransportError::BindFailed { addr, source };

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(bind_err)?;
    socket.set_reuse_address(true).map_err(bind_err)?;
    socket.set_nonblocking(true).map_err(bind_err)?;
    socket.bind(&addr.into()).map_err(bind_err)?;
    socket.listen(LISTEN_BACKLOG).map_err(bind_err)?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener).map_err(bind_err)
}

/// Bind a UDP socket with enlarged OS buffers.
///
/// # Errors
///
/// Returns [`TransportError::BindFailed`] if the socket cannot be created or
/// bound. Buffer sizing failures are only logged.
pub async fn bind_udp(addr: SocketAddr) -> TransportResult<UdpSocket> {
    let bind_err = |source: std::io::Error| TransportError::BindFailed { addr, source };

    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(bind_err)?;

    if let Err(e) = socket.set_recv_buffer_size(UDP_BUFFER_SIZE) {
        tracing::debug!("Failed to size UDP receive buffer: {}", e);
    }
    if let Err(e) = socket.set_send_buffer_size(UDP_BUFFER_SIZE) {
        tracing::debug!("Failed to size UDP send buffer: {}", e);
    }

    socket.set_nonblocking(true).map_err(bind_err)?;
    socket.bind(&addr.into()).map_err(bind_err)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).map_err(bind_err)
}

/// Connect to `host:port`, giving up after `timeout`.
///
/// # Errors
///
/// Returns [`TransportError::Timeout`] if the attempt did not finish in time
/// and [`TransportError::ConnectFailed`] if it was refused or resolution
/// failed.
pub async fn connect_tcp(host: &str, port: u16, timeout: Duration) -> TransportResult<TcpStream> {
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(TransportError::ConnectFailed {
            addr: host_port(host, port),
            source,
        }),
        Err(_) => Err(TransportError::Timeout {
            operation: "connect",
            addr: host_port(host, port),
            after: timeout,
        }),
    }
}

/// Resolve `host:port` to its first socket address.
///
/// # Errors
///
/// Returns [`TransportError::Io`] if the lookup fails and
/// [`TransportError::Unresolved`] if it yields nothing.
pub async fn resolve(host: &str, port: u16) -> TransportResult<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| TransportError::Unresolved(host_port(host, port)))
}

/// Format a host and port, bracketing bare IPv6 literals.
#[must_use]
pub fn host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Unspecified address of the same family as `addr`, port 0
#[must_use]
pub fn unspecified_for(addr: &SocketAddr) -> SocketAddr {
    let ip = if addr.is_ipv4() {
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    } else {
        IpAddr::V6(Ipv6Addr::UNSPECIFIED)
    };
    SocketAddr::new(ip, 0)
}
