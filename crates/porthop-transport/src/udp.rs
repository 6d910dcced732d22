//! Single-exchange UDP forwarding.
//!
//! Every datagram is forwarded on a freshly bound ephemeral socket, answered
//! by at most one reply, and forgotten. No flow state survives the exchange.

use crate::error::{TransportError, TransportResult};
use crate::socket::unspecified_for;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

/// Largest datagram accepted or forwarded
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Send `payload` to `upstream` and wait for one reply.
///
/// # Errors
///
/// Returns [`TransportError::Timeout`] if no reply arrives within
/// `reply_timeout`, or an I/O error from the socket.
pub async fn exchange_datagram(
    payload: &[u8],
    upstream: SocketAddr,
    reply_timeout: Duration,
) -> TransportResult<Vec<u8>> {
    let socket = UdpSocket::bind(unspecified_for(&upstream)).await?;
    socket.connect(upstream).await?;
    socket.send(payload).await?;

    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    match tokio::time::timeout(reply_timeout, socket.recv(&mut buf)).await {
        Ok(Ok(len)) => {
            buf.truncate(len);
            Ok(buf)
        }
        Ok(Err(e)) => Err(TransportError::Io(e)),
        Err(_) => Err(TransportError::Timeout {
            operation: "udp reply",
            addr: upstream.to_string(),
            after: reply_timeout,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn spawn_echo() -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            while let Ok((len, from)) = socket.recv_from(&mut buf).await {
                let mut reply = b"echo:".to_vec();
                reply.extend_from_slice(&buf[..len]);
                let _ = socket.send_to(&reply, from).await;
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_exchange_gets_reply() {
        let upstream = spawn_echo().await;
        let reply = exchange_datagram(b"ping", upstream, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(reply, b"echo:ping");
    }

    #[tokio::test]
    async fn test_exchange_times_out_without_reply() {
        // A bound socket that never answers
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let upstream = silent.local_addr().unwrap();

        let err = exchange_datagram(b"ping", upstream, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }
}
