//! Bidirectional byte relay.
//!
//! Two directions are pumped concurrently. When one side reaches EOF its
//! write half on the other side is shut down, so a half-close propagates.
//! The relay finishes only when both directions are done; a direction that
//! is still moving data is never cut off.

use crate::socket::StreamTuning;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// Outcome of a finished relay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes copied from the first stream to the second
    pub a_to_b: u64,
    /// Bytes copied from the second stream to the first
    pub b_to_a: u64,
}

impl RelayStats {
    /// Total bytes copied in both directions
    #[must_use]
    pub fn total(&self) -> u64 {
        self.a_to_b + self.b_to_a
    }
}

/// Copy `reader` into `writer` until EOF or error, then shut `writer` down.
///
/// Returns the bytes copied. Errors end the direction and are only logged;
/// a reset peer is the normal end of many connections.
async fn pump<R, W>(mut reader: R, mut writer: W, direction: &'static str) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let copied = match tokio::io::copy(&mut reader, &mut writer).await {
        Ok(n) => n,
        Err(e) => {
            tracing::debug!("Relay {} ended with error: {}", direction, e);
            0
        }
    };

    if let Err(e) = writer.shutdown().await {
        tracing::trace!("Relay {} shutdown failed: {}", direction, e);
    }

    copied
}

/// Relay bytes between `a` and `b` until both directions finish.
///
/// A side that closes first only ends its own direction; the peer sees EOF
/// and the other direction keeps running until its source closes too.
pub async fn relay<A, B>(a: A, b: B) -> RelayStats
where
    A: AsyncRead + AsyncWrite + Send,
    B: AsyncRead + AsyncWrite + Send,
{
    let (a_read, a_write) = tokio::io::split(a);
    let (b_read, b_write) = tokio::io::split(b);

    let (a_to_b, b_to_a) = tokio::join!(
        pump(a_read, b_write, "a->b"),
        pump(b_read, a_write, "b->a")
    );

    RelayStats { a_to_b, b_to_a }
}

/// Tune both TCP streams and relay between them.
pub async fn relay_tcp(a: TcpStream, b: TcpStream, tuning: &StreamTuning) -> RelayStats {
    tuning.apply(&a);
    tuning.apply(&b);
    relay(a, b).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_relay_both_directions() {
        let (client, relay_a) = tokio::io::duplex(1024);
        let (relay_b, upstream) = tokio::io::duplex(1024);

        let handle = tokio::spawn(relay(relay_a, relay_b));

        let (mut client_read, mut client_write) = tokio::io::split(client);
        let (mut up_read, mut up_write) = tokio::io::split(upstream);

        client_write.write_all(b"request").await.unwrap();
        client_write.shutdown().await.unwrap();

        let mut received = Vec::new();
        up_read.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"request");

        up_write.write_all(b"response!").await.unwrap();
        up_write.shutdown().await.unwrap();

        let mut reply = Vec::new();
        client_read.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, b"response!");

        let stats = handle.await.unwrap();
        assert_eq!(stats.a_to_b, 7);
        assert_eq!(stats.b_to_a, 9);
        assert_eq!(stats.total(), 16);
    }

    #[tokio::test]
    async fn test_half_closed_client_receives_slow_response() {
        let (client, relay_a) = tokio::io::duplex(1024);
        let (relay_b, upstream) = tokio::io::duplex(1024);

        let handle = tokio::spawn(relay(relay_a, relay_b));

        let (mut client_read, mut client_write) = tokio::io::split(client);
        let (mut up_read, mut up_write) = tokio::io::split(upstream);

        client_write.write_all(b"GET").await.unwrap();
        client_write.shutdown().await.unwrap();

        let mut request = Vec::new();
        up_read.read_to_end(&mut request).await.unwrap();
        assert_eq!(request, b"GET");

        // The response keeps flowing long after the request side closed
        tokio::spawn(async move {
            for _ in 0..10 {
                up_write.write_all(b"chunk").await.unwrap();
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            up_write.shutdown().await.unwrap();
        });

        let mut reply = Vec::new();
        tokio::time::timeout(Duration::from_secs(10), client_read.read_to_end(&mut reply))
            .await
            .expect("Timeout")
            .unwrap();
        assert_eq!(reply.len(), 50);
        assert_eq!(&reply[..5], b"chunk");

        let stats = handle.await.unwrap();
        assert_eq!(stats.a_to_b, 3);
        assert_eq!(stats.b_to_a, 50);
    }

    #[tokio::test]
    async fn test_upstream_close_delivers_buffered_bytes_then_eof() {
        let (client, relay_a) = tokio::io::duplex(1024);
        let (relay_b, upstream) = tokio::io::duplex(1024);

        let handle = tokio::spawn(relay(relay_a, relay_b));

        // The target answers and goes away while the client side stays open
        let (up_read, mut up_write) = tokio::io::split(upstream);
        up_write.write_all(b"final words").await.unwrap();
        drop(up_write);
        drop(up_read);

        let (mut client_read, client_write) = tokio::io::split(client);
        let mut reply = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), client_read.read_to_end(&mut reply))
            .await
            .expect("client must see EOF")
            .unwrap();
        assert_eq!(reply, b"final words");

        // Having seen EOF the client closes, which ends the other direction
        drop(client_write);
        drop(client_read);

        let stats = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("relay must end once both sides closed")
            .unwrap();
        assert_eq!(stats.b_to_a, 11);
        assert_eq!(stats.a_to_b, 0);
    }

    #[tokio::test]
    async fn test_relay_tcp_over_loopback() {
        let upstream_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream_addr = upstream_listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = upstream_listener.accept().await.unwrap();
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await.unwrap();
            buf.reverse();
            stream.write_all(&buf).await.unwrap();
        });

        let front_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let front_addr = front_listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (inbound, _) = front_listener.accept().await.unwrap();
            let outbound = TcpStream::connect(upstream_addr).await.unwrap();
            relay_tcp(inbound, outbound, &StreamTuning::default()).await
        });

        let mut client = TcpStream::connect(front_addr).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        client.shutdown().await.unwrap();

        let mut reply = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut reply))
            .await
            .expect("Timeout")
            .unwrap();
        assert_eq!(reply, b"cba");
    }
}
