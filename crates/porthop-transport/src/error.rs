//! Transport error types.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

/// Transport layer errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// I/O error from the underlying socket
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Address binding failed
    #[error("Failed to bind to {addr}: {source}")]
    BindFailed {
        /// Address that could not be bound
        addr: SocketAddr,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Connection attempt failed
    #[error("Connection to {addr} failed: {source}")]
    ConnectFailed {
        /// Remote address
        addr: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Operation did not finish in time
    #[error("{operation} with {addr} timed out after {after:?}")]
    Timeout {
        /// What was being waited for
        operation: &'static str,
        /// Remote address
        addr: String,
        /// Elapsed limit
        after: Duration,
    },

    /// Host name resolved to no address
    #[error("No address found for {0}")]
    Unresolved(String),
}

impl TransportError {
    /// Whether the error is a bind failure caused by the port being taken
    #[must_use]
    pub fn is_addr_in_use(&self) -> bool {
        matches!(
            self,
            Self::BindFailed { source, .. } if source.kind() == io::ErrorKind::AddrInUse
        )
    }

    /// Whether the error is a timeout
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;
