//! Error types for the server and client
//!
//! Errors fall in two groups:
//!
//! - **Fatal**: the node cannot operate at all (invalid configuration, a local
//!   port that cannot be bound at startup, misuse of the lifecycle)
//! - **Transient**: one connection or one tick failed; the node keeps running
//!   and the next attempt may succeed
//!
//! # Example
//!
//! ```no_run
//! use porthop_node::NodeError;
//!
//! fn handle_error(err: NodeError) {
//!     if err.is_transient() {
//!         println!("Connection failed, listener keeps running: {}", err);
//!     } else {
//!         println!("Cannot continue: {}", err);
//!     }
//! }
//! ```

use porthop_core::{ConfigError, DeriveError};
use porthop_transport::TransportError;
use std::borrow::Cow;
use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;

/// One failed dial of a server candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateAttempt {
    /// Offset the candidate was derived for
    pub offset: i64,
    /// Address that was dialed
    pub addr: String,
    /// Why the attempt failed
    pub reason: String,
}

impl fmt::Display for CandidateAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "offset {:+} -> {} ({})", self.offset, self.addr, self.reason)
    }
}

/// Render attempts as a `; `-separated list
fn list_attempts(attempted: &[CandidateAttempt]) -> String {
    if attempted.is_empty() {
        return "no candidates".to_string();
    }

    attempted
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur in server and client operations
#[derive(Debug, Error)]
pub enum NodeError {
    // ============ Configuration & State Errors ============
    /// Configuration rejected before startup
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// Port derivation failed
    #[error("Port derivation failed: {0}")]
    Derivation(#[from] DeriveError),

    /// Operation not allowed in the current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(Cow<'static, str>),

    // ============ Network Errors ============
    /// A listener could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address that could not be bound
        addr: SocketAddr,
        /// Underlying transport error
        #[source]
        source: TransportError,
    },

    /// Every server candidate failed
    #[error("No reachable candidate: {}", list_attempts(.attempted))]
    NoReachableCandidate {
        /// Attempts in dial order
        attempted: Vec<CandidateAttempt>,
    },

    /// Dial, relay or datagram I/O failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl NodeError {
    /// Returns true if this error is transient and may succeed on retry
    ///
    /// Transient errors include:
    /// - Bind races with other sockets, retried on the next tick
    /// - Unreachable candidates and targets
    /// - I/O failures of a single connection
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            NodeError::Bind { .. }
                | NodeError::NoReachableCandidate { .. }
                | NodeError::Transport(_)
        )
    }

    /// Create an invalid state error with static context (zero allocation)
    #[must_use]
    pub const fn invalid_state(context: &'static str) -> Self {
        NodeError::InvalidState(Cow::Borrowed(context))
    }
}

/// Result type for node operations
pub type Result<T> = std::result::Result<T, NodeError>;
