//! Error types for port derivation and configuration.

use thiserror::Error;

/// Failures of the one-time-code generator.
///
/// These are properties of the configured secret or period, so they recur on
/// every call; an instance that hits one cannot operate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodeGenerationError {
    /// Secret is empty after trimming
    #[error("secret is empty")]
    EmptySecret,

    /// Secret is not valid base32
    #[error("secret is not valid base32: {reason}")]
    InvalidSecret {
        /// What made the encoding unacceptable
        reason: String,
    },

    /// Period of zero seconds
    #[error("period must be greater than zero")]
    ZeroPeriod,

    /// Time before the Unix epoch cannot be mapped to a counter
    #[error("time {0} is before the Unix epoch")]
    NegativeTime(i64),
}

/// Failures of port derivation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeriveError {
    /// Port range is empty or would overflow the 16-bit port space
    #[error("invalid port range: base port {base_port}, range {port_range}")]
    InvalidRange {
        /// Configured base port
        base_port: u16,
        /// Configured range width
        port_range: u16,
    },

    /// The code generator failed
    #[error("code generation failed: {0}")]
    CodeGeneration(#[from] CodeGenerationError),
}

/// Configuration rejected before startup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `interval` is zero
    #[error("interval must be greater than 0")]
    ZeroInterval,

    /// `base_port` is zero
    #[error("base_port must be in range 1-65535")]
    InvalidBasePort,

    /// `port_range` is zero
    #[error("port_range must be greater than 0")]
    ZeroPortRange,

    /// `base_port + port_range` exceeds the port space
    #[error("base_port + port_range must not exceed 65535 (got {0})")]
    PortRangeOverflow(u32),

    /// `secret` missing or unusable
    #[error("secret is unusable: {0}")]
    Secret(#[from] CodeGenerationError),

    /// `offsets` is empty
    #[error("offsets must not be empty")]
    NoOffsets,

    /// An offset further from now than a day
    #[error("offset {0} is out of range (at most one day either way)")]
    OffsetOutOfRange(i64),

    /// `host` is empty
    #[error("host must not be empty")]
    EmptyHost,

    /// `port` is zero
    #[error("port must be in range 1-65535")]
    InvalidPort,

    /// Unknown `mode` string
    #[error("mode must be 'server' or 'client', got '{0}'")]
    UnknownMode(String),

    /// Unknown `protocol` string
    #[error("protocol must be 'tcp' or 'udp', got '{0}'")]
    UnknownProtocol(String),

    /// Parameters the port schedule cannot be built from
    #[error("invalid schedule: {0}")]
    Schedule(#[from] DeriveError),

    /// A numeric field outside of what its type allows
    #[error("{field} is out of range: {value}")]
    OutOfRange {
        /// Configuration key
        field: &'static str,
        /// Value found in the configuration
        value: i64,
    },
}

/// Result alias for derivation
pub type Result<T> = std::result::Result<T, DeriveError>;
