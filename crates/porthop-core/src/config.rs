//! Validated link configuration.
//!
//! File formats live in the binary; this is the typed form every component
//! consumes once it has passed [`HopConfig::validate`].

use crate::error::ConfigError;
use crate::schedule::{PortSchedule, ScheduleParams};
use crate::totp::TotpGenerator;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

/// Largest distance from now a configured offset may probe, in seconds
pub const MAX_OFFSET_SECS: i64 = 86_400;

/// Which end of the link this process is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Rotating listeners in front of the protected service
    Server,
    /// Fixed local port forwarding to the rotating server ports
    Client,
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server" => Ok(Self::Server),
            "client" => Ok(Self::Client),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => f.write_str("server"),
            Self::Client => f.write_str("client"),
        }
    }
}

/// Transport protocol being forwarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Byte streams
    Tcp,
    /// Datagrams, one request/reply exchange each
    Udp,
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            _ => Err(ConfigError::UnknownProtocol(s.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("tcp"),
            Self::Udp => f.write_str("udp"),
        }
    }
}

/// Link configuration
#[derive(Clone, PartialEq, Eq)]
pub struct HopConfig {
    /// Rotation period in seconds
    pub interval: u32,
    /// Validity extension on each side of a period, in seconds
    pub extend: u32,
    /// First port of the rotating range
    pub base_port: u16,
    /// Number of ports in the rotating range
    pub port_range: u16,
    /// Base32 shared secret
    pub secret: String,
    /// Probe offsets in seconds, in dial order
    pub offsets: Vec<i64>,
    /// Server: protected service host. Client: porthop server host.
    pub host: String,
    /// Server: protected service port. Client: local listen port.
    pub port: u16,
    /// Server or client
    pub mode: Mode,
    /// TCP or UDP
    pub protocol: Protocol,
    /// Address local listeners bind to
    pub listen_addr: IpAddr,
}

impl Default for HopConfig {
    fn default() -> Self {
        Self {
            interval: 30,
            extend: 15,
            base_port: 3000,
            port_range: 1000,
            secret: String::new(),
            offsets: vec![-15, 0, 15],
            host: "127.0.0.1".to_string(),
            port: 8080,
            mode: Mode::Server,
            protocol: Protocol::Tcp,
            listen_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }
}

impl fmt::Debug for HopConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HopConfig")
            .field("interval", &self.interval)
            .field("extend", &self.extend)
            .field("base_port", &self.base_port)
            .field("port_range", &self.port_range)
            .field("secret", &mask_secret(&self.secret))
            .field("offsets", &self.offsets)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("mode", &self.mode)
            .field("protocol", &self.protocol)
            .field("listen_addr", &self.listen_addr)
            .finish()
    }
}

impl HopConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.base_port == 0 {
            return Err(ConfigError::InvalidBasePort);
        }
        if self.port_range == 0 {
            return Err(ConfigError::ZeroPortRange);
        }

        let top = u32::from(self.base_port) + u32::from(self.port_range);
        if top > u32::from(u16::MAX) {
            return Err(ConfigError::PortRangeOverflow(top));
        }

        // Decoding once up front turns a bad secret into a startup error
        // instead of a failure on every derivation.
        TotpGenerator::from_base32(&self.secret)?;

        if self.offsets.is_empty() {
            return Err(ConfigError::NoOffsets);
        }
        let bound = -MAX_OFFSET_SECS..=MAX_OFFSET_SECS;
        if let Some(&offset) = self.offsets.iter().find(|o| !bound.contains(*o)) {
            return Err(ConfigError::OffsetOutOfRange(offset));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        Ok(())
    }

    /// Build the port schedule described by this configuration.
    ///
    /// # Errors
    ///
    /// Returns the validation error if the configuration is invalid.
    pub fn schedule(&self) -> Result<PortSchedule, ConfigError> {
        self.validate()?;

        let totp = TotpGenerator::from_base32(&self.secret)?;
        let params = ScheduleParams {
            period: self.interval,
            extension: self.extend,
            base_port: self.base_port,
            port_range: self.port_range,
            offsets: self.offsets.clone(),
        };

        Ok(PortSchedule::new(totp, params)?)
    }

    /// Last port of the rotating range
    #[must_use]
    pub fn last_port(&self) -> u32 {
        u32::from(self.base_port) + u32::from(self.port_range) - 1
    }
}

/// Mask a secret for display, keeping two characters at each end.
#[must_use]
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }

    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}****{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> HopConfig {
        HopConfig {
            secret: "JBSWY3DPEHPK3PXP".to_string(),
            ..HopConfig::default()
        }
    }

    #[test]
    fn test_default_needs_only_a_secret() {
        assert_eq!(
            HopConfig::default().validate(),
            Err(ConfigError::Secret(
                crate::error::CodeGenerationError::EmptySecret
            ))
        );
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = valid();
        config.interval = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroInterval));

        let mut config = valid();
        config.port_range = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroPortRange));

        let mut config = valid();
        config.base_port = 65_000;
        config.port_range = 1000;
        assert_eq!(config.validate(), Err(ConfigError::PortRangeOverflow(66_000)));

        let mut config = valid();
        config.offsets.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoOffsets));

        let mut config = valid();
        config.offsets = vec![0, i64::MAX];
        assert_eq!(
            config.validate(),
            Err(ConfigError::OffsetOutOfRange(i64::MAX))
        );

        let mut config = valid();
        config.offsets = vec![i64::MIN];
        assert_eq!(
            config.validate(),
            Err(ConfigError::OffsetOutOfRange(i64::MIN))
        );

        let mut config = valid();
        config.offsets = vec![-MAX_OFFSET_SECS, MAX_OFFSET_SECS];
        assert!(config.validate().is_ok());

        let mut config = valid();
        config.host = "  ".to_string();
        assert_eq!(config.validate(), Err(ConfigError::EmptyHost));

        let mut config = valid();
        config.port = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidPort));

        let mut config = valid();
        config.secret = "not base32!".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Secret(_))));
    }

    #[test]
    fn test_range_ending_at_65535_is_accepted() {
        let mut config = valid();
        config.base_port = 64_535;
        config.port_range = 1000;
        assert!(config.validate().is_ok());
        assert_eq!(config.last_port(), 65_534);
    }

    #[test]
    fn test_mode_and_protocol_parsing() {
        assert_eq!("server".parse::<Mode>(), Ok(Mode::Server));
        assert_eq!("Client".parse::<Mode>(), Ok(Mode::Client));
        assert!("relay".parse::<Mode>().is_err());
        assert_eq!("tcp".parse::<Protocol>(), Ok(Protocol::Tcp));
        assert_eq!(" UDP ".parse::<Protocol>(), Ok(Protocol::Udp));
        assert_eq!(
            "quic".parse::<Protocol>(),
            Err(ConfigError::UnknownProtocol("quic".to_string()))
        );
        assert_eq!(Protocol::Udp.to_string(), "udp");
        assert_eq!(Mode::Client.to_string(), "client");
    }

    #[test]
    fn test_schedule_from_config() {
        let schedule = valid().schedule().unwrap();
        assert_eq!(schedule.offsets(), &[-15, 0, 15]);
        assert_eq!(schedule.params().period, 30);
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("abc"), "****");
        assert_eq!(mask_secret("JBSWY3DPEHPK3PXP"), "JB****XP");
        let printed = format!("{:?}", valid());
        assert!(!printed.contains("JBSWY3DPEHPK3PXP"));
    }
}
