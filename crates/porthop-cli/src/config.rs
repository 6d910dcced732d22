//! Configuration file handling for the porthop CLI.

use anyhow::Context;
use porthop_core::{ConfigError, HopConfig, Mode, Protocol};
use porthop_node::NodeSettings;
use serde::Deserialize;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file name used when `-c` is not given
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Template copied into place on first run
pub const EXAMPLE_CONFIG_FILE: &str = "config.toml.example";

/// porthop configuration file
///
/// Numeric fields are read wide and range-checked on conversion, so a value
/// such as `extend = -5` is reported by name instead of as a parse error.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Rotation period in seconds
    #[serde(default = "default_interval")]
    pub interval: i64,
    /// Validity extension in seconds
    #[serde(default = "default_extend")]
    pub extend: i64,
    /// First port of the rotating range
    #[serde(default = "default_base_port")]
    pub base_port: i64,
    /// Number of ports in the rotating range
    #[serde(default = "default_port_range")]
    pub port_range: i64,
    /// Base32 shared secret
    #[serde(default)]
    pub secret: String,
    /// Probe offsets in seconds
    #[serde(default = "default_offsets")]
    pub offsets: Vec<i64>,
    /// Target host (server) or server host (client)
    #[serde(default = "default_host")]
    pub host: String,
    /// Target port (server) or local listen port (client)
    #[serde(default = "default_port")]
    pub port: i64,
    /// `server` or `client`
    #[serde(default = "default_mode")]
    pub mode: String,
    /// `tcp` or `udp`
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// Address local listeners bind to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Server reconciliation tick in seconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Dial timeout in seconds
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout_secs: u64,
    /// UDP reply timeout in seconds
    #[serde(default = "default_udp_reply_timeout")]
    pub udp_reply_timeout_secs: u64,
}

// Default values

fn default_interval() -> i64 {
    30
}

fn default_extend() -> i64 {
    15
}

fn default_base_port() -> i64 {
    3000
}

fn default_port_range() -> i64 {
    1000
}

fn default_offsets() -> Vec<i64> {
    vec![-15, 0, 15]
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> i64 {
    8080
}

fn default_mode() -> String {
    "server".to_string()
}

fn default_protocol() -> String {
    "tcp".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_tick_interval() -> u64 {
    5
}

fn default_dial_timeout() -> u64 {
    5
}

fn default_udp_reply_timeout() -> u64 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            extend: default_extend(),
            base_port: default_base_port(),
            port_range: default_port_range(),
            secret: String::new(),
            offsets: default_offsets(),
            host: default_host(),
            port: default_port(),
            mode: default_mode(),
            protocol: default_protocol(),
            listen_addr: default_listen_addr(),
            log_level: default_log_level(),
            tick_interval_secs: default_tick_interval(),
            dial_timeout_secs: default_dial_timeout(),
            udp_reply_timeout_secs: default_udp_reply_timeout(),
        }
    }
}

/// Narrow a config value, naming the field on failure
fn narrow<T: TryFrom<i64>>(field: &'static str, value: i64) -> Result<T, ConfigError> {
    T::try_from(value).map_err(|_| ConfigError::OutOfRange { field, value })
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Convert into the validated link configuration
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn to_hop_config(&self) -> anyhow::Result<HopConfig> {
        if self.interval <= 0 {
            return Err(ConfigError::ZeroInterval.into());
        }

        let listen_addr: IpAddr = self
            .listen_addr
            .trim()
            .parse()
            .with_context(|| format!("Invalid listen_addr: {}", self.listen_addr))?;

        let hop = HopConfig {
            interval: narrow("interval", self.interval)?,
            extend: narrow("extend", self.extend)?,
            base_port: narrow("base_port", self.base_port)?,
            port_range: narrow("port_range", self.port_range)?,
            secret: self.secret.trim().to_string(),
            offsets: self.offsets.clone(),
            host: self.host.trim().to_string(),
            port: narrow("port", self.port)?,
            mode: self.mode.parse::<Mode>()?,
            protocol: self.protocol.parse::<Protocol>()?,
            listen_addr,
        };
        hop.validate()?;

        Ok(hop)
    }

    /// Timing settings for the node
    ///
    /// # Errors
    ///
    /// Returns an error if a timeout is zero.
    pub fn node_settings(&self) -> anyhow::Result<NodeSettings> {
        if self.tick_interval_secs == 0 {
            anyhow::bail!("tick_interval_secs must be greater than 0");
        }
        if self.dial_timeout_secs == 0 {
            anyhow::bail!("dial_timeout_secs must be greater than 0");
        }
        if self.udp_reply_timeout_secs == 0 {
            anyhow::bail!("udp_reply_timeout_secs must be greater than 0");
        }

        Ok(NodeSettings {
            tick_interval: Duration::from_secs(self.tick_interval_secs),
            dial_timeout: Duration::from_secs(self.dial_timeout_secs),
            udp_reply_timeout: Duration::from_secs(self.udp_reply_timeout_secs),
            ..NodeSettings::default()
        })
    }

    /// Validate the log level
    ///
    /// # Errors
    ///
    /// Returns an error if the level is unknown.
    pub fn validate_log_level(&self) -> anyhow::Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.log_level,
                valid_log_levels.join(", ")
            );
        }
        Ok(())
    }
}

/// Directories searched for the default config file, in order
#[must_use]
pub fn search_dirs() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("."), PathBuf::from("./config")];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".porthop"));
    }
    paths.push(PathBuf::from("/etc/porthop"));
    paths
}

/// First `file_name` found in `dirs`
#[must_use]
pub fn find_in(dirs: &[PathBuf], file_name: &str) -> Option<PathBuf> {
    dirs.iter()
        .map(|dir| dir.join(file_name))
        .find(|candidate| candidate.is_file())
}

/// Copy the example configuration to `target`
///
/// # Errors
///
/// Returns an error if the example is missing or the copy fails.
pub fn copy_example_config(example: &Path, target: &Path) -> anyhow::Result<()> {
    if !example.is_file() {
        anyhow::bail!("Example configuration {} not found", example.display());
    }
    fs::copy(example, target).with_context(|| {
        format!(
            "Failed to copy {} to {}",
            example.display(),
            target.display()
        )
    })?;
    Ok(())
}
