//! Runtime settings shared by server and client.

use porthop_transport::StreamTuning;
use std::time::Duration;

/// Timing and socket settings of a running node
#[derive(Debug, Clone)]
pub struct NodeSettings {
    /// Reconciliation tick of the server
    pub tick_interval: Duration,

    /// Per-attempt timeout when dialing the target or a server candidate
    pub dial_timeout: Duration,

    /// Connect timeout of diagnostic TCP probes
    pub probe_timeout: Duration,

    /// Wait for the single reply of a forwarded datagram
    pub udp_reply_timeout: Duration,

    /// Wait for a reply to a diagnostic UDP probe
    pub udp_probe_timeout: Duration,

    /// Pause after an accept error that is not worth retrying at once
    pub accept_backoff: Duration,

    /// Options applied to every relayed TCP stream
    pub tuning: StreamTuning,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            dial_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(3),
            udp_reply_timeout: Duration::from_secs(5),
            udp_probe_timeout: Duration::from_secs(1),
            accept_backoff: Duration::from_millis(100),
            tuning: StreamTuning::default(),
        }
    }
}

impl NodeSettings {
    /// Whether the tick is too coarse to keep rotating ports covered.
    ///
    /// A newly valid window is only seen at the next tick, so the tick must
    /// not exceed the extension that precedes the window's period.
    #[must_use]
    pub fn tick_exceeds(&self, extension_secs: u32) -> bool {
        self.tick_interval > Duration::from_secs(u64::from(extension_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = NodeSettings::default();
        assert_eq!(settings.tick_interval, Duration::from_secs(5));
        assert_eq!(settings.dial_timeout, Duration::from_secs(5));
        assert_eq!(settings.probe_timeout, Duration::from_secs(3));
        assert_eq!(settings.udp_probe_timeout, Duration::from_secs(1));
        assert!(settings.tuning.nodelay);
    }

    #[test]
    fn test_tick_against_extension() {
        let settings = NodeSettings::default();
        assert!(!settings.tick_exceeds(15));
        assert!(!settings.tick_exceeds(5));
        assert!(settings.tick_exceeds(4));
        assert!(settings.tick_exceeds(0));
    }
}
