//! Proxy configuration

use std::time::Duration;

use pppoxy_core::Mode;

/// Fixed delay between client reconnect attempts
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Interval between client keepalive pings
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for a [`crate::Proxy`]
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Which side of the tunnel this proxy is
    pub mode: Mode,
    /// Listen address (server) or dial target (client)
    pub address: String,
    /// Source IP admitted by the server; connections from any other address
    /// are closed without a response. Unused in client mode.
    pub allowed_ip: Option<String>,
    /// Delay before each reconnect attempt. Fixed, no backoff growth and no
    /// jitter.
    pub reconnect_delay: Duration,
    /// How often the client pings an idle upstream
    pub keepalive_interval: Duration,
}

impl ProxyConfig {
    /// Server-side configuration: listen on `address`, admit `allowed_ip`
    pub fn server(address: impl Into<String>, allowed_ip: impl Into<String>) -> Self {
        Self {
            mode: Mode::Server,
            address: address.into(),
            allowed_ip: Some(allowed_ip.into()),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
        }
    }

    /// Client-side configuration: dial `address`
    pub fn client(address: impl Into<String>) -> Self {
        Self {
            mode: Mode::Client,
            address: address.into(),
            allowed_ip: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config() {
        let config = ProxyConfig::server("0.0.0.0:7000", "203.0.113.5");
        assert_eq!(config.mode, Mode::Server);
        assert_eq!(config.allowed_ip.as_deref(), Some("203.0.113.5"));
        assert_eq!(config.reconnect_delay, DEFAULT_RECONNECT_DELAY);
        assert_eq!(config.keepalive_interval, DEFAULT_KEEPALIVE_INTERVAL);
    }

    #[test]
    fn test_client_config() {
        let config = ProxyConfig::client("198.51.100.7:7000");
        assert_eq!(config.mode, Mode::Client);
        assert!(config.allowed_ip.is_none());
    }
}
