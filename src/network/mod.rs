//! Network module - Handles the TCP link to the server
//!
//! Provides:
//! - Client session with connect/disconnect/receive/heartbeat callbacks
//! - Streaming frame reader for the receive path
//! - Connection link shared by the send path and the heartbeat timer

mod client;
mod connection;
mod reader;

pub use client::*;
pub use connection::*;
pub use reader::*;

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::protocol::DEFAULT_PORT;

/// Default heartbeat interval in milliseconds
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 10 * 1000;

/// Configuration for network operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Server address (`host:port`) used by `Client::connect`
    #[serde(default)]
    pub address: Option<String>,
    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Heartbeat interval in milliseconds; 0 disables the timer
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_heartbeat_interval() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            address: None,
            connect_timeout_ms: default_connect_timeout(),
            heartbeat_interval_ms: default_heartbeat_interval(),
        }
    }
}

impl NetworkConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..Default::default()
        }
    }

    pub fn with_heartbeat_interval(mut self, interval_ms: u64) -> Self {
        self.heartbeat_interval_ms = interval_ms;
        self
    }

    pub fn without_heartbeat(mut self) -> Self {
        self.heartbeat_interval_ms = 0;
        self
    }

    pub fn with_connect_timeout(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }
}

/// Resolve `host:port` (or a bare host, using the default port) to a socket address
pub async fn resolve_address(addr: &str) -> std::io::Result<SocketAddr> {
    use tokio::net::lookup_host;

    if let Ok(addr) = addr.parse::<SocketAddr>() {
        return Ok(addr);
    }

    let host_port = if addr.contains(':') {
        addr.to_string()
    } else {
        format!("{}:{}", addr, DEFAULT_PORT)
    };

    let resolved = lookup_host(host_port.as_str()).await?.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Could not resolve host: {}", addr),
        )
    });
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_literal() {
        let addr = resolve_address("127.0.0.1:3553").await.unwrap();
        assert_eq!(addr.port(), 3553);
    }

    #[tokio::test]
    async fn test_resolve_default_port() {
        let addr = resolve_address("127.0.0.1").await.unwrap();
        assert_eq!(addr.port(), DEFAULT_PORT);
    }

    #[tokio::test]
    async fn test_resolve_hostname() {
        let addr = resolve_address("localhost:4000").await.unwrap();
        assert_eq!(addr.port(), 4000);

        let addr = resolve_address("localhost").await.unwrap();
        assert_eq!(addr.port(), DEFAULT_PORT);
    }

    #[test]
    fn test_config_builders() {
        let config = NetworkConfig::new("example.com:1234")
            .with_heartbeat_interval(250)
            .with_connect_timeout(100);
        assert_eq!(config.address.as_deref(), Some("example.com:1234"));
        assert_eq!(config.heartbeat_interval_ms, 250);
        assert_eq!(config.connect_timeout_ms, 100);
        assert_eq!(config.without_heartbeat().heartbeat_interval_ms, 0);
    }
}
