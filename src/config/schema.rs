//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Client-facing listener.
    pub listener: ListenerConfig,

    /// Backend database connection settings.
    pub backend: BackendConfig,

    /// Plotter UI directory served on every other path.
    pub static_files: StaticFilesConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Largest accepted `/data` request body.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 4096,
        }
    }
}

/// Backend database configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend address (e.g., "localhost:4410").
    pub address: String,

    /// Number of persistent connections.
    pub connections: usize,

    /// Maximum requests awaiting a backend reply at once.
    pub max_pending: usize,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Per-request deadline in milliseconds; 0 waits indefinitely.
    pub request_timeout_ms: u64,
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        match self.request_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            address: "localhost:4410".to_string(),
            connections: 2,
            max_pending: 8,
            connect_timeout_secs: 5,
            request_timeout_ms: 0,
        }
    }
}

/// Static asset configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticFilesConfig {
    /// Serve the plotter directory as the router fallback.
    pub enabled: bool,

    /// Directory holding the plotting UI.
    pub plotter_dir: String,
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            plotter_dir: "plotter".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.backend.address, "localhost:4410");
        assert_eq!(config.backend.connections, 2);
        assert_eq!(config.backend.max_pending, 8);
        assert!(config.backend.request_timeout().is_none());
    }

    #[test]
    fn test_partial_toml() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [backend]
            address = "quasar:4410"
            request_timeout_ms = 2500

            [static_files]
            plotter_dir = "/srv/plotter"
            "#,
        )
        .unwrap();
        assert_eq!(config.backend.address, "quasar:4410");
        assert_eq!(config.backend.connections, 2);
        assert_eq!(
            config.backend.request_timeout(),
            Some(Duration::from_millis(2500))
        );
        assert_eq!(config.static_files.plotter_dir, "/srv/plotter");
        assert!(config.static_files.enabled);
    }
}
