//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the monitor.
//! All types derive Serde traits for deserialization from config files.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::poller::PollingProtocol;

pub const DEFAULT_MONITOR_CONFIG_INTERVAL: Duration = Duration::from_secs(5);

/// Root configuration for the monitor.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Control-service connection.
    pub control: ControlConfig,

    /// Monitoring behaviour.
    pub monitor: MonitorConfig,

    /// Availability thresholds.
    pub health: HealthConfig,

    /// Restart policy for the monitor-config poller.
    pub supervisor: SupervisorConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Control-service connection settings.
#[derive(Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ControlConfig {
    /// Base URL (e.g., "https://ops.example.net").
    pub url: String,

    pub username: String,

    pub password: String,

    /// Accept invalid TLS certificates.
    pub insecure: bool,

    /// Request timeout in milliseconds.
    pub timeout_ms: u64,

    pub user_agent: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            insecure: false,
            timeout_ms: 10_000,
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }
}

impl std::fmt::Debug for ControlConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("insecure", &self.insecure)
            .field("timeout_ms", &self.timeout_ms)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Monitoring behaviour.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Tenant (CDN) to monitor.
    pub tenant: String,

    /// This monitor's host name as listed in the monitoring document.
    /// Empty means the system host name.
    pub hostname: String,

    /// Monitoring-config refresh interval in milliseconds, used until the
    /// document supplies one.
    pub monitor_config_interval_ms: u64,

    /// Default poll timeout in milliseconds.
    pub http_timeout_ms: u64,

    /// Payload format when a profile names none.
    pub http_polling_format: String,

    /// Poll type used when a target's type is empty or unknown.
    pub default_poll_type: String,

    /// Address families used for cache polling.
    pub polling_protocol: PollingProtocol,

    /// Capacity of the snapshot audit history.
    pub snapshot_history_count: usize,

    /// Backup of the last snapshot document.
    pub snapshot_backup_file: Option<PathBuf>,

    /// Backup of the last monitoring document.
    pub monitoring_backup_file: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tenant: String::new(),
            hostname: String::new(),
            monitor_config_interval_ms: DEFAULT_MONITOR_CONFIG_INTERVAL.as_millis() as u64,
            http_timeout_ms: 2_000,
            http_polling_format: "astats".to_string(),
            default_poll_type: "http".to_string(),
            polling_protocol: PollingProtocol::Both,
            snapshot_history_count: 20_000,
            snapshot_backup_file: None,
            monitoring_backup_file: None,
        }
    }
}

impl MonitorConfig {
    pub fn monitor_config_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_config_interval_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

/// Availability thresholds.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct HealthConfig {
    /// Number of consecutive successes before marking available.
    pub available_threshold: u32,

    /// Number of consecutive failures before marking unavailable.
    pub unavailable_threshold: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            available_threshold: 1,
            unavailable_threshold: 2,
        }
    }
}

/// Supervised restart policy.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Restarts allowed within `window_secs` before giving up.
    pub max_restarts: u32,

    pub window_secs: u64,

    /// Delay before each restart in milliseconds.
    pub backoff_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            window_secs: 60,
            backoff_ms: 1_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
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
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn metrics_socket_addr(&self) -> Option<SocketAddr> {
        self.metrics_address.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [control]
            url = "https://ops.example.net"

            [monitor]
            tenant = "cdn1"
            "#,
        )
        .unwrap();

        assert_eq!(config.monitor.tenant, "cdn1");
        assert_eq!(config.monitor.monitor_config_interval(), Duration::from_secs(5));
        assert_eq!(config.monitor.http_timeout(), Duration::from_secs(2));
        assert_eq!(config.monitor.snapshot_history_count, 20_000);
        assert_eq!(config.monitor.polling_protocol, PollingProtocol::Both);
        assert_eq!(config.control.timeout_ms, 10_000);
        assert_eq!(config.health, HealthConfig::default());
    }

    #[test]
    fn test_polling_protocol_names() {
        let config: AppConfig = toml::from_str("[monitor]\npolling_protocol = \"ipv6_only\"\n").unwrap();
        assert_eq!(config.monitor.polling_protocol, PollingProtocol::Ipv6Only);
    }

    #[test]
    fn test_debug_redacts_password() {
        let control = ControlConfig {
            password: "hunter2".into(),
            ..ControlConfig::default()
        };
        assert!(!format!("{:?}", control).contains("hunter2"));
    }
}
