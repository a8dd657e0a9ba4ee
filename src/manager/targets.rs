//! Engine configurations derived from a monitoring snapshot.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::manager::intervals::{poll_intervals, IntervalError};
use crate::poller::{EngineConfig, EngineSettings, PollingProtocol, TargetConfig};
use crate::session::{CacheServer, MonitorSnapshot, MonitoringConfig};

/// Used when a profile has no (or a zero) health connection timeout.
pub const DEFAULT_HEALTH_CONNECTION_TIMEOUT: Duration = Duration::from_secs(2);

/// Cache statuses that are actively polled.
const POLLED_CACHE_STATUSES: [&str; 2] = ["REPORTED", "ADMIN_DOWN"];

const HOSTNAME_TEMPLATE: &str = "${hostname}";
const PEER_FORMAT: &str = "crstates";

/// Local settings the derivation depends on.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// This monitor's host name, as listed in the monitoring document.
    pub hostname: String,
    pub polling_format: String,
    pub default_poll_type: String,
    pub protocol: PollingProtocol,
    pub http_timeout: Duration,
    pub monitor_config_interval: Duration,
}

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Intervals(#[from] IntervalError),

    #[error("this monitor '{0}' is not listed in the monitoring config")]
    UnknownHost(String),
}

/// Everything one snapshot produces.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerUpdate {
    pub caches: EngineConfig<String>,
    pub peers: EngineConfig<String>,
    pub monitor_config_interval: Duration,
}

pub fn build_update(snapshot: &MonitorSnapshot, settings: &ManagerSettings) -> Result<ManagerUpdate, ManagerError> {
    let config = &snapshot.config;
    let intervals = poll_intervals(&config.parameters, settings.monitor_config_interval)?;

    let caches = EngineConfig {
        settings: EngineSettings {
            interval: intervals.health,
            no_keep_alive: intervals.health_no_keep_alive,
            protocol: settings.protocol,
        },
        targets: cache_targets(config, settings),
    };

    let peers = EngineConfig {
        settings: EngineSettings {
            interval: intervals.peer,
            no_keep_alive: intervals.peer_no_keep_alive,
            protocol: PollingProtocol::Ipv4Only,
        },
        targets: peer_targets(config, settings)?,
    };

    Ok(ManagerUpdate {
        caches,
        peers,
        monitor_config_interval: intervals.monitor_config,
    })
}

pub fn cache_targets(config: &MonitoringConfig, settings: &ManagerSettings) -> BTreeMap<String, TargetConfig> {
    let mut targets = BTreeMap::new();

    for (name, cache) in &config.caches {
        if !POLLED_CACHE_STATUSES.contains(&cache.status.as_str()) {
            continue;
        }

        let profile = config.profiles.get(&cache.profile).cloned().unwrap_or_default();
        if profile.health_polling_url.is_empty() {
            tracing::error!(cache = %name, profile = %cache.profile, "Profile has no health polling URL, not polling cache");
            continue;
        }

        let format = if profile.health_polling_format.is_empty() {
            settings.polling_format.clone()
        } else {
            profile.health_polling_format
        };
        let poll_type = if profile.health_polling_type.is_empty() {
            settings.default_poll_type.clone()
        } else {
            profile.health_polling_type
        };
        let timeout = match profile.health_connection_timeout_ms {
            0 => DEFAULT_HEALTH_CONNECTION_TIMEOUT,
            ms => Duration::from_millis(ms),
        };

        let (address, address_v6) = health_poll_urls(&profile.health_polling_url, cache);
        targets.insert(
            name.clone(),
            TargetConfig {
                address,
                address_v6,
                host: (!cache.fqdn.is_empty()).then(|| cache.fqdn.clone()),
                timeout,
                format,
                poll_type,
            },
        );
    }

    if targets.is_empty() {
        tracing::error!("No REPORTED caches in the monitoring config, nothing to poll");
    }
    targets
}

/// Other monitors with the same status as this one.
pub fn peer_targets(
    config: &MonitoringConfig,
    settings: &ManagerSettings,
) -> Result<BTreeMap<String, TargetConfig>, ManagerError> {
    let this = config
        .monitors
        .get(&settings.hostname)
        .ok_or_else(|| ManagerError::UnknownHost(settings.hostname.clone()))?;

    Ok(config
        .monitors
        .iter()
        .filter(|(name, monitor)| **name != settings.hostname && monitor.status == this.status)
        .map(|(name, monitor)| {
            let target = TargetConfig {
                address: format!("http://{}:{}/publish/CrStates?raw", monitor.fqdn, monitor.port),
                address_v6: String::new(),
                host: None,
                timeout: settings.http_timeout,
                format: PEER_FORMAT.to_string(),
                poll_type: settings.default_poll_type.clone(),
            };
            (name.clone(), target)
        })
        .collect())
}

/// Expand the profile's polling URL template for each address family.
/// A family without an address gets an empty URL.
pub fn health_poll_urls(template: &str, cache: &CacheServer) -> (String, String) {
    let v4 = if cache.ip.is_empty() {
        String::new()
    } else {
        insert_port(&template.replace(HOSTNAME_TEMPLATE, &cache.ip), cache.port)
    };

    let v6 = if cache.ip6.is_empty() {
        String::new()
    } else {
        let ip6 = cache.ip6.split('/').next().unwrap_or_default();
        insert_port(&template.replace(HOSTNAME_TEMPLATE, &format!("[{}]", ip6)), cache.port)
    };

    (v4, v6)
}

/// Add `port` unless the URL already names one.
fn insert_port(url: &str, port: u16) -> String {
    if port == 0 {
        return url.to_string();
    }
    match Url::parse(url) {
        // `Url::port` hides a default port written out explicitly, so look
        // at the raw authority too.
        Ok(mut parsed) if parsed.port().is_none() && !has_explicit_port(url) => {
            if parsed.set_port(Some(port)).is_err() {
                return url.to_string();
            }
            parsed.to_string()
        }
        Ok(_) => url.to_string(),
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "Health polling URL does not parse, using it without the server port");
            url.to_string()
        }
    }
}

fn has_explicit_port(url: &str) -> bool {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let after_host = match host_port.strip_prefix('[') {
        Some(bracketed) => bracketed.split_once(']').map_or("", |(_, tail)| tail),
        None => host_port,
    };
    after_host.contains(':')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MonitorServer, ProfileParameters, SnapshotStats};
    use serde_json::json;
    use std::time::SystemTime;

    fn settings() -> ManagerSettings {
        ManagerSettings {
            hostname: "tm1".into(),
            polling_format: "astats".into(),
            default_poll_type: "http".into(),
            protocol: PollingProtocol::Both,
            http_timeout: Duration::from_secs(2),
            monitor_config_interval: Duration::from_secs(5),
        }
    }

    fn cache(status: &str, ip6: &str, port: u16) -> CacheServer {
        CacheServer {
            fqdn: "edge1.example.net".into(),
            ip: "10.0.0.1".into(),
            ip6: ip6.into(),
            port,
            status: status.into(),
            profile: "EDGE".into(),
            cache_group: "east".into(),
        }
    }

    fn monitor(fqdn: &str, status: &str) -> MonitorServer {
        MonitorServer {
            fqdn: fqdn.into(),
            ip: "10.1.0.1".into(),
            ip6: String::new(),
            port: 80,
            status: status.into(),
            location: "east".into(),
        }
    }

    fn document() -> MonitoringConfig {
        let mut config = MonitoringConfig::default();
        config.caches.insert("edge1".into(), cache("REPORTED", "2001:db8::1/64", 0));
        config.caches.insert("edge2".into(), cache("ADMIN_DOWN", "", 8080));
        config.caches.insert("edge3".into(), cache("OFFLINE", "", 0));
        config.profiles.insert(
            "EDGE".into(),
            ProfileParameters {
                health_polling_url: "http://${hostname}/_astats?application=system".into(),
                health_polling_format: String::new(),
                health_polling_type: String::new(),
                health_connection_timeout_ms: 0,
            },
        );
        config.monitors.insert("tm1".into(), monitor("tm1.example.net", "ONLINE"));
        config.monitors.insert("tm2".into(), monitor("tm2.example.net", "ONLINE"));
        config.monitors.insert("tm3".into(), monitor("tm3.example.net", "OFFLINE"));
        config.parameters.insert("health.polling.interval".into(), json!(6000));
        config.parameters.insert("peers.polling.interval".into(), json!(10000));
        config
    }

    #[test]
    fn test_health_poll_urls() {
        let template = "http://${hostname}/_astats?application=system";
        let (v4, v6) = health_poll_urls(template, &cache("REPORTED", "2001:db8::1/64", 0));
        assert_eq!(v4, "http://10.0.0.1/_astats?application=system");
        assert_eq!(v6, "http://[2001:db8::1]/_astats?application=system");

        let (v4, v6) = health_poll_urls(template, &cache("REPORTED", "", 8080));
        assert_eq!(v4, "http://10.0.0.1:8080/_astats?application=system");
        assert_eq!(v6, "");

        // An explicit port in the template wins.
        let (v4, _) = health_poll_urls("http://${hostname}:81/stats", &cache("REPORTED", "", 8080));
        assert_eq!(v4, "http://10.0.0.1:81/stats");
    }

    #[test]
    fn test_explicit_default_port_is_kept() {
        let (v4, v6) = health_poll_urls("http://${hostname}:80/_astats", &cache("REPORTED", "2001:db8::1", 8080));
        assert_eq!(v4, "http://10.0.0.1:80/_astats");
        assert_eq!(v6, "http://[2001:db8::1]:80/_astats");

        assert!(has_explicit_port("https://user:pw@host:443/x"));
        assert!(!has_explicit_port("https://user:pw@host/x"));
        assert!(!has_explicit_port("http://[2001:db8::1]/x"));
    }

    #[test]
    fn test_cache_targets_filter_status() {
        let targets = cache_targets(&document(), &settings());
        let names: Vec<_> = targets.keys().cloned().collect();
        assert_eq!(names, vec!["edge1".to_string(), "edge2".to_string()]);

        let edge1 = &targets["edge1"];
        assert_eq!(edge1.host.as_deref(), Some("edge1.example.net"));
        assert_eq!(edge1.timeout, DEFAULT_HEALTH_CONNECTION_TIMEOUT);
        assert_eq!(edge1.format, "astats");
        assert_eq!(edge1.poll_type, "http");
    }

    #[test]
    fn test_cache_without_profile_url_is_skipped() {
        let mut config = document();
        config.caches.get_mut("edge1").unwrap().profile = "MISSING".into();
        let targets = cache_targets(&config, &settings());
        assert!(!targets.contains_key("edge1"));
    }

    #[test]
    fn test_peer_targets() {
        let targets = peer_targets(&document(), &settings()).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets["tm2"].address, "http://tm2.example.net:80/publish/CrStates?raw");

        let mut other = settings();
        other.hostname = "tm9".into();
        assert!(matches!(
            peer_targets(&document(), &other),
            Err(ManagerError::UnknownHost(_))
        ));
    }

    #[test]
    fn test_build_update() {
        let snapshot = MonitorSnapshot {
            tenant: "cdn1".into(),
            config: document(),
            stats: SnapshotStats::new("cdn1", 1),
            received_at: SystemTime::now(),
        };
        let update = build_update(&snapshot, &settings()).unwrap();
        assert_eq!(update.caches.settings.interval, Duration::from_millis(5820));
        assert_eq!(update.caches.settings.protocol, PollingProtocol::Both);
        assert_eq!(update.peers.settings.interval, Duration::from_millis(9700));
        assert_eq!(update.peers.settings.protocol, PollingProtocol::Ipv4Only);
        assert_eq!(update.monitor_config_interval, Duration::from_millis(4850));

        let mut broken = snapshot.clone();
        broken.config.parameters.clear();
        assert!(matches!(
            build_update(&broken, &settings()),
            Err(ManagerError::Intervals(_))
        ));
    }
}
