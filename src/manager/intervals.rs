//! Polling intervals from monitoring-document parameters.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

/// Intervals are shortened to 97% so the poll lands just before the target
/// time rather than just after it.
const POLL_INTERVAL_PERCENT: u128 = 97;

pub const HEALTH_INTERVAL_PARAM: &str = "health.polling.interval";
pub const HEARTBEAT_INTERVAL_PARAM: &str = "heartbeat.polling.interval";
pub const PEER_INTERVAL_PARAM: &str = "peers.polling.interval";
pub const MONITOR_CONFIG_INTERVAL_PARAM: &str = "tm.polling.interval";
pub const HEALTH_KEEPALIVE_PARAM: &str = "health.polling.keepalive";
pub const PEER_KEEPALIVE_PARAM: &str = "peer.polling.keepalive";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub health: Duration,
    pub health_no_keep_alive: bool,
    pub peer: Duration,
    pub peer_no_keep_alive: bool,
    pub monitor_config: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntervalError {
    #[error("monitoring config missing '{0}'")]
    Missing(&'static str),

    #[error("monitoring config '{name}' value '{value}' is not a non-negative number of milliseconds")]
    Invalid { name: &'static str, value: String },
}

fn millis(value: &serde_json::Value) -> Option<Duration> {
    if let Some(ms) = value.as_u64() {
        return Some(Duration::from_millis(ms));
    }
    let ms = value.as_f64()?;
    (ms.is_finite() && ms >= 0.0).then(|| Duration::from_secs_f64(ms / 1000.0))
}

fn scaled(interval: Duration) -> Duration {
    let nanos = interval.as_nanos() * POLL_INTERVAL_PERCENT / 100;
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

fn required(params: &HashMap<String, serde_json::Value>, name: &'static str) -> Result<Duration, IntervalError> {
    let value = params.get(name).ok_or(IntervalError::Missing(name))?;
    millis(value).ok_or_else(|| IntervalError::Invalid {
        name,
        value: value.to_string(),
    })
}

/// `name` if present and numeric, else `fallback`.
fn optional(params: &HashMap<String, serde_json::Value>, name: &str, fallback: Duration) -> Duration {
    match params.get(name) {
        None => fallback,
        Some(value) => millis(value).unwrap_or_else(|| {
            tracing::warn!(value = %value, fallback = ?fallback, "Invalid '{}' parameter, using fallback", name);
            fallback
        }),
    }
}

/// Keep-alive stays on unless the parameter is a string not starting with `t`.
fn no_keep_alive(params: &HashMap<String, serde_json::Value>, name: &str) -> bool {
    params
        .get(name)
        .and_then(|value| value.as_str())
        .is_some_and(|value| !value.to_ascii_lowercase().starts_with('t'))
}

/// Compute the scaled intervals. `monitor_config_fallback` is used when the
/// document has no usable monitor-config interval.
pub fn poll_intervals(
    params: &HashMap<String, serde_json::Value>,
    monitor_config_fallback: Duration,
) -> Result<PollIntervals, IntervalError> {
    let peer = required(params, PEER_INTERVAL_PARAM)?;
    let health = required(params, HEALTH_INTERVAL_PARAM)?;
    // The heartbeat drives the health engine; documents without one poll at
    // the health interval.
    let heartbeat = optional(params, HEARTBEAT_INTERVAL_PARAM, health);
    let monitor_config = optional(params, MONITOR_CONFIG_INTERVAL_PARAM, monitor_config_fallback);

    Ok(PollIntervals {
        health: scaled(heartbeat),
        health_no_keep_alive: no_keep_alive(params, HEALTH_KEEPALIVE_PARAM),
        peer: scaled(peer),
        peer_no_keep_alive: no_keep_alive(params, PEER_KEEPALIVE_PARAM),
        monitor_config: scaled(monitor_config),
    })
}
