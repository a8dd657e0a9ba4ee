//! Metrics collection and exposition.
//!
//! # Metrics
//! - `monitor_polls_total` (counter): polls by engine and result
//! - `monitor_poll_duration_seconds` (histogram): round-trip time by engine
//! - `monitor_skipped_ticks_total` (counter): ticks gated by address family
//! - `monitor_tick_drift_total` (counter): ticks later than interval + slack
//! - `monitor_target_available` (gauge): 1=available, 0=unavailable
//! - `monitor_config_published_total` (counter): monitoring snapshots published
//! - `monitor_snapshot_rejected_total` (counter): stale or cross-tenant snapshots
//! - `monitor_supervisor_restarts_total` (counter): supervised task restarts

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_poll(engine: &str, success: bool, elapsed: Duration) {
    let result = if success { "success" } else { "error" };
    counter!("monitor_polls_total", "engine" => engine.to_string(), "result" => result).increment(1);
    histogram!("monitor_poll_duration_seconds", "engine" => engine.to_string()).record(elapsed.as_secs_f64());
}

pub fn record_skipped_tick(engine: &str) {
    counter!("monitor_skipped_ticks_total", "engine" => engine.to_string()).increment(1);
}

pub fn record_tick_drift(engine: &str) {
    counter!("monitor_tick_drift_total", "engine" => engine.to_string()).increment(1);
}

pub fn record_target_available(target: &str, available: bool) {
    gauge!("monitor_target_available", "target" => target.to_string()).set(if available { 1.0 } else { 0.0 });
}

pub fn record_config_published(tenant: &str) {
    counter!("monitor_config_published_total", "tenant" => tenant.to_string()).increment(1);
}

pub fn record_snapshot_rejected(tenant: &str) {
    counter!("monitor_snapshot_rejected_total", "tenant" => tenant.to_string()).increment(1);
}

pub fn record_supervisor_restart(task: &str) {
    counter!("monitor_supervisor_restarts_total", "task" => task.to_string()).increment(1);
}
