//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, thresholds >= 1, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use url::Url;

use crate::config::schema::AppConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !config.control.url.is_empty() {
        match Url::parse(&config.control.url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(ValidationError::new(
                "control.url",
                format!("unsupported scheme '{}'", url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new("control.url", e.to_string())),
        }
    }

    let monitor = &config.monitor;
    if monitor.monitor_config_interval_ms == 0 {
        errors.push(ValidationError::new("monitor.monitor_config_interval_ms", "must be greater than 0"));
    }
    if monitor.http_timeout_ms == 0 {
        errors.push(ValidationError::new("monitor.http_timeout_ms", "must be greater than 0"));
    }
    if monitor.default_poll_type.is_empty() {
        errors.push(ValidationError::new("monitor.default_poll_type", "must not be empty"));
    }

    if config.health.available_threshold == 0 {
        errors.push(ValidationError::new("health.available_threshold", "must be at least 1"));
    }
    if config.health.unavailable_threshold == 0 {
        errors.push(ValidationError::new("health.unavailable_threshold", "must be at least 1"));
    }

    if config.supervisor.window_secs == 0 {
        errors.push(ValidationError::new("supervisor.window_secs", "must be greater than 0"));
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_socket_addr().is_none() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
