//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Engines, poller, manager, supervisor produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Metrics calls are cheap no-ops until an exporter is installed
//! - The exporter is optional and configured under `[observability]`

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;
