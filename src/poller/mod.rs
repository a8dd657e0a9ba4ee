//! Polling subsystem.
//!
//! # Data Flow
//! ```text
//! EngineConfig stream
//!     → diff.rs (deletions, additions)
//!     → engine.rs (kill deleted targets, spawn added ones)
//!     → registry.rs (resolve poll type, build target context)
//!     → per-target task: tick → poll (http.rs / noop.rs) → Handler
//!
//! Control service
//!     → monitor_config.rs (timer-driven refresh)
//!     → single-slot watch channel
//!     → manager (rebuilds EngineConfigs)
//! ```
//!
//! # Design Decisions
//! - One engine per target kind (caches, peers), generic over the target key
//! - Targets never share state; coordination is entirely through channels
//! - A target has at most one poll in flight

pub mod diff;
pub mod engine;
pub mod error;
pub mod handler;
pub mod http;
pub mod monitor_config;
pub mod noop;
pub mod registry;
pub mod types;

pub use diff::{diff_configs, ConfigDiff};
pub use engine::PollerEngine;
pub use error::PollError;
pub use handler::Handler;
pub use monitor_config::{MonitorConfigInputs, MonitorConfigPoller, SnapshotSlot};
pub use registry::{AppInfo, GlobalSettings, PollRequest, PollerRegistry, PollerType};
pub use types::{
    AddressFamily, EngineConfig, EngineSettings, PollOutcome, PollResponse, PollingProtocol, TargetConfig, TargetKey,
};
