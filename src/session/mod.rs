//! Control-service session and snapshot freshness.
//!
//! # Data Flow
//! ```text
//! Session (client.rs) → ControlSession (control.rs)
//!     → FreshnessCache::validate (freshness.rs)
//!     → AuditHistory::record (history.rs)
//!     → FreshnessCache::set (accepted only)
//! ```

pub mod client;
pub mod control;
pub mod freshness;
pub mod history;
pub mod types;

pub use client::{HttpSession, Session};
pub use control::{BackupFiles, ControlSession};
pub use freshness::{FreshnessCache, FreshnessRecord};
pub use history::{AuditEntry, AuditHistory};
pub use types::{
    CacheServer, FreshnessError, MonitorServer, MonitorSnapshot, MonitoringConfig, OpsConfig, ProfileParameters,
    RawSnapshot, SessionError, SnapshotStats,
};
