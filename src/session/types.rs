//! Control-service document types and errors.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::schema::{AppConfig, ControlConfig};

/// Freshness stats embedded in a delivery snapshot document.
///
/// Everything else in the document is opaque to the monitor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotStats {
    /// Tenant (CDN) the snapshot was generated for.
    #[serde(rename = "CDN_name", default)]
    pub tenant: Option<String>,

    /// Generation time, seconds since the Unix epoch.
    #[serde(rename = "date", default)]
    pub date: Option<i64>,
}

impl SnapshotStats {
    pub fn new(tenant: impl Into<String>, date: i64) -> Self {
        Self {
            tenant: Some(tenant.into()),
            date: Some(date),
        }
    }

    /// Extract the stats sub-structure of a raw snapshot document.
    pub fn from_document(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct Envelope {
            #[serde(default)]
            stats: SnapshotStats,
        }
        serde_json::from_slice::<Envelope>(bytes).map(|envelope| envelope.stats)
    }
}

/// A raw snapshot document as returned by the control service.
#[derive(Debug, Clone)]
pub struct RawSnapshot {
    pub bytes: Bytes,
    /// Address of the control-service instance that answered, for auditing.
    pub remote_addr: Option<String>,
}

/// A cache server entry of the monitoring document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheServer {
    pub fqdn: String,
    pub ip: String,
    pub ip6: String,
    pub port: u16,
    pub status: String,
    pub profile: String,
    pub cache_group: String,
}

/// A monitor (peer) entry of the monitoring document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorServer {
    pub fqdn: String,
    pub ip: String,
    pub ip6: String,
    pub port: u16,
    pub status: String,
    pub location: String,
}

/// Polling parameters attached to a cache profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileParameters {
    pub health_polling_url: String,
    pub health_polling_format: String,
    pub health_polling_type: String,
    pub health_connection_timeout_ms: u64,
}

/// The monitoring configuration document for one tenant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub caches: BTreeMap<String, CacheServer>,
    pub monitors: BTreeMap<String, MonitorServer>,
    pub profiles: BTreeMap<String, ProfileParameters>,
    /// Free-form parameters (`health.polling.interval`, ...).
    pub parameters: HashMap<String, serde_json::Value>,
}

/// A tenant's monitoring configuration merged with the freshness stats of
/// its latest validated snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSnapshot {
    pub tenant: String,
    pub config: MonitoringConfig,
    pub stats: SnapshotStats,
    pub received_at: SystemTime,
}

/// Connection details plus the tenant this monitor serves.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct OpsConfig {
    pub control: ControlConfig,
    pub tenant: String,
}

impl From<&AppConfig> for OpsConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            control: config.control.clone(),
            tenant: config.monitor.tenant.clone(),
        }
    }
}

impl std::fmt::Debug for OpsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpsConfig")
            .field("url", &self.control.url)
            .field("username", &self.control.username)
            .field("tenant", &self.tenant)
            .finish_non_exhaustive()
    }
}

/// Reasons a snapshot is refused by the freshness cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FreshnessError {
    #[error("snapshot stats missing tenant")]
    MissingTenant,

    #[error("snapshot stats missing date")]
    MissingDate,

    #[error("snapshot tenant '{received}' differs from last accepted tenant '{accepted}'")]
    CrossTenant { received: String, accepted: String },

    #[error("snapshot date {received} older than last accepted date {accepted}")]
    Regression { received: i64, accepted: i64 },
}

/// Errors talking to the control service.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("nil session")]
    NilSession,

    #[error("invalid control service URL '{0}'")]
    InvalidUrl(String),

    #[error("control service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("control service returned status {0}")]
    Status(u16),

    #[error("invalid document: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("backup file: {0}")]
    Backup(#[from] std::io::Error),

    #[error("invalid snapshot: {0}")]
    Freshness(#[from] FreshnessError),
}

/// Default HTTP timeout for control-service requests.
pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_secs(10);
