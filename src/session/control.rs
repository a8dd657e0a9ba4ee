//! Thread-safe facade over the live control-service session.
//!
//! # Responsibilities
//! - Hold the current session, swappable at runtime without blocking readers
//! - Run every fetched snapshot through the freshness cache and audit it
//! - Keep on-disk backups of the last good documents and fall back to them
//!   when the control service is unreachable

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use arc_swap::ArcSwapOption;
use bytes::Bytes;

use crate::observability::metrics;
use crate::session::client::Session;
use crate::session::freshness::FreshnessCache;
use crate::session::history::{AuditEntry, AuditHistory};
use crate::session::types::{MonitoringConfig, SessionError, SnapshotStats};

/// Remote address recorded when a document came from a backup file.
pub const BACKUP_REMOTE_ADDR: &str = "127.0.0.1";

/// Where the last good documents are mirrored. `None` disables a backup.
#[derive(Debug, Clone, Default)]
pub struct BackupFiles {
    pub snapshot: Option<PathBuf>,
    pub monitoring: Option<PathBuf>,
}

struct Installed(Arc<dyn Session>);

struct Inner {
    session: ArcSwapOption<Installed>,
    freshness: FreshnessCache,
    history: AuditHistory,
    backups: BackupFiles,
}

#[derive(Clone)]
pub struct ControlSession {
    inner: Arc<Inner>,
}

impl ControlSession {
    pub fn new(history_limit: usize, backups: BackupFiles) -> Self {
        Self {
            inner: Arc::new(Inner {
                session: ArcSwapOption::empty(),
                freshness: FreshnessCache::new(),
                history: AuditHistory::new(history_limit),
                backups,
            }),
        }
    }

    /// Swap in a new session. In-flight calls keep the one they started with.
    pub fn set_session(&self, session: Arc<dyn Session>) {
        self.inner.session.store(Some(Arc::new(Installed(session))));
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.session.load().is_some()
    }

    fn session(&self) -> Result<Arc<dyn Session>, SessionError> {
        self.inner
            .session
            .load()
            .as_ref()
            .map(|installed| installed.0.clone())
            .ok_or(SessionError::NilSession)
    }

    pub fn freshness(&self) -> &FreshnessCache {
        &self.inner.freshness
    }

    /// Audit entries, oldest to newest.
    pub fn snapshot_history(&self) -> Vec<AuditEntry> {
        self.inner.history.entries()
    }

    /// The last accepted snapshot for `tenant` and when it was received.
    /// Fetches once if nothing has been accepted yet.
    pub async fn last_snapshot(&self, tenant: &str) -> Result<(Bytes, SystemTime), SessionError> {
        if let Some(record) = self.inner.freshness.get(tenant) {
            return Ok((record.bytes, record.received_at));
        }
        let bytes = self.snapshot_raw(tenant).await?;
        let received_at = self
            .inner
            .freshness
            .get(tenant)
            .map_or_else(SystemTime::now, |record| record.received_at);
        Ok((bytes, received_at))
    }

    /// Fetch the monitoring configuration, falling back to the backup file.
    pub async fn monitoring_config(&self, tenant: &str) -> Result<MonitoringConfig, SessionError> {
        let session = self.session()?;
        match session.monitoring_config(tenant).await {
            Ok(config) => {
                if let Some(path) = &self.inner.backups.monitoring {
                    match serde_json::to_vec(&config) {
                        Ok(bytes) => write_backup(path, &bytes).await,
                        Err(e) => tracing::warn!(error = %e, "Failed to encode monitoring config backup"),
                    }
                }
                Ok(config)
            }
            Err(e) => {
                let Some(path) = &self.inner.backups.monitoring else {
                    return Err(e);
                };
                if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                    return Err(e);
                }
                tracing::error!(error = %e, path = %path.display(), "Fetching monitoring config failed, using backup");
                let bytes = tokio::fs::read(path).await?;
                Ok(serde_json::from_slice(&bytes)?)
            }
        }
    }

    /// Fetch the raw snapshot, validate it for freshness and record the
    /// attempt in the audit history.
    ///
    /// Returns the document bytes only if it was accepted.
    pub async fn snapshot_raw(&self, tenant: &str) -> Result<Bytes, SessionError> {
        let session = self.session()?;
        let requested_at = SystemTime::now();

        let (bytes, remote_addr) = match session.snapshot_raw(tenant).await {
            Ok(raw) => {
                if let Some(path) = &self.inner.backups.snapshot {
                    write_backup(path, &raw.bytes).await;
                }
                (raw.bytes, raw.remote_addr.unwrap_or_default())
            }
            Err(e) => {
                let Some(path) = &self.inner.backups.snapshot else {
                    return Err(e);
                };
                if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                    return Err(e);
                }
                tracing::error!(error = %e, path = %path.display(), "Fetching snapshot failed, using backup");
                let bytes = Bytes::from(tokio::fs::read(path).await?);
                (bytes, BACKUP_REMOTE_ADDR.to_string())
            }
        };

        let mut entry = AuditEntry {
            requested_at,
            remote_addr,
            stats: SnapshotStats::default(),
            error: None,
        };
        let result = self.accept(tenant, bytes, &mut entry);
        if let Err(e) = &result {
            entry.error = Some(e.to_string());
        }
        self.inner.history.record(entry);
        result
    }

    fn accept(&self, tenant: &str, bytes: Bytes, entry: &mut AuditEntry) -> Result<Bytes, SessionError> {
        let stats = SnapshotStats::from_document(&bytes)?;
        entry.stats = stats.clone();

        if let Err(e) = self.inner.freshness.validate_and_set(tenant, bytes.clone(), stats) {
            tracing::warn!(tenant = %tenant, remote = %entry.remote_addr, error = %e, "Rejected snapshot");
            metrics::record_snapshot_rejected(tenant);
            return Err(e.into());
        }
        Ok(bytes)
    }
}

async fn write_backup(path: &Path, bytes: &[u8]) {
    if let Err(e) = tokio::fs::write(path, bytes).await {
        tracing::warn!(error = %e, path = %path.display(), "Failed to write backup file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::{FreshnessError, RawSnapshot};
    use futures_util::future::BoxFuture;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Serves canned snapshot documents in order, then fails.
    #[derive(Default)]
    struct ScriptedSession {
        snapshots: Mutex<VecDeque<Result<RawSnapshot, SessionError>>>,
        monitoring: Mutex<Option<MonitoringConfig>>,
    }

    impl ScriptedSession {
        fn with_snapshots(docs: &[(&str, i64)]) -> Self {
            let session = Self::default();
            for (tenant, date) in docs {
                session.snapshots.lock().push_back(Ok(snapshot(tenant, *date, "10.1.1.1:443")));
            }
            session
        }
    }

    impl Session for ScriptedSession {
        fn monitoring_config<'a>(&'a self, _tenant: &'a str) -> BoxFuture<'a, Result<MonitoringConfig, SessionError>> {
            Box::pin(async move { self.monitoring.lock().clone().ok_or(SessionError::Status(503)) })
        }

        fn snapshot_raw<'a>(&'a self, _tenant: &'a str) -> BoxFuture<'a, Result<RawSnapshot, SessionError>> {
            Box::pin(async move { self.snapshots.lock().pop_front().unwrap_or(Err(SessionError::Status(503))) })
        }
    }

    fn snapshot(tenant: &str, date: i64, addr: &str) -> RawSnapshot {
        let doc = serde_json::json!({ "stats": { "CDN_name": tenant, "date": date } });
        RawSnapshot {
            bytes: Bytes::from(doc.to_string()),
            remote_addr: Some(addr.to_string()),
        }
    }

    #[tokio::test]
    async fn test_nil_session() {
        let control = ControlSession::new(10, BackupFiles::default());
        assert!(!control.is_initialized());
        assert!(matches!(control.snapshot_raw("cdn1").await, Err(SessionError::NilSession)));
        assert!(matches!(control.monitoring_config("cdn1").await, Err(SessionError::NilSession)));
        assert!(control.snapshot_history().is_empty());
    }

    #[tokio::test]
    async fn test_stale_snapshot_rejected_and_audited() {
        let control = ControlSession::new(10, BackupFiles::default());
        control.set_session(Arc::new(ScriptedSession::with_snapshots(&[
            ("cdn1", 100),
            ("cdn1", 50),
            ("cdn1", 150),
        ])));
        assert!(control.is_initialized());

        control.snapshot_raw("cdn1").await.unwrap();
        let err = control.snapshot_raw("cdn1").await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Freshness(FreshnessError::Regression { received: 50, accepted: 100 })
        ));
        control.snapshot_raw("cdn1").await.unwrap();

        let history = control.snapshot_history();
        let dates: Vec<_> = history.iter().filter_map(|e| e.stats.date).collect();
        assert_eq!(dates, vec![100, 50, 150]);
        assert!(history[0].error.is_none());
        assert!(history[1].error.is_some());

        let (bytes, _) = control.last_snapshot("cdn1").await.unwrap();
        assert_eq!(SnapshotStats::from_document(&bytes).unwrap().date, Some(150));
    }

    #[tokio::test]
    async fn test_cross_tenant_snapshot_rejected() {
        let control = ControlSession::new(10, BackupFiles::default());
        control.set_session(Arc::new(ScriptedSession::with_snapshots(&[("cdn1", 100), ("cdn2", 200)])));

        control.snapshot_raw("cdn1").await.unwrap();
        assert!(matches!(
            control.snapshot_raw("cdn1").await,
            Err(SessionError::Freshness(FreshnessError::CrossTenant { .. }))
        ));
        let (bytes, _) = control.last_snapshot("cdn1").await.unwrap();
        assert_eq!(SnapshotStats::from_document(&bytes).unwrap().date, Some(100));
    }

    #[tokio::test]
    async fn test_snapshot_backup_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let backups = BackupFiles {
            snapshot: Some(dir.path().join("snapshot.json")),
            monitoring: Some(dir.path().join("monitoring.json")),
        };
        let control = ControlSession::new(10, backups.clone());
        control.set_session(Arc::new(ScriptedSession::with_snapshots(&[("cdn1", 100)])));

        control.snapshot_raw("cdn1").await.unwrap();
        assert!(backups.snapshot.as_ref().unwrap().exists());

        // The session is now exhausted; the backup is served instead. Its
        // date equals the cached one so it is accepted.
        control.snapshot_raw("cdn1").await.unwrap();
        let history = control.snapshot_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].remote_addr, BACKUP_REMOTE_ADDR);
    }

    #[tokio::test]
    async fn test_last_snapshot_fetches_when_empty() {
        let control = ControlSession::new(10, BackupFiles::default());
        control.set_session(Arc::new(ScriptedSession::with_snapshots(&[("cdn1", 100)])));

        let (bytes, _) = control.last_snapshot("cdn1").await.unwrap();
        assert_eq!(SnapshotStats::from_document(&bytes).unwrap().date, Some(100));
        // Served from the cache; the scripted session is exhausted.
        control.last_snapshot("cdn1").await.unwrap();
        assert_eq!(control.snapshot_history().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_error_without_backup() {
        let control = ControlSession::new(10, BackupFiles::default());
        control.set_session(Arc::new(ScriptedSession::default()));
        assert!(matches!(control.snapshot_raw("cdn1").await, Err(SessionError::Status(503))));
        assert!(control.snapshot_history().is_empty());
    }

    #[tokio::test]
    async fn test_monitoring_backup_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitoring.json");
        let backups = BackupFiles {
            snapshot: None,
            monitoring: Some(path.clone()),
        };
        let control = ControlSession::new(10, backups);

        let session = Arc::new(ScriptedSession::default());
        let mut config = MonitoringConfig::default();
        config.parameters.insert("health.polling.interval".into(), serde_json::json!(6000));
        *session.monitoring.lock() = Some(config.clone());
        control.set_session(session.clone());

        assert_eq!(control.monitoring_config("cdn1").await.unwrap(), config);
        assert!(path.exists());

        *session.monitoring.lock() = None;
        assert_eq!(control.monitoring_config("cdn1").await.unwrap(), config);
    }
}
