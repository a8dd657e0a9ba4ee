//! Monitoring-configuration poller.
//!
//! # Responsibilities
//! - Periodically fetch the tenant's monitoring configuration and snapshot
//! - Force every fetched snapshot through the freshness cache
//! - Publish the merged result through a single-slot channel
//!
//! # Design Decisions
//! - Inputs are `watch` channels: a restarted loop starts from the latest
//!   tenant, session and interval, and a closed input simply stops being
//!   selected on
//! - Publishing uses `send_replace`, so a slow reader only ever sees the
//!   newest snapshot and the loop never blocks on it
//! - The first refresh happens immediately; later ones follow the interval

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{broadcast, watch};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use crate::observability::metrics;
use crate::session::{ControlSession, MonitorSnapshot, OpsConfig, Session, SessionError, SnapshotStats};

/// Latest published snapshot; `None` until the first successful refresh.
pub type SnapshotSlot = watch::Receiver<Option<Arc<MonitorSnapshot>>>;

/// Reconfiguration inputs of the poller.
#[derive(Clone)]
pub struct MonitorConfigInputs {
    /// Tenant and control-service credentials. An empty tenant disables
    /// refreshing.
    pub ops_config: watch::Receiver<OpsConfig>,
    /// Newly established control-service sessions.
    pub session: watch::Receiver<Option<Arc<dyn Session>>>,
    /// Refresh interval requests.
    pub interval: watch::Receiver<Duration>,
}

/// Keeps the monitoring configuration fresh. Cloning shares the output slot.
#[derive(Clone)]
pub struct MonitorConfigPoller {
    control: ControlSession,
    slot: Arc<watch::Sender<Option<Arc<MonitorSnapshot>>>>,
}

impl MonitorConfigPoller {
    pub fn new(control: ControlSession) -> (Self, SnapshotSlot) {
        let (tx, rx) = watch::channel(None);
        let poller = Self {
            control,
            slot: Arc::new(tx),
        };
        (poller, rx)
    }

    /// A further reader of the published snapshots.
    pub fn subscribe(&self) -> SnapshotSlot {
        self.slot.subscribe()
    }

    pub fn control(&self) -> &ControlSession {
        &self.control
    }

    /// Publish `snapshot`, replacing any value no reader has seen yet.
    pub fn write_config(&self, snapshot: MonitorSnapshot) {
        self.slot.send_replace(Some(Arc::new(snapshot)));
    }

    /// Run until shutdown fires.
    pub async fn run(self, mut inputs: MonitorConfigInputs, mut shutdown: broadcast::Receiver<()>) {
        let mut ops = inputs.ops_config.borrow_and_update().clone();
        if let Some(session) = inputs.session.borrow_and_update().clone() {
            self.control.set_session(session);
        }
        let mut interval = *inputs.interval.borrow_and_update();
        if interval.is_zero() {
            tracing::error!("Monitor config poller started with a zero interval, using 5s");
            interval = crate::config::schema::DEFAULT_MONITOR_CONFIG_INTERVAL;
        }
        let mut ticker = new_ticker(Instant::now(), interval);

        let mut ops_open = true;
        let mut session_open = true;
        let mut interval_open = true;

        tracing::info!(tenant = %ops.tenant, interval = ?interval, "Monitor config poller starting");

        loop {
            tokio::select! {
                changed = inputs.ops_config.changed(), if ops_open => {
                    if changed.is_err() {
                        ops_open = false;
                        continue;
                    }
                    ops = inputs.ops_config.borrow_and_update().clone();
                    tracing::debug!(tenant = %ops.tenant, "Monitor config poller received new ops config");
                }
                changed = inputs.session.changed(), if session_open => {
                    if changed.is_err() {
                        session_open = false;
                        continue;
                    }
                    if let Some(session) = inputs.session.borrow_and_update().clone() {
                        self.control.set_session(session);
                        tracing::debug!("Monitor config poller received new session");
                    }
                }
                changed = inputs.interval.changed(), if interval_open => {
                    if changed.is_err() {
                        interval_open = false;
                        continue;
                    }
                    let requested = *inputs.interval.borrow_and_update();
                    if requested.is_zero() {
                        tracing::error!("Ignoring zero monitor config polling interval");
                    } else if requested != interval {
                        tracing::info!(old = ?interval, new = ?requested, "Monitor config polling interval changed");
                        interval = requested;
                        ticker = new_ticker(Instant::now() + interval, interval);
                    }
                }
                _ = ticker.tick() => {
                    self.on_tick(&ops).await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Monitor config poller received shutdown signal, exiting loop");
                    return;
                }
            }
        }
    }

    async fn on_tick(&self, ops: &OpsConfig) {
        if ops.tenant.is_empty() {
            tracing::warn!("No tenant configured, skipping monitor config refresh");
            return;
        }
        if !self.control.is_initialized() {
            tracing::warn!(tenant = %ops.tenant, "No control service session, skipping monitor config refresh");
            return;
        }

        match self.refresh(&ops.tenant).await {
            Ok(snapshot) => {
                tracing::debug!(tenant = %snapshot.tenant, date = ?snapshot.stats.date, "Publishing monitor config");
                metrics::record_config_published(&snapshot.tenant);
                self.write_config(snapshot);
            }
            Err(e) => {
                tracing::error!(tenant = %ops.tenant, error = %e, "Monitor config refresh failed");
            }
        }
    }

    async fn refresh(&self, tenant: &str) -> Result<MonitorSnapshot, SessionError> {
        let config = self.control.monitoring_config(tenant).await?;
        let bytes = self.control.snapshot_raw(tenant).await?;
        let stats = match self.control.freshness().get(tenant) {
            Some(record) => record.stats,
            None => SnapshotStats::from_document(&bytes)?,
        };

        Ok(MonitorSnapshot {
            tenant: tenant.to_string(),
            config,
            stats,
            received_at: SystemTime::now(),
        })
    }
}

fn new_ticker(start: Instant, interval: Duration) -> Interval {
    let mut ticker = time::interval_at(start, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
