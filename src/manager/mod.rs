//! Monitor-config manager.
//!
//! # Data Flow
//! ```text
//! MonitorConfigPoller slot (latest MonitorSnapshot)
//!     → intervals.rs (document parameters → scaled intervals)
//!     → targets.rs (caches, peers → EngineConfigs)
//!     → cache engine, peer engine, monitor-config interval input
//! ```
//!
//! # Design Decisions
//! - A snapshot that cannot produce intervals is ignored as a whole, so the
//!   engines keep polling under the last good configuration
//! - Health entries of targets that disappeared are dropped here

pub mod intervals;
pub mod targets;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};

use crate::health::HealthHandler;
use crate::poller::{EngineConfig, SnapshotSlot};
use crate::session::MonitorSnapshot;

pub use intervals::{poll_intervals, IntervalError, PollIntervals};
pub use targets::{build_update, ManagerError, ManagerSettings, ManagerUpdate};

pub struct MonitorConfigManager {
    settings: ManagerSettings,
    caches: mpsc::Sender<EngineConfig<String>>,
    peers: mpsc::Sender<EngineConfig<String>>,
    interval: watch::Sender<Duration>,
    cache_health: Arc<HealthHandler<String>>,
    peer_health: Arc<HealthHandler<String>>,
}

impl MonitorConfigManager {
    pub fn new(
        settings: ManagerSettings,
        caches: mpsc::Sender<EngineConfig<String>>,
        peers: mpsc::Sender<EngineConfig<String>>,
        interval: watch::Sender<Duration>,
        cache_health: Arc<HealthHandler<String>>,
        peer_health: Arc<HealthHandler<String>>,
    ) -> Self {
        Self {
            settings,
            caches,
            peers,
            interval,
            cache_health,
            peer_health,
        }
    }

    pub async fn run(self, mut snapshots: SnapshotSlot, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(hostname = %self.settings.hostname, "Monitor config manager starting");

        loop {
            tokio::select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        tracing::info!("Monitor config publisher gone, stopping manager");
                        break;
                    }
                    let snapshot = snapshots.borrow_and_update().clone();
                    if let Some(snapshot) = snapshot {
                        self.apply(&snapshot).await;
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Monitor config manager received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    async fn apply(&self, snapshot: &MonitorSnapshot) {
        let update = match build_update(snapshot, &self.settings) {
            Ok(update) => update,
            Err(e) => {
                tracing::error!(tenant = %snapshot.tenant, error = %e, "Cannot derive polling config, ignoring snapshot");
                return;
            }
        };

        let cache_ids: BTreeSet<String> = update.caches.targets.keys().cloned().collect();
        let peer_ids: BTreeSet<String> = update.peers.targets.keys().cloned().collect();
        tracing::debug!(
            tenant = %snapshot.tenant,
            caches = cache_ids.len(),
            peers = peer_ids.len(),
            "Applying monitor config"
        );

        if self.caches.send(update.caches).await.is_err() {
            tracing::warn!("Cache poller engine is gone");
        }
        if self.peers.send(update.peers).await.is_err() {
            tracing::warn!("Peer poller engine is gone");
        }
        self.interval.send_replace(update.monitor_config_interval);

        self.cache_health.retain(&cache_ids);
        self.peer_health.retain(&peer_ids);
    }
}
