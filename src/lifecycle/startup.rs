//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the poller registry, both poller engines and their health handlers
//! - Wire the monitor-config poller to the manager that feeds the engines
//! - Push config-file reloads into the poller as a new session and ops config
//! - Keep the monitor-config poller alive under a supervisor
//!
//! # Design Decisions
//! - Engines and the manager are plain spawned tasks; only the monitor-config
//!   poller is supervised, since nothing else feeds the engines
//! - A missing or invalid control URL is not fatal: the poller skips its
//!   ticks until a reload installs a session

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::config::schema::{AppConfig, ControlConfig};
use crate::config::watcher::ConfigWatcher;
use crate::health::{HealthHandler, Thresholds};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::supervisor::{RestartPolicy, Supervisor, SupervisorError};
use crate::manager::{ManagerSettings, MonitorConfigManager};
use crate::poller::{
    AppInfo, EngineConfig, GlobalSettings, MonitorConfigInputs, MonitorConfigPoller, PollerEngine, PollerRegistry,
};
use crate::session::{BackupFiles, ControlSession, HttpSession, OpsConfig, Session};

const ENGINE_CONFIG_BUFFER: usize = 8;

type SessionSender = watch::Sender<Option<Arc<dyn Session>>>;

/// Run the monitor until shutdown is triggered.
///
/// `config_path` enables hot reload of the control-service settings.
/// Returns an error only when the monitor-config poller keeps failing.
pub async fn run(config: AppConfig, config_path: Option<PathBuf>, shutdown: Arc<Shutdown>) -> Result<(), SupervisorError> {
    let hostname = resolve_hostname(&config.monitor.hostname);
    tracing::info!(hostname = %hostname, tenant = %config.monitor.tenant, "Starting monitor");

    let registry = PollerRegistry::with_builtin(config.monitor.default_poll_type.clone());
    let app = AppInfo {
        hostname: hostname.clone(),
        ..AppInfo::default()
    };
    let global = GlobalSettings {
        timeout: config.monitor.http_timeout(),
        no_keep_alive: false,
    };
    let thresholds = Thresholds {
        available: config.health.available_threshold,
        unavailable: config.health.unavailable_threshold,
    };

    let cache_health = Arc::new(HealthHandler::new("caches", thresholds));
    let peer_health = Arc::new(HealthHandler::new("peers", thresholds));

    let (cache_tx, cache_rx) = mpsc::channel::<EngineConfig<String>>(ENGINE_CONFIG_BUFFER);
    let (peer_tx, peer_rx) = mpsc::channel::<EngineConfig<String>>(ENGINE_CONFIG_BUFFER);
    let cache_engine = PollerEngine::new("caches", &registry, &global, &app, cache_health.clone());
    let peer_engine = PollerEngine::new("peers", &registry, &global, &app, peer_health.clone());
    tokio::spawn(cache_engine.run(cache_rx, shutdown.subscribe()));
    tokio::spawn(peer_engine.run(peer_rx, shutdown.subscribe()));

    let control = ControlSession::new(
        config.monitor.snapshot_history_count,
        BackupFiles {
            snapshot: config.monitor.snapshot_backup_file.clone(),
            monitoring: config.monitor.monitoring_backup_file.clone(),
        },
    );
    let (poller, snapshots) = MonitorConfigPoller::new(control);

    let (ops_tx, ops_rx) = watch::channel(OpsConfig::from(&config));
    let (session_tx, session_rx) = watch::channel(None);
    let (interval_tx, interval_rx) = watch::channel(config.monitor.monitor_config_interval());
    install_session(&config.control, &session_tx);

    let manager = MonitorConfigManager::new(
        ManagerSettings {
            hostname,
            polling_format: config.monitor.http_polling_format.clone(),
            default_poll_type: config.monitor.default_poll_type.clone(),
            protocol: config.monitor.polling_protocol,
            http_timeout: config.monitor.http_timeout(),
            monitor_config_interval: config.monitor.monitor_config_interval(),
        },
        cache_tx,
        peer_tx,
        interval_tx,
        cache_health,
        peer_health,
    );
    tokio::spawn(manager.run(snapshots, shutdown.subscribe()));

    // Dropping the guard stops the file watcher, so hold it until we return.
    let _watcher = match config_path {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(&path);
            match watcher.run() {
                Ok(guard) => {
                    tokio::spawn(apply_reloads(updates, config.clone(), ops_tx, session_tx, shutdown.clone()));
                    Some(guard)
                }
                Err(e) => {
                    tracing::warn!(path = ?path, error = %e, "Config hot reload disabled");
                    None
                }
            }
        }
        None => None,
    };

    let inputs = MonitorConfigInputs {
        ops_config: ops_rx,
        session: session_rx,
        interval: interval_rx,
    };
    Supervisor::new("monitor-config", RestartPolicy::from(&config.supervisor), shutdown)
        .run(move |stop| poller.clone().run(inputs.clone(), stop))
        .await
}

/// Forward reloaded settings to the poller inputs.
async fn apply_reloads(
    mut updates: mpsc::UnboundedReceiver<AppConfig>,
    mut current: AppConfig,
    ops_tx: watch::Sender<OpsConfig>,
    session_tx: SessionSender,
    shutdown: Arc<Shutdown>,
) {
    let mut stop = shutdown.subscribe();
    loop {
        let next = tokio::select! {
            next = updates.recv() => match next {
                Some(next) => next,
                None => return,
            },
            _ = stop.recv() => return,
        };

        if next.control != current.control {
            tracing::info!(url = %next.control.url, "Control service settings changed, building new session");
            install_session(&next.control, &session_tx);
        }
        if next.control != current.control || next.monitor.tenant != current.monitor.tenant {
            ops_tx.send_replace(OpsConfig::from(&next));
        }
        if next.monitor != current.monitor || next.health != current.health || next.supervisor != current.supervisor {
            tracing::warn!("Only control service settings and tenant are reloaded; other changes need a restart");
        }
        current = next;
    }
}

fn install_session(control: &ControlConfig, session_tx: &SessionSender) {
    if control.url.is_empty() {
        tracing::warn!("No control service URL configured, monitor config will not refresh");
        return;
    }
    match HttpSession::new(control) {
        Ok(session) => {
            let session: Arc<dyn Session> = Arc::new(session);
            session_tx.send_replace(Some(session));
        }
        Err(e) => tracing::error!(url = %control.url, error = %e, "Failed to create control service session"),
    }
}

/// The configured host name, else the one the OS reports.
pub fn resolve_hostname(configured: &str) -> String {
    if !configured.is_empty() {
        return configured.to_string();
    }
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.trim().is_empty() {
            return name.trim().to_string();
        }
    }
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .map(|name| name.trim().to_string())
        .unwrap_or_default()
}
