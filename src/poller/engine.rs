//! Generic poller engine.
//!
//! # Responsibilities
//! - Receive engine configurations from its owner
//! - Reconcile the active target set against each configuration
//! - Run one task per target: jitter, tick, poll, hand off, wait
//!
//! # Target State Machine
//! ```text
//! Sleeping (jitter in [0, interval))
//!     → Ticking ──kill──▶ Killed
//!     → Polling (skipped if the selected address family is unset)
//!     → AwaitingHandler (blocks until the handler signals done)
//!     → Ticking ...
//! ```
//!
//! # Design Decisions
//! - Kill signals are oneshot sends: they never block reconciliation and are
//!   never acknowledged, so one more in-flight poll from a deleted target is
//!   possible
//! - Poll errors are not retried; the next tick is the retry
//! - Dropping the engine drops every kill sender, which stops every target

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::observability::metrics;
use crate::poller::diff::{diff_configs, ConfigDiff};
use crate::poller::handler::Handler;
use crate::poller::registry::{AppInfo, GlobalContexts, GlobalSettings, PollRequest, PollerRegistry, TargetContext};
use crate::poller::types::{
    AddressFamily, EngineConfig, EngineSettings, PollOutcome, PollingProtocol, TargetConfig, TargetKey,
};

/// How far past the interval a tick may land before it is logged as drift.
pub const TICK_DRIFT_SLACK: Duration = Duration::from_millis(100);

/// Runtime record of a spawned target task.
struct ActiveTarget {
    kill: oneshot::Sender<()>,
}

impl ActiveTarget {
    fn kill(self) {
        // The receiver is gone if the task already exited.
        let _ = self.kill.send(());
    }
}

/// Polls a dynamically changing set of targets keyed by `K`.
pub struct PollerEngine<K: TargetKey, H> {
    name: String,
    contexts: GlobalContexts,
    handler: Arc<H>,
    current: EngineConfig<K>,
    active: HashMap<K, ActiveTarget>,
}

impl<K: TargetKey, H: Handler<K>> PollerEngine<K, H> {
    /// Create an engine, running global init for every registered poll type.
    pub fn new(
        name: impl Into<String>,
        registry: &PollerRegistry,
        settings: &GlobalSettings,
        app: &AppInfo,
        handler: Arc<H>,
    ) -> Self {
        Self {
            name: name.into(),
            contexts: registry.global_contexts(settings, app),
            handler,
            current: EngineConfig::default(),
            active: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// IDs of the currently running target tasks.
    pub fn active_ids(&self) -> Vec<K> {
        let mut ids: Vec<K> = self.active.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn current(&self) -> &EngineConfig<K> {
        &self.current
    }

    /// Apply configurations until the stream closes or shutdown fires.
    pub async fn run(mut self, mut configs: mpsc::Receiver<EngineConfig<K>>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(engine = %self.name, "Poller engine starting");

        loop {
            tokio::select! {
                received = configs.recv() => match received {
                    Some(config) => {
                        self.apply(config);
                    }
                    None => {
                        tracing::info!(engine = %self.name, "Config stream closed, stopping poller engine");
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!(engine = %self.name, "Poller engine received shutdown signal, exiting loop");
                    break;
                }
            }
        }

        for (_, target) in self.active.drain() {
            target.kill();
        }
    }

    /// Reconcile running targets against `config` and make it current.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn apply(&mut self, config: EngineConfig<K>) -> ConfigDiff<K> {
        if config.settings.interval.is_zero() {
            tracing::error!(engine = %self.name, "Received config with a zero polling interval, ignoring it");
            return ConfigDiff {
                deletions: Vec::new(),
                additions: Vec::new(),
            };
        }

        let diff = diff_configs(&self.current, &config);

        for id in &diff.deletions {
            if let Some(target) = self.active.remove(id) {
                tracing::debug!(engine = %self.name, target = %id, "Stopping poller");
                target.kill();
            }
        }

        for (id, target) in &diff.additions {
            self.spawn_target(id.clone(), target.clone(), config.settings);
        }

        if !diff.is_empty() {
            tracing::info!(
                engine = %self.name,
                deleted = diff.deletions.len(),
                added = diff.additions.len(),
                active = self.active.len(),
                "Reconciled poll targets"
            );
        }

        self.current = config;
        diff
    }

    fn spawn_target(&mut self, id: K, target: TargetConfig, settings: EngineSettings) {
        let Some((poll_type, global)) = self.contexts.resolve(&target.poll_type) else {
            tracing::error!(
                engine = %self.name,
                target = %id,
                poll_type = %target.poll_type,
                "No poll type available for target, not polling it"
            );
            return;
        };
        tracing::debug!(engine = %self.name, target = %id, poll_type = %poll_type, "Starting poller");

        let ctx = global.init(&target, &settings);
        let (kill_tx, kill_rx) = oneshot::channel();

        let task = TargetTask {
            engine: self.name.clone(),
            id: id.clone(),
            target,
            settings,
            ctx,
            handler: self.handler.clone(),
        };
        tokio::spawn(task.run(kill_rx));

        self.active.insert(id, ActiveTarget { kill: kill_tx });
    }
}

/// Random delay in `[0, interval)` before a target's first tick.
fn initial_jitter(interval: Duration) -> Duration {
    let nanos = u64::try_from(interval.as_nanos()).unwrap_or(u64::MAX);
    if nanos == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(rand::thread_rng().gen_range(0..nanos))
}

struct TargetTask<K, H> {
    engine: String,
    id: K,
    target: TargetConfig,
    settings: EngineSettings,
    ctx: Arc<dyn TargetContext>,
    handler: Arc<H>,
}

impl<K: TargetKey, H: Handler<K>> TargetTask<K, H> {
    async fn run(self, mut kill: oneshot::Receiver<()>) {
        let interval = self.settings.interval;
        let jitter = initial_jitter(interval);

        let mut ticker = time::interval_at(Instant::now() + jitter, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let oscillate = self.settings.protocol == PollingProtocol::Both;
        let mut family = match self.settings.protocol {
            PollingProtocol::Ipv6Only => AddressFamily::V6,
            _ => AddressFamily::V4,
        };
        let mut poll_id: u64 = 0;
        let mut last_tick: Option<Instant> = None;

        loop {
            tokio::select! {
                // A dropped sender means the engine is gone; stop either way.
                _ = &mut kill => {
                    tracing::debug!(engine = %self.engine, target = %self.id, "Poller killed");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let now = Instant::now();
            if let Some(last) = last_tick {
                let actual = now.duration_since(last);
                if actual > interval + TICK_DRIFT_SLACK {
                    tracing::info!(
                        engine = %self.engine,
                        target = %self.id,
                        intended = ?interval,
                        actual = ?actual,
                        "Poll tick later than intended"
                    );
                    metrics::record_tick_drift(&self.engine);
                }
            }
            last_tick = Some(now);

            let address = self.target.address_for(family);
            if address.is_empty() {
                tracing::debug!(
                    engine = %self.engine,
                    target = %self.id,
                    family = %family,
                    "No address for this family, skipping tick"
                );
                metrics::record_skipped_tick(&self.engine);
                if oscillate {
                    family = family.flipped();
                }
                continue;
            }

            poll_id += 1;
            let response = self
                .ctx
                .poll(PollRequest {
                    address,
                    host: self.target.host.as_deref(),
                    poll_id,
                })
                .await;
            metrics::record_poll(&self.engine, response.error.is_none(), response.elapsed);

            let outcome = PollOutcome {
                id: self.id.clone(),
                poll_id,
                format: self.target.format.clone(),
                family,
                body: response.body,
                completed_at: response.completed_at,
                elapsed: response.elapsed,
                error: response.error,
            };

            let (done_tx, done_rx) = oneshot::channel();
            let handler = self.handler.clone();
            tokio::spawn(async move {
                handler.handle(outcome, done_tx).await;
            });

            if oscillate {
                family = family.flipped();
            }

            if done_rx.await.is_err() {
                tracing::warn!(
                    engine = %self.engine,
                    target = %self.id,
                    poll_id,
                    "Handler finished without signalling completion"
                );
            }
        }
    }
}
