//! Poll result consumer that tracks per-target availability.
//!
//! # Responsibilities
//! - Fold every poll outcome into the target's health state
//! - Log and export availability transitions
//! - Always release the engine by signalling `done`

use std::collections::{BTreeMap, BTreeSet};

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::health::state::{Availability, TargetHealth, Thresholds};
use crate::observability::metrics;
use crate::poller::{Handler, PollOutcome, TargetKey};

pub struct HealthHandler<K: TargetKey> {
    name: String,
    thresholds: Thresholds,
    targets: DashMap<K, TargetHealth>,
}

impl<K: TargetKey> HealthHandler<K> {
    pub fn new(name: impl Into<String>, thresholds: Thresholds) -> Self {
        Self {
            name: name.into(),
            thresholds,
            targets: DashMap::new(),
        }
    }

    pub fn get(&self, id: &K) -> Option<TargetHealth> {
        self.targets.get(id).map(|entry| entry.value().clone())
    }

    /// Health of every target seen so far, ordered by ID.
    pub fn snapshot(&self) -> BTreeMap<K, TargetHealth> {
        self.targets
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Drop targets that are no longer configured.
    pub fn retain(&self, keep: &BTreeSet<K>) {
        self.targets.retain(|id, _| keep.contains(id));
    }

    fn record(&self, outcome: &PollOutcome<K>) {
        let transition = self
            .targets
            .entry(outcome.id.clone())
            .or_default()
            .observe(outcome, self.thresholds);

        if let Some(state) = transition {
            match state {
                Availability::Available => tracing::info!(
                    engine = %self.name,
                    target = %outcome.id,
                    poll_id = outcome.poll_id,
                    "Target became available"
                ),
                _ => tracing::warn!(
                    engine = %self.name,
                    target = %outcome.id,
                    poll_id = outcome.poll_id,
                    error = ?outcome.error,
                    "Target became unavailable"
                ),
            }
            metrics::record_target_available(&outcome.id.to_string(), state == Availability::Available);
        }
    }
}

impl<K: TargetKey> Handler<K> for HealthHandler<K> {
    async fn handle(&self, outcome: PollOutcome<K>, done: oneshot::Sender<()>) {
        self.record(&outcome);
        // The engine may already have stopped this target.
        let _ = done.send(());
    }
}
