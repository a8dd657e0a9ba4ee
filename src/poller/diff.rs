//! Reconciliation of two engine configurations.
//!
//! Updates are never applied in place: a changed target is deleted and
//! re-added, so every target starts from a freshly initialised context. A
//! change to any engine-wide setting rebuilds every target.

use crate::poller::types::{EngineConfig, TargetConfig, TargetKey};

/// Targets to tear down and targets to spawn.
///
/// Callers must dispatch every deletion before spawning any addition, so the
/// same ID never has two live pollers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDiff<K> {
    pub deletions: Vec<K>,
    pub additions: Vec<(K, TargetConfig)>,
}

impl<K> ConfigDiff<K> {
    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty() && self.additions.is_empty()
    }
}

/// Compute the deletions and additions that turn `old` into `new`.
pub fn diff_configs<K: TargetKey>(old: &EngineConfig<K>, new: &EngineConfig<K>) -> ConfigDiff<K> {
    if old.settings != new.settings {
        return ConfigDiff {
            deletions: old.targets.keys().cloned().collect(),
            additions: new
                .targets
                .iter()
                .map(|(id, target)| (id.clone(), target.clone()))
                .collect(),
        };
    }

    let mut deletions = Vec::new();
    let mut additions = Vec::new();

    for (id, old_target) in &old.targets {
        match new.targets.get(id) {
            None => deletions.push(id.clone()),
            Some(new_target) if new_target != old_target => {
                deletions.push(id.clone());
                additions.push((id.clone(), new_target.clone()));
            }
            Some(_) => {}
        }
    }

    for (id, new_target) in &new.targets {
        if !old.targets.contains_key(id) {
            additions.push((id.clone(), new_target.clone()));
        }
    }

    ConfigDiff { deletions, additions }
}
