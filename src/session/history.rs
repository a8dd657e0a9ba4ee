//! Bounded audit history of snapshot fetches.

use std::collections::VecDeque;
use std::time::SystemTime;

use parking_lot::RwLock;
use serde::Serialize;

use crate::session::types::SnapshotStats;

/// One snapshot fetch attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub requested_at: SystemTime,
    /// Address the snapshot came from (`127.0.0.1` for a backup file).
    pub remote_addr: String,
    pub stats: SnapshotStats,
    pub error: Option<String>,
}

impl AuditEntry {
    /// Same source, same tenant, same snapshot date.
    fn repeats(&self, other: &AuditEntry) -> bool {
        self.remote_addr == other.remote_addr
            && self.stats.tenant == other.stats.tenant
            && self.stats.date == other.stats.date
    }
}

/// Fixed-capacity ring of audit entries; the oldest entry is overwritten
/// first once full.
#[derive(Debug)]
pub struct AuditHistory {
    entries: RwLock<VecDeque<AuditEntry>>,
    capacity: usize,
}

impl AuditHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append `entry`, unless it repeats the most recent one.
    pub fn record(&self, entry: AuditEntry) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.write();
        if entries.back().is_some_and(|last| last.repeats(&entry)) {
            return;
        }
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Entries oldest to newest.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
