//! Per-tenant snapshot freshness cache.
//!
//! # Invariants
//! - A tenant's record is only replaced by a snapshot from the same tenant
//!   whose date is not older than the cached one
//! - A refused snapshot leaves the cached record untouched
//!
//! `validate_and_set` is the accepting path. `validate` and `set` remain for
//! callers that only inspect or seed a record.

use std::collections::HashMap;
use std::time::SystemTime;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::session::types::{FreshnessError, SnapshotStats};

/// The last accepted snapshot of one tenant.
#[derive(Debug, Clone)]
pub struct FreshnessRecord {
    pub bytes: Bytes,
    pub received_at: SystemTime,
    pub stats: SnapshotStats,
}

impl FreshnessRecord {
    fn new(bytes: Bytes, stats: SnapshotStats) -> Self {
        Self {
            bytes,
            received_at: SystemTime::now(),
            stats,
        }
    }
}

#[derive(Debug, Default)]
pub struct FreshnessCache {
    records: RwLock<HashMap<String, FreshnessRecord>>,
}

impl FreshnessCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant: &str) -> Option<FreshnessRecord> {
        self.records.read().get(tenant).cloned()
    }

    /// Check `stats` against the record cached under `tenant`.
    ///
    /// The comparison uses the record for the requested tenant key, never
    /// whatever tenant the new document claims.
    pub fn validate(&self, tenant: &str, stats: &SnapshotStats) -> Result<(), FreshnessError> {
        check(tenant, self.records.read().get(tenant), stats)
    }

    /// `validate` then `set` under one write lock, so concurrent fetches for
    /// the same tenant cannot interleave and move the record backwards.
    pub fn validate_and_set(&self, tenant: &str, bytes: Bytes, stats: SnapshotStats) -> Result<(), FreshnessError> {
        let mut records = self.records.write();
        check(tenant, records.get(tenant), &stats)?;
        records.insert(tenant.to_string(), FreshnessRecord::new(bytes, stats));
        Ok(())
    }

    /// Unconditionally replace the record for `tenant`.
    pub fn set(&self, tenant: &str, bytes: Bytes, stats: SnapshotStats) {
        self.records.write().insert(tenant.to_string(), FreshnessRecord::new(bytes, stats));
    }
}

fn check(tenant: &str, last: Option<&FreshnessRecord>, stats: &SnapshotStats) -> Result<(), FreshnessError> {
    let Some(last) = last else {
        return Ok(());
    };

    let received_tenant = stats.tenant.as_ref().ok_or(FreshnessError::MissingTenant)?;
    let received_date = stats.date.ok_or(FreshnessError::MissingDate)?;

    let (Some(last_tenant), Some(last_date)) = (&last.stats.tenant, last.stats.date) else {
        tracing::warn!(tenant = %tenant, "Accepting snapshot, but the last accepted one had incomplete stats");
        return Ok(());
    };

    if received_tenant != last_tenant {
        return Err(FreshnessError::CrossTenant {
            received: received_tenant.clone(),
            accepted: last_tenant.clone(),
        });
    }
    if received_date < last_date {
        return Err(FreshnessError::Regression {
            received: received_date,
            accepted: last_date,
        });
    }
    Ok(())
}
