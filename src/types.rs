//! Core identifiers and the persisted lock record.

use crate::error::{LockError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// Opaque job identifier. Zero is reserved as invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// The reserved invalid identifier.
    pub const INVALID: JobId = JobId(0);

    /// Whether this identifier may own locks.
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        JobId(id)
    }
}

/// Opaque target identifier. Must be non-empty to be locked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        TargetId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(id: &str) -> Self {
        TargetId(id.to_string())
    }
}

impl From<String> for TargetId {
    fn from(id: String) -> Self {
        TargetId(id)
    }
}

impl AsRef<str> for TargetId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One row of the lock table.
///
/// A record is authoritative only while `expires_at` is strictly after "now";
/// at or past that instant the target is free regardless of `owner`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// The locked target (table key).
    pub target: TargetId,

    /// Job that acquired or last renewed the lease.
    pub owner: JobId,

    /// Instant at which the lease lapses.
    pub expires_at: DateTime<Utc>,

    /// Lease duration granted at acquisition, reused on refresh. Rounded up
    /// to whole milliseconds so a renewal never ends earlier than the grant.
    pub lease_ms: u64,
}

impl LockRecord {
    /// Build a record for `owner` leasing `target` for `lease` starting at `now`.
    pub fn acquired(
        target: TargetId,
        owner: JobId,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Self> {
        Ok(Self {
            target,
            owner,
            expires_at: expiry_after(now, lease)?,
            lease_ms: u64::try_from(lease.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX),
        })
    }

    /// The lease duration recorded at acquisition.
    pub fn lease(&self) -> Duration {
        Duration::from_millis(self.lease_ms)
    }

    /// Whether the lease is still in force at `now`.
    pub fn is_held_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Whether `job` holds this lease at `now`.
    pub fn is_held_by(&self, job: JobId, now: DateTime<Utc>) -> bool {
        self.owner == job && self.is_held_at(now)
    }

    /// Copy of this record with the lease pushed out to `now + lease`.
    pub fn renewed(&self, now: DateTime<Utc>, lease: Duration) -> Result<Self> {
        Self::acquired(self.target.clone(), self.owner, now, lease)
    }
}

/// A lock record annotated with whether it is currently held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockStatus {
    pub record: LockRecord,
    pub held: bool,
}

impl fmt::Display for LockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (job: {}, expires: {}{})",
            self.record.target,
            self.record.owner,
            self.record.expires_at.to_rfc3339(),
            if self.held { "" } else { ", EXPIRED" }
        )
    }
}

/// Compute `now + lease`, rejecting durations chrono cannot represent.
pub fn expiry_after(now: DateTime<Utc>, lease: Duration) -> Result<DateTime<Utc>> {
    chrono::Duration::from_std(lease)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .ok_or_else(|| {
            LockError::InvalidInput(format!("lease duration {:?} is out of range", lease))
        })
}

/// Reject the reserved job identifier.
pub fn validate_job(job: JobId) -> Result<()> {
    if !job.is_valid() {
        return Err(LockError::InvalidInput(
            "job id must be non-zero".to_string(),
        ));
    }
    Ok(())
}

/// Reject empty target identifiers and collapse duplicates.
///
/// The first occurrence of each target keeps its position, so callers that
/// depend on input order see the same order minus repeats.
pub fn normalize_targets(targets: &[TargetId]) -> Result<Vec<TargetId>> {
    let mut seen = HashSet::with_capacity(targets.len());
    let mut unique = Vec::with_capacity(targets.len());

    for (index, target) in targets.iter().enumerate() {
        if target.is_empty() {
            return Err(LockError::InvalidInput(format!(
                "target at position {} has an empty id",
                index
            )));
        }
        if seen.insert(target) {
            unique.push(target.clone());
        }
    }

    Ok(unique)
}
