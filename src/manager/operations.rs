//! Job-facing lock operations.

use super::LockManager;
use crate::deadline::Deadline;
use crate::error::{LockError, Result};
use crate::types::{JobId, LockRecord, TargetId, normalize_targets, validate_job};
use std::collections::HashMap;
use std::time::Duration;

impl LockManager {
    /// Acquire every target in `targets` for `job`, or none of them.
    ///
    /// Targets `job` already holds are renewed to `now + lease`. If any target
    /// is held by another job the call fails with `Conflict` naming the first
    /// one found and the store is left exactly as it was. Never waits for a
    /// target to become free.
    ///
    /// An empty `targets` succeeds without touching the store once `job` has
    /// been validated.
    pub fn lock(
        &self,
        deadline: Deadline,
        job: JobId,
        lease: Duration,
        targets: &[TargetId],
    ) -> Result<()> {
        validate_job(job)?;
        let targets = normalize_targets(targets)?;
        if targets.is_empty() {
            return Ok(());
        }
        validate_lease(lease)?;
        deadline.check("lock")?;

        let mut txn = self.store.begin(deadline)?;
        let now = self.clock.now();

        for batch in self.splitter.split(&targets) {
            deadline.check("lock")?;

            let existing = txn.select(batch)?;
            if let Some(held) = existing.iter().find(|rec| rec.is_held_at(now) && rec.owner != job) {
                tracing::info!(
                    job = %job,
                    target = %held.target,
                    owner = %held.owner,
                    "lock refused: target held by another job"
                );
                return Err(LockError::Conflict {
                    target: held.target.clone(),
                    owner: held.owner,
                    expires_at: held.expires_at,
                });
            }

            let records = batch
                .iter()
                .map(|target| LockRecord::acquired(target.clone(), job, now, lease))
                .collect::<Result<Vec<_>>>()?;
            txn.upsert(&records)?;
        }

        deadline.check("lock")?;
        txn.commit()?;

        tracing::debug!(
            job = %job,
            targets = targets.len(),
            batches = self.splitter.batch_count(targets.len()),
            "locked targets"
        );
        Ok(())
    }

    /// Release the targets in `targets` that `job` owns.
    ///
    /// Records owned by other jobs are left alone and missing records are
    /// ignored, so unlocking is idempotent. Expired records owned by `job` are
    /// removed as well.
    pub fn unlock(&self, deadline: Deadline, job: JobId, targets: &[TargetId]) -> Result<()> {
        if targets.is_empty() {
            return Ok(());
        }
        validate_job(job)?;
        let targets = normalize_targets(targets)?;
        deadline.check("unlock")?;

        let mut txn = self.store.begin(deadline)?;
        let mut released = 0;
        for batch in self.splitter.split(&targets) {
            deadline.check("unlock")?;
            released += txn.delete_owned(job, batch)?;
        }

        deadline.check("unlock")?;
        txn.commit()?;

        tracing::debug!(job = %job, requested = targets.len(), released, "unlocked targets");
        Ok(())
    }

    /// Acquire as many of `targets` as possible without waiting.
    ///
    /// Targets are examined in input order. A target `job` already holds is
    /// renewed and returned without counting against `limit`. A free target is
    /// acquired while fewer than `limit` new targets have been taken; once the
    /// limit is reached later free targets are left untouched. Targets held by
    /// other jobs are skipped. Returns the acquired and renewed targets in
    /// input order.
    ///
    /// A `limit` of zero never acquires anything new but still renews and
    /// reports targets `job` already holds.
    pub fn try_lock(
        &self,
        deadline: Deadline,
        job: JobId,
        lease: Duration,
        targets: &[TargetId],
        limit: usize,
    ) -> Result<Vec<TargetId>> {
        validate_job(job)?;
        let targets = normalize_targets(targets)?;
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        validate_lease(lease)?;
        deadline.check("try_lock")?;

        let mut txn = self.store.begin(deadline)?;
        let now = self.clock.now();

        let mut granted = Vec::new();
        let mut remaining = limit;
        let mut skipped = 0;

        for batch in self.splitter.split(&targets) {
            deadline.check("try_lock")?;

            let existing: HashMap<TargetId, LockRecord> = txn
                .select(batch)?
                .into_iter()
                .map(|rec| (rec.target.clone(), rec))
                .collect();

            let mut writes = Vec::new();
            for target in batch {
                match existing.get(target) {
                    Some(rec) if rec.is_held_by(job, now) => {}
                    Some(rec) if rec.is_held_at(now) => {
                        skipped += 1;
                        continue;
                    }
                    _ if remaining > 0 => remaining -= 1,
                    _ => continue,
                }
                writes.push(LockRecord::acquired(target.clone(), job, now, lease)?);
                granted.push(target.clone());
            }

            if !writes.is_empty() {
                txn.upsert(&writes)?;
            }
        }

        deadline.check("try_lock")?;
        txn.commit()?;

        tracing::debug!(
            job = %job,
            requested = targets.len(),
            granted = granted.len(),
            held_elsewhere = skipped,
            limit,
            "try-locked targets"
        );
        Ok(granted)
    }

    /// Extend the leases `job` currently holds among `targets`.
    ///
    /// Each renewed lease runs from now for the configured refresh lease, or
    /// for the record's original lease when none is configured. Targets that
    /// are missing, expired, or owned by another job are left as they are; an
    /// expired lease is never revived.
    pub fn refresh_locks(&self, deadline: Deadline, job: JobId, targets: &[TargetId]) -> Result<()> {
        if targets.is_empty() {
            return Ok(());
        }
        validate_job(job)?;
        let targets = normalize_targets(targets)?;
        deadline.check("refresh")?;

        let mut txn = self.store.begin(deadline)?;
        let now = self.clock.now();
        let mut refreshed = 0;

        for batch in self.splitter.split(&targets) {
            deadline.check("refresh")?;

            let renewed = txn
                .select(batch)?
                .iter()
                .filter(|rec| rec.is_held_by(job, now))
                .map(|rec| rec.renewed(now, self.refresh_lease.unwrap_or_else(|| rec.lease())))
                .collect::<Result<Vec<_>>>()?;

            if !renewed.is_empty() {
                refreshed += renewed.len();
                txn.upsert(&renewed)?;
            }
        }

        deadline.check("refresh")?;
        txn.commit()?;

        tracing::debug!(job = %job, requested = targets.len(), refreshed, "refreshed leases");
        Ok(())
    }
}

/// Reject leases that would expire immediately.
fn validate_lease(lease: Duration) -> Result<()> {
    if lease.is_zero() {
        return Err(LockError::InvalidInput(
            "lease duration must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
