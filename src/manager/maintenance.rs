//! Administrative operations over the whole lock table.

use super::LockManager;
use crate::deadline::Deadline;
use crate::error::Result;
use crate::types::{LockStatus, TargetId};

impl LockManager {
    /// Delete every lock record, whoever owns it.
    ///
    /// Meant for operators recovering a wedged deployment; running jobs lose
    /// their leases without notice.
    pub fn reset_all_locks(&self, deadline: Deadline) -> Result<()> {
        deadline.check("reset")?;

        let mut txn = self.store.begin(deadline)?;
        let cleared = txn.truncate()?;

        deadline.check("reset")?;
        txn.commit()?;

        tracing::warn!(cleared, "reset all locks");
        Ok(())
    }

    /// Every record in the table, ordered by target, marked held or expired.
    pub fn list_locks(&self, deadline: Deadline) -> Result<Vec<LockStatus>> {
        deadline.check("list")?;

        let mut txn = self.store.begin(deadline)?;
        let now = self.clock.now();
        let statuses = txn
            .scan()?
            .into_iter()
            .map(|record| {
                let held = record.is_held_at(now);
                LockStatus { record, held }
            })
            .collect();
        txn.commit()?;

        Ok(statuses)
    }

    /// Delete records whose lease has lapsed. Returns how many were removed.
    ///
    /// Expired records are already free; purging only keeps the table small.
    pub fn purge_expired(&self, deadline: Deadline) -> Result<usize> {
        deadline.check("purge")?;

        let mut txn = self.store.begin(deadline)?;
        let now = self.clock.now();
        let expired: Vec<TargetId> = txn
            .scan()?
            .into_iter()
            .filter(|record| !record.is_held_at(now))
            .map(|record| record.target)
            .collect();

        let mut purged = 0;
        for batch in self.splitter.split(&expired) {
            deadline.check("purge")?;
            purged += txn.delete(batch)?;
        }

        deadline.check("purge")?;
        txn.commit()?;

        tracing::debug!(purged, "purged expired locks");
        Ok(purged)
    }
}
