//! In-process lock store.
//!
//! Transactions hold the table mutex for their whole lifetime, which gives
//! serializable isolation between threads of one process. Writes are staged
//! and only folded into the table on commit.

use super::staged::Staged;
use super::{LockStore, LockTable, StoreTxn};
use crate::deadline::Deadline;
use crate::error::{LockError, Result};
use crate::types::{JobId, LockRecord, TargetId};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::Duration;

/// Poll interval while another transaction holds the table.
const BUSY_WAIT: Duration = Duration::from_millis(1);

/// Lock table kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: Mutex<LockTable>,

    /// Reject statements referencing more rows than this.
    statement_limit: Option<usize>,

    /// Statements executed so far (select/upsert/delete calls).
    statements: AtomicUsize,

    /// Fail the next commit with a store error.
    fail_next_commit: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects statements touching more than `limit` rows,
    /// mimicking SQL parameter limits.
    pub fn with_statement_limit(limit: usize) -> Self {
        Self {
            statement_limit: Some(limit),
            ..Self::default()
        }
    }

    /// Number of statements executed against this store.
    pub fn statement_count(&self) -> usize {
        self.statements.load(Ordering::SeqCst)
    }

    /// Make the next commit fail, as if the backend went away mid-transaction.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Committed records, ordered by target.
    pub fn snapshot(&self) -> Vec<LockRecord> {
        self.lock_table().values().cloned().collect()
    }

    fn lock_table(&self) -> MutexGuard<'_, LockTable> {
        self.table.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn statement(&self, rows: usize) -> Result<()> {
        self.statements.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.statement_limit
            && rows > limit
        {
            return Err(LockError::StoreError(format!(
                "statement references {} rows, limit is {}",
                rows, limit
            )));
        }
        Ok(())
    }
}

impl LockStore for MemoryStore {
    fn begin(&self, deadline: Deadline) -> Result<Box<dyn StoreTxn + '_>> {
        loop {
            match self.table.try_lock() {
                Ok(guard) => {
                    return Ok(Box::new(MemoryTxn {
                        store: self,
                        staged: Staged::new(guard),
                    }));
                }
                Err(TryLockError::Poisoned(poison)) => {
                    return Ok(Box::new(MemoryTxn {
                        store: self,
                        staged: Staged::new(poison.into_inner()),
                    }));
                }
                Err(TryLockError::WouldBlock) => {
                    deadline.check("waiting for the lock table")?;
                    thread::sleep(BUSY_WAIT);
                }
            }
        }
    }

    fn max_statement_rows(&self) -> Option<usize> {
        self.statement_limit
    }
}

struct MemoryTxn<'a> {
    store: &'a MemoryStore,
    staged: Staged<MutexGuard<'a, LockTable>>,
}

impl StoreTxn for MemoryTxn<'_> {
    fn select(&mut self, targets: &[TargetId]) -> Result<Vec<LockRecord>> {
        self.store.statement(targets.len())?;
        Ok(self.staged.select(targets))
    }

    fn upsert(&mut self, records: &[LockRecord]) -> Result<()> {
        self.store.statement(records.len())?;
        self.staged.upsert(records);
        Ok(())
    }

    fn delete_owned(&mut self, owner: JobId, targets: &[TargetId]) -> Result<usize> {
        self.store.statement(targets.len())?;
        Ok(self.staged.delete_owned(owner, targets))
    }

    fn delete(&mut self, targets: &[TargetId]) -> Result<usize> {
        self.store.statement(targets.len())?;
        Ok(self.staged.delete(targets))
    }

    fn scan(&mut self) -> Result<Vec<LockRecord>> {
        self.store.statement(0)?;
        Ok(self.staged.scan())
    }

    fn truncate(&mut self) -> Result<usize> {
        self.store.statement(0)?;
        Ok(self.staged.truncate())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        if self.store.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(LockError::StoreError(
                "commit failed: injected failure".to_string(),
            ));
        }
        drop(self.staged.apply());
        Ok(())
    }
}
