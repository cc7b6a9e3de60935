//! Lock store backed by a JSON table on a shared filesystem.
//!
//! # Table File
//!
//! `locks.json` holds every lock record:
//!
//! ```json
//! {
//!   "version": 1,
//!   "locks": [
//!     {"target": "dut-01", "owner": 123, "expires_at": "2024-05-01T12:00:02Z", "lease_ms": 2000}
//!   ]
//! }
//! ```
//!
//! # Transactions
//!
//! A transaction takes the store mutex (see `mutex`), reads the table, stages
//! its changes in memory, and on commit rewrites the table atomically before
//! releasing the mutex. Readers and writers from other processes or hosts are
//! therefore fully serialized, and an abandoned transaction leaves the table
//! untouched. A transaction whose mutex was broken as stale fails its commit
//! instead of writing.

use super::mutex::{self, MutexFileGuard, MutexPolicy};
use super::staged::Staged;
use super::{LockStore, LockTable, StoreTxn};
use crate::config::Config;
use crate::context::StoreContext;
use crate::deadline::Deadline;
use crate::error::{LockError, Result};
use crate::fs::atomic_write;
use crate::types::{JobId, LockRecord, TargetId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Current on-disk table format.
const TABLE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct TableFile {
    version: u32,
    locks: Vec<LockRecord>,
}

/// File-backed lock store.
#[derive(Debug, Clone)]
pub struct FileStore {
    table_path: PathBuf,
    mutex_path: PathBuf,
    policy: MutexPolicy,
}

impl FileStore {
    /// Open the store in `ctx` with default mutex settings.
    pub fn new(ctx: &StoreContext) -> Self {
        Self::from_config(ctx, &Config::default())
    }

    /// Open the store in `ctx`, taking mutex settings from `config`.
    pub fn from_config(ctx: &StoreContext, config: &Config) -> Self {
        Self {
            table_path: ctx.table_path(),
            mutex_path: ctx.mutex_path(),
            policy: MutexPolicy {
                retry_interval: config.mutex_retry_interval(),
                stale_after: config.mutex_stale_after(),
            },
        }
    }

    pub fn table_path(&self) -> &Path {
        &self.table_path
    }

    fn read_table(&self) -> Result<LockTable> {
        let content = match fs::read_to_string(&self.table_path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(LockTable::new()),
            Err(e) => {
                return Err(LockError::StoreError(format!(
                    "failed to read lock table '{}': {}",
                    self.table_path.display(),
                    e
                )));
            }
        };

        let file: TableFile = serde_json::from_str(&content).map_err(|e| {
            LockError::StoreError(format!(
                "failed to parse lock table '{}': {}",
                self.table_path.display(),
                e
            ))
        })?;

        if file.version != TABLE_VERSION {
            return Err(LockError::StoreError(format!(
                "lock table '{}' has unsupported version {} (expected {})",
                self.table_path.display(),
                file.version,
                TABLE_VERSION
            )));
        }

        Ok(file
            .locks
            .into_iter()
            .map(|record| (record.target.clone(), record))
            .collect())
    }

    fn write_table(&self, table: &LockTable) -> Result<()> {
        let file = TableFile {
            version: TABLE_VERSION,
            locks: table.values().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| LockError::StoreError(format!("failed to serialize lock table: {}", e)))?;
        atomic_write(&self.table_path, json.as_bytes())
    }
}

impl LockStore for FileStore {
    fn begin(&self, deadline: Deadline) -> Result<Box<dyn StoreTxn + '_>> {
        let guard = mutex::acquire(&self.mutex_path, self.policy, deadline)?;
        let table = self.read_table()?;
        Ok(Box::new(FileTxn {
            store: self,
            staged: Staged::new(Box::new(table)),
            guard,
        }))
    }
}

struct FileTxn<'a> {
    store: &'a FileStore,
    staged: Staged<Box<LockTable>>,
    guard: MutexFileGuard,
}

impl StoreTxn for FileTxn<'_> {
    fn select(&mut self, targets: &[TargetId]) -> Result<Vec<LockRecord>> {
        Ok(self.staged.select(targets))
    }

    fn upsert(&mut self, records: &[LockRecord]) -> Result<()> {
        self.staged.upsert(records);
        Ok(())
    }

    fn delete_owned(&mut self, owner: JobId, targets: &[TargetId]) -> Result<usize> {
        Ok(self.staged.delete_owned(owner, targets))
    }

    fn delete(&mut self, targets: &[TargetId]) -> Result<usize> {
        Ok(self.staged.delete(targets))
    }

    fn scan(&mut self) -> Result<Vec<LockRecord>> {
        Ok(self.staged.scan())
    }

    fn truncate(&mut self) -> Result<usize> {
        Ok(self.staged.truncate())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let FileTxn {
            store,
            staged,
            guard,
        } = *self;

        if staged.is_dirty() {
            // The mutex may have been broken as stale while this transaction
            // ran; the table then belongs to the new holder.
            guard.verify()?;
            let table = staged.apply();
            store.write_table(&table)?;
        }

        // The table is already published; a mutex we fail to remove will be
        // broken as stale by the next writer.
        if let Err(e) = guard.release() {
            tracing::warn!(error = %e, "committed but could not release store mutex");
        }
        Ok(())
    }
}
