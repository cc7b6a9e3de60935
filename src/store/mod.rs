//! Persistence layer for lock records.
//!
//! The lock manager talks to the store exclusively through transactions:
//! [`LockStore::begin`] opens one, the manager issues bounded statements
//! against it, and [`StoreTxn::commit`] publishes every change at once.
//! Dropping a transaction without committing discards its changes, which is
//! how a failed `lock` leaves no trace.
//!
//! # Backends
//!
//! - [`MemoryStore`]: process-local table, for embedding and tests.
//! - [`FileStore`]: JSON table on a shared filesystem, serialized across
//!   processes and hosts by an exclusive-create mutex file.

mod file;
mod memory;
mod mutex;
mod staged;


pub use file::FileStore;
pub use memory::MemoryStore;
pub use mutex::{MutexFileGuard, MutexHolder};
pub(crate) use mutex::owner_string;

use crate::deadline::Deadline;
use crate::error::Result;
use crate::types::{JobId, LockRecord, TargetId};
use std::collections::BTreeMap;
use std::fmt::Debug;

/// The full lock table, keyed by target.
pub type LockTable = BTreeMap<TargetId, LockRecord>;

/// A shared store of lock records.
pub trait LockStore: Send + Sync + Debug {
    /// Open a transaction, waiting at most until `deadline` for exclusive access.
    fn begin(&self, deadline: Deadline) -> Result<Box<dyn StoreTxn + '_>>;

    /// Largest number of rows a single statement may reference, if bounded.
    fn max_statement_rows(&self) -> Option<usize> {
        None
    }
}

/// An open transaction against a [`LockStore`].
///
/// Reads observe the transaction's own uncommitted writes. Nothing is visible
/// to other transactions until `commit` succeeds.
pub trait StoreTxn {
    /// Records for the given targets; targets without a record are omitted.
    fn select(&mut self, targets: &[TargetId]) -> Result<Vec<LockRecord>>;

    /// Insert or overwrite records, keyed by target.
    fn upsert(&mut self, records: &[LockRecord]) -> Result<()>;

    /// Delete records among `targets` whose owner is `owner`. Returns how many.
    fn delete_owned(&mut self, owner: JobId, targets: &[TargetId]) -> Result<usize>;

    /// Delete records for `targets` regardless of owner. Returns how many.
    fn delete(&mut self, targets: &[TargetId]) -> Result<usize>;

    /// Every record in the table, ordered by target.
    fn scan(&mut self) -> Result<Vec<LockRecord>>;

    /// Delete every record. Returns how many existed.
    fn truncate(&mut self) -> Result<usize>;

    /// Publish all changes made in this transaction.
    fn commit(self: Box<Self>) -> Result<()>;
}
