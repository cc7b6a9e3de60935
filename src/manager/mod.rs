//! The lease-based lock manager.
//!
//! `LockManager` arbitrates exclusive, time-bounded ownership of targets among
//! jobs. It is a stateless protocol layer: all ownership state lives in the
//! [`LockStore`], every decision is made against a fresh read inside the
//! transaction that may mutate it, and nothing is cached between calls. Many
//! managers in many processes may share one store.
//!
//! # Operations
//!
//! - [`lock`](LockManager::lock): all-or-nothing, reentrant acquisition.
//! - [`try_lock`](LockManager::try_lock): best-effort acquisition bounded by a
//!   limit on newly acquired targets.
//! - [`refresh_locks`](LockManager::refresh_locks): extend leases the caller holds.
//! - [`unlock`](LockManager::unlock): release whatever the caller owns.
//! - [`reset_all_locks`](LockManager::reset_all_locks),
//!   [`purge_expired`](LockManager::purge_expired),
//!   [`list_locks`](LockManager::list_locks): administration.
//!
//! None of them wait for a target to become free. Each takes a
//! [`Deadline`](crate::deadline::Deadline) bounding the call itself; running past it aborts with `Timeout` and the
//! open transaction is discarded.
//!
//! # Batching
//!
//! Requests larger than the configured batch size are issued to the store as
//! several bounded statements, all inside one transaction, so a conflict found
//! in the last sub-batch still leaves every target untouched.

mod maintenance;
mod operations;

#[cfg(test)]
mod tests;

use crate::batch::BatchSplitter;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::store::LockStore;
use std::sync::Arc;
use std::time::Duration;

/// Lease-based mutual exclusion over targets, backed by a shared store.
#[derive(Debug, Clone)]
pub struct LockManager {
    store: Arc<dyn LockStore>,
    clock: Arc<dyn Clock>,
    splitter: BatchSplitter,

    /// Lease applied by `refresh_locks`. `None` reuses each record's own lease.
    refresh_lease: Option<Duration>,
}

impl LockManager {
    /// Manager over `store` using the system clock and default batch size.
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        let splitter = BatchSplitter::default().clamped_to(store.max_statement_rows());
        Self {
            store,
            clock: Arc::new(SystemClock),
            splitter,
            refresh_lease: None,
        }
    }

    /// Manager over `store` tuned by `config`.
    pub fn from_config(store: Arc<dyn LockStore>, config: &Config) -> Self {
        let manager = Self::new(store).with_max_batch_size(config.max_batch_size);
        match config.refresh_lease() {
            Some(lease) => manager.with_refresh_lease(lease),
            None => manager,
        }
    }

    /// Replace the time source used for every expiry decision.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Bound the number of targets per store statement.
    ///
    /// The store's own statement limit still applies if it is smaller.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.splitter =
            BatchSplitter::new(max_batch_size).clamped_to(self.store.max_statement_rows());
        self
    }

    /// Use a fixed lease for refreshes instead of each record's original lease.
    pub fn with_refresh_lease(mut self, lease: Duration) -> Self {
        self.refresh_lease = Some(lease);
        self
    }

    pub fn max_batch_size(&self) -> usize {
        self.splitter.max_batch_size()
    }
}
