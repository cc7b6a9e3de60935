//! Lease-based mutual exclusion over shared targets.
//!
//! Jobs that need exclusive use of a set of targets (machines, devices, any
//! resource with a string identifier) acquire time-bounded leases through a
//! [`LockManager`](manager::LockManager). All ownership state lives in a
//! shared [`LockStore`](store::LockStore), so managers in different processes
//! or on different hosts coordinate through the store alone.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use targetlock::context::StoreContext;
//! use targetlock::deadline::Deadline;
//! use targetlock::manager::LockManager;
//! use targetlock::store::FileStore;
//! use targetlock::types::{JobId, TargetId};
//!
//! let ctx = StoreContext::resolve(None)?;
//! ctx.ensure_dir()?;
//! let manager = LockManager::new(Arc::new(FileStore::new(&ctx)));
//!
//! let targets = [TargetId::from("dut-01"), TargetId::from("dut-02")];
//! let deadline = Deadline::after(Duration::from_secs(5));
//! manager.lock(deadline, JobId(42), Duration::from_secs(30), &targets)?;
//! // ... use the targets, calling refresh_locks periodically ...
//! manager.unlock(Deadline::after(Duration::from_secs(5)), JobId(42), &targets)?;
//! # Ok::<(), targetlock::error::LockError>(())
//! ```

pub mod batch;
pub mod clock;
pub mod config;
pub mod context;
pub mod deadline;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod fs;
pub mod manager;
pub mod store;
pub mod types;

#[cfg(test)]
mod test_support;
