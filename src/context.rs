//! Store directory resolution for targetlock.
//!
//! A file-backed lock store is a directory shared by every job runner that
//! competes for the same targets (typically on a network filesystem):
//!
//! ```text
//! <store_dir>/
//!   config.yaml           optional tuning, see `Config`
//!   locks.json            the lock table
//!   .locks.mutex          present while a transaction is open
//!   events/events.ndjson  audit trail of CLI operations
//! ```
//!
//! The directory comes from `--store-dir`, else the `TARGETLOCK_DIR`
//! environment variable, else `.targetlock` under the working directory.

use crate::error::{LockError, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default store directory, relative to the working directory.
pub const DEFAULT_STORE_DIR: &str = ".targetlock";

/// Environment variable that overrides the default store directory.
pub const STORE_DIR_ENV: &str = "TARGETLOCK_DIR";

/// Resolved paths for a file-backed lock store. All paths are absolute when
/// produced by `resolve`.
#[derive(Debug, Clone)]
pub struct StoreContext {
    pub store_dir: PathBuf,
}

impl StoreContext {
    /// Context rooted at an explicit directory.
    pub fn at<P: AsRef<Path>>(store_dir: P) -> Self {
        Self {
            store_dir: store_dir.as_ref().to_path_buf(),
        }
    }

    /// Resolve the store directory from the flag, environment, or default.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let cwd = env::current_dir().map_err(|e| {
            LockError::UserError(format!("failed to get current working directory: {}", e))
        })?;

        let chosen = match explicit {
            Some(dir) => dir.to_path_buf(),
            None => match env::var_os(STORE_DIR_ENV) {
                Some(dir) if !dir.is_empty() => PathBuf::from(dir),
                _ => PathBuf::from(DEFAULT_STORE_DIR),
            },
        };

        let store_dir = if chosen.is_absolute() {
            chosen
        } else {
            cwd.join(chosen)
        };

        Ok(Self { store_dir })
    }

    /// Create the store directory if it does not exist yet.
    pub fn ensure_dir(&self) -> Result<()> {
        if !self.store_dir.exists() {
            fs::create_dir_all(&self.store_dir).map_err(|e| {
                LockError::UserError(format!(
                    "failed to create store directory '{}': {}",
                    self.store_dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.store_dir.join("config.yaml")
    }

    /// Get the path to the lock table file.
    pub fn table_path(&self) -> PathBuf {
        self.store_dir.join("locks.json")
    }

    /// Get the path to the transaction mutex file.
    pub fn mutex_path(&self) -> PathBuf {
        self.store_dir.join(".locks.mutex")
    }

    pub fn events_dir(&self) -> PathBuf {
        self.store_dir.join("events")
    }

    pub fn events_file(&self) -> PathBuf {
        self.events_dir().join("events.ndjson")
    }
}
