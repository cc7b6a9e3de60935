//! Cross-process mutex for the file store.
//!
//! The mutex is a file created with **create_new** semantics (exclusive
//! create): whoever creates it owns the lock table until the file is removed.
//! The file carries JSON metadata about its holder so that contention errors
//! can say who is in the way, and so that a holder that crashed mid-transaction
//! can be recognized once its mutex is older than the stale threshold.
//!
//! Breaking a stale mutex is itself serialized by a second exclusive-create
//! file (`<mutex>.break`). Each acquisition stamps a unique nonce into the
//! mutex, and a holder only removes or publishes under a mutex that still
//! carries its own nonce.

use crate::deadline::Deadline;
use crate::error::{LockError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, SystemTime};

/// Metadata written into the mutex file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutexHolder {
    /// Owner of the mutex (e.g., `user@HOST`).
    pub owner: String,

    /// Process ID of the holder (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    /// Timestamp when the mutex was taken (RFC3339).
    pub created_at: DateTime<Utc>,

    /// Identifies one acquisition; never reused.
    #[serde(default)]
    pub nonce: String,
}

impl MutexHolder {
    /// Metadata for the current process, stamped now.
    pub fn current() -> Self {
        Self {
            owner: owner_string(),
            pid: Some(std::process::id()),
            created_at: Utc::now(),
            nonce: next_nonce(),
        }
    }

    /// Parse holder metadata from a mutex file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            LockError::StoreError(format!(
                "failed to read mutex file '{}': {}",
                path.display(),
                e
            ))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            LockError::StoreError(format!(
                "failed to parse mutex file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| LockError::StoreError(format!("failed to serialize mutex holder: {}", e)))
    }

    /// Age of the mutex by wall-clock time.
    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.created_at)
    }
}

static NEXT_NONCE: AtomicU64 = AtomicU64::new(0);

fn next_nonce() -> String {
    format!(
        "{}-{}-{}",
        std::process::id(),
        Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        NEXT_NONCE.fetch_add(1, Ordering::Relaxed)
    )
}

/// `user@host` for the current process.
pub(crate) fn owner_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

/// RAII guard for a held mutex file.
///
/// When dropped, the mutex file is deleted if it still carries this guard's
/// nonce. If deletion fails, a warning is logged but no panic occurs.
#[derive(Debug)]
pub struct MutexFileGuard {
    path: PathBuf,
    nonce: String,
    released: bool,
}

impl MutexFileGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file on disk is still the one this guard created.
    pub fn is_held(&self) -> bool {
        MutexHolder::from_file(&self.path).is_ok_and(|holder| holder.nonce == self.nonce)
    }

    /// Fail if the mutex was broken as stale and possibly re-taken.
    pub fn verify(&self) -> Result<()> {
        if self.is_held() {
            return Ok(());
        }
        Err(LockError::StoreError(format!(
            "store mutex '{}' is no longer held by this transaction (broken as stale?)",
            self.path.display()
        )))
    }

    /// Release the mutex explicitly, surfacing any error.
    ///
    /// A mutex that now belongs to someone else is left in place.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.verify()?;
        fs::remove_file(&self.path).map_err(|e| {
            LockError::StoreError(format!(
                "failed to release mutex '{}': {}",
                self.path.display(),
                e
            ))
        })
    }
}

impl Drop for MutexFileGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if !self.is_held() {
            tracing::warn!(path = %self.path.display(), "store mutex was taken over; leaving it in place");
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release store mutex");
        }
    }
}

/// How to wait for a contended mutex.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MutexPolicy {
    /// Sleep between attempts.
    pub retry_interval: Duration,

    /// Mutex files older than this are assumed abandoned and removed.
    pub stale_after: Duration,
}

/// Take the mutex at `path`, retrying until `deadline`.
pub(crate) fn acquire(path: &Path, policy: MutexPolicy, deadline: Deadline) -> Result<MutexFileGuard> {
    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            LockError::StoreError(format!(
                "failed to create store directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    loop {
        match try_create(path)? {
            Some(guard) => return Ok(guard),
            None => {
                if is_stale(path, policy.stale_after) && break_stale(path, policy.stale_after)? {
                    continue;
                }

                if deadline.is_expired() {
                    return Err(LockError::Timeout(format!(
                        "store mutex is held{}",
                        describe_holder(path)
                    )));
                }

                let pause = match deadline.remaining() {
                    Some(left) => policy.retry_interval.min(left),
                    None => policy.retry_interval,
                };
                thread::sleep(pause);
            }
        }
    }
}

/// One exclusive-create attempt. `Ok(None)` means somebody else holds it.
fn try_create(path: &Path) -> Result<Option<MutexFileGuard>> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
        Err(e) => {
            return Err(LockError::StoreError(format!(
                "failed to create mutex '{}': {}",
                path.display(),
                e
            )));
        }
    };

    let holder = MutexHolder::current();
    if let Err(e) = write_holder(&mut file, &holder) {
        // Nobody else can own a file we just created.
        let _ = fs::remove_file(path);
        return Err(e);
    }

    Ok(Some(MutexFileGuard {
        path: path.to_path_buf(),
        nonce: holder.nonce,
        released: false,
    }))
}

fn write_holder(file: &mut fs::File, holder: &MutexHolder) -> Result<()> {
    let json = holder.to_json()?;
    file.write_all(json.as_bytes()).map_err(|e| {
        LockError::StoreError(format!("failed to write mutex metadata: {}", e))
    })?;
    file.sync_all()
        .map_err(|e| LockError::StoreError(format!("failed to sync mutex file: {}", e)))
}

/// Remove the mutex at `path` if it is still stale once the breaker file is
/// held. Returns whether a stale mutex was removed.
fn break_stale(path: &Path, stale_after: Duration) -> Result<bool> {
    let breaker_path = breaker_path(path);
    let Some(breaker) = try_create(&breaker_path)? else {
        if is_stale(&breaker_path, stale_after) {
            tracing::warn!(path = %breaker_path.display(), "removing abandoned mutex breaker");
            let _ = fs::remove_file(&breaker_path);
        }
        return Ok(false);
    };

    // What was judged stale before taking the breaker may since have been
    // replaced by a live holder.
    if !is_stale(path, stale_after) {
        drop(breaker);
        return Ok(false);
    }

    tracing::warn!(path = %path.display(), holder = %describe_holder(path).trim(), "breaking stale store mutex");
    let removed = match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(LockError::StoreError(format!(
            "failed to remove stale mutex '{}': {}",
            path.display(),
            e
        ))),
    };
    drop(breaker);
    removed
}

fn breaker_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".break");
    PathBuf::from(name)
}

/// Whether the mutex at `path` has outlived `stale_after`.
///
/// Falls back to the file's mtime when the metadata cannot be parsed, which
/// happens if the holder died between creating and writing the file.
fn is_stale(path: &Path, stale_after: Duration) -> bool {
    let stale_after_chrono = chrono::Duration::from_std(stale_after).unwrap_or(chrono::Duration::MAX);
    match MutexHolder::from_file(path) {
        Ok(holder) => holder.age() > stale_after_chrono,
        Err(_) => fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > stale_after),
    }
}

fn describe_holder(path: &Path) -> String {
    match MutexHolder::from_file(path) {
        Ok(holder) => format!(
            " by {} (pid {}, since {})",
            holder.owner,
            holder
                .pid
                .map(|p| p.to_string())
                .unwrap_or_else(|| "?".to_string()),
            holder.created_at.to_rfc3339()
        ),
        Err(_) => format!(" ({})", path.display()),
    }
}
