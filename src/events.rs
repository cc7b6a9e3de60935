//! Append-only audit log of lock operations.
//!
//! Every mutating CLI command appends one event to
//! `<store>/events/events.ndjson` (one JSON object per line) after the store
//! transaction commits, so operators can reconstruct who held what and when.
//!
//! # Event Format
//!
//! Each event is a JSON object with the following fields:
//! - `ts`: RFC3339 timestamp
//! - `action`: The operation performed (lock, unlock, try_lock, ...)
//! - `actor`: The owner string (e.g., `user@HOST`)
//! - `job`: Job ID for job-scoped operations
//! - `targets`: Targets the operation affected
//! - `details`: Freeform object with action-specific details
//!
//! ```no_run
//! use targetlock::context::StoreContext;
//! use targetlock::events::{Event, EventAction, append_event};
//! use targetlock::types::{JobId, TargetId};
//!
//! let ctx = StoreContext::resolve(None)?;
//! let event = Event::new(EventAction::Lock)
//!     .with_job(JobId(42))
//!     .with_targets(&[TargetId::from("dut-01")]);
//! append_event(&ctx, &event)?;
//! # Ok::<(), targetlock::error::LockError>(())
//! ```

use crate::context::StoreContext;
use crate::error::{LockError, Result};
use crate::store::owner_string;
use crate::types::{JobId, TargetId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;

/// Operations recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    Lock,
    Unlock,
    TryLock,
    Refresh,
    /// All records cleared by an operator.
    Reset,
    /// Expired records removed.
    Purge,
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventAction::Lock => write!(f, "lock"),
            EventAction::Unlock => write!(f, "unlock"),
            EventAction::TryLock => write!(f, "try_lock"),
            EventAction::Refresh => write!(f, "refresh"),
            EventAction::Reset => write!(f, "reset"),
            EventAction::Purge => write!(f, "purge"),
        }
    }
}

/// An event record for the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// RFC3339 timestamp when the event occurred.
    pub ts: DateTime<Utc>,

    pub action: EventAction,

    /// The actor who performed the action (e.g., `user@HOST`).
    pub actor: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<JobId>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetId>,

    /// Freeform details object with action-specific information.
    pub details: Value,
}

impl Event {
    /// Create a new event stamped with the current time and actor.
    pub fn new(action: EventAction) -> Self {
        Self {
            ts: Utc::now(),
            action,
            actor: owner_string(),
            job: None,
            targets: Vec::new(),
            details: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_job(mut self, job: JobId) -> Self {
        self.job = Some(job);
        self
    }

    pub fn with_targets(mut self, targets: &[TargetId]) -> Self {
        self.targets = targets.to_vec();
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Serialize the event to a single-line JSON string.
    pub fn to_ndjson_line(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| LockError::UserError(format!("failed to serialize event to JSON: {}", e)))
    }
}

/// Append an event to the store's audit log.
///
/// The events directory and file are created on first use. Each call appends
/// exactly one line and syncs it to disk.
pub fn append_event(ctx: &StoreContext, event: &Event) -> Result<()> {
    let events_file = ctx.events_file();
    let json_line = event.to_ndjson_line()?;

    let events_dir = ctx.events_dir();
    if !events_dir.exists() {
        fs::create_dir_all(&events_dir).map_err(|e| {
            LockError::StoreError(format!(
                "failed to create events directory '{}': {}",
                events_dir.display(),
                e
            ))
        })?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&events_file)
        .map_err(|e| {
            LockError::StoreError(format!(
                "failed to open events file '{}': {}",
                events_file.display(),
                e
            ))
        })?;

    writeln!(file, "{}", json_line).map_err(|e| {
        LockError::StoreError(format!(
            "failed to write event to '{}': {}",
            events_file.display(),
            e
        ))
    })?;

    file.sync_all().map_err(|e| {
        LockError::StoreError(format!(
            "failed to sync events file '{}': {}",
            events_file.display(),
            e
        ))
    })?;

    Ok(())
}

/// Read back every event in the log, oldest first.
///
/// A missing log reads as empty. Blank lines are skipped; any other
/// unparsable line is an error.
pub fn read_events(ctx: &StoreContext) -> Result<Vec<Event>> {
    let events_file = ctx.events_file();
    let content = match fs::read_to_string(&events_file) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(LockError::StoreError(format!(
                "failed to read events file '{}': {}",
                events_file.display(),
                e
            )));
        }
    };

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|e| {
                LockError::StoreError(format!(
                    "malformed event on line {} of '{}': {}",
                    index + 1,
                    events_file.display(),
                    e
                ))
            })
        })
        .collect()
}
