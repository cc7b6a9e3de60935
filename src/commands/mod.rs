//! Command implementations for targetlock.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations. Every command runs against the file-backed store in the
//! resolved store directory, under a single call deadline.

mod admin;
mod locking;


use crate::cli::{Cli, Command};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use targetlock::config::Config;
use targetlock::context::StoreContext;
use targetlock::deadline::Deadline;
use targetlock::error::{LockError, Result};
use targetlock::events::{Event, EventAction, append_event};
use targetlock::manager::LockManager;
use targetlock::store::FileStore;
use targetlock::types::{JobId, TargetId};

/// Everything a command needs: resolved paths, config, and a manager.
pub(crate) struct Session {
    pub ctx: StoreContext,
    pub config: Config,
    pub manager: LockManager,
    timeout: Duration,
}

impl Session {
    /// Open the store in `store_dir` (or the default location).
    ///
    /// `timeout_ms` overrides the configured call timeout.
    pub fn open(store_dir: Option<&Path>, timeout_ms: Option<u64>) -> Result<Self> {
        let ctx = StoreContext::resolve(store_dir)?;
        ctx.ensure_dir()?;
        Self::from_context(ctx, timeout_ms)
    }

    pub fn from_context(ctx: StoreContext, timeout_ms: Option<u64>) -> Result<Self> {
        let config = Config::load_or_default(ctx.config_path())?;
        let store = FileStore::from_config(&ctx, &config);
        let manager = LockManager::from_config(Arc::new(store), &config);
        let timeout = match timeout_ms {
            Some(0) => {
                return Err(LockError::UserError(
                    "--timeout-ms must be greater than 0".to_string(),
                ));
            }
            Some(ms) => Duration::from_millis(ms),
            None => config.call_timeout(),
        };

        Ok(Self {
            ctx,
            config,
            manager,
            timeout,
        })
    }

    /// A fresh deadline for one store operation.
    pub fn deadline(&self) -> Deadline {
        Deadline::after(self.timeout)
    }

    /// Append an audit event for a committed operation.
    ///
    /// The lock state has already changed by the time this runs, so a failed
    /// append is reported but does not fail the command.
    pub fn record(&self, action: EventAction, job: Option<JobId>, targets: &[TargetId], details: Value) {
        let mut event = Event::new(action).with_targets(targets).with_details(details);
        if let Some(job) = job {
            event = event.with_job(job);
        }

        if let Err(e) = append_event(&self.ctx, &event) {
            tracing::warn!(action = %action, error = %e, "failed to append audit event");
        }
    }
}

/// Dispatch a command to its implementation.
pub fn dispatch(cli: Cli) -> Result<()> {
    let session = Session::open(cli.store_dir.as_deref(), cli.timeout_ms)?;

    match cli.command {
        Command::Lock(args) => locking::cmd_lock(&session, args),
        Command::Unlock(args) => locking::cmd_unlock(&session, args),
        Command::TryLock(args) => locking::cmd_try_lock(&session, args),
        Command::Refresh(args) => locking::cmd_refresh(&session, args),
        Command::Status => admin::cmd_status(&session),
        Command::Purge => admin::cmd_purge(&session),
        Command::Reset(args) => admin::cmd_reset(&session, args),
    }
}

/// Convert raw CLI target strings into target identifiers, keeping the first
/// occurrence of each.
fn target_ids(raw: &[String]) -> Vec<TargetId> {
    let mut seen = HashSet::with_capacity(raw.len());
    raw.iter()
        .filter(|id| seen.insert(id.as_str()))
        .map(|id| TargetId::new(id.as_str()))
        .collect()
}
