//! Job-scoped commands: `lock`, `unlock`, `try-lock`, `refresh`.

use super::{Session, target_ids};
use crate::cli::{AcquireArgs, JobTargetsArgs, TryLockArgs};
use serde_json::json;
use std::time::Duration;
use targetlock::error::Result;
use targetlock::events::EventAction;
use targetlock::types::JobId;

fn lease_for(session: &Session, args: &AcquireArgs) -> Duration {
    args.lease_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| session.config.default_lease())
}

pub fn cmd_lock(session: &Session, args: AcquireArgs) -> Result<()> {
    let job = JobId(args.selection.job);
    let targets = target_ids(&args.selection.targets);
    let lease = lease_for(session, &args);

    session.manager.lock(session.deadline(), job, lease, &targets)?;

    session.record(
        EventAction::Lock,
        Some(job),
        &targets,
        json!({ "lease_secs": lease.as_secs_f64() }),
    );
    println!(
        "Locked {} target(s) for job {} (lease {}s)",
        targets.len(),
        job,
        lease.as_secs_f64()
    );
    Ok(())
}

pub fn cmd_unlock(session: &Session, args: JobTargetsArgs) -> Result<()> {
    let job = JobId(args.job);
    let targets = target_ids(&args.targets);

    session.manager.unlock(session.deadline(), job, &targets)?;

    session.record(EventAction::Unlock, Some(job), &targets, json!({}));
    println!("Released job {}'s locks among {} target(s)", job, targets.len());
    Ok(())
}

/// Prints the targets the job holds afterwards, one per line, so the output
/// can be consumed by scripts.
pub fn cmd_try_lock(session: &Session, args: TryLockArgs) -> Result<()> {
    let job = JobId(args.acquire.selection.job);
    let targets = target_ids(&args.acquire.selection.targets);
    let lease = lease_for(session, &args.acquire);
    let limit = args.limit.unwrap_or(targets.len());

    let granted = session
        .manager
        .try_lock(session.deadline(), job, lease, &targets, limit)?;

    session.record(
        EventAction::TryLock,
        Some(job),
        &granted,
        json!({
            "requested": targets.len(),
            "limit": limit,
            "lease_secs": lease.as_secs_f64(),
        }),
    );
    for target in &granted {
        println!("{}", target);
    }
    Ok(())
}

pub fn cmd_refresh(session: &Session, args: JobTargetsArgs) -> Result<()> {
    let job = JobId(args.job);
    let targets = target_ids(&args.targets);

    session.manager.refresh_locks(session.deadline(), job, &targets)?;

    session.record(EventAction::Refresh, Some(job), &targets, json!({}));
    println!("Refreshed job {}'s leases among {} target(s)", job, targets.len());
    Ok(())
}
