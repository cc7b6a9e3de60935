//! Store-wide commands: `status`, `purge`, `reset`.

use super::Session;
use crate::cli::ResetArgs;
use serde_json::json;
use targetlock::error::{LockError, Result};
use targetlock::events::EventAction;

pub fn cmd_status(session: &Session) -> Result<()> {
    let statuses = session.manager.list_locks(session.deadline())?;

    if statuses.is_empty() {
        println!("No lock records.");
        return Ok(());
    }

    let held = statuses.iter().filter(|s| s.held).count();
    println!("Lock records ({}, {} held):", statuses.len(), held);
    println!();
    for status in &statuses {
        println!("  {}", status);
    }

    let expired = statuses.len() - held;
    if expired > 0 {
        println!();
        println!(
            "Note: {} record(s) have expired. Use `targetlock purge` to remove them.",
            expired
        );
    }

    Ok(())
}

pub fn cmd_purge(session: &Session) -> Result<()> {
    let purged = session.manager.purge_expired(session.deadline())?;

    if purged > 0 {
        session.record(EventAction::Purge, None, &[], json!({ "purged": purged }));
    }
    println!("Purged {} expired record(s)", purged);
    Ok(())
}

pub fn cmd_reset(session: &Session, args: ResetArgs) -> Result<()> {
    if !args.force {
        return Err(LockError::UserError(
            "refusing to reset locks without --force flag.\n\n\
             Resetting removes every lock, including those held by running jobs.\n\
             Only reset if you are certain no job still relies on its locks.\n\n\
             To reset, run:\n  targetlock reset --force"
                .to_string(),
        ));
    }

    session.manager.reset_all_locks(session.deadline())?;

    session.record(EventAction::Reset, None, &[], json!({ "force": true }));
    println!("Reset all locks");
    Ok(())
}
