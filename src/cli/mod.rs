//! CLI argument parsing for targetlock.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Targetlock: lease-based exclusive locks over shared targets.
///
/// Jobs lock the targets they are about to use, refresh the leases while they
/// work, and unlock when done. A lease that is not refreshed lapses on its
/// own, so a crashed job never wedges a target for longer than its lease.
#[derive(Parser, Debug)]
#[command(name = "targetlock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Lock store directory (defaults to $TARGETLOCK_DIR, then ./.targetlock).
    #[arg(long, global = true, value_name = "DIR")]
    pub store_dir: Option<PathBuf>,

    /// Give up if the call takes longer than this (overrides config).
    #[arg(long, global = true, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for targetlock.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Lock every listed target for a job, or none of them.
    ///
    /// Fails with exit code 4 if any target is held by another job.
    Lock(AcquireArgs),

    /// Release the listed targets the job owns.
    ///
    /// Targets owned by other jobs are left alone.
    Unlock(JobTargetsArgs),

    /// Lock as many of the listed targets as possible, up to a limit.
    ///
    /// Prints the targets the job holds afterwards, one per line.
    TryLock(TryLockArgs),

    /// Extend the leases the job still holds on the listed targets.
    Refresh(JobTargetsArgs),

    /// Show every lock record and whether it is still held.
    Status,

    /// Delete records whose lease has lapsed.
    Purge,

    /// Delete every lock record, regardless of owner.
    Reset(ResetArgs),
}

/// Job and target selection shared by job-scoped commands.
#[derive(Args, Debug)]
pub struct JobTargetsArgs {
    /// Job identifier (non-zero).
    #[arg(long)]
    pub job: u64,

    /// Target identifiers.
    #[arg(required = true)]
    pub targets: Vec<String>,
}

/// Arguments for the `lock` command.
#[derive(Args, Debug)]
pub struct AcquireArgs {
    #[command(flatten)]
    pub selection: JobTargetsArgs,

    /// Lease duration in seconds (defaults to config).
    #[arg(long)]
    pub lease_secs: Option<u64>,
}

/// Arguments for the `try-lock` command.
#[derive(Args, Debug)]
pub struct TryLockArgs {
    #[command(flatten)]
    pub acquire: AcquireArgs,

    /// Maximum number of targets to newly acquire (defaults to all listed).
    #[arg(long)]
    pub limit: Option<usize>,
}

/// Arguments for the `reset` command.
#[derive(Args, Debug)]
pub struct ResetArgs {
    /// Required: confirm that running jobs may lose their locks.
    #[arg(long)]
    pub force: bool,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
