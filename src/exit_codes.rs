//! Exit code constants for the targetlock CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid job/target identifiers, bad config)
//! - 2: Store failure (lock table unreadable, commit failed)
//! - 3: Call deadline exceeded
//! - 4: Lock conflict (a target is held by another job)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid identifiers, or invalid configuration.
pub const USER_ERROR: i32 = 1;

/// Store failure: the lock table could not be read, written, or committed.
pub const STORE_FAILURE: i32 = 2;

/// The call deadline expired before the operation could complete.
pub const TIMEOUT: i32 = 3;

/// Lock acquisition failure: a requested target is held by another job.
pub const LOCK_CONFLICT: i32 = 4;
