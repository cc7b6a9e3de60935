//! Error types for targetlock.
//!
//! Uses thiserror for derive macros. The variants follow the lock protocol's
//! error taxonomy: invalid input, conflict, store failure, and call timeout,
//! plus `UserError` for CLI and configuration problems.

use crate::exit_codes;
use crate::types::{JobId, TargetId};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Main error type for targetlock operations.
#[derive(Error, Debug)]
pub enum LockError {
    /// User provided invalid arguments or configuration.
    #[error("{0}")]
    UserError(String),

    /// A job or target identifier failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A requested target is held by a different job whose lease has not expired.
    #[error("target '{target}' is held by job {owner} until {}", .expires_at.to_rfc3339())]
    Conflict {
        target: TargetId,
        owner: JobId,
        expires_at: DateTime<Utc>,
    },

    /// The lock store could not be read, written, or committed.
    #[error("lock store failure: {0}")]
    StoreError(String),

    /// The call deadline expired before the operation completed.
    #[error("deadline exceeded: {0}")]
    Timeout(String),
}

impl LockError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LockError::UserError(_) => exit_codes::USER_ERROR,
            LockError::InvalidInput(_) => exit_codes::USER_ERROR,
            LockError::Conflict { .. } => exit_codes::LOCK_CONFLICT,
            LockError::StoreError(_) => exit_codes::STORE_FAILURE,
            LockError::Timeout(_) => exit_codes::TIMEOUT,
        }
    }

    /// Whether this error reports a target held by another job.
    pub fn is_conflict(&self) -> bool {
        matches!(self, LockError::Conflict { .. })
    }
}

/// Result type alias for targetlock operations.
pub type Result<T> = std::result::Result<T, LockError>;
