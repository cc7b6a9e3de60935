//! Per-call execution deadlines.
//!
//! A [`Deadline`] bounds how long a single lock operation may take, which is
//! unrelated to the lease it grants. It is measured on the monotonic clock so
//! that a mocked lease clock never makes a call time out, and vice versa.

use crate::error::{LockError, Result};
use std::time::{Duration, Instant};

/// Point in monotonic time after which a call must give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// No deadline; the call runs to completion.
    pub fn none() -> Self {
        Self { at: None }
    }

    /// Deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(timeout),
        }
    }

    /// Deadline at a specific instant.
    pub fn at(instant: Instant) -> Self {
        Self { at: Some(instant) }
    }

    /// Time left, or `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.at, Some(at) if Instant::now() >= at)
    }

    /// Fail with `Timeout` if the deadline has passed.
    ///
    /// `during` names the step being attempted and ends up in the error message.
    pub fn check(&self, during: &str) -> Result<()> {
        if self.is_expired() {
            return Err(LockError::Timeout(format!("{} did not complete in time", during)));
        }
        Ok(())
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}
