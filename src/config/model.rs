//! Config struct definition and default implementation.

use crate::batch::DEFAULT_MAX_BATCH_SIZE;
use serde::{Deserialize, Serialize};

/// Configuration shared by every process using one lock store.
///
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Protocol settings
    // =========================================================================
    /// Maximum targets per store statement; larger requests are split.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Lease granted by `lock`/`try-lock` when the caller does not pass one.
    #[serde(default = "default_lease_seconds")]
    pub default_lease_seconds: u64,

    /// Lease applied on refresh. When unset, each record's own lease is reused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_lease_seconds: Option<u64>,

    /// Deadline for a single operation, from call to commit.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    // =========================================================================
    // File store settings
    // =========================================================================
    /// Sleep between attempts to take the store mutex.
    #[serde(default = "default_mutex_retry_ms")]
    pub mutex_retry_ms: u64,

    /// Age after which a leftover store mutex is considered abandoned.
    #[serde(default = "default_mutex_stale_seconds")]
    pub mutex_stale_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            default_lease_seconds: default_lease_seconds(),
            refresh_lease_seconds: None,
            call_timeout_ms: default_call_timeout_ms(),
            mutex_retry_ms: default_mutex_retry_ms(),
            mutex_stale_seconds: default_mutex_stale_seconds(),
        }
    }
}

pub(crate) fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

pub(crate) fn default_lease_seconds() -> u64 {
    30
}

pub(crate) fn default_call_timeout_ms() -> u64 {
    5_000
}

pub(crate) fn default_mutex_retry_ms() -> u64 {
    10
}

pub(crate) fn default_mutex_stale_seconds() -> u64 {
    60
}
