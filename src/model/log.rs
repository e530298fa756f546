//! Cycle log entries and the persistent check status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of the cycle log. The log is append-only, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(default)]
    pub is_error: bool,
}

impl LogEntry {
    pub fn info(timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            message: message.into(),
            is_error: false,
        }
    }

    pub fn error(timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            message: message.into(),
            is_error: true,
        }
    }
}

/// Outcome of the most recent check, as shown to the site owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckStatus {
    /// No check has run against a configured mailbox yet.
    #[default]
    #[serde(rename = "unconfigured")]
    Unconfigured,
    /// Last check did not hit a connection or fetch failure.
    #[serde(rename = "")]
    Ok,
    /// Last check failed to connect, list or fetch.
    #[serde(rename = "error")]
    Error,
}

/// Persistent state of the check loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckState {
    #[serde(default)]
    pub status: CheckStatus,

    /// Start of the most recent cycle against a configured mailbox.
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,

    /// Checks before this instant are refused. Cleared after a cycle fails
    /// so the next attempt can run at once.
    #[serde(default)]
    pub lease_until: Option<DateTime<Utc>>,
}
