//! Centralized error types for mailpost.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailpost library.
///
/// Policy outcomes (PIN mismatch, unknown sender) are not errors; they are
/// reported through [`crate::post::Outcome`].
#[derive(Error, Debug)]
pub enum MailpostError {
    /// Settings are missing or still hold placeholder values.
    #[error("Mail server is not configured: {0}")]
    Unconfigured(String),

    /// A setting is present but unusable.
    #[error("Invalid setting: {0}")]
    InvalidConfig(String),

    /// Authentication failure, unreachable host or TLS failure.
    #[error("Could not connect to the mail server: {0}")]
    Connection(String),

    /// A command failed on an open session (listing, fetching, flagging).
    #[error("Mail server error: {0}")]
    Protocol(String),

    /// The post store refused the post.
    #[error("Post rejected: {0}")]
    Validation(String),

    /// A MIME decoding error.
    #[error("MIME decoding error: {0}")]
    Mime(String),

    /// An operation was called on a connection that is not open.
    #[error("Connection is {0}")]
    InvalidState(&'static str),

    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A data file could not be read or written as JSON.
    #[error("Corrupt data file '{path}': {reason}")]
    DataFile { path: PathBuf, reason: String },
}

/// Convenience alias for `Result<T, MailpostError>`.
pub type Result<T> = std::result::Result<T, MailpostError>;

impl MailpostError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// `true` when the failure must abort the whole check cycle.
    ///
    /// Everything else only costs the message being processed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Unconfigured(_) | Self::InvalidConfig(_) | Self::Connection(_)
        )
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (sockets, mostly; prefer `MailpostError::io` for files).
impl From<std::io::Error> for MailpostError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<socket>"),
            source,
        }
    }
}

impl From<native_tls::Error> for MailpostError {
    fn from(e: native_tls::Error) -> Self {
        Self::Connection(format!("TLS: {e}"))
    }
}

impl From<imap::error::Error> for MailpostError {
    fn from(e: imap::error::Error) -> Self {
        Self::Protocol(e.to_string())
    }
}
