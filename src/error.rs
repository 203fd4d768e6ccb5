//! Centralized error types for chatsweep.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the chatsweep library.
///
/// Field absence during payload decoding is deliberately NOT represented
/// here — the decoding layer signals it through `Option`, never through an
/// error (see [`crate::proto`]).
#[derive(Error, Debug)]
pub enum SweepError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The log file does not exist or is not a readable message log.
    #[error("Not a valid message log: {0}")]
    InvalidLog(PathBuf),

    /// A record in the log store could not be read or written.
    #[error("Log store error: {0}")]
    Store(String),

    /// The conversation id is unknown to the store or the bridge.
    #[error("Unknown conversation: {0}")]
    InvalidConversation(String),

    /// The remote action bridge cannot be reached or stopped responding.
    #[error("Action bridge unavailable: {0}")]
    BridgeUnavailable(String),

    /// The bridge rejected a single action call. Recoverable: the bulk
    /// loop reports it through the failure callback and moves on.
    #[error("Action rejected: {0}")]
    ActionRejected(String),

    /// A media download handed to the download collaborator failed.
    #[error("Download failed: {0}")]
    Download(String),

    /// The user cancelled the operation.
    #[error("Operation cancelled by user")]
    Cancelled,
}

/// Convenience alias for `Result<T, SweepError>`.
pub type Result<T> = std::result::Result<T, SweepError>;

impl SweepError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error makes continuing a bulk run meaningless.
    ///
    /// A rejected action only fails one message; everything else is an
    /// infrastructure fault that terminates the run as FAILED.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ActionRejected(_))
    }
}

/// Allow `?` on `std::io::Error` inside functions returning `SweepError`
/// when no path context is available (rare — prefer `SweepError::io`).
impl From<std::io::Error> for SweepError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_is_not_fatal() {
        assert!(!SweepError::ActionRejected("duplicate request".into()).is_fatal());
    }

    #[test]
    fn test_infrastructure_errors_are_fatal() {
        assert!(SweepError::BridgeUnavailable("timed out".into()).is_fatal());
        assert!(SweepError::InvalidConversation("abc".into()).is_fatal());
        assert!(SweepError::Store("table missing".into()).is_fatal());
        assert!(SweepError::Cancelled.is_fatal());
    }
}
