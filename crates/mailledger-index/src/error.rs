//! Error types for the index sync engine.

use thiserror::Error;

use crate::log::LogError;
use crate::types::LogPosition;

/// Errors that can occur while syncing an index map.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A log record violated the format or an index invariant.
    ///
    /// The sync pass stops at the first corrupted record and the published
    /// map is left untouched.
    #[error("Index {position}: {reason}")]
    Corrupted {
        /// Position of the offending record.
        position: LogPosition,
        /// Description of the violation.
        reason: String,
    },

    /// The map can't be brought forward from this log; the index must be
    /// reopened from scratch.
    #[error("Index reopen required: {reason}")]
    ReopenRequired {
        /// Why the map is unusable.
        reason: String,
    },

    /// Allocating a private copy or growing a buffer failed.
    #[error("Out of memory while {context}")]
    OutOfMemory {
        /// What was being allocated.
        context: &'static str,
    },

    /// The log source failed.
    #[error("Transaction log error: {0}")]
    Log(#[from] LogError),
}

impl Error {
    /// Returns true if the error reports a corrupted record.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::Corrupted { .. })
    }

    /// Corruption or reopen reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Corrupted { reason, .. } | Self::ReopenRequired { reason } => Some(reason),
            Self::OutOfMemory { .. } | Self::Log(_) => None,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corruption_display_includes_position() {
        let err = Error::Corrupted {
            position: LogPosition::new(1, 48),
            reason: "Append with UID 3, but next_uid = 5".to_string(),
        };
        assert!(err.is_corruption());
        assert_eq!(err.to_string(), "Index 1:48: Append with UID 3, but next_uid = 5");
        assert_eq!(err.reason(), Some("Append with UID 3, but next_uid = 5"));
    }

    #[test]
    fn log_errors_convert() {
        let err: Error = LogError::NameTooLong { len: 70000 }.into();
        assert!(!err.is_corruption());
        assert!(err.reason().is_none());
    }
}
