//! Unified error type for syncell.
//!
//! Every failure the engine can surface is a variant here; all of them
//! are recoverable at the call site. Conflicts are the only retryable
//! kind and are what the [`retry`](crate::retry) helper re-executes on.

use crate::types::Version;
use thiserror::Error;

/// All syncell errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Read attempted while the backend cell holds no value.
    #[error("empty cell: backend holds no value")]
    EmptyCell,

    /// CAS at commit time found an unexpected version; a competing
    /// commit won.
    #[error("transaction conflict: expected version {expected}, found {actual}")]
    Conflict {
        /// The baseline version the commit expected.
        expected: Version,
        /// The version the backend actually held.
        actual: Version,
    },

    /// The retry helper hit its attempt bound.
    #[error("retry attempts exhausted after {attempts} attempts")]
    RetryExhausted {
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// The retry helper hit its wall-clock deadline.
    #[error("retry deadline elapsed")]
    RetryTimeout,

    /// Mutation attempted on a wrapper no longer reachable from the
    /// root.
    #[error("mutation on detached wrapper")]
    Detached,

    /// Attempt to link one wrapper instance into two positions.
    #[error("value is already linked at another position")]
    Aliasing,

    /// Explicit refresh while a transaction is open.
    #[error("refresh while a transaction is open")]
    RefreshInTransaction,

    /// Operation not valid for the value's shape (bad index, wrong
    /// element type, foreign manager).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// I/O failure surfaced from a backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Non-I/O storage failure surfaced from a backend (corrupt cell
    /// framing, lost lock, shut-down cell).
    #[error("backend error: {0}")]
    Backend(String),

    /// Decode failure or unencodable value.
    #[error("codec error: {0}")]
    Codec(String),
}

/// Result type for syncell operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is retryable.
    ///
    /// Retryable errors (conflicts) may succeed on retry with fresh
    /// data.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// Check if this is a commit conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// Check if this is a detached-mutation error.
    pub fn is_detached(&self) -> bool {
        matches!(self, Error::Detached)
    }

    /// Check if this is the empty-cell error.
    pub fn is_empty_cell(&self) -> bool {
        matches!(self, Error::EmptyCell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_is_retryable() {
        let err = Error::Conflict { expected: Version::new(1), actual: Version::new(2) };
        assert!(err.is_retryable());
        assert!(err.is_conflict());
        assert!(!err.is_detached());
    }

    #[test]
    fn other_kinds_are_not_retryable() {
        assert!(!Error::Detached.is_retryable());
        assert!(!Error::EmptyCell.is_retryable());
        assert!(!Error::RetryTimeout.is_retryable());
    }

    #[test]
    fn display_includes_versions() {
        let err = Error::Conflict { expected: Version::new(3), actual: Version::new(5) };
        let msg = err.to_string();
        assert!(msg.contains('3') && msg.contains('5'));
    }
}
