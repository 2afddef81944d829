//! Error taxonomy for the scope-locking layer.
//!
//! Structured variants for every failure the layer can surface, split along
//! the lines callers dispatch on: lock timeouts (distinguished by mode so
//! upstream retry policy can differ), fatal schema/configuration defects,
//! precondition violations, and the teardown leak check. Nothing in this
//! layer retries or swallows: every error propagates synchronously to the
//! immediate caller.

use thiserror::Error;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, LockError>;

// ---------------------------------------------------------------------------
// Driver boundary
// ---------------------------------------------------------------------------

/// A failure reported by the ambient database session.
///
/// The session executes statements inside the externally-owned transaction;
/// it classifies engine error codes into the two conditions the lock
/// adapters dispatch on and passes everything else through as
/// [`DbError::Statement`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    /// The engine gave up waiting for a row lock (strict row-locking
    /// engines report this via a dedicated error code, e.g. 1222).
    #[error("lock wait timeout exceeded")]
    LockWaitExceeded,

    /// Another writer held the log for the whole busy-retry window
    /// (write-ahead-log engines report SQLITE_BUSY-style conditions).
    #[error("database is busy")]
    Busy,

    /// Any other statement failure.
    #[error("statement failed: {0}")]
    Statement(String),
}

// ---------------------------------------------------------------------------
// LockError
// ---------------------------------------------------------------------------

/// Primary error type for scope-locking operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    // === Timeouts ===
    /// A shared (read) lock could not be obtained within the allotted
    /// duration. Callers may retry with backoff; this layer never does.
    #[error("timed out acquiring read lock for lock id {lock_id}")]
    ReadTimeout { lock_id: i32 },

    /// An exclusive (write) lock could not be obtained within the allotted
    /// duration.
    #[error("timed out acquiring write lock for lock id {lock_id}")]
    WriteTimeout { lock_id: i32 },

    // === Schema / configuration defects ===
    /// The lock table has no row for the requested identifier. Rows are
    /// pre-seeded by schema migration; a missing row is a deployment
    /// defect, never a transient condition.
    #[error("no lock row exists for lock id {lock_id}")]
    MissingLockRow { lock_id: i32 },

    // === Precondition violations ===
    /// A lock was requested while no ambient transaction was open.
    #[error("no ambient transaction is active")]
    NoAmbientTransaction,

    /// The ambient transaction's isolation level is too weak for row
    /// locking to mean anything.
    #[error("transaction isolation level {actual} is below the required {required}")]
    IsolationTooWeak {
        required: &'static str,
        actual: &'static str,
    },

    // === Teardown ===
    /// Teardown found lock interest still registered for one or more
    /// units of work, meaning a nested unit never signalled completion.
    /// The report lists every remaining (unit, lock id, count) entry.
    #[error("units of work not fully completed at teardown: {report}")]
    UnbalancedCompletion { report: String },

    // === Passthrough ===
    /// A driver failure that is neither a timeout nor a busy condition.
    #[error(transparent)]
    Db(#[from] DbError),
}

impl LockError {
    /// Whether this error is a lock-acquisition timeout (read or write).
    ///
    /// Timeouts are the only variants a caller may reasonably retry.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ReadTimeout { .. } | Self::WriteTimeout { .. }
        )
    }

    /// Whether this error signals a programming or configuration defect
    /// that no amount of retrying will fix.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingLockRow { .. }
                | Self::NoAmbientTransaction
                | Self::IsolationTooWeak { .. }
                | Self::UnbalancedCompletion { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_retryable_not_fatal() {
        let read = LockError::ReadTimeout { lock_id: -333 };
        let write = LockError::WriteTimeout { lock_id: -334 };
        assert!(read.is_timeout());
        assert!(write.is_timeout());
        assert!(!read.is_fatal());
        assert!(!write.is_fatal());
    }

    #[test]
    fn defects_are_fatal_not_retryable() {
        let errors = [
            LockError::MissingLockRow { lock_id: 42 },
            LockError::NoAmbientTransaction,
            LockError::IsolationTooWeak {
                required: "read committed",
                actual: "read uncommitted",
            },
            LockError::UnbalancedCompletion {
                report: "unit 3: lock id -333 requested 2 times".into(),
            },
        ];
        for error in errors {
            assert!(error.is_fatal(), "{error}");
            assert!(!error.is_timeout(), "{error}");
        }
    }

    #[test]
    fn db_passthrough_is_neither() {
        let error = LockError::from(DbError::Statement("syntax error".into()));
        assert!(!error.is_timeout());
        assert!(!error.is_fatal());
    }

    #[test]
    fn display_names_the_lock_id() {
        let error = LockError::WriteTimeout { lock_id: -340 };
        assert_eq!(
            error.to_string(),
            "timed out acquiring write lock for lock id -340"
        );
    }
}
