//! Lock adapter for strict row-locking engines.
//!
//! Engines in this family (SQL Server and friends) take real row locks on
//! locking reads and updates, honour a statement-level lock wait timeout,
//! and report exceeding it with a dedicated error code. Every acquisition
//! here follows the same shape: set the statement timeout, touch the lock
//! row under a locking hint, translate the outcome.
//!
//! Precondition for every call: an ambient transaction at isolation level
//! read-committed or stronger. Row locks taken under weaker isolation do
//! not survive the statement, so a violation is a configuration error, not
//! something to retry.

use std::time::Duration;

use scopelock_error::{DbError, LockError, Result};
use scopelock_types::{IsolationLevel, LockId, LockMode};
use tracing::debug;

use crate::backend::{LOCK_TABLE, LockBackend, LockHandle};
use crate::session::{AmbientSession, SqlValue};

/// Adapter for strict row-locking engines.
///
/// Stateless; all per-call state arrives through the session.
#[derive(Debug, Default, Clone, Copy)]
pub struct RowLockEngine;

impl RowLockEngine {
    /// Create the adapter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Check the ambient-transaction precondition.
    fn ensure_transaction(session: &dyn AmbientSession) -> Result<()> {
        if !session.transaction_active() {
            return Err(LockError::NoAmbientTransaction);
        }
        match session.isolation_level() {
            None => Err(LockError::NoAmbientTransaction),
            Some(level) if level < IsolationLevel::ReadCommitted => {
                Err(LockError::IsolationTooWeak {
                    required: IsolationLevel::ReadCommitted.as_str(),
                    actual: level.as_str(),
                })
            }
            Some(_) => Ok(()),
        }
    }

    /// Bound how long the *next* statement may wait on a row lock.
    fn set_statement_timeout(session: &dyn AmbientSession, timeout: Duration) -> Result<()> {
        let sql = format!("SET LOCK_TIMEOUT {};", timeout_millis(timeout));
        session.execute(&sql, &[])?;
        Ok(())
    }
}

impl LockBackend for RowLockEngine {
    fn read_lock(
        &self,
        session: &dyn AmbientSession,
        lock_id: LockId,
        timeout: Duration,
    ) -> Result<LockHandle> {
        Self::ensure_transaction(session)?;
        Self::set_statement_timeout(session, timeout)?;

        // A locking read: the REPEATABLEREAD hint takes a shared row lock
        // held until the transaction ends.
        let sql = format!("SELECT value FROM {LOCK_TABLE} WITH (REPEATABLEREAD) WHERE id=@0");
        match session.query_scalar(&sql, &[SqlValue::Int(lock_id.get())]) {
            Ok(Some(_)) => {
                debug!(%lock_id, timeout_ms = timeout_millis(timeout), "acquired row read lock");
                Ok(LockHandle::new(lock_id, LockMode::Read))
            }
            Ok(None) => Err(LockError::MissingLockRow {
                lock_id: lock_id.get(),
            }),
            Err(DbError::LockWaitExceeded) => Err(LockError::ReadTimeout {
                lock_id: lock_id.get(),
            }),
            Err(other) => Err(other.into()),
        }
    }

    fn write_lock(
        &self,
        session: &dyn AmbientSession,
        lock_id: LockId,
        timeout: Duration,
    ) -> Result<LockHandle> {
        Self::ensure_transaction(session)?;
        Self::set_statement_timeout(session, timeout)?;

        // Toggle the stored value to force an exclusive row lock: a no-op
        // update could be elided by the engine and would take no lock.
        let sql = format!(
            "UPDATE {LOCK_TABLE} WITH (REPEATABLEREAD) \
             SET value = (CASE WHEN (value=1) THEN -1 ELSE 1 END) WHERE id=@0"
        );
        match session.execute(&sql, &[SqlValue::Int(lock_id.get())]) {
            Ok(0) => Err(LockError::MissingLockRow {
                lock_id: lock_id.get(),
            }),
            Ok(_) => {
                debug!(%lock_id, timeout_ms = timeout_millis(timeout), "acquired row write lock");
                Ok(LockHandle::new(lock_id, LockMode::Write))
            }
            Err(DbError::LockWaitExceeded) => Err(LockError::WriteTimeout {
                lock_id: lock_id.get(),
            }),
            Err(other) => Err(other.into()),
        }
    }
}

/// Whole milliseconds of `timeout`, saturating.
pub(crate) fn timeout_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedSession;

    const TIMEOUT: Duration = Duration::from_millis(1800);

    #[test]
    fn read_lock_sets_timeout_then_takes_locking_read() {
        let session = ScriptedSession::with_rows(&[(42, 1)]);
        let engine = RowLockEngine::new();

        let handle = engine
            .read_lock(&session, LockId::new(42), TIMEOUT)
            .unwrap();
        assert_eq!(handle.mode(), LockMode::Read);
        assert_eq!(handle.lock_id(), LockId::new(42));

        let statements = session.statements();
        assert_eq!(statements[0].0, "SET LOCK_TIMEOUT 1800;");
        assert_eq!(
            statements[1].0,
            "SELECT value FROM sharedLock WITH (REPEATABLEREAD) WHERE id=@0"
        );
        assert_eq!(statements[1].1, vec![SqlValue::Int(42)]);
    }

    #[test]
    fn write_lock_toggles_the_row_under_a_locking_hint() {
        let session = ScriptedSession::with_rows(&[(7, 1)]);
        let engine = RowLockEngine::new();

        engine
            .write_lock(&session, LockId::new(7), TIMEOUT)
            .unwrap();

        let statements = session.statements();
        assert_eq!(statements[0].0, "SET LOCK_TIMEOUT 1800;");
        assert_eq!(
            statements[1].0,
            "UPDATE sharedLock WITH (REPEATABLEREAD) \
             SET value = (CASE WHEN (value=1) THEN -1 ELSE 1 END) WHERE id=@0"
        );
        // the toggle flipped the sentinel
        assert_eq!(session.row_value(7), Some(-1));
    }

    #[test]
    fn missing_row_is_a_configuration_error() {
        let session = ScriptedSession::with_rows(&[]);
        let engine = RowLockEngine::new();

        let read = engine.read_lock(&session, LockId::new(999), TIMEOUT);
        assert_eq!(read, Err(LockError::MissingLockRow { lock_id: 999 }));

        let write = engine.write_lock(&session, LockId::new(999), TIMEOUT);
        assert_eq!(write, Err(LockError::MissingLockRow { lock_id: 999 }));
    }

    #[test]
    fn lock_wait_exceeded_translates_per_mode() {
        let session = ScriptedSession::with_rows(&[(5, 1)]);
        session.fail_next(DbError::LockWaitExceeded);
        let engine = RowLockEngine::new();
        let read = engine.read_lock(&session, LockId::new(5), TIMEOUT);
        assert_eq!(read, Err(LockError::ReadTimeout { lock_id: 5 }));

        session.fail_next(DbError::LockWaitExceeded);
        let write = engine.write_lock(&session, LockId::new(5), TIMEOUT);
        assert_eq!(write, Err(LockError::WriteTimeout { lock_id: 5 }));
    }

    #[test]
    fn requires_an_ambient_transaction() {
        let session = ScriptedSession::without_transaction();
        let engine = RowLockEngine::new();
        let result = engine.read_lock(&session, LockId::new(1), TIMEOUT);
        assert_eq!(result, Err(LockError::NoAmbientTransaction));
        assert!(session.statements().is_empty());
    }

    #[test]
    fn rejects_isolation_below_read_committed() {
        let session =
            ScriptedSession::with_rows(&[(1, 1)]).isolation(IsolationLevel::ReadUncommitted);
        let engine = RowLockEngine::new();
        let result = engine.write_lock(&session, LockId::new(1), TIMEOUT);
        assert_eq!(
            result,
            Err(LockError::IsolationTooWeak {
                required: "read committed",
                actual: "read uncommitted",
            })
        );
    }

    #[test]
    fn other_driver_failures_pass_through() {
        let session = ScriptedSession::with_rows(&[(5, 1)]);
        session.fail_next(DbError::Statement("connection reset".into()));
        let engine = RowLockEngine::new();
        let result = engine.read_lock(&session, LockId::new(5), TIMEOUT);
        assert_eq!(
            result,
            Err(LockError::Db(DbError::Statement("connection reset".into())))
        );
    }
}
