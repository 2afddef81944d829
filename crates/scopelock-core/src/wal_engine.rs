//! Lock adapter for write-ahead-log engines.
//!
//! Engines in this family (SQLite in WAL mode and friends) give every
//! transaction a consistent snapshot, so shared read locks cost nothing;
//! `read_lock` only verifies the ambient transaction exists. Writes are a
//! different story: one writer may hold the log at a time, globally, and a
//! blocked writer is retried internally by the engine for up to the busy
//! window before a busy/locked condition surfaces.

use std::time::Duration;

use scopelock_error::{DbError, LockError, Result};
use scopelock_types::{LockId, LockMode};
use tracing::debug;

use crate::backend::{LOCK_TABLE, LockBackend, LockHandle};
use crate::row_engine::timeout_millis;
use crate::session::{AmbientSession, SqlValue};

/// Adapter for write-ahead-log engines with busy-retry semantics.
#[derive(Debug, Default, Clone, Copy)]
pub struct WalLockEngine;

impl WalLockEngine {
    /// Create the adapter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn ensure_transaction(session: &dyn AmbientSession) -> Result<()> {
        if session.transaction_active() {
            Ok(())
        } else {
            Err(LockError::NoAmbientTransaction)
        }
    }
}

impl LockBackend for WalLockEngine {
    /// Read locks are effectively free: the log's snapshot isolation
    /// guarantees a consistent read without blocking.
    fn read_lock(
        &self,
        session: &dyn AmbientSession,
        lock_id: LockId,
        _timeout: Duration,
    ) -> Result<LockHandle> {
        Self::ensure_transaction(session)?;
        Ok(LockHandle::new(lock_id, LockMode::Read))
    }

    fn write_lock(
        &self,
        session: &dyn AmbientSession,
        lock_id: LockId,
        timeout: Duration,
    ) -> Result<LockHandle> {
        Self::ensure_transaction(session)?;

        // Busy-retry window for the write: while another writer holds the
        // log the engine retries internally up to this long.
        let pragma = format!("PRAGMA busy_timeout = {};", timeout_millis(timeout));
        session.execute(&pragma, &[])?;

        // Same toggle as the row-locking engine: the update must change
        // the value or the engine could elide it without writing.
        let sql = format!(
            "UPDATE {LOCK_TABLE} SET value = (CASE WHEN (value=1) THEN -1 ELSE 1 END) WHERE id=@0"
        );
        match session.execute(&sql, &[SqlValue::Int(lock_id.get())]) {
            Ok(0) => Err(LockError::MissingLockRow {
                lock_id: lock_id.get(),
            }),
            Ok(_) => {
                debug!(%lock_id, timeout_ms = timeout_millis(timeout), "acquired wal write lock");
                Ok(LockHandle::new(lock_id, LockMode::Write))
            }
            Err(DbError::Busy) => Err(LockError::WriteTimeout {
                lock_id: lock_id.get(),
            }),
            Err(other) => Err(other.into()),
        }
    }
}
