//! The backend lock adapter contract.
//!
//! A [`LockBackend`] translates an abstract read/write lock request into
//! concrete relational operations against one storage engine. Two
//! implementations exist: [`RowLockEngine`](crate::row_engine::RowLockEngine)
//! for strict row-locking engines and
//! [`WalLockEngine`](crate::wal_engine::WalLockEngine) for write-ahead-log
//! engines with busy-retry semantics, selected once at startup via
//! [`BackendKind`]. There is no shared base logic beyond this contract.

use std::sync::Arc;
use std::time::Duration;

use scopelock_error::Result;
use scopelock_types::{LockId, LockMode};
use tracing::trace;

use crate::row_engine::RowLockEngine;
use crate::session::AmbientSession;
use crate::wal_engine::WalLockEngine;

/// Name of the pre-seeded lock table.
///
/// One row per lock identifier, with an integer `value` column whose
/// content is irrelevant; the row exists only to be lockable. Rows are
/// created by the surrounding system's schema migration, never here.
pub const LOCK_TABLE: &str = "sharedLock";

// ---------------------------------------------------------------------------
// LockHandle
// ---------------------------------------------------------------------------

/// An acquired lock, held for the remainder of the shared transaction.
///
/// The handle is a plain value token. [`LockHandle::release`] is a logical
/// no-op kept for symmetry and logging: the row lock (or writer slot) is
/// physically released only when the ambient transaction commits or rolls
/// back. Do not add real unlocking logic here: it would be redundant at
/// best and incorrect at worst, since the handle cannot outlive decisions
/// the transaction layer makes.
#[derive(Debug, PartialEq, Eq)]
pub struct LockHandle {
    lock_id: LockId,
    mode: LockMode,
}

impl LockHandle {
    /// Create a handle for an acquisition that just succeeded.
    #[must_use]
    pub const fn new(lock_id: LockId, mode: LockMode) -> Self {
        Self { lock_id, mode }
    }

    /// The identifier this handle covers.
    #[must_use]
    pub const fn lock_id(&self) -> LockId {
        self.lock_id
    }

    /// The mode the lock was acquired in.
    #[must_use]
    pub const fn mode(&self) -> LockMode {
        self.mode
    }

    /// Logically release the handle. The physical lock is tied to the
    /// transaction's lifetime, not the handle's.
    pub fn release(self) {
        trace!(mode = %self.mode, lock_id = %self.lock_id, "releasing lock handle");
    }
}

// ---------------------------------------------------------------------------
// LockBackend
// ---------------------------------------------------------------------------

/// Acquisition of read/write locks against one storage engine.
///
/// Implementations are stateless values; per-call state (the transaction,
/// the connection) arrives through the [`AmbientSession`]. Every call
/// carries an explicit timeout; there is no cancellation token, and a call
/// that has been issued runs to completion or to its own timeout.
pub trait LockBackend: Send + Sync {
    /// Acquire a shared lock on `lock_id`, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// [`LockError::ReadTimeout`](scopelock_error::LockError::ReadTimeout)
    /// on contention beyond `timeout`;
    /// [`LockError::MissingLockRow`](scopelock_error::LockError::MissingLockRow)
    /// when no lock row exists for `lock_id`; a precondition error when the
    /// ambient transaction is absent or too weakly isolated.
    fn read_lock(
        &self,
        session: &dyn AmbientSession,
        lock_id: LockId,
        timeout: Duration,
    ) -> Result<LockHandle>;

    /// Acquire an exclusive lock on `lock_id`, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// As [`LockBackend::read_lock`], with
    /// [`LockError::WriteTimeout`](scopelock_error::LockError::WriteTimeout)
    /// in place of the read timeout.
    fn write_lock(
        &self,
        session: &dyn AmbientSession,
        lock_id: LockId,
        timeout: Duration,
    ) -> Result<LockHandle>;
}

// ---------------------------------------------------------------------------
// BackendKind
// ---------------------------------------------------------------------------

/// Which storage engine the lock table lives in. Selected at startup from
/// configuration.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Strict row-locking engine (statement-level lock wait timeout,
    /// per-row shared/exclusive locks).
    #[default]
    RowLock,
    /// Write-ahead-log engine (snapshot reads, single global writer with
    /// busy retry).
    WalLock,
}

impl BackendKind {
    /// Instantiate the adapter for this engine.
    #[must_use]
    pub fn backend(self) -> Arc<dyn LockBackend> {
        match self {
            Self::RowLock => Arc::new(RowLockEngine::new()),
            Self::WalLock => Arc::new(WalLockEngine::new()),
        }
    }
}
