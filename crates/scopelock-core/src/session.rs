//! The ambient-transaction boundary.
//!
//! This layer locks *within* a transaction it does not manage: the
//! surrounding system owns connection management, transaction begin/commit/
//! rollback, and schema creation. [`AmbientSession`] is the narrow view the
//! lock adapters get of that world: enough to check preconditions and run
//! parameterized statements, nothing more.

use scopelock_error::DbError;
use scopelock_types::IsolationLevel;

/// A parameter bound into a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    /// 32-bit integer (lock identifiers, sentinel values).
    Int(i32),
    /// 64-bit integer.
    BigInt(i64),
}

/// Access to the externally-owned database transaction.
///
/// Implementations execute statements on whichever connection carries the
/// ambient transaction, and classify engine error codes into [`DbError`]
/// kinds: a row-lock wait timeout becomes [`DbError::LockWaitExceeded`], a
/// busy/locked condition after the engine's internal retry window becomes
/// [`DbError::Busy`], and anything else [`DbError::Statement`].
///
/// Implementations never open, commit, or roll back the transaction on
/// behalf of this layer.
pub trait AmbientSession: Send + Sync {
    /// Whether a transaction is currently open on the session.
    fn transaction_active(&self) -> bool;

    /// Isolation level of the open transaction, or `None` when no
    /// transaction is open.
    fn isolation_level(&self) -> Option<IsolationLevel>;

    /// Execute a statement inside the ambient transaction and return the
    /// number of rows affected.
    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError>;

    /// Execute a query inside the ambient transaction and return the first
    /// column of the first row, or `None` when the query matched no rows.
    fn query_scalar(&self, sql: &str, params: &[SqlValue]) -> Result<Option<i64>, DbError>;
}
