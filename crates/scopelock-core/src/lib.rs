//! Scope-level distributed locking over a shared database transaction.
//!
//! Many nested units of work share one physical transaction; this crate
//! lets them coordinate read/write access to a small set of named logical
//! resources (content tree, media tree, …) without each nested unit
//! re-acquiring a database-level lock. The pieces:
//!
//! - [`StackQueue`]: hybrid FIFO/LIFO ordering structure. Flush drains in
//!   arrival order, a disposing unit unwinds from the tail.
//! - [`LockBackend`]: translates an abstract lock request into relational
//!   operations against one storage engine. [`RowLockEngine`] targets
//!   strict row-locking engines, [`WalLockEngine`] targets write-ahead-log
//!   engines with busy-retry semantics.
//! - [`LockCoordinator`]: the per-transaction object every nested unit
//!   consults: queues lazy declarations, elides redundant backend calls,
//!   batches flushes, and checks for unit-of-work leaks at teardown.
//!
//! The transaction itself is owned elsewhere; this crate sees it only
//! through the [`AmbientSession`] boundary and never opens, commits, or
//! rolls one back. The database lock-table row is the true mutual-exclusion
//! primitive; everything in-process here exists to avoid redundant
//! round-trips to it, not to replace it.

pub mod backend;
pub mod config;
pub mod coordinator;
pub mod row_engine;
pub mod session;
pub mod stack_queue;
pub mod wal_engine;

#[cfg(test)]
pub(crate) mod test_support;

pub use backend::{BackendKind, LOCK_TABLE, LockBackend, LockHandle};
pub use config::LockingConfig;
pub use coordinator::LockCoordinator;
pub use row_engine::RowLockEngine;
pub use session::{AmbientSession, SqlValue};
pub use stack_queue::StackQueue;
pub use wal_engine::WalLockEngine;

pub use scopelock_error::{DbError, LockError, Result};
pub use scopelock_types::{IsolationLevel, LockId, LockMode, ScopeId, well_known};
