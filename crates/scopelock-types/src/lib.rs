//! Shared vocabulary types for the scope-locking layer.
//!
//! Small newtypes and enums used across the workspace: lock identifiers,
//! unit-of-work identifiers, lock modes, and transaction isolation levels.
//! The [`well_known`] module publishes the lock identifiers the surrounding
//! system seeds into its lock table by schema migration.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// ---------------------------------------------------------------------------
// LockId
// ---------------------------------------------------------------------------

/// Identifier of a logical resource protected by the locking layer.
///
/// A small integer naming a resource such as "content tree" or "media
/// tree". Opaque to this layer; globally meaningful to callers. The
/// surrounding system seeds one lock-table row per identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct LockId(i32);

impl LockId {
    /// Create a lock identifier from its raw value.
    #[inline]
    #[must_use]
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// The raw integer value, as stored in the lock table's `id` column.
    #[inline]
    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for LockId {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}

// ---------------------------------------------------------------------------
// ScopeId
// ---------------------------------------------------------------------------

/// Identifier of one nested unit of work.
///
/// Units form a strict nesting stack at any instant: a child is always
/// created after, and disposed before, its parent. Identifiers are unique
/// for the lifetime of the process; [`ScopeId::fresh`] mints them from a
/// process-wide monotonic counter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct ScopeId(u64);

impl ScopeId {
    /// Mint a fresh, process-unique identifier.
    #[must_use]
    pub fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw counter value. Only useful for logging.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// LockMode
// ---------------------------------------------------------------------------

/// Read locks are shared, write locks are exclusive.
///
/// The two modes are tracked in wholly separate bookkeeping structures;
/// holding a read lock on an identifier never elides a later write lock on
/// the same identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum LockMode {
    /// Shared access.
    Read,
    /// Exclusive access.
    Write,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

// ---------------------------------------------------------------------------
// IsolationLevel
// ---------------------------------------------------------------------------

/// Transaction isolation level reported by the ambient session.
///
/// Ordered weakest-first so adapters can check `level >= ReadCommitted`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Lowercase name as used in error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadUncommitted => "read uncommitted",
            Self::ReadCommitted => "read committed",
            Self::RepeatableRead => "repeatable read",
            Self::Serializable => "serializable",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Well-known lock identifiers
// ---------------------------------------------------------------------------

/// Lock identifiers seeded by the surrounding system's schema migration.
///
/// Negative values keep them clear of user-allocated identifier ranges.
pub mod well_known {
    use super::LockId;

    /// Server registration records.
    pub const SERVERS: LockId = LockId::new(-331);
    /// Content type definitions.
    pub const CONTENT_TYPES: LockId = LockId::new(-332);
    /// The content tree.
    pub const CONTENT_TREE: LockId = LockId::new(-333);
    /// The media tree.
    pub const MEDIA_TREE: LockId = LockId::new(-334);
    /// The member tree.
    pub const MEMBER_TREE: LockId = LockId::new(-335);
    /// Media type definitions.
    pub const MEDIA_TYPES: LockId = LockId::new(-336);
    /// Member type definitions.
    pub const MEMBER_TYPES: LockId = LockId::new(-337);
    /// Domain assignments.
    pub const DOMAINS: LockId = LockId::new(-338);
    /// The key/value store.
    pub const KEY_VALUES: LockId = LockId::new(-339);
    /// Language definitions.
    pub const LANGUAGES: LockId = LockId::new(-340);
    /// The scheduled publishing run.
    pub const SCHEDULED_PUBLISHING: LockId = LockId::new(-341);
    /// Main-domain election.
    pub const MAIN_DOM: LockId = LockId::new(-342);
}
