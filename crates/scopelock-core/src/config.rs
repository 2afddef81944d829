//! Configuration for the locking layer.

use std::time::Duration;

use scopelock_types::LockMode;

use crate::backend::BackendKind;

/// Settings applied when a lock request carries no explicit timeout.
///
/// Reads default to a generous window (readers queue behind writers under
/// contention but eventually get through); writes default to a short one so
/// a deadlocked writer pair fails fast. Deadlocks are *avoided* by these
/// timeouts, never detected.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LockingConfig {
    /// Default wait for shared locks, in milliseconds.
    pub read_lock_timeout_ms: u64,
    /// Default wait for exclusive locks, in milliseconds.
    pub write_lock_timeout_ms: u64,
    /// Which storage engine the lock table lives in.
    pub backend: BackendKind,
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            read_lock_timeout_ms: 60_000,
            write_lock_timeout_ms: 5_000,
            backend: BackendKind::RowLock,
        }
    }
}

impl LockingConfig {
    /// Default read-lock timeout as a [`Duration`].
    #[must_use]
    pub const fn read_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.read_lock_timeout_ms)
    }

    /// Default write-lock timeout as a [`Duration`].
    #[must_use]
    pub const fn write_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.write_lock_timeout_ms)
    }

    /// Default timeout for requests in `mode`.
    #[must_use]
    pub const fn timeout_for(&self, mode: LockMode) -> Duration {
        match mode {
            LockMode::Read => self.read_lock_timeout(),
            LockMode::Write => self.write_lock_timeout(),
        }
    }
}
