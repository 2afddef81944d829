//! The per-transaction lock coordinator.
//!
//! One [`LockCoordinator`] exists per outermost unit of work and is shared
//! by every unit nested inside it. Nested units *declare* interest in a
//! lock (cheap, no I/O); when the database is about to be touched, a
//! [`flush`](LockCoordinator::flush) drains the declarations into real
//! backend acquisitions, deduplicated and batched. Because all nested units
//! share one physical transaction (and therefore one physical row lock),
//! an identifier acquired once is never re-acquired for the coordinator's
//! whole lifetime.
//!
//! Key invariants:
//! - An identifier added to an acquired set stays there until teardown;
//!   there is no decrement-to-zero release.
//! - A disposing unit's unflushed requests sit contiguously at the queue
//!   tail (strict nesting), so [`complete`](LockCoordinator::complete)
//!   unwinds tail-first and stops at the first foreign item.
//! - At teardown both interest maps must be empty; anything left means a
//!   unit never signalled completion, which is a caller bug, not a
//!   transient condition.
//!
//! The coordinator must live exactly as long as one physical transaction.
//! Reusing it across transactions would make the elision unsound: the
//! backend's row locks die with the transaction, the acquired sets do not.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use scopelock_error::{LockError, Result};
use scopelock_types::{LockId, LockMode, ScopeId};
use tracing::{debug, error, trace};

use crate::backend::{LockBackend, LockHandle};
use crate::config::LockingConfig;
use crate::session::AmbientSession;
use crate::stack_queue::StackQueue;

// ---------------------------------------------------------------------------
// Pending requests and flush runs
// ---------------------------------------------------------------------------

/// A queued lock request awaiting flush.
///
/// `timeout: None` means "use the configured default for the mode when the
/// request is flushed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingLock {
    mode: LockMode,
    timeout: Option<Duration>,
    scope: ScopeId,
    lock_id: LockId,
}

impl PendingLock {
    fn key(&self) -> (LockMode, Option<Duration>, ScopeId) {
        (self.mode, self.timeout, self.scope)
    }
}

/// A maximal contiguous span of pending requests sharing (mode, timeout,
/// unit), coalesced into one batched acquisition call.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Run {
    mode: LockMode,
    timeout: Option<Duration>,
    scope: ScopeId,
    /// Deduplicated, first-seen order.
    lock_ids: Vec<LockId>,
}

/// Coalesce pending requests into contiguous runs.
///
/// Contiguity, not global grouping, is deliberate: it preserves
/// first-requested-first-serviced fairness across units while still
/// collapsing back-to-back duplicates from one unit into a single batch.
fn coalesce(pending: Vec<PendingLock>) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    for item in pending {
        let extends_last = match runs.last_mut() {
            Some(run) if (run.mode, run.timeout, run.scope) == item.key() => {
                if !run.lock_ids.contains(&item.lock_id) {
                    run.lock_ids.push(item.lock_id);
                }
                true
            }
            _ => false,
        };
        if !extends_last {
            runs.push(Run {
                mode: item.mode,
                timeout: item.timeout,
                scope: item.scope,
                lock_ids: vec![item.lock_id],
            });
        }
    }
    runs
}

// ---------------------------------------------------------------------------
// Bookkeeping state
// ---------------------------------------------------------------------------

/// Per-unit, per-identifier request counters. Purely a leak-detection
/// device, never consulted to decide when a lock is physically released.
type InterestMap = HashMap<ScopeId, HashMap<LockId, u32>>;

#[derive(Default)]
struct LockState {
    read_interest: InterestMap,
    write_interest: InterestMap,
    /// Identifiers already obtained from the backend this lifetime.
    read_held: HashSet<LockId>,
    write_held: HashSet<LockId>,
    /// Handles in acquisition order, released together at teardown.
    acquired: Vec<LockHandle>,
}

impl LockState {
    fn interest_mut(&mut self, mode: LockMode) -> &mut InterestMap {
        match mode {
            LockMode::Read => &mut self.read_interest,
            LockMode::Write => &mut self.write_interest,
        }
    }

    fn held(&self, mode: LockMode) -> &HashSet<LockId> {
        match mode {
            LockMode::Read => &self.read_held,
            LockMode::Write => &self.write_held,
        }
    }

    fn held_mut(&mut self, mode: LockMode) -> &mut HashSet<LockId> {
        match mode {
            LockMode::Read => &mut self.read_held,
            LockMode::Write => &mut self.write_held,
        }
    }

    fn increment_interest(&mut self, mode: LockMode, scope: ScopeId, lock_id: LockId) {
        *self
            .interest_mut(mode)
            .entry(scope)
            .or_default()
            .entry(lock_id)
            .or_insert(0) += 1;
    }

    /// Undo the counter added for a failed acquisition. The failing call is
    /// always the one that created the counter (an already-held identifier
    /// can only elide, never fail), so the whole entry goes.
    fn rollback_interest(&mut self, mode: LockMode, scope: ScopeId, lock_id: LockId) {
        let interest = self.interest_mut(mode);
        if let Some(counts) = interest.get_mut(&scope) {
            counts.remove(&lock_id);
            if counts.is_empty() {
                interest.remove(&scope);
            }
        }
    }

    /// Human-readable listing of all remaining interest, or `None` when
    /// both maps are empty.
    fn leak_report(&self) -> Option<String> {
        let mut parts: Vec<String> = Vec::new();
        for (label, interest) in [("read", &self.read_interest), ("write", &self.write_interest)] {
            let mut scopes: Vec<_> = interest.iter().collect();
            scopes.sort_by_key(|(scope, _)| **scope);
            for (scope, counts) in scopes {
                let mut ids: Vec<_> = counts.iter().collect();
                ids.sort_by_key(|(lock_id, _)| **lock_id);
                let listing = ids
                    .iter()
                    .map(|(lock_id, count)| format!("lock {lock_id} requested {count} time(s)"))
                    .collect::<Vec<_>>()
                    .join(", ");
                parts.push(format!("{label} locks held by {scope}: {listing}"));
            }
        }
        if parts.is_empty() { None } else { Some(parts.join("; ")) }
    }
}

// ---------------------------------------------------------------------------
// LockCoordinator
// ---------------------------------------------------------------------------

/// Coordinates read/write locks for all units of work sharing one physical
/// transaction.
///
/// Two disjoint critical sections guard the coordinator: one for the
/// ordering queue (declare, flush, complete, teardown's final clear), one
/// for the interest maps, acquired-identifier sets, and handle list. The
/// backend call is made while holding the second section so acquisition is
/// atomic with the already-acquired check: two units racing on the same
/// identifier can never both reach the backend. Flush additionally holds
/// the queue section for the whole drain, which keeps pending requests
/// serviced strictly in arrival order even with concurrent flushers.
pub struct LockCoordinator {
    session: Arc<dyn AmbientSession>,
    backend: Arc<dyn LockBackend>,
    config: LockingConfig,
    queue: Mutex<StackQueue<PendingLock>>,
    state: Mutex<LockState>,
}

impl LockCoordinator {
    /// Create a coordinator for one physical transaction.
    #[must_use]
    pub fn new(
        session: Arc<dyn AmbientSession>,
        backend: Arc<dyn LockBackend>,
        config: LockingConfig,
    ) -> Self {
        Self {
            session,
            backend,
            config,
            queue: Mutex::new(StackQueue::new()),
            state: Mutex::new(LockState::default()),
        }
    }

    /// Create a coordinator with the backend named by the configuration.
    #[must_use]
    pub fn from_config(session: Arc<dyn AmbientSession>, config: LockingConfig) -> Self {
        let backend = config.backend.backend();
        Self::new(session, backend, config)
    }

    // -- lazy declarations ---------------------------------------------------

    /// Declare read interest in `lock_ids` for `scope`. No I/O; the real
    /// acquisition happens at the next flush.
    pub fn declare_read(&self, scope: ScopeId, lock_ids: &[LockId]) {
        self.declare(LockMode::Read, scope, None, lock_ids);
    }

    /// Declare write interest in `lock_ids` for `scope`.
    pub fn declare_write(&self, scope: ScopeId, lock_ids: &[LockId]) {
        self.declare(LockMode::Write, scope, None, lock_ids);
    }

    /// Declare read interest with an explicit acquisition timeout.
    pub fn declare_read_with_timeout(&self, scope: ScopeId, timeout: Duration, lock_id: LockId) {
        self.declare(LockMode::Read, scope, Some(timeout), &[lock_id]);
    }

    /// Declare write interest with an explicit acquisition timeout.
    pub fn declare_write_with_timeout(&self, scope: ScopeId, timeout: Duration, lock_id: LockId) {
        self.declare(LockMode::Write, scope, Some(timeout), &[lock_id]);
    }

    fn declare(
        &self,
        mode: LockMode,
        scope: ScopeId,
        timeout: Option<Duration>,
        lock_ids: &[LockId],
    ) {
        let mut queue = self.queue.lock();
        for &lock_id in lock_ids {
            trace!(%mode, %scope, %lock_id, "queueing lock request");
            queue.enqueue(PendingLock {
                mode,
                timeout,
                scope,
                lock_id,
            });
        }
    }

    // -- eager acquisition ---------------------------------------------------

    /// Acquire read locks immediately, bypassing the queue.
    ///
    /// # Errors
    ///
    /// Propagates the backend's timeout, missing-resource, or precondition
    /// error for the first identifier that fails; earlier identifiers in
    /// `lock_ids` keep their acquisitions.
    pub fn acquire_read_now(&self, scope: ScopeId, lock_ids: &[LockId]) -> Result<()> {
        self.acquire_eager(LockMode::Read, scope, None, lock_ids)
    }

    /// Acquire write locks immediately, bypassing the queue.
    ///
    /// # Errors
    ///
    /// As [`LockCoordinator::acquire_read_now`].
    pub fn acquire_write_now(&self, scope: ScopeId, lock_ids: &[LockId]) -> Result<()> {
        self.acquire_eager(LockMode::Write, scope, None, lock_ids)
    }

    /// Acquire a read lock immediately with an explicit timeout.
    ///
    /// # Errors
    ///
    /// As [`LockCoordinator::acquire_read_now`].
    pub fn acquire_read_now_with_timeout(
        &self,
        scope: ScopeId,
        timeout: Duration,
        lock_id: LockId,
    ) -> Result<()> {
        self.acquire_eager(LockMode::Read, scope, Some(timeout), &[lock_id])
    }

    /// Acquire a write lock immediately with an explicit timeout.
    ///
    /// # Errors
    ///
    /// As [`LockCoordinator::acquire_read_now`].
    pub fn acquire_write_now_with_timeout(
        &self,
        scope: ScopeId,
        timeout: Duration,
        lock_id: LockId,
    ) -> Result<()> {
        self.acquire_eager(LockMode::Write, scope, Some(timeout), &[lock_id])
    }

    /// The real-acquisition algorithm shared by flush and the eager entry
    /// points: count interest, elide if already held, otherwise contact the
    /// backend, rolling the bookkeeping back on failure so a later retry
    /// genuinely re-contacts the backend.
    fn acquire_eager(
        &self,
        mode: LockMode,
        scope: ScopeId,
        timeout: Option<Duration>,
        lock_ids: &[LockId],
    ) -> Result<()> {
        let mut state = self.state.lock();
        for &lock_id in lock_ids {
            state.increment_interest(mode, scope, lock_id);

            if state.held(mode).contains(&lock_id) {
                trace!(%mode, %lock_id, "lock already held for this transaction, eliding backend call");
                continue;
            }

            // Insert speculatively: the membership check and the backend
            // call must be atomic under the state section or two units
            // could both reach the backend for the same identifier.
            state.held_mut(mode).insert(lock_id);
            let effective = timeout.unwrap_or_else(|| self.config.timeout_for(mode));
            let outcome = match mode {
                LockMode::Read => self.backend.read_lock(self.session.as_ref(), lock_id, effective),
                LockMode::Write => {
                    self.backend.write_lock(self.session.as_ref(), lock_id, effective)
                }
            };
            match outcome {
                Ok(handle) => {
                    debug!(%mode, %scope, %lock_id, "acquired backend lock");
                    state.acquired.push(handle);
                }
                Err(error) => {
                    state.held_mut(mode).remove(&lock_id);
                    state.rollback_interest(mode, scope, lock_id);
                    return Err(error);
                }
            }
        }
        Ok(())
    }

    // -- flush ---------------------------------------------------------------

    /// Drain the entire pending queue into real backend acquisitions.
    ///
    /// The whole queue is drained (not just one unit's entries) because
    /// it holds all nested units' requests in true arrival order.
    /// Contiguous runs sharing (mode, timeout, unit) become one batched
    /// acquisition carrying that run's deduplicated identifiers.
    ///
    /// # Errors
    ///
    /// Propagates the first failing acquisition. Requests already drained
    /// for this flush are not re-queued; the transaction is expected to be
    /// abandoned on error.
    pub fn flush(&self) -> Result<()> {
        let mut queue = self.queue.lock();
        if queue.is_empty() {
            return Ok(());
        }
        let mut pending = Vec::with_capacity(queue.len());
        while let Some(item) = queue.dequeue() {
            pending.push(item);
        }
        let runs = coalesce(pending);
        debug!(runs = runs.len(), "flushing queued lock requests");
        for run in &runs {
            self.acquire_eager(run.mode, run.scope, run.timeout, &run.lock_ids)?;
        }
        Ok(())
    }

    // -- completion and teardown ---------------------------------------------

    /// Forget a completed unit's bookkeeping.
    ///
    /// Removes the unit from both interest maps, then pops its still-
    /// pending (never flushed) requests off the queue tail. Strict nesting
    /// guarantees those requests are contiguous at the tail, so the walk
    /// stops at the first item belonging to another unit.
    pub fn complete(&self, scope: ScopeId) {
        {
            let mut state = self.state.lock();
            state.read_interest.remove(&scope);
            state.write_interest.remove(&scope);
        }
        let mut queue = self.queue.lock();
        while queue.peek_tail().is_some_and(|pending| pending.scope == scope) {
            queue.pop_tail();
        }
        trace!(%scope, "unit of work completed");
    }

    /// Release every acquired handle (in acquisition order), drop any
    /// still-queued requests, and verify all units completed.
    ///
    /// # Errors
    ///
    /// [`LockError::UnbalancedCompletion`] when either interest map is
    /// non-empty: a nested unit never called
    /// [`complete`](LockCoordinator::complete), which is a bug in the
    /// caller, not a transient condition.
    pub fn teardown(&self) -> Result<()> {
        let report = {
            let mut state = self.state.lock();
            for handle in state.acquired.drain(..) {
                handle.release();
            }
            state.leak_report()
        };
        self.queue.lock().clear();
        match report {
            None => Ok(()),
            Some(report) => {
                error!(%report, "lock interest remaining at teardown, a unit of work was never completed");
                Err(LockError::UnbalancedCompletion { report })
            }
        }
    }

    // -- diagnostics ---------------------------------------------------------

    /// Number of queued, not-yet-flushed requests.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Snapshot of a mode's interest counters.
    #[must_use]
    pub fn interest(&self, mode: LockMode) -> HashMap<ScopeId, HashMap<LockId, u32>> {
        let state = self.state.lock();
        match mode {
            LockMode::Read => state.read_interest.clone(),
            LockMode::Write => state.write_interest.clone(),
        }
    }

    /// Snapshot of the identifiers already acquired in `mode`.
    #[must_use]
    pub fn held_ids(&self, mode: LockMode) -> HashSet<LockId> {
        self.state.lock().held(mode).clone()
    }
}

impl fmt::Debug for LockCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self.queue.lock().len();
        let state = self.state.lock();
        f.debug_struct("LockCoordinator")
            .field("pending", &pending)
            .field("read_held", &state.read_held.len())
            .field("write_held", &state.write_held.len())
            .field("acquired", &state.acquired.len())
            .finish_non_exhaustive()
    }
}
