//! Scripted ambient session for adapter and coordinator tests.

use std::collections::HashMap;

use parking_lot::Mutex;
use scopelock_error::DbError;
use scopelock_types::IsolationLevel;

use crate::backend::LOCK_TABLE;
use crate::session::{AmbientSession, SqlValue};

/// A fake session over an in-memory lock table.
///
/// Records every statement it is given, toggles lock-row values the way a
/// real engine would, and can be scripted to fail the next statement that
/// touches the lock table (timeout-setting statements are never failed).
pub(crate) struct ScriptedSession {
    rows: Mutex<HashMap<i32, i64>>,
    statements: Mutex<Vec<(String, Vec<SqlValue>)>>,
    fail_next: Mutex<Option<DbError>>,
    transaction_active: bool,
    isolation: Option<IsolationLevel>,
}

impl ScriptedSession {
    pub(crate) fn with_rows(rows: &[(i32, i64)]) -> Self {
        Self {
            rows: Mutex::new(rows.iter().copied().collect()),
            statements: Mutex::new(Vec::new()),
            fail_next: Mutex::new(None),
            transaction_active: true,
            isolation: Some(IsolationLevel::ReadCommitted),
        }
    }

    pub(crate) fn without_transaction() -> Self {
        let mut session = Self::with_rows(&[]);
        session.transaction_active = false;
        session.isolation = None;
        session
    }

    pub(crate) fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = Some(level);
        self
    }

    /// Fail the next statement that touches the lock table.
    pub(crate) fn fail_next(&self, error: DbError) {
        *self.fail_next.lock() = Some(error);
    }

    pub(crate) fn statements(&self) -> Vec<(String, Vec<SqlValue>)> {
        self.statements.lock().clone()
    }

    pub(crate) fn row_value(&self, id: i32) -> Option<i64> {
        self.rows.lock().get(&id).copied()
    }

    fn record(&self, sql: &str, params: &[SqlValue]) {
        self.statements.lock().push((sql.to_owned(), params.to_vec()));
    }

    fn scripted_failure(&self, sql: &str) -> Option<DbError> {
        if sql.contains(LOCK_TABLE) {
            self.fail_next.lock().take()
        } else {
            None
        }
    }

    fn param_id(params: &[SqlValue]) -> i32 {
        match params.first() {
            Some(SqlValue::Int(id)) => *id,
            other => panic!("expected an Int lock id parameter, got {other:?}"),
        }
    }
}

impl AmbientSession for ScriptedSession {
    fn transaction_active(&self) -> bool {
        self.transaction_active
    }

    fn isolation_level(&self) -> Option<IsolationLevel> {
        self.isolation
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError> {
        self.record(sql, params);
        if let Some(error) = self.scripted_failure(sql) {
            return Err(error);
        }
        if sql.starts_with("SET LOCK_TIMEOUT") || sql.starts_with("PRAGMA busy_timeout") {
            return Ok(0);
        }
        if sql.starts_with("UPDATE") {
            let id = Self::param_id(params);
            let mut rows = self.rows.lock();
            return match rows.get_mut(&id) {
                Some(value) => {
                    *value = if *value == 1 { -1 } else { 1 };
                    Ok(1)
                }
                None => Ok(0),
            };
        }
        Err(DbError::Statement(format!("unexpected statement: {sql}")))
    }

    fn query_scalar(&self, sql: &str, params: &[SqlValue]) -> Result<Option<i64>, DbError> {
        self.record(sql, params);
        if let Some(error) = self.scripted_failure(sql) {
            return Err(error);
        }
        let id = Self::param_id(params);
        Ok(self.rows.lock().get(&id).copied())
    }
}
