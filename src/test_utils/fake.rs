//! A scripted [`PgHandle`] that records every call made on it.
//!
//! The fake behaves like a Postgres session inside a transaction: once a statement
//! fails, every later statement fails too until [`PgHandle::reset`] is called.
//!
//! ```rust
//! use pg_stats::adapter::ConnectionAdapter;
//! use pg_stats::test_utils::fake::{Call, FakeHandle};
//!
//! let fake = FakeHandle::new().failing_on("SELECT broken");
//! let log = fake.log();
//! let mut adapter = ConnectionAdapter::from_handle(Box::new(fake)).unwrap();
//!
//! assert!(adapter.execute("SELECT broken", &[]).is_err());
//! assert!(adapter.execute("SELECT 1", &[]).is_ok());
//! assert_eq!(log.count(&Call::Reset), 1);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::PgStatsError;
use crate::handle::PgHandle;
use crate::results::ResultSet;
use crate::types::SqlValue;

/// Message carried by statements rejected because an earlier one failed.
pub const ABORTED_MESSAGE: &str =
    "current transaction is aborted, commands ignored until end of transaction block";

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Exec {
        statement: String,
        params: Option<Vec<SqlValue>>,
    },
    Reset,
    Probe,
    DbName,
    ServerVersion,
    Close,
    Release,
}

impl Call {
    #[must_use]
    pub fn exec(statement: &str, params: Option<Vec<SqlValue>>) -> Self {
        Call::Exec {
            statement: statement.to_string(),
            params,
        }
    }
}

/// Shared view of the calls a [`FakeHandle`] received; stays readable after the
/// handle has been moved into an adapter or dropped.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    fn push(&self, call: Call) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    /// Statements executed, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Exec { statement, .. } => Some(statement),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct FakeHandle {
    log: CallLog,
    failing: HashSet<String>,
    rejecting_params: HashSet<String>,
    responses: HashMap<String, ResultSet>,
    aborted: bool,
    unreachable: bool,
    closed: bool,
    failing_reset: bool,
    failing_teardown: bool,
    db_name: String,
    server_version: u32,
    client_version: Option<u32>,
}

impl Default for FakeHandle {
    fn default() -> Self {
        FakeHandle {
            log: CallLog::default(),
            failing: HashSet::new(),
            rejecting_params: HashSet::new(),
            responses: HashMap::new(),
            aborted: false,
            unreachable: false,
            closed: false,
            failing_reset: false,
            failing_teardown: false,
            db_name: "postgres".to_string(),
            server_version: 160_000,
            client_version: None,
        }
    }
}

impl FakeHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    /// Any statement containing `fragment` fails with a database error, aborting the
    /// session.
    #[must_use]
    pub fn failing_on(mut self, fragment: &str) -> Self {
        self.failing.insert(fragment.to_string());
        self
    }

    /// `statement` fails with a `ParameterError`, as a value that cannot be bound would.
    #[must_use]
    pub fn rejecting_params_on(mut self, statement: &str) -> Self {
        self.rejecting_params.insert(statement.to_string());
        self
    }

    /// `statement` answers with `result` instead of an empty result set.
    #[must_use]
    pub fn responding(mut self, statement: &str, result: ResultSet) -> Self {
        self.responses.insert(statement.to_string(), result);
        self
    }

    /// Every round-trip fails as if the server went away.
    #[must_use]
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    #[must_use]
    pub fn closed(mut self) -> Self {
        self.closed = true;
        self
    }

    #[must_use]
    pub fn failing_reset(mut self) -> Self {
        self.failing_reset = true;
        self
    }

    /// `close` and `release` both report a teardown failure.
    #[must_use]
    pub fn failing_teardown(mut self) -> Self {
        self.failing_teardown = true;
        self
    }

    #[must_use]
    pub fn with_db_name(mut self, name: &str) -> Self {
        self.db_name = name.to_string();
        self
    }

    #[must_use]
    pub fn with_server_version(mut self, version: u32) -> Self {
        self.server_version = version;
        self
    }

    #[must_use]
    pub fn with_client_version(mut self, version: u32) -> Self {
        self.client_version = Some(version);
        self
    }

    fn round_trip(&self) -> Result<(), PgStatsError> {
        if self.unreachable {
            return Err(PgStatsError::ExecutionError(
                "connection refused".to_string(),
            ));
        }
        Ok(())
    }

    fn teardown(&self, call: Call) -> Result<(), PgStatsError> {
        self.log.push(call);
        if self.failing_teardown {
            return Err(PgStatsError::TeardownError(
                "socket closed mid-shutdown".to_string(),
            ));
        }
        Ok(())
    }
}

impl PgHandle for FakeHandle {
    fn exec(
        &mut self,
        statement: &str,
        params: Option<&[SqlValue]>,
    ) -> Result<ResultSet, PgStatsError> {
        self.log
            .push(Call::exec(statement, params.map(<[SqlValue]>::to_vec)));
        self.round_trip()?;

        if self.rejecting_params.contains(statement) {
            return Err(PgStatsError::ParameterError(format!(
                "cannot bind parameters for '{statement}'"
            )));
        }
        if self.aborted {
            return Err(PgStatsError::ExecutionError(ABORTED_MESSAGE.to_string()));
        }
        if self.failing.iter().any(|f| statement.contains(f.as_str())) {
            self.aborted = true;
            return Err(PgStatsError::ExecutionError(format!(
                "statement failed: {statement}"
            )));
        }
        Ok(self.responses.get(statement).cloned().unwrap_or_default())
    }

    fn reset(&mut self) -> Result<(), PgStatsError> {
        self.log.push(Call::Reset);
        if self.failing_reset {
            return Err(PgStatsError::ConnectionError(
                "reset failed".to_string(),
            ));
        }
        self.aborted = false;
        Ok(())
    }

    fn probe(&mut self) -> Result<(), PgStatsError> {
        self.log.push(Call::Probe);
        self.round_trip()
    }

    fn db_name(&mut self) -> Result<String, PgStatsError> {
        self.log.push(Call::DbName);
        self.round_trip()?;
        Ok(self.db_name.clone())
    }

    fn server_version(&mut self) -> Result<u32, PgStatsError> {
        self.log.push(Call::ServerVersion);
        self.round_trip()?;
        Ok(self.server_version)
    }

    fn client_version(&self) -> Option<u32> {
        self.client_version
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn close(self: Box<Self>) -> Result<(), PgStatsError> {
        self.teardown(Call::Close)
    }

    fn release(self: Box<Self>) -> Result<(), PgStatsError> {
        self.teardown(Call::Release)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_aborted_until_reset() {
        let mut fake = FakeHandle::new().failing_on("SELECT broken");

        assert!(fake.exec("SELECT broken", None).is_err());
        let err = fake.exec("SELECT 1", None).unwrap_err();
        assert!(matches!(err, PgStatsError::ExecutionError(ref m) if m == ABORTED_MESSAGE));

        fake.reset().unwrap();
        assert!(fake.exec("SELECT 1", None).is_ok());
    }

    #[test]
    fn log_outlives_handle() {
        let fake = FakeHandle::new();
        let log = fake.log();
        Box::new(fake).release().unwrap();
        assert_eq!(log.calls(), vec![Call::Release]);
    }
}
