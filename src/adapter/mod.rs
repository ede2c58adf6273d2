//! The connection adapter: one session, its provenance, and its recovery policy.
//!
//! An adapter is built already holding a live session and stays that way until
//! [`ConnectionAdapter::disconnect`]; after that every call returns
//! [`PgStatsError::Disconnected`].
//!
//! # Recovery
//!
//! When a statement fails at the database the adapter resets the session (rolling
//! back an aborted transaction, or reopening a dead socket when it owns the session)
//! and then hands the *original* error back. It never retries the statement and does
//! not try to tell transient failures from permanent ones; that decision belongs to
//! the caller.

mod info;

use deadpool_postgres::{Object, Pool};
use tracing::{debug, error, info, warn};

use crate::catalog::Executor;
use crate::config::ConnectionParams;
use crate::error::PgStatsError;
use crate::handle::{PgHandle, Provenance};
use crate::postgres::{DirectConnection, PooledConnection};
use crate::results::ResultSet;
use crate::types::SqlValue;

pub use info::{ConnectionInfo, UNKNOWN_VERSION, format_version};

/// Where a self-established adapter gets its session from.
#[derive(Clone)]
pub enum ConnectionSource {
    /// Resolve parameters from the environment and open a dedicated session.
    Direct,
    /// Open a dedicated session with explicit parameters.
    Params(ConnectionParams),
    /// Borrow a session from a pool the caller manages.
    Pooled(Pool),
}

impl std::fmt::Debug for ConnectionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionSource::Direct => f.write_str("Direct"),
            ConnectionSource::Params(params) => f
                .debug_tuple("Params")
                .field(&params.display_target())
                .finish(),
            ConnectionSource::Pooled(pool) => f
                .debug_struct("Pooled")
                .field("max_size", &pool.status().max_size)
                .finish(),
        }
    }
}

/// Owns (or borrows) exactly one database session.
pub struct ConnectionAdapter {
    handle: Option<Box<dyn PgHandle>>,
    provenance: Provenance,
    info: Option<ConnectionInfo>,
}

impl std::fmt::Debug for ConnectionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionAdapter")
            .field("provenance", &self.provenance)
            .field("disconnected", &self.handle.is_none())
            .field("info", &self.info)
            .finish()
    }
}

impl ConnectionAdapter {
    /// Establish a session from `source`.
    ///
    /// # Errors
    /// `ConfigError` if `Direct` finds no connection URL; `ConnectionError` or
    /// `PoolError` if the session cannot be opened or borrowed.
    pub fn establish(source: &ConnectionSource) -> Result<Self, PgStatsError> {
        match source {
            ConnectionSource::Direct => Self::connect(&ConnectionParams::from_env()?),
            ConnectionSource::Params(params) => Self::connect(params),
            ConnectionSource::Pooled(pool) => {
                let conn = PooledConnection::checkout(pool)?;
                Ok(Self::with_handle(Box::new(conn), Provenance::Borrowed))
            }
        }
    }

    /// Open a dedicated session with `params`; the adapter owns it.
    ///
    /// # Errors
    /// Returns `ConnectionError` if the server refuses the session.
    pub fn connect(params: &ConnectionParams) -> Result<Self, PgStatsError> {
        let conn = DirectConnection::open(params)?;
        Ok(Self::with_handle(Box::new(conn), Provenance::Owned))
    }

    /// Adopt a session supplied by the caller. The caller keeps responsibility for
    /// it: [`disconnect`](Self::disconnect) releases it rather than closing it.
    ///
    /// # Errors
    /// Returns `InvalidConnection` if the session is already closed.
    pub fn from_handle(handle: Box<dyn PgHandle>) -> Result<Self, PgStatsError> {
        if handle.is_closed() {
            return Err(PgStatsError::InvalidConnection(
                "connection must be an open PostgreSQL session, but it was closed".to_string(),
            ));
        }
        Ok(Self::with_handle(handle, Provenance::Borrowed))
    }

    /// Adopt a session the caller checked out of a deadpool pool.
    ///
    /// # Errors
    /// Returns `InvalidConnection` if the session is already closed.
    pub fn from_pooled(object: Object) -> Result<Self, PgStatsError> {
        Self::from_handle(Box::new(PooledConnection::new(object)))
    }

    pub(crate) fn with_handle(handle: Box<dyn PgHandle>, provenance: Provenance) -> Self {
        ConnectionAdapter {
            handle: Some(handle),
            provenance,
            info: None,
        }
    }

    #[must_use]
    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.handle.is_none()
    }

    fn handle_mut(&mut self) -> Result<&mut Box<dyn PgHandle>, PgStatsError> {
        self.handle.as_mut().ok_or(PgStatsError::Disconnected)
    }

    /// Run `statement` and return every row it produced.
    ///
    /// An empty `params` slice is sent as an unparameterized statement. If the
    /// database rejects the statement the session is reset before the error is
    /// returned, so the next call starts from a clean session.
    ///
    /// # Errors
    /// The database error exactly as the driver reported it; `Disconnected` after
    /// [`disconnect`](Self::disconnect).
    pub fn execute(
        &mut self,
        statement: &str,
        params: &[SqlValue],
    ) -> Result<ResultSet, PgStatsError> {
        let params = if params.is_empty() { None } else { Some(params) };
        let handle = self.handle_mut()?;
        debug!(statement, params = params.map_or(0, <[SqlValue]>::len), "execute");

        match handle.exec(statement, params) {
            Ok(result_set) => Ok(result_set),
            Err(err) if err.is_database_error() => {
                warn!(error = %err, "statement failed; resetting session");
                if let Err(reset_err) = handle.reset() {
                    warn!(error = %reset_err, "session reset failed");
                }
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Health probe: `Ok(false)` when the database (or the socket to it) fails the
    /// probe, `Ok(true)` otherwise.
    ///
    /// # Errors
    /// Only failures that are not database errors, such as `Disconnected`.
    pub fn alive(&mut self) -> Result<bool, PgStatsError> {
        match self.handle_mut()?.probe() {
            Ok(()) => Ok(true),
            Err(err) if err.is_database_error() => {
                debug!(error = %err, "liveness probe failed");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Session metadata, queried on first use and cached until the adapter is dropped.
    ///
    /// # Errors
    /// The database error if the first lookup fails; `Disconnected` after
    /// [`disconnect`](Self::disconnect), even if the metadata was cached.
    pub fn info(&mut self) -> Result<&ConnectionInfo, PgStatsError> {
        let handle = self.handle.as_mut().ok_or(PgStatsError::Disconnected)?;
        if self.info.is_none() {
            let db_name = handle.db_name()?;
            let server_version = format_version(handle.server_version()?);
            let client_version = handle
                .client_version()
                .map_or_else(|| UNKNOWN_VERSION.to_string(), format_version);
            self.info = Some(ConnectionInfo {
                db_name,
                server_version,
                client_version,
            });
        }
        self.info.as_ref().ok_or(PgStatsError::Disconnected)
    }

    /// End the adapter's hold on its session: close an owned session, release a
    /// borrowed one. The adapter is unusable afterwards.
    ///
    /// # Errors
    /// `TeardownError` if the session did not shut down cleanly; `Disconnected` if it
    /// was already disconnected.
    pub fn disconnect(&mut self) -> Result<(), PgStatsError> {
        let handle = self.handle.take().ok_or(PgStatsError::Disconnected)?;
        let result = match self.provenance {
            Provenance::Owned => handle.close(),
            Provenance::Borrowed => handle.release(),
        };
        match &result {
            Ok(()) => info!(provenance = ?self.provenance, "disconnected"),
            Err(e) => error!(error = %e, provenance = ?self.provenance, "disconnect failed"),
        }
        result
    }
}

impl Executor for ConnectionAdapter {
    fn exec(&mut self, statement: &str, params: &[SqlValue]) -> Result<ResultSet, PgStatsError> {
        self.execute(statement, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fake::{Call, FakeHandle};

    fn borrowed(fake: FakeHandle) -> ConnectionAdapter {
        ConnectionAdapter::from_handle(Box::new(fake)).unwrap()
    }

    #[test]
    fn failed_statement_resets_then_propagates() {
        let fake = FakeHandle::new().failing_on("SELECT broken");
        let log = fake.log();
        let mut adapter = borrowed(fake);

        let err = adapter.execute("SELECT broken", &[]).unwrap_err();
        assert!(matches!(err, PgStatsError::ExecutionError(ref m) if m.contains("SELECT broken")));
        assert!(adapter.execute("SELECT 1", &[]).is_ok());

        assert_eq!(
            log.calls(),
            vec![
                Call::exec("SELECT broken", None),
                Call::Reset,
                Call::exec("SELECT 1", None),
            ]
        );
    }

    #[test]
    fn non_database_errors_skip_reset() {
        let fake = FakeHandle::new().rejecting_params_on("SELECT $1");
        let log = fake.log();
        let mut adapter = borrowed(fake);

        assert!(adapter.execute("SELECT $1", &[SqlValue::Int(1)]).is_err());
        assert!(!log.calls().contains(&Call::Reset));
    }

    #[test]
    fn failing_reset_keeps_original_error() {
        let fake = FakeHandle::new().failing_on("SELECT broken").failing_reset();
        let mut adapter = borrowed(fake);

        let err = adapter.execute("SELECT broken", &[]).unwrap_err();
        assert!(matches!(err, PgStatsError::ExecutionError(ref m) if m.contains("SELECT broken")));
    }

    #[test]
    fn empty_params_are_sent_as_none() {
        let fake = FakeHandle::new();
        let log = fake.log();
        let mut adapter = borrowed(fake);

        adapter.execute("SELECT 1", &[]).unwrap();
        adapter
            .execute("SELECT $1::bigint", &[SqlValue::Int(5)])
            .unwrap();

        assert_eq!(
            log.calls(),
            vec![
                Call::exec("SELECT 1", None),
                Call::exec("SELECT $1::bigint", Some(vec![SqlValue::Int(5)])),
            ]
        );
    }

    #[test]
    fn closed_handle_is_rejected() {
        let err = ConnectionAdapter::from_handle(Box::new(FakeHandle::new().closed())).unwrap_err();
        assert!(matches!(err, PgStatsError::InvalidConnection(_)));
    }

    #[test]
    fn borrowed_handle_is_released_not_closed() {
        let fake = FakeHandle::new();
        let log = fake.log();
        let mut adapter = borrowed(fake);
        assert_eq!(adapter.provenance(), Provenance::Borrowed);

        adapter.disconnect().unwrap();
        assert_eq!(log.count(&Call::Release), 1);
        assert_eq!(log.count(&Call::Close), 0);
    }

    #[test]
    fn owned_handle_is_closed() {
        let fake = FakeHandle::new();
        let log = fake.log();
        let mut adapter = ConnectionAdapter::with_handle(Box::new(fake), Provenance::Owned);

        adapter.disconnect().unwrap();
        assert_eq!(log.count(&Call::Close), 1);
        assert_eq!(log.count(&Call::Release), 0);
    }

    #[test]
    fn teardown_failure_propagates() {
        let fake = FakeHandle::new().failing_teardown();
        let mut adapter = ConnectionAdapter::with_handle(Box::new(fake), Provenance::Owned);

        let err = adapter.disconnect().unwrap_err();
        assert!(matches!(err, PgStatsError::TeardownError(_)));
        assert!(adapter.is_disconnected());
    }

    #[test]
    fn disconnected_adapter_refuses_everything() {
        let mut adapter = borrowed(FakeHandle::new());
        adapter.disconnect().unwrap();

        assert!(matches!(adapter.execute("SELECT 1", &[]), Err(PgStatsError::Disconnected)));
        assert!(matches!(adapter.alive(), Err(PgStatsError::Disconnected)));
        assert!(matches!(adapter.info(), Err(PgStatsError::Disconnected)));
        assert!(matches!(adapter.disconnect(), Err(PgStatsError::Disconnected)));
    }

    #[test]
    fn alive_reports_false_on_database_failure() {
        let mut adapter = borrowed(FakeHandle::new().unreachable());
        assert!(!adapter.alive().unwrap());

        let mut adapter = borrowed(FakeHandle::new());
        assert!(adapter.alive().unwrap());
    }

    #[test]
    fn info_is_computed_once() {
        let fake = FakeHandle::new()
            .with_db_name("metrics")
            .with_server_version(90624);
        let log = fake.log();
        let mut adapter = borrowed(fake);

        let first = adapter.info().unwrap().clone();
        let second = adapter.info().unwrap().clone();

        assert_eq!(first, second);
        assert_eq!(first.db_name, "metrics");
        assert_eq!(first.server_version, "9.6.24");
        assert_eq!(first.client_version, UNKNOWN_VERSION);
        assert_eq!(log.count(&Call::DbName), 1);
        assert_eq!(log.count(&Call::ServerVersion), 1);
    }

    #[test]
    fn client_version_is_formatted_when_known() {
        let fake = FakeHandle::new().with_client_version(160002);
        let mut adapter = borrowed(fake);
        assert_eq!(adapter.info().unwrap().client_version, "16.2");
    }
}
