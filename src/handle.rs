use crate::error::PgStatsError;
use crate::results::ResultSet;
use crate::types::SqlValue;

/// Who is responsible for ending a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Opened by the adapter; the adapter closes it.
    Owned,
    /// Lent by the caller or a pool; the adapter only gives it back.
    Borrowed,
}

/// One live database session.
///
/// All methods block until the round-trip is done. Implementations report failures
/// the server (or the socket to it) produced as [`PgStatsError::PostgresError`] or
/// [`PgStatsError::ExecutionError`]; the adapter's recovery logic keys off
/// [`PgStatsError::is_database_error`].
pub trait PgHandle: Send {
    /// Run `statement`. `None` means a plain, unparameterized statement; `Some` binds
    /// the given values positionally.
    ///
    /// # Errors
    /// Database errors, or `ParameterError` if a value cannot be bound.
    fn exec(
        &mut self,
        statement: &str,
        params: Option<&[SqlValue]>,
    ) -> Result<ResultSet, PgStatsError>;

    /// Clear any protocol-level leftovers (an aborted transaction, a dead socket) so the
    /// next statement starts clean.
    ///
    /// # Errors
    /// Returns the error that prevented the reset.
    fn reset(&mut self) -> Result<(), PgStatsError>;

    /// Trivial round-trip (`SELECT 1`).
    ///
    /// # Errors
    /// Returns the database error if the probe fails.
    fn probe(&mut self) -> Result<(), PgStatsError>;

    /// Name of the database the session is connected to.
    ///
    /// # Errors
    /// Returns the database error if the lookup fails.
    fn db_name(&mut self) -> Result<String, PgStatsError>;

    /// Server version as Postgres encodes it numerically (`server_version_num`).
    ///
    /// # Errors
    /// Returns the database error if the lookup fails or the value is not numeric.
    fn server_version(&mut self) -> Result<u32, PgStatsError>;

    /// Client library version in the same numeric encoding, if the driver knows it.
    fn client_version(&self) -> Option<u32> {
        None
    }

    /// True once the session can no longer carry statements.
    fn is_closed(&self) -> bool;

    /// End the session for good.
    ///
    /// # Errors
    /// Returns `TeardownError` if the session did not shut down cleanly.
    fn close(self: Box<Self>) -> Result<(), PgStatsError>;

    /// Give the session back to whoever lent it, leaving it open.
    ///
    /// # Errors
    /// Returns `TeardownError` if the session could not be handed back.
    fn release(self: Box<Self>) -> Result<(), PgStatsError> {
        Ok(())
    }
}
