use tracing::{error, warn};

use crate::adapter::{ConnectionAdapter, ConnectionSource};
use crate::catalog::QueryCatalog;
use crate::error::PgStatsError;
use crate::results::ResultSet;
use crate::types::SqlValue;

/// Caller-facing statistics facade over one connection adapter.
///
/// ```rust,no_run
/// use pg_stats::prelude::*;
///
/// # fn main() -> Result<(), PgStatsError> {
/// // Reads PG_STATS_DATABASE_URL, falling back to DATABASE_URL.
/// let mut stats = Stats::new()?;
/// let db_name = stats.db_name()?.to_owned();
/// println!("{} on {}", db_name, stats.version()?);
///
/// let largest = stats.get("table_sizes", &[SqlValue::Int(5)])?;
/// for row in &largest {
///     println!("{:?} {:?}", row.get("name"), row.get("size"));
/// }
/// stats.close()
/// # }
/// ```
#[derive(Debug)]
pub struct Stats {
    adapter: ConnectionAdapter,
    catalog: QueryCatalog,
}

impl Stats {
    /// Connect using the environment and the built-in catalog.
    ///
    /// # Errors
    /// `ConfigError` if no connection URL is set; `ConnectionError` if the session
    /// cannot be opened.
    pub fn new() -> Result<Self, PgStatsError> {
        Self::establish(&ConnectionSource::Direct, QueryCatalog::builtin())
    }

    /// Connect through `source` and dispatch requests to `catalog`.
    ///
    /// # Errors
    /// See [`ConnectionAdapter::establish`].
    pub fn establish(
        source: &ConnectionSource,
        catalog: QueryCatalog,
    ) -> Result<Self, PgStatsError> {
        let adapter = ConnectionAdapter::establish(source)?;
        Ok(Stats { adapter, catalog })
    }

    /// Run the catalog query `name` with positional `params`.
    ///
    /// # Errors
    /// `UnknownQuery` if `name` is not registered, `ArgumentError` if `params` do not
    /// fit its declaration, or the database error the query ran into.
    pub fn get(&mut self, name: &str, params: &[SqlValue]) -> Result<ResultSet, PgStatsError> {
        self.catalog.run(name, &mut self.adapter, params)
    }

    /// Name of the connected database.
    ///
    /// # Errors
    /// The database error if session metadata cannot be read.
    pub fn db_name(&mut self) -> Result<&str, PgStatsError> {
        Ok(&self.adapter.info()?.db_name)
    }

    /// Server version, e.g. `16.2`.
    ///
    /// # Errors
    /// The database error if session metadata cannot be read.
    pub fn version(&mut self) -> Result<&str, PgStatsError> {
        Ok(&self.adapter.info()?.server_version)
    }

    /// Client library version, or `unknown`.
    ///
    /// # Errors
    /// The database error if session metadata cannot be read.
    pub fn client_version(&mut self) -> Result<&str, PgStatsError> {
        Ok(&self.adapter.info()?.client_version)
    }

    #[must_use]
    pub fn query_names(&self) -> Vec<&'static str> {
        self.catalog.names()
    }

    /// Give up the connection.
    ///
    /// # Errors
    /// `TeardownError` if the session did not shut down cleanly.
    pub fn close(mut self) -> Result<(), PgStatsError> {
        self.adapter.disconnect()
    }

    /// Liveness check against the environment-configured server.
    ///
    /// # Errors
    /// See [`Stats::check_source`].
    pub fn check() -> Result<(), PgStatsError> {
        Self::check_source(&ConnectionSource::Direct)
    }

    /// Establish a throwaway session from `source`, probe it and tear it down.
    ///
    /// # Errors
    /// `ConnectionUnavailable` if the probe fails (teardown still runs); otherwise
    /// the establishment or teardown error.
    pub fn check_source(source: &ConnectionSource) -> Result<(), PgStatsError> {
        probe_and_teardown(ConnectionAdapter::establish(source)?)
    }
}

/// Probe `adapter`, then disconnect it whatever the probe said.
pub(crate) fn probe_and_teardown(mut adapter: ConnectionAdapter) -> Result<(), PgStatsError> {
    let probe = adapter.alive();
    let teardown = adapter.disconnect();

    let failure = match probe {
        Ok(true) => return teardown,
        Ok(false) => "liveness probe failed".to_string(),
        Err(e) => format!("liveness probe failed: {e}"),
    };
    if let Err(e) = teardown {
        error!(error = %e, "teardown after failed liveness probe also failed");
    }
    warn!(reason = %failure, "could not establish connection");
    Err(PgStatsError::ConnectionUnavailable(format!(
        "could not establish connection: {failure}"
    )))
}
