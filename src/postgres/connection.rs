use deadpool_postgres::{Object, Pool};
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, info};

use super::query::{run_statement, scalar_text};
use super::{APPLICATION_NAME, runtime};
use crate::config::ConnectionParams;
use crate::error::PgStatsError;
use crate::handle::PgHandle;
use crate::results::ResultSet;
use crate::types::SqlValue;

type Driver = JoinHandle<Result<(), tokio_postgres::Error>>;

fn identify_statement() -> String {
    format!("SET application_name = '{APPLICATION_NAME}'")
}

async fn connect(config: &tokio_postgres::Config) -> Result<(Client, Driver), tokio_postgres::Error> {
    let (client, connection) = config.connect(NoTls).await?;
    let driver = tokio::spawn(async move {
        let result = connection.await;
        if let Err(e) = &result {
            debug!(error = %e, "postgres session ended with an error");
        }
        result
    });
    Ok((client, driver))
}

async fn server_version_num(client: &Client) -> Result<u32, PgStatsError> {
    let raw = scalar_text(client, "SHOW server_version_num").await?;
    raw.trim().parse().map_err(|_| {
        PgStatsError::ExecutionError(format!("unexpected server_version_num '{raw}'"))
    })
}

/// A session this crate opened itself.
///
/// Keeps its driver configuration so a session whose socket died can be reopened in
/// place by [`PgHandle::reset`].
pub struct DirectConnection {
    client: Client,
    driver: Driver,
    config: tokio_postgres::Config,
    target: String,
}

impl std::fmt::Debug for DirectConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectConnection")
            .field("target", &self.target)
            .field("closed", &self.client.is_closed())
            .finish()
    }
}

impl DirectConnection {
    /// Open a session and tag it with the crate's application name.
    ///
    /// # Errors
    /// Returns `PgStatsError::ConnectionError` if the server refuses the session or the
    /// tagging statement fails.
    pub fn open(params: &ConnectionParams) -> Result<Self, PgStatsError> {
        let config = params.to_pg_config();
        let target = params.display_target();
        let (client, driver) = runtime()?
            .block_on(connect(&config))
            .map_err(|e| PgStatsError::ConnectionError(format!("failed to connect to {target}: {e}")))?;

        let conn = DirectConnection {
            client,
            driver,
            config,
            target,
        };
        conn.identify()?;
        info!(target_db = %conn.target, "opened postgres session");
        Ok(conn)
    }

    fn identify(&self) -> Result<(), PgStatsError> {
        runtime()?
            .block_on(self.client.simple_query(&identify_statement()))
            .map(|_| ())
            .map_err(|e| {
                PgStatsError::ConnectionError(format!(
                    "session to {} is unusable: {e}",
                    self.target
                ))
            })
    }
}

impl PgHandle for DirectConnection {
    fn exec(
        &mut self,
        statement: &str,
        params: Option<&[SqlValue]>,
    ) -> Result<ResultSet, PgStatsError> {
        runtime()?.block_on(run_statement(&self.client, statement, params))
    }

    fn reset(&mut self) -> Result<(), PgStatsError> {
        if !self.client.is_closed() {
            runtime()?.block_on(self.client.simple_query("ROLLBACK"))?;
            return Ok(());
        }

        info!(target_db = %self.target, "reopening closed postgres session");
        let (client, driver) = runtime()?.block_on(connect(&self.config))?;
        // The old socket task has already finished; its outcome was logged when it did.
        let _previous = std::mem::replace(&mut self.driver, driver);
        self.client = client;
        self.identify()
    }

    fn probe(&mut self) -> Result<(), PgStatsError> {
        runtime()?.block_on(self.client.simple_query("SELECT 1"))?;
        Ok(())
    }

    fn db_name(&mut self) -> Result<String, PgStatsError> {
        runtime()?.block_on(scalar_text(&self.client, "SELECT current_database()"))
    }

    fn server_version(&mut self) -> Result<u32, PgStatsError> {
        runtime()?.block_on(server_version_num(&self.client))
    }

    fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    fn close(self: Box<Self>) -> Result<(), PgStatsError> {
        let DirectConnection {
            client,
            driver,
            target,
            ..
        } = *self;
        // Dropping the client sends Terminate; the socket task then runs to completion.
        drop(client);
        match runtime()?.block_on(driver) {
            Ok(Ok(())) => {
                info!(target_db = %target, "closed postgres session");
                Ok(())
            }
            Ok(Err(e)) => Err(PgStatsError::TeardownError(format!(
                "session to {target} did not shut down cleanly: {e}"
            ))),
            Err(e) => Err(PgStatsError::TeardownError(format!(
                "session task for {target} failed: {e}"
            ))),
        }
    }
}

/// A session lent by a deadpool pool the caller manages.
pub struct PooledConnection {
    object: Object,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("closed", &self.object.is_closed())
            .finish()
    }
}

impl PooledConnection {
    /// Wrap an object the caller already checked out.
    #[must_use]
    pub fn new(object: Object) -> Self {
        PooledConnection { object }
    }

    /// Check a session out of `pool` and tag it with the crate's application name.
    ///
    /// # Errors
    /// Returns `PgStatsError::PoolError` if the pool cannot lend a session, or
    /// `PgStatsError::ConnectionError` if the tagging statement fails.
    pub fn checkout(pool: &Pool) -> Result<Self, PgStatsError> {
        let object = runtime()?.block_on(pool.get())?;
        runtime()?
            .block_on(object.simple_query(&identify_statement()))
            .map_err(|e| PgStatsError::ConnectionError(format!("pooled session is unusable: {e}")))?;
        debug!("borrowed postgres session from pool");
        Ok(PooledConnection { object })
    }
}

impl PgHandle for PooledConnection {
    fn exec(
        &mut self,
        statement: &str,
        params: Option<&[SqlValue]>,
    ) -> Result<ResultSet, PgStatsError> {
        runtime()?.block_on(run_statement(&self.object, statement, params))
    }

    fn reset(&mut self) -> Result<(), PgStatsError> {
        if self.object.is_closed() {
            // Reopening is the pool's job; it discards closed objects on recycle.
            return Err(PgStatsError::ConnectionError(
                "pooled session is closed and cannot be reopened by a borrower".to_string(),
            ));
        }
        runtime()?.block_on(self.object.simple_query("ROLLBACK"))?;
        Ok(())
    }

    fn probe(&mut self) -> Result<(), PgStatsError> {
        runtime()?.block_on(self.object.simple_query("SELECT 1"))?;
        Ok(())
    }

    fn db_name(&mut self) -> Result<String, PgStatsError> {
        runtime()?.block_on(scalar_text(&self.object, "SELECT current_database()"))
    }

    fn server_version(&mut self) -> Result<u32, PgStatsError> {
        runtime()?.block_on(server_version_num(&self.object))
    }

    fn is_closed(&self) -> bool {
        self.object.is_closed()
    }

    fn close(self: Box<Self>) -> Result<(), PgStatsError> {
        // Detach from the pool so the session is dropped instead of recycled.
        drop(Object::take(self.object));
        Ok(())
    }

    fn release(self: Box<Self>) -> Result<(), PgStatsError> {
        drop(self.object);
        debug!("returned postgres session to pool");
        Ok(())
    }
}
