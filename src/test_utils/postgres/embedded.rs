use postgresql_embedded::PostgreSQL;

use crate::config::ConnectionParams;
use crate::handle::PgHandle;
use crate::postgres::{DirectConnection, runtime};

/// Represents a running embedded `PostgreSQL` instance.
pub struct EmbeddedPostgres {
    pub postgresql: PostgreSQL,
    pub port: u16,
    pub database_url: String,
    /// Parameters that reach the test database with working credentials
    pub params: ConnectionParams,
}

impl std::fmt::Debug for EmbeddedPostgres {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedPostgres")
            .field("port", &self.port)
            .field("target", &self.params.display_target())
            .finish_non_exhaustive()
    }
}

/// Set up an embedded `PostgreSQL` instance with a database named `db_name`.
///
/// # Errors
/// Returns an error if the embedded server cannot be set up or started, if the
/// database cannot be created, or if the post-start connectivity check fails.
pub fn setup_postgres_embedded(
    db_name: &str,
) -> Result<EmbeddedPostgres, Box<dyn std::error::Error>> {
    let rt = runtime()?;
    let postgresql = rt.block_on(async {
        let mut postgresql = PostgreSQL::default();

        // Setup PostgreSQL binaries (bundled, so no download conflicts)
        postgresql.setup().await?;
        postgresql.start().await?;
        postgresql.create_database(db_name).await?;
        Ok::<_, Box<dyn std::error::Error>>(postgresql)
    })?;

    let settings = postgresql.settings();
    let port = settings.port;
    let database_url = format!(
        "postgres://{}:{}@{}:{port}/{db_name}",
        settings.username, settings.password, settings.host
    );
    let params = ConnectionParams::from_url(&database_url)?;

    // Quick connection test; the session handles drive their own runtime, so this
    // must happen outside the block_on above.
    let mut conn = Box::new(DirectConnection::open(&params)?);
    conn.probe()?;
    conn.close()?;
    tracing::info!(port, "embedded postgres ready");

    Ok(EmbeddedPostgres {
        postgresql,
        port,
        database_url,
        params,
    })
}

/// Stop a previously started embedded `PostgreSQL` instance.
pub fn stop_postgres_embedded(postgres: EmbeddedPostgres) {
    let EmbeddedPostgres { postgresql, .. } = postgres;
    if let Ok(rt) = runtime() {
        let _ = rt.block_on(postgresql.stop());
    }
}
