// PostgreSQL module - the native session handles behind the adapter
//
// - connection: DirectConnection (opened by us) and PooledConnection (lent by a deadpool pool)
// - params: binding SqlValue as statement parameters
// - query: running statements and materializing result sets
//
// tokio-postgres is async; the handles expose a blocking API by driving every call to
// completion on one process-wide runtime.

pub mod connection;
pub mod params;
pub mod query;

use std::sync::OnceLock;

use tokio::runtime::{Builder, Runtime};

use crate::error::PgStatsError;

pub use connection::{DirectConnection, PooledConnection};
pub use params::Params;
pub use query::{build_result_set_from_messages, build_result_set_from_statement};

/// Value sent as `application_name` on every session this crate opens or borrows.
pub const APPLICATION_NAME: &str = concat!("pg-stats ", env!("CARGO_PKG_VERSION"));

static SHARED_RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// The runtime that owns every session's socket task.
///
/// Blocking calls `block_on` this runtime, so they must not be made from inside an
/// async task.
pub(crate) fn runtime() -> Result<&'static Runtime, PgStatsError> {
    if let Some(rt) = SHARED_RUNTIME.get() {
        return Ok(rt);
    }
    let rt = Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("pg-stats-io")
        .enable_all()
        .build()
        .map_err(|e| PgStatsError::ConnectionError(format!("failed to start I/O runtime: {e}")))?;
    Ok(SHARED_RUNTIME.get_or_init(|| rt))
}
