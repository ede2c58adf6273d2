//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::adapter::{ConnectionAdapter, ConnectionInfo, ConnectionSource, format_version};
pub use crate::catalog::{Executor, ParamKind, ParamSpec, QueryCatalog, QueryEntry};
pub use crate::config::{ConfigSource, ConnectionParams, EnvSource};
pub use crate::error::PgStatsError;
pub use crate::handle::{PgHandle, Provenance};
pub use crate::postgres::{DirectConnection, PooledConnection};
pub use crate::results::{ResultSet, Row};
pub use crate::stats::Stats;
pub use crate::types::SqlValue;
