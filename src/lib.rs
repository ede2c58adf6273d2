//! Blocking statistics facade over a PostgreSQL server.
//!
//! A [`Stats`] value holds one session through a [`ConnectionAdapter`] and answers
//! named diagnostic queries (sizes, cache hit ratios, sessions, locks) from a
//! [`QueryCatalog`]. When a statement fails the adapter resets the session before
//! returning the error, so one bad query does not poison the next.
//!
//! ```rust,no_run
//! use pg_stats::prelude::*;
//!
//! # fn main() -> Result<(), PgStatsError> {
//! Stats::check()?;
//!
//! let params = ConnectionParams::from_url("postgres://stats@localhost/app")?;
//! let mut stats = Stats::establish(&ConnectionSource::Params(params), QueryCatalog::builtin())?;
//! let ratio = stats.get("cache_hit_ratio", &[])?;
//! println!("{}", serde_json::to_string(&ratio).unwrap_or_default());
//! stats.close()
//! # }
//! ```
//!
//! [`Stats`]: stats::Stats
//! [`ConnectionAdapter`]: adapter::ConnectionAdapter
//! [`QueryCatalog`]: catalog::QueryCatalog

pub mod prelude;

pub mod adapter;
pub mod catalog;
pub mod config;
pub mod error;
pub mod handle;
pub mod postgres;
pub mod results;
pub mod stats;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use adapter::{ConnectionAdapter, ConnectionInfo, ConnectionSource};
pub use catalog::{Executor, QueryCatalog};
pub use config::ConnectionParams;
pub use error::PgStatsError;
pub use results::{ResultSet, Row};
pub use stats::Stats;
pub use types::SqlValue;
