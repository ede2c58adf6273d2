use std::error::Error as _;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PgStatsError {
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[error(transparent)]
    PoolError(#[from] deadpool_postgres::PoolError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid connection: {0}")]
    InvalidConnection(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("Unknown stats query: {0}")]
    UnknownQuery(String),

    #[error("Invalid arguments for stats query '{query}': {message}")]
    ArgumentError { query: String, message: String },

    #[error("Connection unavailable: {0}")]
    ConnectionUnavailable(String),

    #[error("Teardown error: {0}")]
    TeardownError(String),

    #[error("Connection adapter has already been disconnected")]
    Disconnected,
}

impl PgStatsError {
    /// True for failures reported by the database session itself.
    ///
    /// These are the errors that trigger a reset inside
    /// [`ConnectionAdapter::execute`](crate::adapter::ConnectionAdapter::execute)
    /// and that make [`ConnectionAdapter::alive`](crate::adapter::ConnectionAdapter::alive)
    /// report `false` instead of failing.
    ///
    /// A driver error counts only when the server answered with an error, the session
    /// closed, or the socket failed. Values that fail to bind or columns that fail to
    /// decode are caught on the client and leave the session untouched.
    #[must_use]
    pub fn is_database_error(&self) -> bool {
        match self {
            PgStatsError::PostgresError(e) => {
                e.as_db_error().is_some()
                    || e.is_closed()
                    || e.source().is_some_and(|cause| cause.is::<std::io::Error>())
            }
            PgStatsError::ExecutionError(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_execution_kinds_are_database_errors() {
        assert!(PgStatsError::ExecutionError("syntax error".into()).is_database_error());
        assert!(!PgStatsError::ConfigError("missing".into()).is_database_error());
        assert!(!PgStatsError::ParameterError("bad".into()).is_database_error());
        assert!(!PgStatsError::Disconnected.is_database_error());
        assert!(!PgStatsError::UnknownQuery("nope".into()).is_database_error());
    }

    #[test]
    fn client_side_driver_errors_are_not_database_errors() {
        let driver_err = "port=notanumber"
            .parse::<tokio_postgres::Config>()
            .unwrap_err();
        assert!(!PgStatsError::from(driver_err).is_database_error());
    }

    #[test]
    fn unknown_query_names_the_request() {
        let err = PgStatsError::UnknownQuery("nonexistent".into());
        assert_eq!(err.to_string(), "Unknown stats query: nonexistent");
    }
}
