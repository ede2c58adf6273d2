//! Connection parameters and where they come from.
//!
//! Parameters are read from a URL held in one of two variables: the crate-specific
//! [`DATABASE_URL_VAR`] wins over the generic [`FALLBACK_URL_VAR`]. The URL is parsed
//! scheme-agnostically, so `postgres://`, `postgresql://` and anything else with the
//! same shape are accepted.

use std::collections::HashMap;
use std::sync::{LazyLock, OnceLock};

use regex::Regex;
use url::Url;

use crate::error::PgStatsError;

/// Crate-specific variable holding the connection URL.
pub const DATABASE_URL_VAR: &str = "PG_STATS_DATABASE_URL";
/// Generic fallback variable holding the connection URL.
pub const FALLBACK_URL_VAR: &str = "DATABASE_URL";
/// Port used when the URL does not name one.
pub const DEFAULT_PORT: u16 = 5432;

static ENCODED_SLASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("(?i)%2F").expect("static pattern"));

static FROM_ENV: OnceLock<ConnectionParams> = OnceLock::new();

/// A place configuration variables can be read from.
pub trait ConfigSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads variables from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl ConfigSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Everything needed to open a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Host name, address, or Unix-socket directory (starts with `/`)
    pub host: Option<String>,
    pub port: u16,
    pub database: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

fn percent_decode(component: &str) -> Result<String, PgStatsError> {
    urlencoding::decode(component)
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| PgStatsError::ConfigError(format!("invalid database URL: {e}")))
}

impl ConnectionParams {
    /// Parse a connection URL.
    ///
    /// `%2F` in the host (any case) is decoded to `/`, which is how a socket
    /// directory is written in URL form: `postgres://%2Fvar%2Frun%2Fpostgresql/app`.
    /// Percent-escapes in the user, password and database name are decoded too.
    ///
    /// # Errors
    /// Returns `PgStatsError::ConfigError` if the URL cannot be parsed.
    pub fn from_url(raw: &str) -> Result<Self, PgStatsError> {
        let url = Url::parse(raw)
            .map_err(|e| PgStatsError::ConfigError(format!("invalid database URL: {e}")))?;

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .map(|h| ENCODED_SLASH.replace_all(h, "/").into_owned());
        let database = percent_decode(url.path().strip_prefix('/').unwrap_or(url.path()))?;
        let user = Some(url.username())
            .filter(|u| !u.is_empty())
            .map(percent_decode)
            .transpose()?;
        let password = url.password().map(percent_decode).transpose()?;

        Ok(ConnectionParams {
            host,
            port: url.port().unwrap_or(DEFAULT_PORT),
            database,
            user,
            password,
        })
    }

    /// Resolve parameters from `source`.
    ///
    /// # Errors
    /// Returns `PgStatsError::ConfigError` naming both variables if neither is set,
    /// or if the URL found is malformed.
    pub fn resolve(source: &dyn ConfigSource) -> Result<Self, PgStatsError> {
        let raw = source
            .var(DATABASE_URL_VAR)
            .or_else(|| source.var(FALLBACK_URL_VAR))
            .ok_or_else(|| {
                PgStatsError::ConfigError(format!(
                    "missing {DATABASE_URL_VAR} or {FALLBACK_URL_VAR}"
                ))
            })?;
        Self::from_url(&raw)
    }

    /// Resolve parameters from the process environment.
    ///
    /// The first successful resolution is kept for the rest of the process; failures
    /// are not cached, so a later call can still succeed once a variable is set.
    ///
    /// # Errors
    /// See [`ConnectionParams::resolve`].
    pub fn from_env() -> Result<Self, PgStatsError> {
        if let Some(params) = FROM_ENV.get() {
            return Ok(params.clone());
        }
        let params = Self::resolve(&EnvSource)?;
        Ok(FROM_ENV.get_or_init(|| params).clone())
    }

    /// Build the driver configuration for a dedicated session.
    #[must_use]
    pub fn to_pg_config(&self) -> tokio_postgres::Config {
        let mut cfg = tokio_postgres::Config::new();
        if let Some(host) = &self.host {
            cfg.host(host);
        }
        cfg.port(self.port);
        if !self.database.is_empty() {
            cfg.dbname(&self.database);
        }
        if let Some(user) = &self.user {
            cfg.user(user);
        }
        if let Some(password) = &self.password {
            cfg.password(password);
        }
        cfg
    }

    /// Build a deadpool configuration, for callers that want a pool to lend sessions from.
    #[must_use]
    pub fn to_pool_config(&self) -> deadpool_postgres::Config {
        let mut cfg = deadpool_postgres::Config::new();
        cfg.host.clone_from(&self.host);
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.database.clone()).filter(|d| !d.is_empty());
        cfg.user.clone_from(&self.user);
        cfg.password.clone_from(&self.password);
        cfg
    }

    /// `host:port/database` for log lines; never includes credentials.
    #[must_use]
    pub fn display_target(&self) -> String {
        format!(
            "{}:{}/{}",
            self.host.as_deref().unwrap_or("localhost"),
            self.port,
            self.database
        )
    }
}
