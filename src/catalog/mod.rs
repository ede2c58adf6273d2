//! Named statistics queries and the dispatch that routes a request to one of them.
//!
//! A [`QueryCatalog`] maps a name to a [`QueryEntry`]: a plain function plus the list
//! of arguments it takes. [`QueryCatalog::run`] looks the name up, checks and coerces
//! the caller's arguments against that list, and only then calls the function with an
//! [`Executor`] to issue its statements through.
//!
//! ```rust
//! use pg_stats::catalog::{ParamKind, ParamSpec, QueryCatalog, QueryEntry};
//!
//! let mut catalog = QueryCatalog::builtin();
//! catalog.register(QueryEntry::new(
//!     "replication_lag",
//!     "Bytes each standby is behind",
//!     &[],
//!     |exec, _args| {
//!         exec.exec(
//!             "SELECT application_name, pg_wal_lsn_diff(pg_current_wal_lsn(), replay_lsn)::bigint AS lag_bytes FROM pg_stat_replication",
//!             &[],
//!         )
//!     },
//! ));
//! assert!(catalog.contains("replication_lag"));
//! assert!(catalog.contains("table_sizes"));
//! ```

pub mod size_queries;
pub mod stat_queries;

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::PgStatsError;
use crate::results::ResultSet;
use crate::types::SqlValue;

/// Something that can run a statement for a catalog operation.
pub trait Executor {
    /// Run `statement` with positional `params` (empty for none).
    ///
    /// # Errors
    /// Whatever the underlying session reports.
    fn exec(&mut self, statement: &str, params: &[SqlValue]) -> Result<ResultSet, PgStatsError>;
}

/// Signature of a catalog operation. `args` always has one slot per declared
/// parameter; omitted optional arguments arrive as [`SqlValue::Null`].
pub type QueryFn = fn(&mut dyn Executor, &[SqlValue]) -> Result<ResultSet, PgStatsError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Text,
}

impl std::fmt::Display for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamKind::Int => f.write_str("integer"),
            ParamKind::Text => f.write_str("text"),
        }
    }
}

/// One declared argument of a catalog operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
}

impl ParamSpec {
    #[must_use]
    pub const fn required(name: &'static str, kind: ParamKind) -> Self {
        ParamSpec {
            name,
            kind,
            required: true,
        }
    }

    #[must_use]
    pub const fn optional(name: &'static str, kind: ParamKind) -> Self {
        ParamSpec {
            name,
            kind,
            required: false,
        }
    }

    fn coerce(&self, query: &str, value: &SqlValue) -> Result<SqlValue, PgStatsError> {
        let coerced = match (self.kind, value) {
            (_, SqlValue::Null) if !self.required => Some(SqlValue::Null),
            (ParamKind::Int, SqlValue::Int(i)) => Some(SqlValue::Int(*i)),
            (ParamKind::Int, SqlValue::Text(_)) => value.as_int().map(SqlValue::Int),
            (ParamKind::Text, SqlValue::Text(s)) => Some(SqlValue::Text(s.clone())),
            _ => None,
        };
        coerced.ok_or_else(|| PgStatsError::ArgumentError {
            query: query.to_string(),
            message: format!("'{}' must be {}, got {value:?}", self.name, self.kind),
        })
    }
}

/// A named operation and its argument list.
#[derive(Debug, Clone, Copy)]
pub struct QueryEntry {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
    run: QueryFn,
}

impl QueryEntry {
    #[must_use]
    pub const fn new(
        name: &'static str,
        description: &'static str,
        params: &'static [ParamSpec],
        run: QueryFn,
    ) -> Self {
        QueryEntry {
            name,
            description,
            params,
            run,
        }
    }

    /// Check `args` against the declared parameters and return them coerced, padded
    /// with `Null` for omitted optional ones.
    ///
    /// # Errors
    /// Returns `PgStatsError::ArgumentError` on too many arguments, a missing required
    /// one, or a value that cannot be coerced to the declared kind.
    pub fn validate(&self, args: &[SqlValue]) -> Result<Vec<SqlValue>, PgStatsError> {
        if args.len() > self.params.len() {
            return Err(PgStatsError::ArgumentError {
                query: self.name.to_string(),
                message: format!(
                    "expected at most {} argument(s), got {}",
                    self.params.len(),
                    args.len()
                ),
            });
        }

        self.params
            .iter()
            .enumerate()
            .map(|(idx, spec)| match args.get(idx) {
                Some(value) => spec.coerce(self.name, value),
                None if spec.required => Err(PgStatsError::ArgumentError {
                    query: self.name.to_string(),
                    message: format!("missing required argument '{}'", spec.name),
                }),
                None => Ok(SqlValue::Null),
            })
            .collect()
    }

    /// `name(arg, arg?)` for listings.
    #[must_use]
    pub fn signature(&self) -> String {
        let args: Vec<String> = self
            .params
            .iter()
            .map(|p| {
                if p.required {
                    p.name.to_string()
                } else {
                    format!("{}?", p.name)
                }
            })
            .collect();
        format!("{}({})", self.name, args.join(", "))
    }
}

/// Name → operation registry, built once.
#[derive(Debug, Clone, Default)]
pub struct QueryCatalog {
    entries: BTreeMap<&'static str, QueryEntry>,
}

impl QueryCatalog {
    /// A catalog with nothing registered.
    #[must_use]
    pub fn empty() -> Self {
        QueryCatalog::default()
    }

    /// The size and activity queries shipped with the crate.
    #[must_use]
    pub fn builtin() -> Self {
        let mut catalog = QueryCatalog::empty();
        for entry in size_queries::ENTRIES.iter().chain(stat_queries::ENTRIES) {
            catalog.register(*entry);
        }
        catalog
    }

    /// Add `entry`, returning whatever was registered under the same name before.
    pub fn register(&mut self, entry: QueryEntry) -> Option<QueryEntry> {
        self.entries.insert(entry.name, entry)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&QueryEntry> {
        self.entries.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &QueryEntry> {
        self.entries.values()
    }

    /// Dispatch the request `name(args)` to its operation.
    ///
    /// Lookup and argument validation happen before `exec` sees any statement.
    ///
    /// # Errors
    /// `UnknownQuery` naming the request if nothing is registered under `name`;
    /// `ArgumentError` if the arguments do not fit; otherwise whatever the operation
    /// returns.
    pub fn run(
        &self,
        name: &str,
        exec: &mut dyn Executor,
        args: &[SqlValue],
    ) -> Result<ResultSet, PgStatsError> {
        let entry = self
            .get(name)
            .ok_or_else(|| PgStatsError::UnknownQuery(name.to_string()))?;
        let args = entry.validate(args)?;
        debug!(query = entry.name, args = args.len(), "dispatching stats query");
        (entry.run)(exec, &args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        statements: Vec<(String, Vec<SqlValue>)>,
    }

    impl Executor for Recorder {
        fn exec(
            &mut self,
            statement: &str,
            params: &[SqlValue],
        ) -> Result<ResultSet, PgStatsError> {
            self.statements.push((statement.to_string(), params.to_vec()));
            Ok(ResultSet::default())
        }
    }

    fn echo(exec: &mut dyn Executor, args: &[SqlValue]) -> Result<ResultSet, PgStatsError> {
        exec.exec("SELECT echo", args)
    }

    const ECHO_PARAMS: &[ParamSpec] = &[
        ParamSpec::required("table", ParamKind::Text),
        ParamSpec::optional("limit", ParamKind::Int),
    ];

    fn echo_catalog() -> QueryCatalog {
        let mut catalog = QueryCatalog::empty();
        catalog.register(QueryEntry::new("echo", "test", ECHO_PARAMS, echo));
        catalog
    }

    #[test]
    fn unknown_name_fails_without_executing() {
        let mut rec = Recorder::default();
        let err = echo_catalog().run("nonexistent", &mut rec, &[]).unwrap_err();
        assert!(matches!(err, PgStatsError::UnknownQuery(ref n) if n == "nonexistent"));
        assert!(rec.statements.is_empty());
    }

    #[test]
    fn omitted_optional_is_padded_with_null() {
        let mut rec = Recorder::default();
        echo_catalog()
            .run("echo", &mut rec, &["users".into()])
            .unwrap();
        assert_eq!(
            rec.statements,
            vec![("SELECT echo".to_string(), vec!["users".into(), SqlValue::Null])]
        );
    }

    #[test]
    fn text_coerces_to_int() {
        let mut rec = Recorder::default();
        echo_catalog()
            .run("echo", &mut rec, &["users".into(), "15".into()])
            .unwrap();
        assert_eq!(rec.statements[0].1[1], SqlValue::Int(15));
    }

    #[test]
    fn bad_arguments_fail_before_executing() {
        let catalog = echo_catalog();
        let mut rec = Recorder::default();

        let too_many = catalog.run(
            "echo",
            &mut rec,
            &["a".into(), SqlValue::Int(1), SqlValue::Int(2)],
        );
        let missing = catalog.run("echo", &mut rec, &[]);
        let wrong_kind = catalog.run("echo", &mut rec, &["a".into(), "ten".into()]);
        let null_required = catalog.run("echo", &mut rec, &[SqlValue::Null]);

        for result in [too_many, missing, wrong_kind, null_required] {
            assert!(matches!(
                result,
                Err(PgStatsError::ArgumentError { ref query, .. }) if query == "echo"
            ));
        }
        assert!(rec.statements.is_empty());
    }

    #[test]
    fn register_replaces_by_name() {
        let mut catalog = echo_catalog();
        let previous = catalog.register(QueryEntry::new("echo", "again", &[], echo));
        assert_eq!(previous.map(|e| e.description), Some("test"));
        assert_eq!(catalog.names(), vec!["echo"]);
    }

    #[test]
    fn builtin_has_sorted_unique_names() {
        let catalog = QueryCatalog::builtin();
        let names = catalog.names();
        assert_eq!(
            names.len(),
            size_queries::ENTRIES.len() + stat_queries::ENTRIES.len()
        );
        assert!(names.windows(2).all(|w| w[0] < w[1]));
        assert!(catalog.contains("cache_hit_ratio"));
        assert!(catalog.contains("database_size"));
    }

    #[test]
    fn signature_marks_optional_arguments() {
        let catalog = echo_catalog();
        assert_eq!(catalog.get("echo").unwrap().signature(), "echo(table, limit?)");
    }
}
