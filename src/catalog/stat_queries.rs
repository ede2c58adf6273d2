//! Cache efficiency, index usage, sessions, locks and vacuum state.

use super::{Executor, ParamKind, ParamSpec, QueryEntry};
use crate::error::PgStatsError;
use crate::results::ResultSet;
use crate::types::SqlValue;

/// Threshold for `long_running_queries` when the caller gives none.
pub const DEFAULT_LONG_RUNNING_SECONDS: i64 = 300;

const MIN_SECONDS: &[ParamSpec] = &[ParamSpec::optional("min_seconds", ParamKind::Int)];

pub const ENTRIES: &[QueryEntry] = &[
    QueryEntry::new(
        "cache_hit_ratio",
        "Share of index and table reads served from shared buffers",
        &[],
        cache_hit_ratio,
    ),
    QueryEntry::new(
        "index_usage",
        "Per table, how often an index was used instead of a sequential scan",
        &[],
        index_usage,
    ),
    QueryEntry::new(
        "unused_indexes",
        "Non-unique indexes that have never been scanned",
        &[],
        unused_indexes,
    ),
    QueryEntry::new(
        "seq_scans",
        "Sequential scan counts per table",
        &[],
        seq_scans,
    ),
    QueryEntry::new(
        "connection_count",
        "Number of server sessions",
        &[],
        connection_count,
    ),
    QueryEntry::new(
        "connections_by_state",
        "Server sessions grouped by state",
        &[],
        connections_by_state,
    ),
    QueryEntry::new(
        "activity",
        "Client sessions and what they are running",
        &[],
        activity,
    ),
    QueryEntry::new(
        "long_running_queries",
        "Statements running for at least min_seconds (default 300)",
        MIN_SECONDS,
        long_running_queries,
    ),
    QueryEntry::new(
        "locks",
        "Locks held or awaited on relations",
        &[],
        locks,
    ),
    QueryEntry::new(
        "blocking_queries",
        "Sessions waiting on a lock and the sessions holding it",
        &[],
        blocking_queries,
    ),
    QueryEntry::new(
        "vacuum_stats",
        "Dead tuples and last (auto)vacuum/analyze per table",
        &[],
        vacuum_stats,
    ),
];

const INDEX_HIT_RATIO: &str = "SELECT (sum(idx_blks_hit) / nullif(sum(idx_blks_hit + idx_blks_read), 0))::float8 AS ratio \
     FROM pg_statio_user_indexes";

const TABLE_HIT_RATIO: &str = "SELECT (sum(heap_blks_hit) / nullif(sum(heap_blks_hit + heap_blks_read), 0))::float8 AS ratio \
     FROM pg_statio_user_tables";

/// Two statements, reshaped into one `name | ratio` result with an `index` and a
/// `table` row. A ratio is `NULL` until the server has read anything.
fn cache_hit_ratio(exec: &mut dyn Executor, _args: &[SqlValue]) -> Result<ResultSet, PgStatsError> {
    let mut combined = ResultSet::with_columns(vec!["name".into(), "ratio".into()], 2);
    for (name, sql) in [("index", INDEX_HIT_RATIO), ("table", TABLE_HIT_RATIO)] {
        let ratio = exec
            .exec(sql, &[])?
            .results
            .first()
            .and_then(|row| row.get("ratio"))
            .cloned()
            .unwrap_or(SqlValue::Null);
        combined.add_row_values(vec![name.into(), ratio]);
    }
    Ok(combined)
}

fn index_usage(exec: &mut dyn Executor, _args: &[SqlValue]) -> Result<ResultSet, PgStatsError> {
    exec.exec(
        "SELECT schemaname AS schema, relname AS name, \
                coalesce(idx_scan, 0) AS idx_scan, seq_scan, \
                round(100.0 * coalesce(idx_scan, 0) / nullif(coalesce(idx_scan, 0) + seq_scan, 0), 2)::float8 AS percent_idx_used, \
                n_live_tup AS rows \
         FROM pg_stat_user_tables \
         ORDER BY n_live_tup DESC, schema, name",
        &[],
    )
}

fn unused_indexes(exec: &mut dyn Executor, _args: &[SqlValue]) -> Result<ResultSet, PgStatsError> {
    exec.exec(
        "SELECT s.schemaname AS schema, s.relname AS table, s.indexrelname AS name, \
                pg_size_pretty(pg_relation_size(s.indexrelid)) AS size, \
                pg_relation_size(s.indexrelid) AS bytes \
         FROM pg_stat_user_indexes s \
         JOIN pg_index i ON i.indexrelid = s.indexrelid \
         WHERE s.idx_scan = 0 AND NOT i.indisunique \
         ORDER BY bytes DESC, schema, name",
        &[],
    )
}

fn seq_scans(exec: &mut dyn Executor, _args: &[SqlValue]) -> Result<ResultSet, PgStatsError> {
    exec.exec(
        "SELECT schemaname AS schema, relname AS name, seq_scan, seq_tup_read \
         FROM pg_stat_user_tables \
         ORDER BY seq_scan DESC, schema, name",
        &[],
    )
}

fn connection_count(exec: &mut dyn Executor, _args: &[SqlValue]) -> Result<ResultSet, PgStatsError> {
    exec.exec("SELECT count(*) AS connections FROM pg_stat_activity", &[])
}

fn connections_by_state(
    exec: &mut dyn Executor,
    _args: &[SqlValue],
) -> Result<ResultSet, PgStatsError> {
    exec.exec(
        "SELECT coalesce(state, 'background') AS state, count(*) AS connections \
         FROM pg_stat_activity \
         GROUP BY 1 \
         ORDER BY connections DESC, state",
        &[],
    )
}

fn activity(exec: &mut dyn Executor, _args: &[SqlValue]) -> Result<ResultSet, PgStatsError> {
    exec.exec(
        "SELECT pid, usename AS user, datname AS database, application_name, \
                client_addr::text AS client_addr, state, \
                (now() - query_start)::text AS duration, query \
         FROM pg_stat_activity \
         WHERE pid <> pg_backend_pid() AND usename IS NOT NULL \
         ORDER BY query_start NULLS LAST",
        &[],
    )
}

// interval and inet have no typed mapping, so they come back cast to text.
fn long_running_queries(
    exec: &mut dyn Executor,
    args: &[SqlValue],
) -> Result<ResultSet, PgStatsError> {
    let min_seconds = args
        .first()
        .and_then(SqlValue::as_int)
        .unwrap_or(DEFAULT_LONG_RUNNING_SECONDS);
    exec.exec(
        "SELECT pid, usename AS user, datname AS database, state, \
                (now() - query_start)::text AS duration, query \
         FROM pg_stat_activity \
         WHERE state <> 'idle' \
           AND pid <> pg_backend_pid() \
           AND now() - query_start >= interval '1 second' * $1::bigint \
         ORDER BY query_start",
        &[SqlValue::Int(min_seconds)],
    )
}

fn locks(exec: &mut dyn Executor, _args: &[SqlValue]) -> Result<ResultSet, PgStatsError> {
    exec.exec(
        "SELECT l.pid, c.relname AS relation, l.mode, l.granted, \
                a.state, (now() - a.query_start)::text AS duration, a.query \
         FROM pg_locks l \
         JOIN pg_class c ON c.oid = l.relation \
         JOIN pg_namespace n ON n.oid = c.relnamespace \
         LEFT JOIN pg_stat_activity a ON a.pid = l.pid \
         WHERE n.nspname NOT IN ('pg_catalog', 'information_schema') \
           AND l.pid <> pg_backend_pid() \
         ORDER BY l.granted, l.pid",
        &[],
    )
}

fn blocking_queries(exec: &mut dyn Executor, _args: &[SqlValue]) -> Result<ResultSet, PgStatsError> {
    exec.exec(
        "SELECT waiting.pid AS blocked_pid, waiting.query AS blocked_query, \
                (now() - waiting.query_start)::text AS blocked_duration, \
                holder.pid AS blocking_pid, holder.query AS blocking_query, \
                (now() - holder.query_start)::text AS blocking_duration \
         FROM pg_stat_activity waiting \
         JOIN LATERAL unnest(pg_blocking_pids(waiting.pid)) AS b(pid) ON true \
         JOIN pg_stat_activity holder ON holder.pid = b.pid \
         ORDER BY waiting.query_start",
        &[],
    )
}

fn vacuum_stats(exec: &mut dyn Executor, _args: &[SqlValue]) -> Result<ResultSet, PgStatsError> {
    exec.exec(
        "SELECT schemaname AS schema, relname AS name, n_live_tup, n_dead_tup, \
                last_vacuum, last_autovacuum, last_analyze, last_autoanalyze \
         FROM pg_stat_user_tables \
         ORDER BY n_dead_tup DESC, schema, name",
        &[],
    )
}
