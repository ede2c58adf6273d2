//! On-disk size of databases, tables and indexes.
//!
//! Every size is reported twice: `size` pretty-printed by the server and `bytes` as a
//! plain integer for sorting and arithmetic.

use super::{Executor, ParamKind, ParamSpec, QueryEntry};
use crate::error::PgStatsError;
use crate::results::ResultSet;
use crate::types::SqlValue;

const USER_SCHEMAS: &str =
    "n.nspname NOT IN ('pg_catalog', 'information_schema') AND n.nspname !~ '^pg_toast'";

const LIMIT: &[ParamSpec] = &[ParamSpec::optional("limit", ParamKind::Int)];
const TABLE: &[ParamSpec] = &[ParamSpec::required("table", ParamKind::Text)];

pub const ENTRIES: &[QueryEntry] = &[
    QueryEntry::new(
        "database_size",
        "Size of the current database",
        &[],
        database_size,
    ),
    QueryEntry::new(
        "database_sizes",
        "Size of every non-template database on the server",
        &[],
        database_sizes,
    ),
    QueryEntry::new(
        "table_sizes",
        "User tables by total size (data, indexes and TOAST), largest first",
        LIMIT,
        table_sizes,
    ),
    QueryEntry::new(
        "table_size",
        "Data, index and total size of one table",
        TABLE,
        table_size,
    ),
    QueryEntry::new(
        "index_sizes",
        "User indexes by size, largest first",
        LIMIT,
        index_sizes,
    ),
    QueryEntry::new(
        "total_index_size",
        "Combined size of all user indexes",
        &[],
        total_index_size,
    ),
];

fn database_size(exec: &mut dyn Executor, _args: &[SqlValue]) -> Result<ResultSet, PgStatsError> {
    exec.exec(
        "SELECT current_database() AS name, \
                pg_size_pretty(pg_database_size(current_database())) AS size, \
                pg_database_size(current_database()) AS bytes",
        &[],
    )
}

fn database_sizes(exec: &mut dyn Executor, _args: &[SqlValue]) -> Result<ResultSet, PgStatsError> {
    exec.exec(
        "SELECT datname AS name, \
                pg_size_pretty(pg_database_size(datname)) AS size, \
                pg_database_size(datname) AS bytes \
         FROM pg_database \
         WHERE NOT datistemplate \
         ORDER BY bytes DESC, name",
        &[],
    )
}

// LIMIT NULL returns every row, so an omitted limit needs no special casing.
fn table_sizes(exec: &mut dyn Executor, args: &[SqlValue]) -> Result<ResultSet, PgStatsError> {
    let sql = format!(
        "SELECT n.nspname AS schema, c.relname AS name, \
                pg_size_pretty(pg_total_relation_size(c.oid)) AS size, \
                pg_total_relation_size(c.oid) AS bytes \
         FROM pg_class c \
         JOIN pg_namespace n ON n.oid = c.relnamespace \
         WHERE c.relkind IN ('r', 'm') AND {USER_SCHEMAS} \
         ORDER BY bytes DESC, schema, name \
         LIMIT $1::bigint"
    );
    exec.exec(&sql, args)
}

fn table_size(exec: &mut dyn Executor, args: &[SqlValue]) -> Result<ResultSet, PgStatsError> {
    exec.exec(
        "SELECT $1::text AS name, \
                pg_size_pretty(pg_relation_size($1::text::regclass)) AS data_size, \
                pg_size_pretty(pg_indexes_size($1::text::regclass)) AS index_size, \
                pg_size_pretty(pg_total_relation_size($1::text::regclass)) AS total_size, \
                pg_total_relation_size($1::text::regclass) AS bytes",
        args,
    )
}

fn index_sizes(exec: &mut dyn Executor, args: &[SqlValue]) -> Result<ResultSet, PgStatsError> {
    let sql = format!(
        "SELECT n.nspname AS schema, t.relname AS table, c.relname AS name, \
                pg_size_pretty(pg_relation_size(c.oid)) AS size, \
                pg_relation_size(c.oid) AS bytes \
         FROM pg_class c \
         JOIN pg_namespace n ON n.oid = c.relnamespace \
         JOIN pg_index i ON i.indexrelid = c.oid \
         JOIN pg_class t ON t.oid = i.indrelid \
         WHERE c.relkind = 'i' AND {USER_SCHEMAS} \
         ORDER BY bytes DESC, schema, name \
         LIMIT $1::bigint"
    );
    exec.exec(&sql, args)
}

fn total_index_size(exec: &mut dyn Executor, _args: &[SqlValue]) -> Result<ResultSet, PgStatsError> {
    let sql = format!(
        "SELECT pg_size_pretty(coalesce(sum(pg_relation_size(c.oid)), 0)::bigint) AS size, \
                coalesce(sum(pg_relation_size(c.oid)), 0)::bigint AS bytes \
         FROM pg_class c \
         JOIN pg_namespace n ON n.oid = c.relnamespace \
         WHERE c.relkind = 'i' AND {USER_SCHEMAS}"
    );
    exec.exec(&sql, &[])
}
