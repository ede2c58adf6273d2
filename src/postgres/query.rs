use chrono::NaiveDateTime;
use serde_json::Value;
use tokio_postgres::{Client, SimpleQueryMessage, Statement};

use super::params::Params;
use crate::error::PgStatsError;
use crate::results::ResultSet;
use crate::types::SqlValue;

/// Run one statement on `client` and materialize the result.
///
/// Without parameters the statement goes over the simple-query protocol (several
/// `;`-separated statements are allowed; the result of the last one is returned and
/// every column is text). With parameters it is prepared and bound, and columns are
/// decoded into typed values.
///
/// # Errors
/// Returns the driver error, or `ParameterError` on a parameter count mismatch.
pub(crate) async fn run_statement(
    client: &Client,
    statement: &str,
    params: Option<&[SqlValue]>,
) -> Result<ResultSet, PgStatsError> {
    match params {
        None => {
            let messages = client.simple_query(statement).await?;
            build_result_set_from_messages(&messages)
        }
        Some(values) => {
            let stmt = client.prepare(statement).await?;
            let converted = Params::convert(values, stmt.params().len())?;
            let rows = client.query(&stmt, converted.as_refs()).await?;
            build_result_set_from_statement(&stmt, &rows)
        }
    }
}

/// Fetch the first column of the first row of an unparameterized query as text.
pub(crate) async fn scalar_text(client: &Client, statement: &str) -> Result<String, PgStatsError> {
    let rs = run_statement(client, statement, None).await?;
    rs.results
        .first()
        .and_then(|row| row.get_by_index(0))
        .and_then(SqlValue::as_text)
        .map(str::to_string)
        .ok_or_else(|| {
            PgStatsError::ExecutionError(format!("'{statement}' returned no value"))
        })
}

/// Build a result set from simple-query protocol messages.
///
/// # Errors
/// Returns the driver error if a row cannot be read.
pub fn build_result_set_from_messages(
    messages: &[SimpleQueryMessage],
) -> Result<ResultSet, PgStatsError> {
    let mut current: Option<ResultSet> = None;
    let mut last = ResultSet::default();

    for message in messages {
        match message {
            SimpleQueryMessage::Row(row) => {
                let rs = current.get_or_insert_with(|| {
                    let names = row.columns().iter().map(|c| c.name().to_string()).collect();
                    ResultSet::with_columns(names, 0)
                });
                let mut values = Vec::with_capacity(row.len());
                for idx in 0..row.len() {
                    let value = row.try_get(idx)?;
                    values.push(value.map_or(SqlValue::Null, |v| SqlValue::Text(v.to_string())));
                }
                rs.add_row_values(values);
            }
            SimpleQueryMessage::RowDescription(columns) => {
                let names = columns.iter().map(|c| c.name().to_string()).collect();
                current = Some(ResultSet::with_columns(names, 0));
            }
            SimpleQueryMessage::CommandComplete(_) => {
                last = current.take().unwrap_or_default();
            }
            _ => {}
        }
    }

    Ok(last)
}

/// Build a result set using statement metadata for column names.
///
/// # Errors
/// Returns errors from row value extraction.
pub fn build_result_set_from_statement(
    stmt: &Statement,
    rows: &[tokio_postgres::Row],
) -> Result<ResultSet, PgStatsError> {
    let column_names: Vec<String> = stmt
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();
    let column_count = column_names.len();

    let mut result_set = ResultSet::with_columns(column_names, rows.len());
    for row in rows {
        let mut row_values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            row_values.push(postgres_extract_value(row, idx)?);
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}

/// Extracts a `SqlValue` from a `tokio_postgres` Row at the given index.
///
/// # Errors
/// Returns the driver error if the column cannot be decoded. Types without a
/// mapping here (e.g. `numeric`) must be cast in SQL.
pub fn postgres_extract_value(
    row: &tokio_postgres::Row,
    idx: usize,
) -> Result<SqlValue, PgStatsError> {
    let type_name = row.columns()[idx].type_().name();

    let value = match type_name {
        "int2" => row
            .try_get::<_, Option<i16>>(idx)?
            .map(|v| SqlValue::Int(i64::from(v))),
        "int4" => row
            .try_get::<_, Option<i32>>(idx)?
            .map(|v| SqlValue::Int(i64::from(v))),
        "int8" => row.try_get::<_, Option<i64>>(idx)?.map(SqlValue::Int),
        "oid" => row
            .try_get::<_, Option<u32>>(idx)?
            .map(|v| SqlValue::Int(i64::from(v))),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| SqlValue::Float(f64::from(v))),
        "float8" => row.try_get::<_, Option<f64>>(idx)?.map(SqlValue::Float),
        "bool" => row.try_get::<_, Option<bool>>(idx)?.map(SqlValue::Bool),
        "timestamp" => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(SqlValue::Timestamp),
        "timestamptz" => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)?
            .map(|v| SqlValue::Timestamp(v.naive_utc())),
        "json" | "jsonb" => row.try_get::<_, Option<Value>>(idx)?.map(SqlValue::Json),
        "bytea" => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(SqlValue::Blob),
        // text, varchar, bpchar, name, and anything else with a text representation
        _ => row.try_get::<_, Option<String>>(idx)?.map(SqlValue::Text),
    };

    Ok(value.unwrap_or(SqlValue::Null))
}
