#![cfg(feature = "test-utils-postgres")]

use deadpool_postgres::Runtime;
use pg_stats::prelude::*;
use pg_stats::test_utils::postgres::{
    EmbeddedPostgres, setup_postgres_embedded, stop_postgres_embedded,
};
use tokio_postgres::NoTls;

#[test]
fn test03_embedded_postgres() -> Result<(), Box<dyn std::error::Error>> {
    let pg = setup_postgres_embedded("stats_test")?;
    let outcome = run_against(&pg);
    stop_postgres_embedded(pg);
    outcome
}

fn run_against(pg: &EmbeddedPostgres) -> Result<(), Box<dyn std::error::Error>> {
    let source = ConnectionSource::Params(pg.params.clone());
    Stats::check_source(&source)?;

    adapter_round_trips(&source)?;
    client_errors_keep_transaction(&source)?;
    builtin_queries(&source)?;
    pooled_session(pg)?;
    adopted_pool_object(pg)?;
    Ok(())
}

fn adapter_round_trips(source: &ConnectionSource) -> Result<(), Box<dyn std::error::Error>> {
    let mut adapter = ConnectionAdapter::establish(source)?;
    assert_eq!(adapter.provenance(), Provenance::Owned);
    assert!(adapter.alive()?);

    adapter.execute(
        "CREATE TABLE accounts (id BIGINT PRIMARY KEY, owner TEXT NOT NULL)",
        &[],
    )?;
    adapter.execute(
        "INSERT INTO accounts SELECT g, 'owner' || g FROM generate_series(1, 100) g",
        &[],
    )?;

    // Typed binding and decoding
    let rs = adapter.execute(
        "SELECT id, owner FROM accounts WHERE id = $1",
        &[SqlValue::Int(42)],
    )?;
    assert_eq!(rs.results[0].get("id"), Some(&SqlValue::Int(42)));
    assert_eq!(
        rs.results[0].get("owner").and_then(SqlValue::as_text),
        Some("owner42")
    );

    // No parameters: simple protocol, text values
    let rs = adapter.execute("SELECT count(*) AS n FROM accounts", &[])?;
    assert_eq!(rs.results[0].get("n").and_then(SqlValue::as_int), Some(100));

    // Zero rows over the simple protocol still name the columns
    let rs = adapter.execute("SELECT id, owner FROM accounts WHERE false", &[])?;
    assert!(rs.is_empty());
    assert_eq!(
        rs.get_column_names().map(|c| c.as_slice()),
        Some(&["id".to_string(), "owner".to_string()][..])
    );

    // A failure inside a transaction is rolled back before the error comes back.
    adapter.execute("BEGIN", &[])?;
    let err = adapter
        .execute("SELECT * FROM no_such_table", &[])
        .unwrap_err();
    assert!(err.is_database_error());
    let rs = adapter.execute("SELECT 1 AS one", &[])?;
    assert_eq!(rs.results[0].get("one").and_then(SqlValue::as_int), Some(1));

    let info = adapter.info()?.clone();
    assert_eq!(info.db_name, "stats_test");
    assert!(info.server_version.split('.').all(|p| p.parse::<u32>().is_ok()));
    assert_eq!(info.client_version, "unknown");

    adapter.disconnect()?;
    assert!(matches!(
        adapter.execute("SELECT 1", &[]),
        Err(PgStatsError::Disconnected)
    ));
    Ok(())
}

fn client_errors_keep_transaction(
    source: &ConnectionSource,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut adapter = ConnectionAdapter::establish(source)?;
    adapter.execute("BEGIN", &[])?;
    adapter.execute("INSERT INTO accounts VALUES (1001, 'pending')", &[])?;

    // Does not fit int4: rejected while binding, before anything reaches the server.
    let err = adapter
        .execute("SELECT $1::int4 AS x", &[SqlValue::Int(i64::MAX)])
        .unwrap_err();
    assert!(!err.is_database_error(), "{err}");

    // numeric has no typed mapping, so decoding the row fails on the client.
    let err = adapter
        .execute("SELECT 1.5::numeric AS n WHERE $1::int4 = 1", &[SqlValue::Int(1)])
        .unwrap_err();
    assert!(!err.is_database_error(), "{err}");

    // Neither failure rolled the open transaction back.
    let rs = adapter.execute(
        "SELECT owner FROM accounts WHERE id = $1",
        &[SqlValue::Int(1001)],
    )?;
    assert_eq!(rs.results[0].get("owner").and_then(SqlValue::as_text), Some("pending"));

    adapter.execute("ROLLBACK", &[])?;
    let rs = adapter.execute("SELECT count(*) AS n FROM accounts WHERE id = 1001", &[])?;
    assert_eq!(rs.results[0].get("n").and_then(SqlValue::as_int), Some(0));

    adapter.disconnect()?;
    Ok(())
}

fn builtin_queries(source: &ConnectionSource) -> Result<(), Box<dyn std::error::Error>> {
    let mut stats = Stats::establish(source, QueryCatalog::builtin())?;
    assert_eq!(stats.db_name()?, "stats_test");

    let rs = stats.get("table_size", &["accounts".into()])?;
    assert_eq!(rs.results[0].get("name").and_then(SqlValue::as_text), Some("accounts"));
    assert!(rs.results[0].get("bytes").and_then(SqlValue::as_int).unwrap_or(0) > 0);

    let rs = stats.get("table_sizes", &["10".into()])?;
    assert!(rs
        .results
        .iter()
        .any(|row| row.get("name").and_then(SqlValue::as_text) == Some("accounts")));

    let rs = stats.get("cache_hit_ratio", &[])?;
    assert_eq!(rs.len(), 2);

    let rs = stats.get("connection_count", &[])?;
    assert!(rs.results[0].get("connections").and_then(SqlValue::as_int).unwrap_or(0) >= 1);

    // Every builtin query must at least run on a stock server.
    for name in stats.query_names() {
        let args: Vec<SqlValue> = if name == "table_size" {
            vec!["accounts".into()]
        } else {
            Vec::new()
        };
        stats
            .get(name, &args)
            .map_err(|e| format!("{name} failed: {e}"))?;
    }

    assert!(matches!(
        stats.get("table_size", &["no_such_table".into()]),
        Err(e) if e.is_database_error()
    ));
    assert!(stats.get("database_size", &[])?.len() == 1);

    stats.close()?;
    Ok(())
}

fn pooled_session(pg: &EmbeddedPostgres) -> Result<(), Box<dyn std::error::Error>> {
    let pool = pg
        .params
        .to_pool_config()
        .create_pool(Some(Runtime::Tokio1), NoTls)?;

    let mut stats = Stats::establish(
        &ConnectionSource::Pooled(pool.clone()),
        QueryCatalog::builtin(),
    )?;
    let rs = stats.get("database_size", &[])?;
    assert_eq!(rs.results[0].get("name").and_then(SqlValue::as_text), Some("stats_test"));
    stats.close()?;

    // Released, not closed: the session is back in the pool.
    let status = pool.status();
    assert_eq!(status.size, 1);
    assert_eq!(status.available, 1);
    Ok(())
}

fn adopted_pool_object(pg: &EmbeddedPostgres) -> Result<(), Box<dyn std::error::Error>> {
    // Runs the pool's connection tasks for the objects checked out below.
    let rt = tokio::runtime::Runtime::new()?;
    let pool = pg
        .params
        .to_pool_config()
        .create_pool(Some(Runtime::Tokio1), NoTls)?;

    let object = rt.block_on(pool.get())?;
    let mut adapter = ConnectionAdapter::from_pooled(object)?;
    assert_eq!(adapter.provenance(), Provenance::Borrowed);
    let rs = adapter.execute("SELECT count(*) AS n FROM accounts", &[])?;
    assert_eq!(rs.results[0].get("n").and_then(SqlValue::as_int), Some(100));
    adapter.disconnect()?;

    let status = pool.status();
    assert_eq!(status.size, 1);
    assert_eq!(status.available, 1);

    // Closing a pooled handle detaches it instead of returning it.
    let handle: Box<dyn PgHandle> = Box::new(PooledConnection::checkout(&pool)?);
    assert_eq!(pool.status().available, 0);
    handle.close()?;
    let status = pool.status();
    assert_eq!(status.size, 0);
    assert_eq!(status.available, 0);
    Ok(())
}
