use pg_stats::prelude::*;
use pg_stats::test_utils::fake::{ABORTED_MESSAGE, Call, FakeHandle};

#[test]
fn test01_reset_then_propagate() -> Result<(), Box<dyn std::error::Error>> {
    let fake = FakeHandle::new().failing_on("SELECT * FROM missing_table");
    let log = fake.log();
    let mut adapter = ConnectionAdapter::from_handle(Box::new(fake))?;

    let err = adapter
        .execute("SELECT * FROM missing_table", &[])
        .unwrap_err();
    // The caller sees the statement's own error, not the aborted-session one.
    assert!(err.is_database_error());
    assert!(!err.to_string().contains(ABORTED_MESSAGE));

    // Without the reset the fake would reject this with ABORTED_MESSAGE.
    adapter.execute("SELECT 1", &[])?;

    assert_eq!(
        log.calls(),
        vec![
            Call::exec("SELECT * FROM missing_table", None),
            Call::Reset,
            Call::exec("SELECT 1", None),
        ]
    );
    Ok(())
}

#[test]
fn test01_every_failure_resets_once() -> Result<(), Box<dyn std::error::Error>> {
    let fake = FakeHandle::new().failing_on("SELECT broken");
    let log = fake.log();
    let mut adapter = ConnectionAdapter::from_handle(Box::new(fake))?;

    for _ in 0..3 {
        assert!(adapter.execute("SELECT broken", &[]).is_err());
    }
    assert_eq!(log.count(&Call::Reset), 3);
    Ok(())
}

#[test]
fn test01_empty_params_normalized() -> Result<(), Box<dyn std::error::Error>> {
    let fake = FakeHandle::new();
    let log = fake.log();
    let mut adapter = ConnectionAdapter::from_handle(Box::new(fake))?;

    let no_params: Vec<SqlValue> = Vec::new();
    adapter.execute("SELECT now()", &[])?;
    adapter.execute("SELECT now()", &no_params)?;

    assert_eq!(
        log.calls(),
        vec![
            Call::exec("SELECT now()", None),
            Call::exec("SELECT now()", None),
        ]
    );
    Ok(())
}

#[test]
fn test01_borrowed_session_is_released() -> Result<(), Box<dyn std::error::Error>> {
    let fake = FakeHandle::new();
    let log = fake.log();
    let mut adapter = ConnectionAdapter::from_handle(Box::new(fake))?;
    assert_eq!(adapter.provenance(), Provenance::Borrowed);

    adapter.execute("SELECT 1", &[])?;
    adapter.disconnect()?;

    assert_eq!(log.count(&Call::Release), 1);
    assert_eq!(log.count(&Call::Close), 0);
    assert!(matches!(
        adapter.disconnect(),
        Err(PgStatsError::Disconnected)
    ));
    Ok(())
}

#[test]
fn test01_alive_false_when_server_gone() -> Result<(), Box<dyn std::error::Error>> {
    let mut adapter = ConnectionAdapter::from_handle(Box::new(FakeHandle::new().unreachable()))?;
    assert!(!adapter.alive()?);

    let mut adapter = ConnectionAdapter::from_handle(Box::new(FakeHandle::new()))?;
    assert!(adapter.alive()?);
    Ok(())
}

#[test]
fn test01_closed_handle_rejected() {
    let result = ConnectionAdapter::from_handle(Box::new(FakeHandle::new().closed()));
    assert!(matches!(result, Err(PgStatsError::InvalidConnection(_))));
}

#[test]
fn test01_info_formats_versions() -> Result<(), Box<dyn std::error::Error>> {
    let fake = FakeHandle::new()
        .with_db_name("inventory")
        .with_server_version(90_624);
    let mut adapter = ConnectionAdapter::from_handle(Box::new(fake))?;

    let info = adapter.info()?;
    assert_eq!(info.db_name, "inventory");
    assert_eq!(info.server_version, "9.6.24");
    assert_eq!(info.client_version, "unknown");
    assert_eq!(format_version(100_000), "10");
    Ok(())
}
