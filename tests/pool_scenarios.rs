//! Integration tests for the numbered end-to-end scenarios and boundary
//! behaviors. Driven entirely against [`FakeConnection`], never a real
//! database.

use std::time::Duration;

use postgres_pool::testing::{ConnectOutcome, FakeConfig, FakeConnection, FakeRows, FakeValue, QueryOutcome};
use postgres_pool::{PgPoolOptions, PoolError, Values};

fn options(config: &FakeConfig) -> PgPoolOptions<FakeConnection> {
    PgPoolOptions::new(config.clone())
}

#[tokio::test]
async fn scenario_named_parameter_substitution_end_to_end() {
    let config = FakeConfig::new();
    config.push_connect(ConnectOutcome::Ok);
    config.push_query(QueryOutcome::Ok(FakeRows {
        rows: vec![FakeValue::Text("lorem".into())],
        row_count: 1,
    }));

    let pool = options(&config).build();
    let result = pool
        .query(
            "select foo from foobar where id=@id and (bar=@foobar or bar=@foo) and foo=@foo",
            Values::named([
                ("id", FakeValue::from("lorem")),
                ("foo", FakeValue::from("lorem - foo")),
                ("foobar", FakeValue::from("lorem - foobar")),
                ("unused", FakeValue::from("lorem - unused")),
            ]),
        )
        .await
        .unwrap();

    assert_eq!(result.row_count, 1);
    assert_eq!(config.query_calls(), 1);
}

#[tokio::test]
async fn scenario_missing_named_parameter_never_touches_the_pool() {
    let config = FakeConfig::new();
    let pool = options(&config).build();

    let err = pool
        .query(
            "select * from foobar where id=@id",
            Values::named([("unused", FakeValue::from("x"))]),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), "ERR_PG_QUERY_MISSING_QUERY_PARAMETER");
    assert_eq!(err.to_string(), "Missing query parameter(s): id");
    assert_eq!(config.connect_attempts(), 0);
    assert_eq!(config.query_calls(), 0);
    assert_eq!(pool.total_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scenario_pool_size_cap_under_concurrency() {
    let config = FakeConfig::new();
    for _ in 0..2 {
        config.push_connect(ConnectOutcome::Ok);
    }
    for _ in 0..6 {
        config.push_query(QueryOutcome::Ok(FakeRows::default()));
    }

    let pool = options(&config)
        .pool_size(2)
        .idle_timeout(Duration::from_secs(5))
        .build();

    let mut handles = Vec::new();
    for _ in 0..6 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            pool.query("select 1", Values::<FakeValue>::None).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(config.connect_attempts(), 2);
    assert_eq!(pool.total_count(), 2);
    assert_eq!(pool.idle_count(), 2);
    assert_eq!(pool.waiting_count(), 0);
}

#[tokio::test]
async fn scenario_read_only_transaction_failover() {
    let config = FakeConfig::new();
    config.push_connect(ConnectOutcome::Ok);
    config.push_connect(ConnectOutcome::Ok);
    config.push_query(QueryOutcome::Err(postgres_pool::DriverError::new(
        "cannot execute CREATE in a read-only transaction",
    )));
    config.push_query(QueryOutcome::Ok(FakeRows {
        rows: vec![FakeValue::Int(42)],
        row_count: 1,
    }));

    let pool = options(&config)
        .wait_for_reconnect_read_only_transaction(Duration::from_millis(5))
        .build();

    let result = pool.query("select 1", Values::<FakeValue>::None).await.unwrap();
    assert_eq!(result.row_count, 1);
    assert_eq!(config.connect_attempts(), 2);
    assert_eq!(config.query_calls(), 2);
    // The first (read-only-rejected) connection was removed, the second
    // released normally back to idle.
    assert_eq!(pool.total_count(), 1);
    assert_eq!(pool.idle_count(), 1);
}

#[tokio::test]
async fn scenario_database_starting_up_loop() {
    let config = FakeConfig::new();
    config.push_connect(ConnectOutcome::Err(postgres_pool::DriverError::new(
        "the database system is starting up",
    )));
    config.push_connect(ConnectOutcome::Ok);
    config.push_query(QueryOutcome::Ok(FakeRows::default()));

    let pool = options(&config)
        .wait_for_database_startup(Duration::from_millis(5))
        .build();

    pool.query("select 1", Values::<FakeValue>::None).await.unwrap();
    // Draining the still-idle, successfully-connected session makes the
    // failed attempt's `end()` call observable on its own: one `end()` for
    // the rejected connect, one for the healthy connection's eventual close.
    pool.end().await;

    assert_eq!(config.connect_attempts(), 2);
    assert_eq!(config.close_calls(), 2);
    assert_eq!(config.query_calls(), 1);
}

#[tokio::test]
async fn scenario_connect_retry_on_transient_error() {
    let config = FakeConfig::new();
    config.push_connect(ConnectOutcome::Err(postgres_pool::DriverError::new(
        "timeout expired",
    )));
    config.push_connect(ConnectOutcome::Ok);

    let pool = options(&config)
        .retry_connection_wait(Duration::from_millis(1))
        .build();

    let conn = pool.acquire().await.unwrap();
    drop(conn);

    assert_eq!(config.connect_attempts(), 2);
    assert_eq!(pool.total_count(), 1);
}

#[tokio::test]
async fn boundary_connect_timeout_decrements_total_count() {
    let config = FakeConfig::new();
    config.push_connect(ConnectOutcome::Hang);

    let pool = options(&config)
        .connect_timeout(Duration::from_millis(1))
        .build();

    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, PoolError::ConnectTimeout));
    assert_eq!(pool.total_count(), 0);
}

#[tokio::test]
async fn boundary_zero_idle_timeout_removes_on_release() {
    let config = FakeConfig::new();
    config.push_connect(ConnectOutcome::Ok);

    let pool = options(&config).idle_timeout(Duration::from_millis(0)).build();

    let mut conn = pool.acquire().await.unwrap();
    conn.release().await;

    assert_eq!(pool.idle_count(), 0);
    assert_eq!(pool.total_count(), 0);
    assert_eq!(config.close_calls(), 1);
}

#[tokio::test]
async fn boundary_release_then_acquire_reuses_same_connection() {
    let config = FakeConfig::new();
    config.push_connect(ConnectOutcome::Ok);

    let pool = options(&config)
        .idle_timeout(Duration::from_millis(5_000))
        .build();

    let mut conn = pool.acquire().await.unwrap();
    let id = conn.id();
    conn.release().await;

    let conn2 = pool.acquire().await.unwrap();
    assert_eq!(conn2.id(), id);
    assert_eq!(config.connect_attempts(), 1);
}

#[tokio::test]
async fn boundary_queued_acquire_times_out_and_is_removed_by_id() {
    let config = FakeConfig::new();
    config.push_connect(ConnectOutcome::Ok);

    let pool = options(&config)
        .pool_size(1)
        .acquire_timeout(Duration::from_millis(5))
        .build();

    let held = pool.acquire().await.unwrap();
    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, PoolError::AcquireTimeout));
    assert_eq!(pool.waiting_count(), 0);

    drop(held);
}

#[tokio::test]
async fn ending_pool_rejects_new_acquires() {
    let config = FakeConfig::new();
    config.push_connect(ConnectOutcome::Ok);

    let pool = options(&config).build();
    let mut conn = pool.acquire().await.unwrap();
    conn.release().await;

    pool.end().await;

    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, PoolError::Ended));
    assert_eq!(pool.idle_count(), 0);
}
