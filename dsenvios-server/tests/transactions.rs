//! Transaction coordinator behaviour against the in-memory backend

use chrono::Utc;
use dsenvios_server::db::{
    MemoryBackend, Pool, PoolError, PoolOptions, QueryError, QueryErrorKind, QueryExecutor, Statement,
    TransactionCoordinator, TransactionError,
};
use serde_json::json;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn insert_doc(id: &str) -> Statement {
    Statement::new(
        "/* documents.insert */ INSERT INTO documents (collection, id, body, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $4) RETURNING id, body, created_at, updated_at",
    )
    .bind("pruebas")
    .bind(id)
    .bind(json!({ "id": id }))
    .bind(Utc::now())
}

fn delete_doc(id: &str) -> Statement {
    Statement::new("/* documents.delete */ DELETE FROM documents WHERE collection = $1 AND id = $2")
        .bind("pruebas")
        .bind(id)
}

fn setup() -> (MemoryBackend, Pool) {
    init_tracing();
    let backend = MemoryBackend::new();
    let pool = Pool::new(backend.clone(), PoolOptions::default().max_connections(2));
    (backend, pool)
}

#[tokio::test]
async fn second_of_three_failing_leaves_no_trace() {
    let (backend, pool) = setup();
    QueryExecutor::new(&pool).execute(&insert_doc("b")).await.unwrap();

    let err = TransactionCoordinator::new(&pool)
        .run(&[insert_doc("a"), insert_doc("b"), insert_doc("c")])
        .await
        .unwrap_err();

    assert_eq!(err.failed_index(), Some(1));
    assert_eq!(
        err.query_error().map(|e| e.kind),
        Some(QueryErrorKind::ConstraintViolation)
    );
    assert_eq!(backend.row_count("documents"), 1);
    assert_eq!(pool.status().leased, 0);
}

#[tokio::test]
async fn results_come_back_in_order() {
    let (backend, pool) = setup();
    let results = TransactionCoordinator::new(&pool)
        .run(&[insert_doc("a"), insert_doc("b"), delete_doc("a")])
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].first().unwrap().get::<String>("id").unwrap(), "a");
    assert_eq!(results[2].rows_affected, 1);
    assert_eq!(backend.row_count("documents"), 1);
}

#[tokio::test]
async fn empty_transaction_never_leases() {
    let (backend, pool) = setup();
    let results = TransactionCoordinator::new(&pool).run(&[]).await.unwrap();
    assert!(results.is_empty());
    assert_eq!(backend.connections_opened(), 0);
}

#[tokio::test]
async fn row_count_guard_rolls_back() {
    let (backend, pool) = setup();
    let err = TransactionCoordinator::new(&pool)
        .run(&[insert_doc("a"), delete_doc("missing").expect_rows(1)])
        .await
        .unwrap_err();

    assert_eq!(
        err,
        TransactionError::Guard {
            failed_index: 1,
            expected: 1,
            actual: 0
        }
    );
    assert_eq!(backend.row_count("documents"), 0);
}

#[tokio::test]
async fn commit_failure_discards_connection() {
    let (backend, pool) = setup();
    backend.fail_next_commit();

    let err = TransactionCoordinator::new(&pool)
        .run(&[insert_doc("a")])
        .await
        .unwrap_err();

    assert!(matches!(err, TransactionError::Commit(_)));
    assert_eq!(backend.row_count("documents"), 0);
    assert_eq!(pool.connections_discarded(), 1);
    assert_eq!(pool.status().leased, 0);
}

#[tokio::test]
async fn lost_connection_mid_transaction_is_reported() {
    let (backend, pool) = setup();
    backend.inject_fault("documents.delete", QueryError::connection_lost("reset"));

    let err = TransactionCoordinator::new(&pool)
        .run(&[insert_doc("a"), delete_doc("a")])
        .await
        .unwrap_err();

    assert_eq!(err.failed_index(), Some(1));
    assert!(err.query_error().is_some_and(QueryError::is_retryable));
    assert_eq!(backend.row_count("documents"), 0);
    assert_eq!(pool.connections_discarded(), 1);
}

#[tokio::test]
async fn uncommitted_writes_are_invisible_to_readers() {
    let (backend, pool) = setup();
    backend.set_latency(Some(std::time::Duration::from_millis(50)));

    let count = Statement::new(
        "/* documents.count */ SELECT COUNT(*) AS total FROM documents WHERE collection = $1",
    )
    .bind("pruebas");

    let statements = [insert_doc("a"), insert_doc("b")];
    let coordinator = TransactionCoordinator::new(&pool);
    let exec = QueryExecutor::new(&pool);
    let (txn, seen) = tokio::join!(
        coordinator.run(&statements),
        async {
            // Reads while the transaction is between its two inserts.
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            exec.fetch_optional(&count).await
        }
    );

    txn.unwrap();
    let seen: i64 = seen.unwrap().unwrap().get("total").unwrap();
    assert_eq!(seen, 0);
    assert_eq!(backend.row_count("documents"), 2);
}

#[tokio::test]
async fn closed_pool_rejects_transactions() {
    let (_, pool) = setup();
    pool.close().await;

    let err = TransactionCoordinator::new(&pool)
        .run(&[insert_doc("a")])
        .await
        .unwrap_err();
    assert_eq!(err, TransactionError::Pool(PoolError::Closed));
}

#[tokio::test]
async fn cancelled_transaction_rolls_back_and_frees_its_connection() {
    init_tracing();
    let backend = MemoryBackend::new();
    let pool = Pool::new(backend.clone(), PoolOptions::default().max_connections(1));
    backend.set_latency(Some(std::time::Duration::from_millis(50)));

    // Times out after the first insert, before the second one finishes.
    let statements = [insert_doc("a"), insert_doc("b")];
    let cancelled = tokio::time::timeout(
        std::time::Duration::from_millis(70),
        TransactionCoordinator::new(&pool).run(&statements),
    )
    .await;
    assert!(cancelled.is_err());
    assert_eq!(pool.status().leased, 0);
    assert_eq!(pool.connections_discarded(), 1);
    assert_eq!(backend.row_count("documents"), 0);

    // The single slot and the store's write lock are both free again.
    backend.set_latency(None);
    TransactionCoordinator::new(&pool)
        .run(&[insert_doc("c")])
        .await
        .unwrap();
    assert_eq!(backend.row_count("documents"), 1);
    assert_eq!(pool.status().leased, 0);
}
