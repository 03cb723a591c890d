//! Atomic multi-statement execution
//!
//! `run` executes an ordered list of statements on one leased connection
//! between BEGIN and COMMIT. The first failure stops the run and rolls back,
//! so callers observe either every effect or none. Isolation comes from the
//! backend (read committed or stronger); nothing here adds to it.

use tracing::{debug, warn};

use super::error::TransactionError;
use super::pool::{Pool, PoolConnection};
use super::statement::Statement;
use super::value::QueryResult;

pub struct TransactionCoordinator<'a> {
    pool: &'a Pool,
}

impl<'a> TransactionCoordinator<'a> {
    pub fn new(pool: &'a Pool) -> Self {
        Self { pool }
    }

    /// Run `statements` atomically, returning one result per statement.
    ///
    /// An empty list succeeds without touching the pool. A statement built
    /// with [`Statement::expect_rows`] that affects a different number of
    /// rows fails the transaction with [`TransactionError::Guard`].
    pub async fn run(&self, statements: &[Statement]) -> Result<Vec<QueryResult>, TransactionError> {
        if statements.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.pool.acquire().await?;
        conn.begin().await.map_err(TransactionError::Begin)?;

        let mut results = Vec::with_capacity(statements.len());
        for (index, statement) in statements.iter().enumerate() {
            let outcome = match conn.execute(statement).await {
                Ok(result) => match statement.expected_rows() {
                    Some(expected) if result.rows_affected != expected => Err(TransactionError::Guard {
                        failed_index: index,
                        expected,
                        actual: result.rows_affected,
                    }),
                    _ => Ok(result),
                },
                Err(cause) => Err(TransactionError::Statement {
                    failed_index: index,
                    cause,
                }),
            };

            match outcome {
                Ok(result) => results.push(result),
                Err(err) => {
                    abort(&mut conn, &err).await;
                    return Err(err);
                }
            }
        }

        if let Err(err) = conn.commit().await {
            warn!(error = %err, "commit failed, discarding connection");
            return Err(TransactionError::Commit(err));
        }

        debug!(statements = statements.len(), "transaction committed");
        Ok(results)
    }
}

/// Roll back after a failed statement. A failed rollback leaves the
/// connection marked broken so the pool closes it instead of reusing it.
async fn abort(conn: &mut PoolConnection, cause: &TransactionError) {
    warn!(
        failed_index = cause.failed_index(),
        error = %cause,
        "rolling back transaction"
    );
    if let Err(err) = conn.rollback().await {
        warn!(error = %err, "rollback failed, discarding connection");
        conn.mark_broken();
    }
}
