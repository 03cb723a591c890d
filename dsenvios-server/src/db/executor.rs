//! Single-statement execution
//!
//! Each call leases a connection, runs exactly one statement, and gives the
//! connection back on every exit path. No retries happen here: whether a
//! statement is safe to repeat is the caller's decision.

use tracing::debug;

use super::error::DbError;
use super::pool::Pool;
use super::statement::Statement;
use super::value::{QueryResult, Row};

pub struct QueryExecutor<'a> {
    pool: &'a Pool,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(pool: &'a Pool) -> Self {
        Self { pool }
    }

    pub async fn execute(&self, statement: &Statement) -> Result<QueryResult, DbError> {
        let mut conn = self.pool.acquire().await?;
        let result = conn.execute(statement).await;
        conn.release();

        match &result {
            Ok(done) => debug!(
                tag = statement.tag().unwrap_or("-"),
                rows = done.rows_affected,
                "statement executed"
            ),
            Err(err) => debug!(
                tag = statement.tag().unwrap_or("-"),
                error = %err,
                "statement failed"
            ),
        }
        Ok(result?)
    }

    pub async fn fetch_all(&self, statement: &Statement) -> Result<Vec<Row>, DbError> {
        Ok(self.execute(statement).await?.rows)
    }

    pub async fn fetch_optional(&self, statement: &Statement) -> Result<Option<Row>, DbError> {
        Ok(self.execute(statement).await?.into_first())
    }
}
