//! Generic document store behind `/collection/{name}`
//!
//! Untyped JSON bodies keyed by `(collection, id)` in a single table. This is
//! the admin panel's escape hatch and never touches the shipment tables.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::db::{DbError, Pool, QueryError, QueryExecutor, Row, Statement};
use crate::models::{CollectionName, Paginated, Pagination};

const COLUMNS: &str = "id, body, created_at, updated_at";

/// Stored document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: String,
    pub body: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    fn from_row(row: &Row) -> Result<Self, QueryError> {
        Ok(Self {
            id: row.get("id")?,
            body: row.get("body")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Document repository
pub struct DocumentRepo<'a> {
    pool: &'a Pool,
}

impl<'a> DocumentRepo<'a> {
    pub fn new(pool: &'a Pool) -> Self {
        Self { pool }
    }

    fn executor(&self) -> QueryExecutor<'a> {
        QueryExecutor::new(self.pool)
    }

    /// List a collection, newest first.
    pub async fn list(&self, collection: &CollectionName, page: Pagination) -> Result<Paginated<Document>, DbError> {
        let count = Statement::new(
            "/* documents.count */ SELECT COUNT(*) AS total FROM documents WHERE collection = $1",
        )
        .bind(collection.as_str());
        let total: i64 = self
            .executor()
            .fetch_optional(&count)
            .await?
            .ok_or_else(|| QueryError::other("count returned no rows"))?
            .get("total")?;

        let stmt = Statement::new(format!(
            "/* documents.list */ SELECT {} FROM documents WHERE collection = $1 \
             ORDER BY created_at DESC, id ASC LIMIT $2 OFFSET $3",
            COLUMNS
        ))
        .bind(collection.as_str())
        .bind(page.limit)
        .bind(page.offset());

        let rows = self.executor().fetch_all(&stmt).await?;
        let data = rows
            .iter()
            .map(Document::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Paginated::new(data, total, page))
    }

    pub async fn get(&self, collection: &CollectionName, id: &str) -> Result<Option<Document>, DbError> {
        let stmt = Statement::new(format!(
            "/* documents.get */ SELECT {} FROM documents WHERE collection = $1 AND id = $2",
            COLUMNS
        ))
        .bind(collection.as_str())
        .bind(id);

        match self.executor().fetch_optional(&stmt).await? {
            Some(row) => Ok(Some(Document::from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Insert a new document. An existing id is a constraint violation.
    pub async fn create(&self, collection: &CollectionName, id: &str, body: Value) -> Result<Document, DbError> {
        let stmt = Statement::new(format!(
            "/* documents.insert */ INSERT INTO documents (collection, id, body, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $4) RETURNING {}",
            COLUMNS
        ))
        .bind(collection.as_str())
        .bind(id)
        .bind(body)
        .bind(Utc::now());

        let row = self
            .executor()
            .fetch_optional(&stmt)
            .await?
            .ok_or_else(|| QueryError::other("insert returned no rows"))?;
        Ok(Document::from_row(&row)?)
    }

    /// Replace the body of an existing document.
    pub async fn replace(&self, collection: &CollectionName, id: &str, body: Value) -> Result<Option<Document>, DbError> {
        let stmt = Statement::new(format!(
            "/* documents.replace */ UPDATE documents SET body = $3, updated_at = $4 \
             WHERE collection = $1 AND id = $2 RETURNING {}",
            COLUMNS
        ))
        .bind(collection.as_str())
        .bind(id)
        .bind(body)
        .bind(Utc::now());

        match self.executor().fetch_optional(&stmt).await? {
            Some(row) => Ok(Some(Document::from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Delete a document, returning whether it existed.
    pub async fn delete(&self, collection: &CollectionName, id: &str) -> Result<bool, DbError> {
        let stmt = Statement::new(
            "/* documents.delete */ DELETE FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection.as_str())
        .bind(id);

        Ok(self.executor().execute(&stmt).await?.rows_affected > 0)
    }
}
