//! Backend seam: one physical connection, and the factory that opens them.

use async_trait::async_trait;

use super::error::QueryError;
use super::statement::Statement;
use super::value::QueryResult;

/// A single backend session. Statements run strictly in call order.
#[async_trait]
pub trait Connection: Send {
    async fn execute(&mut self, statement: &Statement) -> Result<QueryResult, QueryError>;

    async fn begin(&mut self) -> Result<(), QueryError>;

    async fn commit(&mut self) -> Result<(), QueryError>;

    async fn rollback(&mut self) -> Result<(), QueryError>;

    /// Cheap liveness probe used before reusing a long-idle connection.
    async fn ping(&mut self) -> bool;

    async fn close(self: Box<Self>);
}

/// Opens new connections on demand for the pool.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Box<dyn Connection>, QueryError>;
}
