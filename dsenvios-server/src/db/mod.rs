//! Database layer - pool, execution, transactions and repositories
//!
//! # Design Principles
//!
//! - One pool per process, bounded; every lease is returned on every path
//! - Multi-statement writes go through the transaction coordinator only
//! - Rely on DB constraints and guarded updates, never check-then-insert
//! - Backends sit behind the `Connector` seam (Postgres, in-memory)

pub mod connection;
pub mod error;
pub mod executor;
pub mod memory;
pub mod migrations;
pub mod pool;
pub mod postgres;
pub mod repos;
pub mod statement;
pub mod transaction;
pub mod value;

pub use connection::{Connection, Connector};
pub use error::{DbError, PoolError, QueryError, QueryErrorKind, TransactionError};
pub use executor::QueryExecutor;
pub use memory::MemoryBackend;
pub use pool::{Pool, PoolConnection, PoolOptions, PoolStatus};
pub use postgres::PgConnector;
pub use statement::Statement;
pub use transaction::TransactionCoordinator;
pub use value::{FromSql, QueryResult, Row, SqlType, SqlValue, ToSql};
