//! dsenvios-server: persistence and consistency layer for DsEnvios
//!
//! Bounded connection pool, single-statement executor and transaction
//! coordinator over pluggable backends (Postgres, in-memory), the shipment
//! status engine and tracking projector built on them, and the HTTP API
//! the front end talks to.

pub mod db;
pub mod engine;
pub mod http;
pub mod models;
pub mod projector;

pub use db::{migrations, MemoryBackend, PgConnector, Pool, PoolOptions};
pub use engine::{CreateError, StatusEngine, TransitionError};
pub use http::{run_server, ServerConfig, ServerError};
pub use projector::{ProjectError, Projection, TrackingProjector};
