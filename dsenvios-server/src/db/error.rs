//! Database error taxonomy
//!
//! Backend failures are collapsed into [`QueryErrorKind`] so callers can make
//! retry decisions without knowing which backend produced them.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    ConstraintViolation,
    Timeout,
    ConnectionLost,
    Other,
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ConstraintViolation => "constraint violation",
            Self::Timeout => "timeout",
            Self::ConnectionLost => "connection lost",
            Self::Other => "query failed",
        };
        f.write_str(s)
    }
}

/// One statement failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub message: String,
}

impl QueryError {
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::ConstraintViolation, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Timeout, message)
    }

    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::ConnectionLost, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Other, message)
    }

    /// Infrastructure hiccups worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            QueryErrorKind::Timeout | QueryErrorKind::ConnectionLost
        )
    }

    /// The connection that produced this error should not be reused.
    pub(crate) fn poisons_connection(&self) -> bool {
        self.is_retryable()
    }
}

/// Lease request failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("connection pool exhausted after waiting {waited:?}")]
    Exhausted { waited: Duration },

    #[error("connection pool is closed")]
    Closed,

    #[error("failed to open connection: {0}")]
    Connect(QueryError),
}

/// Single-statement failure: either no connection, or the statement itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DbError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Query(#[from] QueryError),
}

impl DbError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Pool(PoolError::Exhausted { .. }) => true,
            Self::Pool(PoolError::Connect(e)) | Self::Query(e) => e.is_retryable(),
            Self::Pool(PoolError::Closed) => false,
        }
    }
}

/// A transaction was rolled back (or never started). No partial effects
/// are visible in any variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("failed to begin transaction: {0}")]
    Begin(QueryError),

    #[error("statement {failed_index} failed: {cause}")]
    Statement {
        failed_index: usize,
        cause: QueryError,
    },

    #[error("statement {failed_index} affected {actual} rows, expected {expected}")]
    Guard {
        failed_index: usize,
        expected: u64,
        actual: u64,
    },

    #[error("commit failed: {0}")]
    Commit(QueryError),
}

impl TransactionError {
    pub fn failed_index(&self) -> Option<usize> {
        match self {
            Self::Statement { failed_index, .. } | Self::Guard { failed_index, .. } => {
                Some(*failed_index)
            }
            _ => None,
        }
    }

    /// Underlying statement error, if any.
    pub fn query_error(&self) -> Option<&QueryError> {
        match self {
            Self::Begin(e) | Self::Commit(e) | Self::Statement { cause: e, .. } => Some(e),
            Self::Pool(PoolError::Connect(e)) => Some(e),
            _ => None,
        }
    }
}

impl From<TransactionError> for DbError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::Pool(e) => Self::Pool(e),
            TransactionError::Begin(e) | TransactionError::Commit(e) => Self::Query(e),
            TransactionError::Statement { cause, .. } => Self::Query(cause),
            guard @ TransactionError::Guard { .. } => Self::Query(QueryError::other(guard.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(QueryError::timeout("slow").is_retryable());
        assert!(QueryError::connection_lost("reset").is_retryable());
        assert!(!QueryError::constraint("dup").is_retryable());
        assert!(DbError::from(PoolError::Exhausted { waited: Duration::from_secs(1) }).is_retryable());
        assert!(!DbError::from(PoolError::Closed).is_retryable());
    }

    #[test]
    fn display() {
        let err = TransactionError::Statement {
            failed_index: 1,
            cause: QueryError::constraint("duplicate key"),
        };
        assert_eq!(err.to_string(), "statement 1 failed: constraint violation: duplicate key");
        assert_eq!(err.failed_index(), Some(1));
    }
}
