//! API error types with IntoResponse
//!
//! Errors are converted to JSON responses with appropriate status codes:
//! `{"success": false, "error": <code>, "message": <text>}`. Infrastructure
//! failures are logged and answered with a generic message.

use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use dsenvios_core::{ShipmentStatus, TrackingNumber, ValidationError};
use serde_json::{json, Value};

use crate::db::{DbError, PoolError, QueryErrorKind, TransactionError};
use crate::engine::{CreateError, TransitionError};
use crate::projector::ProjectError;

/// API error type with automatic HTTP status mapping
#[derive(Debug)]
pub enum ApiError {
    /// Validation failed (400)
    Validation(ValidationError),

    /// Resource not found (404)
    NotFound { resource: &'static str, id: String },

    /// Resource already exists (409)
    Conflict { resource: &'static str, id: String },

    /// Status change not allowed from the current status (409)
    IllegalTransition {
        from: ShipmentStatus,
        to: ShipmentStatus,
    },

    /// Lost an optimistic race; the client may retry (409)
    ConcurrentModification { tracking_number: TrackingNumber },

    /// No pooled connection available (503, Retry-After)
    Unavailable { waited: Duration },

    /// Statement ran past its timeout (504)
    Timeout,

    /// Database error (500, logged)
    Database(DbError),
}

fn body(error: &str, message: impl Into<String>) -> Value {
    json!({
        "success": false,
        "error": error,
        "message": message.into()
    })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::Validation(e) => (StatusCode::BAD_REQUEST, body("validation_error", e.to_string())),
            Self::NotFound { resource, id } => (
                StatusCode::NOT_FOUND,
                body("not_found", format!("{} '{}' not found", resource, id)),
            ),
            Self::Conflict { resource, id } => (
                StatusCode::CONFLICT,
                body("conflict", format!("{} '{}' already exists", resource, id)),
            ),
            Self::IllegalTransition { from, to } => {
                let mut b = body(
                    "illegal_transition",
                    format!("cannot move from {} to {}", from, to),
                );
                b["from"] = json!(from);
                b["to"] = json!(to);
                (StatusCode::CONFLICT, b)
            }
            Self::ConcurrentModification { tracking_number } => (
                StatusCode::CONFLICT,
                body(
                    "concurrent_modification",
                    format!("guide '{}' changed while updating, retry the request", tracking_number),
                ),
            ),
            Self::Unavailable { waited } => {
                tracing::warn!(waited_ms = waited.as_millis() as u64, "rejecting request, no database connection");
                let mut response = (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(body("unavailable", "service busy, retry shortly")),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
                return response;
            }
            Self::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                body("timeout", "database did not respond in time"),
            ),
            Self::Database(e) => {
                // Log the actual error, return generic message
                tracing::error!(error = %e, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    body("internal_error", "an internal error occurred"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Pool(PoolError::Exhausted { waited }) => Self::Unavailable { waited },
            DbError::Pool(PoolError::Closed) => Self::Unavailable {
                waited: Duration::ZERO,
            },
            DbError::Query(ref q) if q.kind == QueryErrorKind::Timeout => Self::Timeout,
            _ => Self::Database(e),
        }
    }
}

impl From<TransactionError> for ApiError {
    fn from(e: TransactionError) -> Self {
        DbError::from(e).into()
    }
}

impl From<TransitionError> for ApiError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::Validation(v) => Self::Validation(v),
            TransitionError::NotFound(n) => Self::NotFound {
                resource: "guia",
                id: n.to_string(),
            },
            TransitionError::IllegalTransition { from, to } => Self::IllegalTransition { from, to },
            TransitionError::ConcurrentModification { tracking_number } => {
                Self::ConcurrentModification { tracking_number }
            }
            TransitionError::Storage(e) => e.into(),
        }
    }
}

impl From<CreateError> for ApiError {
    fn from(e: CreateError) -> Self {
        match e {
            CreateError::Validation(v) => Self::Validation(v),
            CreateError::Duplicate(n) => Self::Conflict {
                resource: "guia",
                id: n.to_string(),
            },
            CreateError::Storage(e) => e.into(),
        }
    }
}

impl From<ProjectError> for ApiError {
    fn from(e: ProjectError) -> Self {
        match e {
            ProjectError::NotFound(n) => Self::NotFound {
                resource: "guia",
                id: n.to_string(),
            },
            ProjectError::Storage(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::QueryError;
    use axum::body::to_bytes;

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn validation_error_is_400() {
        let err = ApiError::Validation(ValidationError::Empty { field: "numero_guia" });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn illegal_transition_names_both_states() {
        let err = ApiError::from(TransitionError::IllegalTransition {
            from: ShipmentStatus::Confirmed,
            to: ShipmentStatus::Delivered,
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = json_body(response).await;
        assert_eq!(body["from"], "confirmed");
        assert_eq!(body["to"], "delivered");
    }

    #[tokio::test]
    async fn exhausted_pool_is_503_with_retry_after() {
        let err = ApiError::from(DbError::Pool(PoolError::Exhausted {
            waited: Duration::from_secs(5),
        }));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    }

    #[tokio::test]
    async fn timeout_is_504() {
        let err = ApiError::from(DbError::Query(QueryError::timeout("slow")));
        assert_eq!(err.into_response().status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn internal_errors_are_not_echoed() {
        let err = ApiError::from(DbError::Query(QueryError::other("relation \"secret\" does not exist")));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["message"], "an internal error occurred");
    }
}
