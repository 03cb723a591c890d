//! Generic document endpoints for the admin panel
//!
//! Untyped JSON pass-through: no domain validation beyond the collection
//! name and document id.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use dsenvios_core::validation::required_text;
use serde_json::Value;
use uuid::Uuid;

use crate::db::repos::{Document, DocumentRepo};
use crate::db::{DbError, QueryErrorKind};
use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::models::{CollectionName, Paginated, Pagination, PaginationParams};

const MAX_ID_LEN: usize = 128;

fn document_id(id: &str) -> Result<String, ApiError> {
    Ok(required_text("id", id, MAX_ID_LEN)?)
}

fn not_found(collection: &CollectionName, id: &str) -> ApiError {
    ApiError::NotFound {
        resource: "document",
        id: format!("{}/{}", collection.as_str(), id),
    }
}

async fn insert(state: &AppState, collection: CollectionName, id: String, body: Value) -> Result<(StatusCode, Json<Document>), ApiError> {
    match DocumentRepo::new(&state.pool).create(&collection, &id, body).await {
        Ok(doc) => Ok((StatusCode::CREATED, Json(doc))),
        Err(DbError::Query(e)) if e.kind == QueryErrorKind::ConstraintViolation => Err(ApiError::Conflict {
            resource: "document",
            id: format!("{}/{}", collection.as_str(), id),
        }),
        Err(e) => Err(e.into()),
    }
}

/// GET /collection/{name} - list documents, newest first
async fn list_documents(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Paginated<Document>>, ApiError> {
    let collection = CollectionName::new(&name)?;
    let page = Pagination::from(params);
    Ok(Json(DocumentRepo::new(&state.pool).list(&collection, page).await?))
}

/// POST /collection/{name} - create with the body's `id` or a fresh UUID
async fn create_document(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let collection = CollectionName::new(&name)?;
    let id = match body.get("id").and_then(Value::as_str) {
        Some(id) => document_id(id)?,
        None => Uuid::new_v4().to_string(),
    };
    insert(&state, collection, id, body).await
}

/// GET /collection/{name}/{id}
async fn get_document(
    State(state): State<Arc<AppState>>,
    Path((name, id)): Path<(String, String)>,
) -> Result<Json<Document>, ApiError> {
    let collection = CollectionName::new(&name)?;
    DocumentRepo::new(&state.pool)
        .get(&collection, &id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(&collection, &id))
}

/// POST /collection/{name}/{id} - create with a caller-chosen id
async fn create_document_with_id(
    State(state): State<Arc<AppState>>,
    Path((name, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let collection = CollectionName::new(&name)?;
    let id = document_id(&id)?;
    insert(&state, collection, id, body).await
}

/// PUT /collection/{name}/{id} - replace an existing body
async fn replace_document(
    State(state): State<Arc<AppState>>,
    Path((name, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Document>, ApiError> {
    let collection = CollectionName::new(&name)?;
    DocumentRepo::new(&state.pool)
        .replace(&collection, &id, body)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(&collection, &id))
}

/// DELETE /collection/{name}/{id}
async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path((name, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let collection = CollectionName::new(&name)?;
    if DocumentRepo::new(&state.pool).delete(&collection, &id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(&collection, &id))
    }
}

/// Collection routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/collection/{name}", get(list_documents).post(create_document))
        .route(
            "/collection/{name}/{id}",
            get(get_document)
                .post(create_document_with_id)
                .put(replace_document)
                .delete(delete_document),
        )
}

#[cfg(test)]
mod tests {
    use crate::http::server::tests::{json_request, read_json, test_app};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn document_crud() {
        let (backend, pool, app) = test_app();

        let response = app
            .clone()
            .oneshot(json_request("POST", "/collection/bodegas/central", json!({ "nombre": "Central" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(json_request("POST", "/collection/bodegas/central", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .clone()
            .oneshot(json_request("PUT", "/collection/bodegas/central", json!({ "nombre": "Central 2" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.clone().oneshot(request("GET", "/collection/bodegas/central")).await.unwrap();
        assert_eq!(read_json(response).await["body"]["nombre"], "Central 2");

        let response = app.clone().oneshot(request("DELETE", "/collection/bodegas/central")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app.clone().oneshot(request("GET", "/collection/bodegas/central")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        assert_eq!(backend.row_count("documents"), 0);
        assert_eq!(pool.status().leased, 0);
    }

    #[tokio::test]
    async fn create_assigns_id_and_lists() {
        let (_, _, app) = test_app();
        for body in [json!({ "ciudad": "Quito" }), json!({ "id": "gye", "ciudad": "Guayaquil" })] {
            let response = app
                .clone()
                .oneshot(json_request("POST", "/collection/ciudades", body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let response = app.clone().oneshot(request("GET", "/collection/ciudades?limit=1")).await.unwrap();
        let body = read_json(response).await;
        assert_eq!(body["total"], 2);
        assert_eq!(body["totalPages"], 2);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let response = app.oneshot(request("GET", "/collection/ciudades/gye")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn invalid_collection_name_is_400() {
        let (_, _, app) = test_app();
        let response = app.oneshot(request("GET", "/collection/Drop%20Table")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_document_replace_is_404() {
        let (_, _, app) = test_app();
        let response = app
            .oneshot(json_request("PUT", "/collection/bodegas/none", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
