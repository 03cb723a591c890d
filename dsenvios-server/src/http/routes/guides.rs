//! Guide endpoints: listing, creation, detail and status changes

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use dsenvios_core::{EventMetadata, NewShipment, Party, Shipment, ShipmentStatus, TrackingNumber, ValidationError};
use serde::Deserialize;

use super::tracking::lookup;
use super::ApiResponse;
use crate::db::repos::{GuideQuery, GuideRepo};
use crate::engine::StatusEngine;
use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::models::Paginated;
use crate::projector::{HistoryEntry, Projection};

/// Create guide request, as sent by the guide form
#[derive(Debug, Deserialize)]
pub struct CreateGuideRequest {
    pub numero_guia: Option<String>,
    pub remitente_nombre: String,
    pub remitente_telefono: Option<String>,
    pub destinatario_nombre: String,
    pub destinatario_telefono: Option<String>,
    pub bodega_origen: Option<String>,
    pub bodega_destino: Option<String>,
    pub tipo_envio: String,
    pub peso: f64,
    pub valor_declarado: Option<f64>,
    pub costo: f64,
    pub descripcion: Option<String>,
    pub notas: Option<String>,
    /// Location for the initial history entry
    pub ubicacion: Option<String>,
    pub usuario: Option<String>,
}

impl TryFrom<CreateGuideRequest> for NewShipment {
    type Error = ValidationError;

    fn try_from(req: CreateGuideRequest) -> Result<Self, Self::Error> {
        let tracking_number = req
            .numero_guia
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(TrackingNumber::new)
            .transpose()?;

        Ok(NewShipment {
            tracking_number,
            sender: Party {
                name: req.remitente_nombre,
                phone: req.remitente_telefono,
            },
            recipient: Party {
                name: req.destinatario_nombre,
                phone: req.destinatario_telefono,
            },
            origin_warehouse: req.bodega_origen,
            destination_warehouse: req.bodega_destino,
            service_type: req.tipo_envio,
            weight_kg: req.peso,
            declared_value: req.valor_declarado,
            cost: req.costo,
            description: req.descripcion,
            notes: req.notas,
            initial: EventMetadata {
                location: req.ubicacion,
                actor: req.usuario,
                notes: None,
            },
        })
    }
}

/// Status change request
#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub estado: String,
    pub ubicacion: Option<String>,
    pub usuario: Option<String>,
    pub observaciones: Option<String>,
}

/// GET /api/guias - filtered, sorted, paginated listing
async fn list_guides(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GuideQuery>,
) -> Result<Json<Paginated<Shipment>>, ApiError> {
    let (filter, page) = query.into_parts()?;
    let result = GuideRepo::new(&state.pool).list(&filter, page).await?;
    Ok(Json(result))
}

/// POST /api/guias - create a guide in `pending`
async fn create_guide(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateGuideRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Shipment>>), ApiError> {
    let new = NewShipment::try_from(req)?;
    let shipment = StatusEngine::new(&state.pool).create(new).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(shipment))))
}

/// GET /api/guias/{numero} - tracking projection for one guide
async fn get_guide(
    State(state): State<Arc<AppState>>,
    Path(numero): Path<String>,
) -> Result<Json<ApiResponse<Projection>>, ApiError> {
    let projection = lookup(&state.pool, &numero).await?;
    Ok(Json(ApiResponse::ok(projection)))
}

/// POST /api/guias/{numero}/estado - move a guide to a new status
async fn change_status(
    State(state): State<Arc<AppState>>,
    Path(numero): Path<String>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<ApiResponse<HistoryEntry>>, ApiError> {
    let tracking_number = TrackingNumber::new(&numero)?;
    let target: ShipmentStatus = req.estado.parse()?;
    let metadata = EventMetadata {
        location: req.ubicacion,
        actor: req.usuario,
        notes: req.observaciones,
    };

    let event = StatusEngine::new(&state.pool)
        .transition(&tracking_number, target, metadata)
        .await?;
    Ok(Json(ApiResponse::ok(HistoryEntry::from(event))))
}

/// Guide routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/guias", get(list_guides).post(create_guide))
        .route("/api/guias/{numero}", get(get_guide))
        .route("/api/guias/{numero}/estado", post(change_status))
}
