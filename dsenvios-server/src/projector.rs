//! Tracking History Projector
//!
//! Read-only reconstruction of a guide's tracking view: summary, progress,
//! and ordered history. History is read up to the `last_seq` of the shipment
//! row it was paired with, so a transition committing between the two reads
//! cannot produce a mixed view.

use chrono::{DateTime, Utc};
use dsenvios_core::{Party, Progress, ProgressSummary, Shipment, ShipmentStatus, TrackingEvent, TrackingNumber};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::db::repos::ShipmentRepo;
use crate::db::{DbError, Pool};

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("shipment {0} not found")]
    NotFound(TrackingNumber),

    #[error(transparent)]
    Storage(#[from] DbError),
}

/// `guia` block: what the customer sees about the shipment itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuideSummary {
    pub numero_guia: TrackingNumber,
    pub estado: ShipmentStatus,
    pub estado_label: &'static str,
    pub tipo_envio: String,
    pub peso: f64,
    pub valor_declarado: Option<f64>,
    pub costo: f64,
    pub descripcion: Option<String>,
    pub remitente: Party,
    pub destinatario: Party,
    pub bodega_origen: Option<String>,
    pub bodega_destino: Option<String>,
    pub notas: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl GuideSummary {
    fn new(shipment: Shipment, estado: ShipmentStatus) -> Self {
        Self {
            numero_guia: shipment.tracking_number,
            estado,
            estado_label: estado.label(),
            tipo_envio: shipment.service_type,
            peso: shipment.weight_kg,
            valor_declarado: shipment.declared_value,
            costo: shipment.cost,
            descripcion: shipment.description,
            remitente: shipment.sender,
            destinatario: shipment.recipient,
            bodega_origen: shipment.origin_warehouse,
            bodega_destino: shipment.destination_warehouse,
            notas: shipment.notes,
            created_at: shipment.created_at,
        }
    }
}

/// One `historial` entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub seq: i64,
    pub estado: ShipmentStatus,
    pub estado_label: &'static str,
    pub fecha: DateTime<Utc>,
    pub ubicacion: Option<String>,
    pub usuario: Option<String>,
    pub observaciones: Option<String>,
}

impl From<TrackingEvent> for HistoryEntry {
    fn from(e: TrackingEvent) -> Self {
        Self {
            seq: e.seq,
            estado: e.status,
            estado_label: e.status.label(),
            fecha: e.recorded_at,
            ubicacion: e.location,
            usuario: e.actor,
            observaciones: e.notes,
        }
    }
}

/// `{guia, progreso, historial}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projection {
    pub guia: GuideSummary,
    pub progreso: ProgressSummary,
    pub historial: Vec<HistoryEntry>,
}

impl Projection {
    pub fn current_status(&self) -> ShipmentStatus {
        self.guia.estado
    }

    pub fn progress(&self) -> Progress {
        Progress::of(self.guia.estado)
    }
}

pub struct TrackingProjector<'a> {
    pool: &'a Pool,
}

impl<'a> TrackingProjector<'a> {
    pub fn new(pool: &'a Pool) -> Self {
        Self { pool }
    }

    pub async fn project(&self, tracking_number: &TrackingNumber) -> Result<Projection, ProjectError> {
        let repo = ShipmentRepo::new(self.pool);
        let snapshot = repo
            .find(tracking_number)
            .await?
            .ok_or_else(|| ProjectError::NotFound(tracking_number.clone()))?;
        let shipment = snapshot.shipment;

        let mut events = repo.history(&shipment).await?;
        events.sort_by_key(|e| e.seq);
        events.dedup_by_key(|e| e.seq);

        let mut status = shipment.status;
        if let Some(last) = events.last() {
            if last.status != status {
                warn!(
                    %tracking_number,
                    stored = %status,
                    history = %last.status,
                    "status drift between shipment row and history, reporting history"
                );
                status = last.status;
            }
        }

        let furthest = events
            .iter()
            .rev()
            .map(|e| e.status)
            .find(|s| s.chain_position().is_some());

        Ok(Projection {
            guia: GuideSummary::new(shipment, status),
            progreso: ProgressSummary::new(status, furthest),
            historial: events.into_iter().map(HistoryEntry::from).collect(),
        })
    }
}
