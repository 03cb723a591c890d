//! Shipment (guide) and tracking event records

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::ShipmentStatus;
use crate::tracking::TrackingNumber;
use crate::validation::{optional_text, required_text, ValidationError};

const MAX_NAME_LEN: usize = 120;
const MAX_PHONE_LEN: usize = 32;
const MAX_TEXT_LEN: usize = 500;

/// Location recorded on the first history entry when the caller gives none.
pub const DEFAULT_INITIAL_LOCATION: &str = "En preparación";

/// Sender or recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    pub name: String,
    pub phone: Option<String>,
}

impl Party {
    fn validated(&self, field: &'static str) -> Result<Self, ValidationError> {
        Ok(Self {
            name: required_text(field, &self.name, MAX_NAME_LEN)?,
            phone: optional_text("telefono", self.phone.as_deref(), MAX_PHONE_LEN)?,
        })
    }
}

/// Input for creating a guide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewShipment {
    /// Caller-chosen number; generated when absent.
    pub tracking_number: Option<TrackingNumber>,
    pub sender: Party,
    pub recipient: Party,
    pub origin_warehouse: Option<String>,
    pub destination_warehouse: Option<String>,
    /// `tipo_envio` (STANDARD, EXPRESS, ...)
    pub service_type: String,
    pub weight_kg: f64,
    pub declared_value: Option<f64>,
    pub cost: f64,
    pub description: Option<String>,
    pub notes: Option<String>,
    /// Metadata for the initial `pending` history entry.
    pub initial: EventMetadata,
}

impl NewShipment {
    /// Check ranges and trim free-text fields.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if !self.weight_kg.is_finite() || self.weight_kg <= 0.0 {
            return Err(ValidationError::OutOfRange {
                field: "peso",
                reason: format!("must be greater than zero, got {}", self.weight_kg),
            });
        }
        if !self.cost.is_finite() || self.cost < 0.0 {
            return Err(ValidationError::OutOfRange {
                field: "costo",
                reason: format!("must not be negative, got {}", self.cost),
            });
        }
        if let Some(value) = self.declared_value {
            if !value.is_finite() || value < 0.0 {
                return Err(ValidationError::OutOfRange {
                    field: "valor_declarado",
                    reason: format!("must not be negative, got {}", value),
                });
            }
        }

        Ok(Self {
            tracking_number: self.tracking_number,
            sender: self.sender.validated("remitente")?,
            recipient: self.recipient.validated("destinatario")?,
            origin_warehouse: optional_text("bodega_origen", self.origin_warehouse.as_deref(), MAX_NAME_LEN)?,
            destination_warehouse: optional_text(
                "bodega_destino",
                self.destination_warehouse.as_deref(),
                MAX_NAME_LEN,
            )?,
            service_type: required_text("tipo_envio", &self.service_type, 32)?.to_ascii_uppercase(),
            weight_kg: self.weight_kg,
            declared_value: self.declared_value,
            cost: self.cost,
            description: optional_text("descripcion", self.description.as_deref(), MAX_TEXT_LEN)?,
            notes: optional_text("notas", self.notes.as_deref(), MAX_TEXT_LEN)?,
            initial: self.initial.validate()?,
        })
    }
}

/// Stored guide with its denormalized current status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: Uuid,
    #[serde(rename = "numero_guia")]
    pub tracking_number: TrackingNumber,
    pub status: ShipmentStatus,
    /// Sequence number of the newest history entry.
    pub last_seq: i64,
    pub sender: Party,
    pub recipient: Party,
    pub origin_warehouse: Option<String>,
    pub destination_warehouse: Option<String>,
    #[serde(rename = "tipo_envio")]
    pub service_type: String,
    pub weight_kg: f64,
    pub declared_value: Option<f64>,
    pub cost: f64,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shipment {
    /// Build the row for a validated [`NewShipment`] in its initial `pending` state.
    pub fn pending(id: Uuid, tracking_number: TrackingNumber, new: &NewShipment, at: DateTime<Utc>) -> Self {
        Self {
            id,
            tracking_number,
            status: ShipmentStatus::Pending,
            last_seq: 1,
            sender: new.sender.clone(),
            recipient: new.recipient.clone(),
            origin_warehouse: new.origin_warehouse.clone(),
            destination_warehouse: new.destination_warehouse.clone(),
            service_type: new.service_type.clone(),
            weight_kg: new.weight_kg,
            declared_value: new.declared_value,
            cost: new.cost,
            description: new.description.clone(),
            notes: new.notes.clone(),
            created_at: at,
            updated_at: at,
        }
    }
}

/// Caller-supplied context for a history entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub location: Option<String>,
    pub actor: Option<String>,
    pub notes: Option<String>,
}

impl EventMetadata {
    pub fn validate(self) -> Result<Self, ValidationError> {
        Ok(Self {
            location: optional_text("ubicacion", self.location.as_deref(), MAX_NAME_LEN)?,
            actor: optional_text("usuario", self.actor.as_deref(), MAX_NAME_LEN)?,
            notes: optional_text("observaciones", self.notes.as_deref(), MAX_TEXT_LEN)?,
        })
    }
}

/// One immutable history row. Ordered by `(shipment_id, seq)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub shipment_id: Uuid,
    pub seq: i64,
    pub status: ShipmentStatus,
    pub recorded_at: DateTime<Utc>,
    pub location: Option<String>,
    pub actor: Option<String>,
    pub notes: Option<String>,
}

impl TrackingEvent {
    pub fn new(
        shipment_id: Uuid,
        seq: i64,
        status: ShipmentStatus,
        recorded_at: DateTime<Utc>,
        metadata: EventMetadata,
    ) -> Self {
        Self {
            shipment_id,
            seq,
            status,
            recorded_at,
            location: metadata.location,
            actor: metadata.actor,
            notes: metadata.notes,
        }
    }
}

/// Server-assigned timestamp for the next history entry.
///
/// Truncated to microseconds (storage precision) and strictly later than
/// `previous`, even when the wall clock has not advanced or went backwards.
pub fn next_event_time(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    let tick = Duration::microseconds(1);
    let now = now.duration_trunc(tick).unwrap_or(now);
    match previous {
        Some(prev) if prev >= now => prev + tick,
        _ => now,
    }
}
