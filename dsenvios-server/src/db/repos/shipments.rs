//! Shipment and tracking-event statements
//!
//! Reads go through the [`QueryExecutor`]; writes are returned as
//! [`Statement`]s so the status engine can compose them into one transaction.

use chrono::{DateTime, Utc};
use dsenvios_core::{Party, Shipment, ShipmentStatus, TrackingEvent, TrackingNumber};
use uuid::Uuid;

use crate::db::{DbError, Pool, QueryError, QueryExecutor, Row, Statement};

/// Column order shared by `shipments.insert` and the in-memory store.
pub(crate) const SHIPMENT_COLUMNS: [&str; 18] = [
    "id",
    "tracking_number",
    "status",
    "last_seq",
    "sender_name",
    "sender_phone",
    "recipient_name",
    "recipient_phone",
    "origin_warehouse",
    "destination_warehouse",
    "service_type",
    "weight_kg",
    "declared_value",
    "cost",
    "description",
    "notes",
    "created_at",
    "updated_at",
];

/// Column order shared by `events.insert` and the in-memory store.
pub(crate) const EVENT_COLUMNS: [&str; 7] = [
    "shipment_id",
    "seq",
    "status",
    "recorded_at",
    "location",
    "actor",
    "notes",
];

const INSERT_SHIPMENT: &str = r#"/* shipments.insert */
INSERT INTO shipments (
    id, tracking_number, status, last_seq,
    sender_name, sender_phone, recipient_name, recipient_phone,
    origin_warehouse, destination_warehouse, service_type,
    weight_kg, declared_value, cost, description, notes,
    created_at, updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)"#;

const INSERT_EVENT: &str = r#"/* events.insert */
INSERT INTO tracking_events (shipment_id, seq, status, recorded_at, location, actor, notes)
VALUES ($1, $2, $3, $4, $5, $6, $7)"#;

const ADVANCE_STATUS: &str = r#"/* shipments.advance */
UPDATE shipments
SET status = $1, last_seq = $2, updated_at = $3
WHERE id = $4 AND status = $5 AND last_seq = $6"#;

const FIND_BY_TRACKING: &str = r#"/* shipments.by_tracking */
SELECT s.*, e.recorded_at AS last_event_at
FROM shipments s
LEFT JOIN tracking_events e ON e.shipment_id = s.id AND e.seq = s.last_seq
WHERE s.tracking_number = $1"#;

const HISTORY: &str = r#"/* events.history */
SELECT shipment_id, seq, status, recorded_at, location, actor, notes
FROM tracking_events
WHERE shipment_id = $1 AND seq <= $2
ORDER BY seq ASC"#;

const EVENT_BY_SEQ: &str = r#"/* events.by_seq */
SELECT shipment_id, seq, status, recorded_at, location, actor, notes
FROM tracking_events
WHERE shipment_id = $1 AND seq = $2"#;

/// Shipment as read for a transition: the row plus its newest event time.
#[derive(Debug, Clone, PartialEq)]
pub struct ShipmentSnapshot {
    pub shipment: Shipment,
    pub last_event_at: Option<DateTime<Utc>>,
}

pub fn insert_shipment(s: &Shipment) -> Statement {
    Statement::new(INSERT_SHIPMENT)
        .bind(s.id)
        .bind(s.tracking_number.as_str())
        .bind(s.status.as_str())
        .bind(s.last_seq)
        .bind(s.sender.name.as_str())
        .bind(s.sender.phone.as_deref())
        .bind(s.recipient.name.as_str())
        .bind(s.recipient.phone.as_deref())
        .bind(s.origin_warehouse.as_deref())
        .bind(s.destination_warehouse.as_deref())
        .bind(s.service_type.as_str())
        .bind(s.weight_kg)
        .bind(s.declared_value)
        .bind(s.cost)
        .bind(s.description.as_deref())
        .bind(s.notes.as_deref())
        .bind(s.created_at)
        .bind(s.updated_at)
}

pub fn insert_event(e: &TrackingEvent) -> Statement {
    Statement::new(INSERT_EVENT)
        .bind(e.shipment_id)
        .bind(e.seq)
        .bind(e.status.as_str())
        .bind(e.recorded_at)
        .bind(e.location.as_deref())
        .bind(e.actor.as_deref())
        .bind(e.notes.as_deref())
}

/// Move `current` to the event's status, but only if nobody else moved it
/// first: the row must still carry the status and sequence we read.
pub fn advance_status(current: &Shipment, event: &TrackingEvent) -> Statement {
    Statement::new(ADVANCE_STATUS)
        .bind(event.status.as_str())
        .bind(event.seq)
        .bind(event.recorded_at)
        .bind(current.id)
        .bind(current.status.as_str())
        .bind(current.last_seq)
        .expect_rows(1)
}

pub struct ShipmentRepo<'a> {
    pool: &'a Pool,
}

impl<'a> ShipmentRepo<'a> {
    pub fn new(pool: &'a Pool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, tracking_number: &TrackingNumber) -> Result<Option<ShipmentSnapshot>, DbError> {
        let stmt = Statement::new(FIND_BY_TRACKING).bind(tracking_number.as_str());
        let Some(row) = QueryExecutor::new(self.pool).fetch_optional(&stmt).await? else {
            return Ok(None);
        };

        Ok(Some(ShipmentSnapshot {
            shipment: shipment_from_row(&row)?,
            last_event_at: row.get("last_event_at")?,
        }))
    }

    /// Events up to the shipment's recorded `last_seq`, oldest first.
    pub async fn history(&self, shipment: &Shipment) -> Result<Vec<TrackingEvent>, DbError> {
        let stmt = Statement::new(HISTORY).bind(shipment.id).bind(shipment.last_seq);
        let rows = QueryExecutor::new(self.pool).fetch_all(&stmt).await?;
        Ok(rows.iter().map(event_from_row).collect::<Result<_, _>>()?)
    }

    pub async fn event(&self, shipment_id: Uuid, seq: i64) -> Result<Option<TrackingEvent>, DbError> {
        let stmt = Statement::new(EVENT_BY_SEQ).bind(shipment_id).bind(seq);
        match QueryExecutor::new(self.pool).fetch_optional(&stmt).await? {
            Some(row) => Ok(Some(event_from_row(&row)?)),
            None => Ok(None),
        }
    }
}

fn corrupt(column: &str, err: impl std::fmt::Display) -> QueryError {
    QueryError::other(format!("corrupt value in column '{}': {}", column, err))
}

fn status_column(row: &Row, column: &str) -> Result<ShipmentStatus, QueryError> {
    let raw: String = row.get(column)?;
    raw.parse().map_err(|e| corrupt(column, e))
}

pub(crate) fn shipment_from_row(row: &Row) -> Result<Shipment, QueryError> {
    let tracking: String = row.get("tracking_number")?;
    Ok(Shipment {
        id: row.get("id")?,
        tracking_number: TrackingNumber::new(&tracking).map_err(|e| corrupt("tracking_number", e))?,
        status: status_column(row, "status")?,
        last_seq: row.get("last_seq")?,
        sender: Party {
            name: row.get("sender_name")?,
            phone: row.get("sender_phone")?,
        },
        recipient: Party {
            name: row.get("recipient_name")?,
            phone: row.get("recipient_phone")?,
        },
        origin_warehouse: row.get("origin_warehouse")?,
        destination_warehouse: row.get("destination_warehouse")?,
        service_type: row.get("service_type")?,
        weight_kg: row.get("weight_kg")?,
        declared_value: row.get("declared_value")?,
        cost: row.get("cost")?,
        description: row.get("description")?,
        notes: row.get("notes")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub(crate) fn event_from_row(row: &Row) -> Result<TrackingEvent, QueryError> {
    Ok(TrackingEvent {
        shipment_id: row.get("shipment_id")?,
        seq: row.get("seq")?,
        status: status_column(row, "status")?,
        recorded_at: row.get("recorded_at")?,
        location: row.get("location")?,
        actor: row.get("actor")?,
        notes: row.get("notes")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqlValue;

    #[test]
    fn insert_binds_every_column() {
        let stmt = insert_event(&TrackingEvent {
            shipment_id: Uuid::nil(),
            seq: 1,
            status: ShipmentStatus::Pending,
            recorded_at: Utc::now(),
            location: Some("En preparación".into()),
            actor: None,
            notes: None,
        });
        assert_eq!(stmt.params().len(), EVENT_COLUMNS.len());
        assert_eq!(stmt.tag(), Some("events.insert"));
        assert!(!stmt.sql().contains("En preparación"));
    }

    #[test]
    fn advance_is_guarded() {
        let now = Utc::now();
        assert!(shipment_from_row(&Row::new()).is_err());

        let current = Shipment {
            id: Uuid::new_v4(),
            tracking_number: TrackingNumber::new("TRK-1").unwrap(),
            status: ShipmentStatus::Pending,
            last_seq: 1,
            sender: Party { name: "A".into(), phone: None },
            recipient: Party { name: "B".into(), phone: None },
            origin_warehouse: None,
            destination_warehouse: None,
            service_type: "STANDARD".into(),
            weight_kg: 1.0,
            declared_value: None,
            cost: 10.0,
            description: None,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        let event = TrackingEvent::new(current.id, 2, ShipmentStatus::Confirmed, now, Default::default());
        let stmt = advance_status(&current, &event);

        assert_eq!(stmt.expected_rows(), Some(1));
        assert_eq!(stmt.params()[4], SqlValue::Text("pending".into()));
        assert_eq!(stmt.params()[5], SqlValue::Int(1));

        let insert = insert_shipment(&current);
        assert_eq!(insert.params().len(), SHIPMENT_COLUMNS.len());
    }
}
