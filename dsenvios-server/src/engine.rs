//! Shipment Status Engine
//!
//! Enforces the status lifecycle on writes. Every state change is one
//! transaction that moves the denormalized status and appends the matching
//! history row, so the two can never disagree.
//!
//! Concurrent transitions on the same guide are resolved optimistically: the
//! status UPDATE only matches the row if it still carries the status and
//! sequence number we read. A miss rolls back and surfaces
//! [`TransitionError::ConcurrentModification`], which is safe to retry.

use chrono::Utc;
use dsenvios_core::shipment::DEFAULT_INITIAL_LOCATION;
use dsenvios_core::{
    next_event_time, EventMetadata, NewShipment, Shipment, ShipmentStatus, TrackingEvent,
    TrackingNumber, ValidationError,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::repos::shipments::{advance_status, insert_event, insert_shipment};
use crate::db::repos::ShipmentRepo;
use crate::db::{DbError, Pool, QueryError, QueryErrorKind, TransactionCoordinator, TransactionError};

/// Attempts at issuing a fresh generated tracking number.
const MAX_GENERATE_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum CreateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("tracking number {0} already exists")]
    Duplicate(TrackingNumber),

    #[error("could not store shipment: {0}")]
    Storage(#[from] TransactionError),
}

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("shipment {0} not found")]
    NotFound(TrackingNumber),

    #[error("illegal transition from {from} to {to}")]
    IllegalTransition {
        from: ShipmentStatus,
        to: ShipmentStatus,
    },

    #[error("shipment {tracking_number} was modified concurrently, retry the transition")]
    ConcurrentModification { tracking_number: TrackingNumber },

    #[error(transparent)]
    Storage(#[from] DbError),
}

impl TransitionError {
    /// Whether repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConcurrentModification { .. } => true,
            Self::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }
}

fn is_unique_violation(err: &TransactionError) -> bool {
    matches!(
        err,
        TransactionError::Statement { failed_index: 0, cause }
            if cause.kind == QueryErrorKind::ConstraintViolation
    )
}

pub struct StatusEngine<'a> {
    pool: &'a Pool,
}

impl<'a> StatusEngine<'a> {
    pub fn new(pool: &'a Pool) -> Self {
        Self { pool }
    }

    /// Create a guide in `pending` together with its first history entry.
    ///
    /// A caller-supplied tracking number that already exists fails with
    /// [`CreateError::Duplicate`]; a generated one is reissued on collision.
    pub async fn create(&self, new: NewShipment) -> Result<Shipment, CreateError> {
        self.create_with(new, TrackingNumber::generate).await
    }

    async fn create_with<G>(&self, new: NewShipment, mut generate: G) -> Result<Shipment, CreateError>
    where
        G: FnMut() -> TrackingNumber + Send,
    {
        let new = new.validate()?;
        let supplied = new.tracking_number.clone();

        let mut attempt = 1;
        loop {
            let tracking_number = supplied.clone().unwrap_or_else(&mut generate);
            match self.insert(&new, tracking_number.clone()).await {
                Ok(shipment) => {
                    info!(
                        tracking_number = %shipment.tracking_number,
                        service_type = %shipment.service_type,
                        "shipment created"
                    );
                    return Ok(shipment);
                }
                Err(err) if is_unique_violation(&err) => {
                    if supplied.is_some() {
                        return Err(CreateError::Duplicate(tracking_number));
                    }
                    if attempt >= MAX_GENERATE_ATTEMPTS {
                        return Err(CreateError::Storage(err));
                    }
                    warn!(%tracking_number, attempt, "generated tracking number collided, reissuing");
                    attempt += 1;
                }
                Err(err) => return Err(CreateError::Storage(err)),
            }
        }
    }

    async fn insert(&self, new: &NewShipment, tracking_number: TrackingNumber) -> Result<Shipment, TransactionError> {
        let at = next_event_time(None, Utc::now());
        let shipment = Shipment::pending(Uuid::new_v4(), tracking_number, new, at);

        let mut metadata = new.initial.clone();
        metadata
            .location
            .get_or_insert_with(|| DEFAULT_INITIAL_LOCATION.to_owned());
        let event = TrackingEvent::new(shipment.id, shipment.last_seq, ShipmentStatus::Pending, at, metadata);

        TransactionCoordinator::new(self.pool)
            .run(&[insert_shipment(&shipment), insert_event(&event)])
            .await?;
        Ok(shipment)
    }

    /// Move a guide to `target`, appending one history entry.
    ///
    /// Requesting the status the guide is already in returns the latest
    /// existing event without writing anything.
    pub async fn transition(
        &self,
        tracking_number: &TrackingNumber,
        target: ShipmentStatus,
        metadata: EventMetadata,
    ) -> Result<TrackingEvent, TransitionError> {
        let metadata = metadata.validate()?;
        let repo = ShipmentRepo::new(self.pool);

        let snapshot = repo
            .find(tracking_number)
            .await?
            .ok_or_else(|| TransitionError::NotFound(tracking_number.clone()))?;
        let current = &snapshot.shipment;

        if current.status == target {
            debug!(%tracking_number, status = %target, "already in requested status");
            return repo
                .event(current.id, current.last_seq)
                .await?
                .ok_or_else(|| {
                    TransitionError::Storage(DbError::Query(QueryError::other(format!(
                        "shipment {} has no history entry {}",
                        tracking_number, current.last_seq
                    ))))
                });
        }

        if !current.status.can_transition_to(target) {
            return Err(TransitionError::IllegalTransition {
                from: current.status,
                to: target,
            });
        }

        let at = next_event_time(snapshot.last_event_at, Utc::now());
        let event = TrackingEvent::new(current.id, current.last_seq + 1, target, at, metadata);

        let result = TransactionCoordinator::new(self.pool)
            .run(&[advance_status(current, &event), insert_event(&event)])
            .await;

        match result {
            Ok(_) => {
                info!(
                    %tracking_number,
                    from = %current.status,
                    to = %target,
                    seq = event.seq,
                    "status changed"
                );
                Ok(event)
            }
            Err(TransactionError::Guard { .. }) => {
                warn!(%tracking_number, "status changed underneath transition");
                Err(TransitionError::ConcurrentModification {
                    tracking_number: tracking_number.clone(),
                })
            }
            Err(TransactionError::Statement { cause, .. })
                if cause.kind == QueryErrorKind::ConstraintViolation =>
            {
                warn!(%tracking_number, error = %cause, "history entry already taken");
                Err(TransitionError::ConcurrentModification {
                    tracking_number: tracking_number.clone(),
                })
            }
            Err(err) => Err(TransitionError::Storage(err.into())),
        }
    }
}
