//! Shipment status lifecycle
//!
//! ```text
//! pending → confirmed → picked_up → in_transit → out_for_delivery → delivered*
//!    └──────────┴───────────┴────────────┴─────────────┴──────────→ cancelled*
//! ```
//!
//! Legal edges live in [`TRANSITIONS`], keyed by the current state. Adding a
//! state means adding a variant and one row there; nothing else encodes the
//! edge set.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::validation::ValidationError;

/// Closed set of statuses a guide can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    Pending,
    Confirmed,
    PickedUp,
    InTransit,
    OutForDelivery,
    Delivered,
    Cancelled,
}

use ShipmentStatus::*;

/// Forward progression, in order. `Cancelled` is deliberately absent.
pub const FORWARD_CHAIN: [ShipmentStatus; 6] = [
    Pending,
    Confirmed,
    PickedUp,
    InTransit,
    OutForDelivery,
    Delivered,
];

/// Current state → legal next states.
const TRANSITIONS: &[(ShipmentStatus, &[ShipmentStatus])] = &[
    (Pending, &[Confirmed, Cancelled]),
    (Confirmed, &[PickedUp, Cancelled]),
    (PickedUp, &[InTransit, Cancelled]),
    (InTransit, &[OutForDelivery, Cancelled]),
    (OutForDelivery, &[Delivered, Cancelled]),
    (Delivered, &[]),
    (Cancelled, &[]),
];

impl ShipmentStatus {
    /// Every status, forward chain first.
    pub const ALL: [ShipmentStatus; 7] = [
        Pending,
        Confirmed,
        PickedUp,
        InTransit,
        OutForDelivery,
        Delivered,
        Cancelled,
    ];

    /// Canonical storage/wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Pending => "pending",
            Confirmed => "confirmed",
            PickedUp => "picked_up",
            InTransit => "in_transit",
            OutForDelivery => "out_for_delivery",
            Delivered => "delivered",
            Cancelled => "cancelled",
        }
    }

    /// Customer-facing label shown on the tracking timeline.
    pub fn label(self) -> &'static str {
        match self {
            Pending => "Pendiente",
            Confirmed => "Confirmado",
            PickedUp => "Recolectado",
            InTransit => "En Tránsito",
            OutForDelivery => "En Distribución",
            Delivered => "Entregado",
            Cancelled => "Cancelado",
        }
    }

    /// Statuses reachable from this one in a single transition.
    pub fn next_states(self) -> &'static [ShipmentStatus] {
        TRANSITIONS
            .iter()
            .find(|(from, _)| *from == self)
            .map(|(_, next)| *next)
            .unwrap_or(&[])
    }

    pub fn can_transition_to(self, target: ShipmentStatus) -> bool {
        self.next_states().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        self.next_states().is_empty()
    }

    /// Zero-based index in [`FORWARD_CHAIN`], `None` for `Cancelled`.
    pub fn chain_position(self) -> Option<usize> {
        FORWARD_CHAIN.iter().position(|s| *s == self)
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShipmentStatus {
    type Err = ValidationError;

    /// Accepts canonical names in any case, plus the Spanish codes used by
    /// older clients (`PENDIENTE`, `EN_TRANSITO`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        let status = match normalized.as_str() {
            "pending" | "pendiente" => Pending,
            "confirmed" | "confirmado" => Confirmed,
            "picked_up" | "recolectado" => PickedUp,
            "in_transit" | "en_transito" => InTransit,
            "out_for_delivery" | "en_distribucion" => OutForDelivery,
            "delivered" | "entregado" => Delivered,
            "cancelled" | "canceled" | "cancelado" => Cancelled,
            _ => {
                return Err(ValidationError::InvalidVariant {
                    field: "estado",
                    value: s.to_owned(),
                })
            }
        };
        Ok(status)
    }
}
