//! Progress math for the tracking timeline

use serde::Serialize;

use crate::status::{ShipmentStatus, FORWARD_CHAIN};

/// Position of a guide along the forward chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    /// `chain index / (chain length - 1)`, in `0.0..=1.0`
    Fraction(f64),
    /// Out-of-band marker; cancelled guides have no position.
    Cancelled,
}

impl Progress {
    pub fn of(status: ShipmentStatus) -> Self {
        match status.chain_position() {
            Some(index) => Self::Fraction(index as f64 / (FORWARD_CHAIN.len() - 1) as f64),
            None => Self::Cancelled,
        }
    }

    pub fn fraction(self) -> Option<f64> {
        match self {
            Self::Fraction(f) => Some(f),
            Self::Cancelled => None,
        }
    }
}

/// One stage of the customer-facing timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineStage {
    pub codigo: ShipmentStatus,
    pub nombre: &'static str,
    pub completado: bool,
    pub activo: bool,
}

/// `progreso` block of a tracking lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSummary {
    pub porcentaje: u8,
    /// 1-based stage number, 0 when cancelled
    pub paso_actual: u8,
    pub completado: bool,
    pub cancelado: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fraction: Option<f64>,
    pub timeline: Vec<TimelineStage>,
}

impl ProgressSummary {
    /// Build the summary for `current`.
    ///
    /// `furthest` is the last forward-chain status the guide reached; it
    /// only matters for cancelled guides, whose timeline keeps the stages
    /// they passed marked as completed.
    pub fn new(current: ShipmentStatus, furthest: Option<ShipmentStatus>) -> Self {
        let progress = Progress::of(current);
        let reached = current
            .chain_position()
            .or_else(|| furthest.and_then(ShipmentStatus::chain_position));

        let timeline = FORWARD_CHAIN
            .iter()
            .enumerate()
            .map(|(i, &stage)| TimelineStage {
                codigo: stage,
                nombre: stage.label(),
                completado: reached.is_some_and(|r| i <= r),
                activo: stage == current,
            })
            .collect();

        Self {
            porcentaje: progress
                .fraction()
                .map(|f| (f * 100.0).round() as u8)
                .unwrap_or(0),
            paso_actual: current.chain_position().map(|p| p as u8 + 1).unwrap_or(0),
            completado: current.is_terminal(),
            cancelado: progress == Progress::Cancelled,
            fraction: progress.fraction(),
            timeline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ShipmentStatus::*;

    #[test]
    fn fractions_along_the_chain() {
        assert_eq!(Progress::of(Pending), Progress::Fraction(0.0));
        assert_eq!(Progress::of(Confirmed), Progress::Fraction(0.2));
        assert_eq!(Progress::of(Delivered), Progress::Fraction(1.0));
        assert_eq!(Progress::of(Cancelled), Progress::Cancelled);
    }

    #[test]
    fn confirmed_summary() {
        let s = ProgressSummary::new(Confirmed, None);
        assert_eq!(s.porcentaje, 20);
        assert_eq!(s.paso_actual, 2);
        assert!(!s.completado);
        assert!(!s.cancelado);
        assert_eq!(s.timeline.len(), 6);
        assert!(s.timeline[1].activo);
        assert!(s.timeline[1].completado);
        assert!(!s.timeline[2].completado);
    }

    #[test]
    fn cancelled_summary_keeps_reached_stages() {
        let s = ProgressSummary::new(Cancelled, Some(PickedUp));
        assert!(s.cancelado);
        assert!(s.completado);
        assert_eq!(s.fraction, None);
        assert_eq!(s.paso_actual, 0);
        let done: Vec<_> = s.timeline.iter().filter(|t| t.completado).map(|t| t.codigo).collect();
        assert_eq!(done, vec![Pending, Confirmed, PickedUp]);
        assert!(s.timeline.iter().all(|t| !t.activo));
    }

    #[test]
    fn fraction_is_omitted_from_json_when_cancelled() {
        let json = serde_json::to_value(ProgressSummary::new(Cancelled, None)).unwrap();
        assert!(json.get("fraction").is_none());
        assert_eq!(json["cancelado"], true);
    }
}
