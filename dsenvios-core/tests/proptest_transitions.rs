use dsenvios_core::{Progress, ProgressSummary, ShipmentStatus, TrackingNumber, FORWARD_CHAIN};
use proptest::prelude::*;

fn arb_status() -> impl Strategy<Value = ShipmentStatus> {
    prop::sample::select(ShipmentStatus::ALL.to_vec())
}

proptest! {
    /// Property: the only legal edges are one step forward or into cancelled
    #[test]
    fn prop_legal_edges_are_forward_or_cancel(from in arb_status(), to in arb_status()) {
        let expected = match (from.chain_position(), to) {
            (_, _) if from.is_terminal() => false,
            (Some(_), ShipmentStatus::Cancelled) => true,
            (Some(i), to) => to.chain_position() == Some(i + 1),
            (None, _) => false,
        };
        prop_assert_eq!(from.can_transition_to(to), expected, "{} -> {}", from, to);
    }

    /// Property: terminal states have no way out
    #[test]
    fn prop_terminal_states_are_sinks(to in arb_status()) {
        prop_assert!(!ShipmentStatus::Delivered.can_transition_to(to));
        prop_assert!(!ShipmentStatus::Cancelled.can_transition_to(to));
    }

    /// Property: any walk through legal edges keeps progress non-decreasing
    /// until it reaches cancelled
    #[test]
    fn prop_progress_never_goes_backwards(choices in prop::collection::vec(any::<prop::sample::Index>(), 0..12)) {
        let mut current = ShipmentStatus::Pending;
        let mut last = 0.0_f64;

        for choice in choices {
            let next = current.next_states();
            if next.is_empty() {
                break;
            }
            current = next[choice.index(next.len())];
            match Progress::of(current) {
                Progress::Fraction(f) => {
                    prop_assert!(f > last);
                    last = f;
                }
                Progress::Cancelled => prop_assert!(current.is_terminal()),
            }
        }
    }

    /// Property: percentage matches the chain index
    #[test]
    fn prop_percentage_matches_position(index in 0usize..FORWARD_CHAIN.len()) {
        let summary = ProgressSummary::new(FORWARD_CHAIN[index], None);
        prop_assert_eq!(summary.porcentaje as usize, index * 20);
        prop_assert_eq!(summary.paso_actual as usize, index + 1);
        prop_assert_eq!(summary.timeline.iter().filter(|s| s.completado).count(), index + 1);
    }

    /// Property: tracking numbers never panic and normalize idempotently
    #[test]
    fn prop_tracking_number_normalization_is_stable(raw in "\\PC{0,40}") {
        if let Ok(n) = TrackingNumber::new(&raw) {
            let again = TrackingNumber::new(n.as_str()).unwrap();
            prop_assert_eq!(again, n);
        }
    }
}
