//! Engine + projector properties over random transition requests

use dsenvios_core::{EventMetadata, NewShipment, Party, Progress, ShipmentStatus, TrackingNumber};
use dsenvios_server::db::{MemoryBackend, Pool, PoolOptions};
use dsenvios_server::{StatusEngine, TrackingProjector, TransitionError};
use proptest::prelude::*;

fn arb_status() -> impl Strategy<Value = ShipmentStatus> {
    prop::sample::select(ShipmentStatus::ALL.to_vec())
}

fn new_shipment(tracking: &TrackingNumber) -> NewShipment {
    NewShipment {
        tracking_number: Some(tracking.clone()),
        sender: Party {
            name: "Remitente".into(),
            phone: None,
        },
        recipient: Party {
            name: "Destinatario".into(),
            phone: None,
        },
        origin_warehouse: None,
        destination_warehouse: None,
        service_type: "STANDARD".into(),
        weight_kg: 1.0,
        declared_value: None,
        cost: 5.0,
        description: None,
        notes: None,
        initial: EventMetadata::default(),
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: after every request the projection matches a model of the
    /// transition table; illegal requests change nothing, repeats append nothing
    #[test]
    fn prop_projection_follows_model(targets in prop::collection::vec(arb_status(), 1..12)) {
        runtime().block_on(async {
            let pool = Pool::new(MemoryBackend::new(), PoolOptions::default());
            let engine = StatusEngine::new(&pool);
            let projector = TrackingProjector::new(&pool);
            let trk = TrackingNumber::new("TRK-PROP-1").unwrap();
            engine.create(new_shipment(&trk)).await.unwrap();

            let mut current = ShipmentStatus::Pending;
            let mut history_len = 1;

            for target in targets {
                let result = engine.transition(&trk, target, EventMetadata::default()).await;
                if target == current {
                    prop_assert_eq!(result.unwrap().status, current);
                } else if current.can_transition_to(target) {
                    prop_assert_eq!(result.unwrap().seq, history_len as i64 + 1);
                    current = target;
                    history_len += 1;
                } else {
                    let is_illegal = matches!(
                        result,
                        Err(TransitionError::IllegalTransition { from, to }) if from == current && to == target
                    );
                    prop_assert!(is_illegal);
                }

                let projection = projector.project(&trk).await.unwrap();
                prop_assert_eq!(projection.current_status(), current);
                prop_assert_eq!(projection.historial.len(), history_len);
                prop_assert_eq!(projection.progress(), Progress::of(current));
            }
            Ok(())
        })?;
    }

    /// Property: history comes back ordered by sequence with strictly
    /// increasing timestamps, ending in the current status
    #[test]
    fn prop_history_is_strictly_ordered(steps in 0usize..=5, cancel in any::<bool>()) {
        runtime().block_on(async {
            let pool = Pool::new(MemoryBackend::new(), PoolOptions::default());
            let engine = StatusEngine::new(&pool);
            let trk = TrackingNumber::new("TRK-PROP-2").unwrap();
            engine.create(new_shipment(&trk)).await.unwrap();

            let mut path: Vec<ShipmentStatus> = dsenvios_core::FORWARD_CHAIN[1..=steps].to_vec();
            if cancel && steps < 5 {
                path.push(ShipmentStatus::Cancelled);
            }
            for target in &path {
                engine.transition(&trk, *target, EventMetadata::default()).await.unwrap();
            }

            let projection = TrackingProjector::new(&pool).project(&trk).await.unwrap();
            let seqs: Vec<i64> = projection.historial.iter().map(|h| h.seq).collect();
            prop_assert_eq!(seqs, (1..=path.len() as i64 + 1).collect::<Vec<_>>());
            prop_assert!(projection.historial.windows(2).all(|w| w[0].fecha < w[1].fecha));
            prop_assert_eq!(
                projection.historial.last().map(|h| h.estado),
                Some(projection.current_status())
            );
            Ok(())
        })?;
    }
}
