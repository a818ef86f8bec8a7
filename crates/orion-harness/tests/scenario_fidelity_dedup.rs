//! Spec §8 Scenario 6: "Fidelity-ignoring dedup." An algorithm that
//! suggests the same point twice, differing only in a fidelity dimension,
//! must have the Producer register both — `hash_params` (not the
//! fidelity-ignoring variant) is what the Producer dedupes against.

use orion::{Algorithm, MaxObservedLie, MemoryStorage, Point, Producer, Space, StorageBackend, Trial};
use orion_trial::Param;
use orion_types::{ParamKind, Value};

struct TwoFidelityLevels;

impl Algorithm for TwoFidelityLevels {
    fn suggest(&mut self, n: usize, _space: &Space) -> Vec<Point> {
        [1_i64, 4_i64]
            .into_iter()
            .take(n)
            .map(|epoch| {
                vec![
                    Param { name: "lr".into(), kind: ParamKind::Real, value: Value::Real(0.5) },
                    Param { name: "epoch".into(), kind: ParamKind::Fidelity, value: Value::Integer(epoch) },
                ]
            })
            .collect()
    }

    fn observe(&mut self, _trial: &Trial) {}

    fn best_objective(&self) -> Option<f64> {
        None
    }
}

#[test]
fn suggestions_differing_only_in_fidelity_both_register() {
    let storage = MemoryStorage::new();
    let space = Space::new();
    let mut producer = Producer::new("exp", &space, 2, Box::new(TwoFidelityLevels), Box::new(MaxObservedLie), &storage);

    producer.produce();

    let trials = storage.fetch_trials("exp");
    assert_eq!(trials.len(), 2, "both fidelity variants must register as distinct trials");
}
