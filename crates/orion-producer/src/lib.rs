//! Algorithm interface, a deterministic random-search implementation, lie
//! strategies, and the trial producer (spec §4.6).

use orion_space::Space;
use orion_storage::StorageBackend;
use orion_trial::{hash_params, Param, Status, Trial, TrialResult};
use orion_types::{ResultKind, Timestamp, Value};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use tracing::{debug, warn};

/// A candidate point in the search space: one value per dimension.
pub type Point = Vec<Param>;

/// Suggestion/observation interface every optimizer implements (spec §4.6
/// step 1, 5). `suggest` may return fewer than `n` points; callers must not
/// loop waiting for exactly `n`.
pub trait Algorithm: Send {
    fn suggest(&mut self, n: usize, space: &Space) -> Vec<Point>;

    /// Must be idempotent: observing the same trial twice has the same
    /// effect as observing it once (spec §4.6 contract).
    fn observe(&mut self, trial: &Trial);

    /// Best objective seen so far, if any have been observed. Used by lie
    /// strategies.
    fn best_objective(&self) -> Option<f64>;
}

/// Deterministic uniform-random sampling, seeded from the experiment id so
/// two processes building the same experiment sample identically (grounded
/// in the teacher's seeded `StdRng::seed_from_u64` usage for reproducible
/// corruption sequences).
pub struct RandomSearch {
    rng: StdRng,
    best_objective: Option<f64>,
}

impl RandomSearch {
    #[must_use]
    pub fn new(experiment_id: &str) -> Self {
        Self { rng: StdRng::seed_from_u64(seed_from_id(experiment_id)), best_objective: None }
    }
}

impl Algorithm for RandomSearch {
    fn suggest(&mut self, n: usize, space: &Space) -> Vec<Point> {
        (0..n)
            .map(|_| {
                space
                    .iter()
                    .map(|dim| Param { name: dim.name.clone(), kind: dim.kind, value: dim.prior.sample(&mut self.rng) })
                    .collect()
            })
            .collect()
    }

    fn observe(&mut self, trial: &Trial) {
        if let Some(objective) = trial.objective().and_then(|r| r.value.as_real()) {
            self.best_objective = Some(self.best_objective.map_or(objective, |best| best.min(objective)));
        }
    }

    fn best_objective(&self) -> Option<f64> {
        self.best_objective
    }
}

fn seed_from_id(id: &str) -> u64 {
    let hash = blake3::hash(id.as_bytes());
    u64::from_le_bytes(hash.as_bytes()[..8].try_into().expect("blake3 hash is >=8 bytes"))
}

/// Fabricates a fake completed trial for a pending trial so the algorithm
/// can suggest concurrently without waiting on real results (spec §3
/// "Lie", §4.6 step 4).
pub trait Strategy: Send {
    fn lie(&self, pending: &Trial, algorithm: &dyn Algorithm) -> Option<Trial>;
}

/// Lies the pending trial as complete with the best objective observed so
/// far; produces nothing if the algorithm has not observed anything yet.
pub struct MaxObservedLie;

impl Strategy for MaxObservedLie {
    fn lie(&self, pending: &Trial, algorithm: &dyn Algorithm) -> Option<Trial> {
        let objective = algorithm.best_objective()?;
        let mut lie = pending.clone();
        lie.id = format!("lie-{}", pending.id);
        lie.status = Status::Completed;
        lie.results = vec![TrialResult { name: "objective".into(), kind: ResultKind::Objective, value: Value::Real(objective) }];
        Some(lie)
    }
}

/// Drives an [`Algorithm`] against storage for one experiment (spec §4.6's
/// five-step contract).
pub struct Producer<'a> {
    experiment_id: String,
    space: &'a Space,
    pool_size: usize,
    algorithm: Box<dyn Algorithm>,
    strategy: Box<dyn Strategy>,
    storage: &'a dyn StorageBackend,
    last_update: Timestamp,
    observed: HashSet<String>,
}

impl<'a> Producer<'a> {
    #[must_use]
    pub fn new(
        experiment_id: impl Into<String>,
        space: &'a Space,
        pool_size: usize,
        algorithm: Box<dyn Algorithm>,
        strategy: Box<dyn Strategy>,
        storage: &'a dyn StorageBackend,
    ) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            space,
            pool_size,
            algorithm,
            strategy,
            storage,
            last_update: Timestamp(0),
            observed: HashSet::new(),
        }
    }

    /// Steps 1-4 of spec §4.6: refill the pending pool, register new
    /// trials deduped by `hash_params`, then register a lie for each
    /// currently-pending trial.
    pub fn produce(&mut self) {
        let existing = self.storage.fetch_trials(&self.experiment_id);
        let mut known_hashes: HashSet<String> = existing.iter().map(|t| hash_params(&t.params)).collect();

        let pending_count = existing.iter().filter(|t| !t.status.is_terminal()).count();
        let deficit = self.pool_size.saturating_sub(pending_count);
        if deficit > 0 {
            let suggestions = self.algorithm.suggest(deficit, self.space);
            for params in suggestions {
                let trial = Trial::new(&self.experiment_id, params);
                let hash = hash_params(&trial.params);
                if !known_hashes.insert(hash) {
                    debug!(trial_id = %trial.id, "orion.producer::produce duplicate suggestion, skipping");
                    continue;
                }
                match self.storage.register_trial(trial) {
                    Ok(registered) => debug!(trial_id = %registered.id, "orion.producer::produce registered trial"),
                    Err(err) if err.is_recoverable_race() => {
                        debug!(%err, "orion.producer::produce lost registration race, continuing");
                    }
                    Err(err) => warn!(%err, "orion.producer::produce failed to register trial"),
                }
            }
        }

        let pending = self.storage.fetch_pending_trials(&self.experiment_id);
        for trial in &pending {
            if let Some(lie) = self.strategy.lie(trial, self.algorithm.as_ref()) {
                // A duplicate lie id just means a previous `produce` call
                // already fabricated one for this trial.
                let _ = self.storage.register_lie(lie);
            }
        }
    }

    /// Step 5: fetch trials completed since the last call and observe them
    /// on the algorithm. Idempotent because `Algorithm::observe` must be.
    pub fn update(&mut self) {
        let completed = self.storage.fetch_trials_by_status(&self.experiment_id, Status::Completed);
        for trial in completed {
            if self.observed.insert(trial.id.clone()) {
                self.algorithm.observe(&trial);
            }
        }
        self.last_update = Timestamp(self.last_update.0 + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orion_space::{Dimension, Prior};
    use orion_storage::MemoryStorage;
    use orion_types::ParamKind;

    fn space() -> Space {
        let mut space = Space::new();
        space.insert(Dimension::new("lr", Prior::parse("uniform(0,1)").unwrap(), ParamKind::Real)).unwrap();
        space
    }

    #[test]
    fn random_search_is_deterministic_for_a_given_experiment_id() {
        let space = space();
        let mut a = RandomSearch::new("exp-1");
        let mut b = RandomSearch::new("exp-1");
        assert_eq!(a.suggest(5, &space), b.suggest(5, &space));
    }

    #[test]
    fn produce_refills_pool_and_dedupes() {
        let storage = MemoryStorage::new();
        let space = space();
        let mut producer = Producer::new("exp", &space, 3, Box::new(RandomSearch::new("exp")), Box::new(MaxObservedLie), &storage);
        producer.produce();
        assert_eq!(storage.fetch_trials("exp").len(), 3);

        // A second call sees a full pool and should not add more.
        producer.produce();
        assert_eq!(storage.fetch_trials("exp").len(), 3);
    }

    #[test]
    fn produce_registers_a_lie_per_pending_trial_once_something_is_observed() {
        let storage = MemoryStorage::new();
        let space = space();
        let mut algorithm = RandomSearch::new("exp");
        let completed = Trial {
            results: vec![TrialResult { name: "objective".into(), kind: ResultKind::Objective, value: Value::Real(0.1) }],
            status: Status::Completed,
            ..Trial::new("exp", algorithm.suggest(1, &space).remove(0))
        };
        algorithm.observe(&completed);

        let mut producer = Producer::new("exp", &space, 1, Box::new(algorithm), Box::new(MaxObservedLie), &storage);
        storage.register_trial(Trial::new("exp", vec![Param { name: "lr".into(), kind: ParamKind::Real, value: Value::Real(0.9) }])).unwrap();
        producer.produce();

        // The one pending trial (pool already full) should have a lie.
        let trials = storage.fetch_trials("exp");
        assert_eq!(trials.len(), 1);
    }

    #[test]
    fn update_is_idempotent_across_repeated_calls() {
        let storage = MemoryStorage::new();
        let space = space();
        let mut producer = Producer::new("exp", &space, 1, Box::new(RandomSearch::new("exp")), Box::new(MaxObservedLie), &storage);
        let trial = Trial::new("exp", vec![Param { name: "lr".into(), kind: ParamKind::Real, value: Value::Real(0.5) }]);
        storage.register_trial(trial.clone()).unwrap();
        storage.reserve_trial("exp", 60_000, Timestamp(1)).unwrap();
        storage.set_trial_status(&trial.id, Status::Completed, Some(Timestamp(1)), Timestamp(2)).unwrap();

        producer.update();
        producer.update();
        assert_eq!(producer.observed.len(), 1);
    }
}
