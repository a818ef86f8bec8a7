//! Worker loop (spec §4.8): reserve a trial, consume it, or ask the
//! producer to refill the pool, until the experiment is done, broken, or
//! this worker's `worker_trials` quota is spent.
//!
//! Grounded on `original_source/src/orion/core/worker/__init__.py`'s
//! `workon` loop, translated from Python's "return an int" convention into
//! [`WorkerExit`] so callers (the CLI) decide how to map it to a process
//! exit code.

use orion_consumer::{Consumer, Outcome};
use orion_experiment::Experiment;
use orion_producer::Producer;
use orion_storage::StorageBackend;
use orion_trial::Status;
use orion_types::Timestamp;
use tracing::{error, info, warn};

/// Mirrors spec §6's exit code table: 0 normal, 1 broken, 2 propagated
/// child misuse. `>2` is reserved for errors the worker loop itself never
/// produces (caller-side unhandled errors).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Done,
    Broken,
    PoolSaturated,
    ChildMisuse,
}

impl WorkerExit {
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            WorkerExit::Done | WorkerExit::PoolSaturated => 0,
            WorkerExit::Broken => 1,
            WorkerExit::ChildMisuse => 2,
        }
    }
}

/// Number of `reserved`-or-running trials belonging to `experiment_id`,
/// used to detect when too many workers are already active for
/// `pool_size` (spec §4.8 `workers_running`).
fn workers_running(storage: &dyn StorageBackend, experiment_id: &str) -> usize {
    storage.fetch_trials_by_status(experiment_id, Status::Reserved).len()
}

fn now() -> Timestamp {
    Timestamp(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default(),
    )
}

/// Runs the loop from spec §4.8's pseudocode until `worker_trials` trials
/// have been completed by this worker, the experiment is done, or it is
/// found broken.
pub fn workon(
    experiment: &Experiment,
    producer: &mut Producer<'_>,
    consumer: &Consumer<'_>,
    storage: &dyn StorageBackend,
    heartbeat_ttl_ms: u64,
    worker_trials: Option<u64>,
) -> WorkerExit {
    let mut completed_by_this_worker = 0u64;
    info!(experiment_id = experiment.id(), "orion.worker::workon starting");

    loop {
        if experiment.is_broken() {
            error!(experiment_id = experiment.id(), "orion.worker::workon experiment broken, too many failed trials");
            return WorkerExit::Broken;
        }

        let running = workers_running(storage, experiment.id());
        if running >= experiment.config.pool_size as usize {
            warn!(running, pool_size = experiment.config.pool_size, "orion.worker::workon too many concurrent workers, terminating");
            return WorkerExit::PoolSaturated;
        }

        match storage.reserve_trial(experiment.id(), heartbeat_ttl_ms, now()) {
            None => {
                producer.update();
                if experiment.is_done() {
                    info!(experiment_id = experiment.id(), "orion.worker::workon experiment is done");
                    return WorkerExit::Done;
                }
                producer.produce();
            }
            Some(trial) => match consumer.consume(&trial) {
                Ok(Outcome::Completed(results)) => {
                    if let Err(err) = storage.push_trial_results(&trial.id, results) {
                        warn!(%err, trial_id = %trial.id, "orion.worker::workon lost the race pushing trial results");
                    }
                    if let Err(err) = storage.set_trial_status(&trial.id, Status::Completed, trial.timestamps.heartbeat, now()) {
                        warn!(%err, trial_id = %trial.id, "orion.worker::workon lost the race marking trial completed");
                    }
                    completed_by_this_worker += 1;
                }
                Ok(Outcome::Broken) => {
                    if let Err(err) = storage.set_trial_status(&trial.id, Status::Broken, trial.timestamps.heartbeat, now()) {
                        warn!(%err, trial_id = %trial.id, "orion.worker::workon lost the race marking trial broken");
                    }
                }
                Ok(Outcome::Interrupted) => {
                    if let Err(err) = storage.set_trial_status(&trial.id, Status::Interrupted, trial.timestamps.heartbeat, now()) {
                        warn!(%err, trial_id = %trial.id, "orion.worker::workon lost the race marking trial interrupted");
                    }
                }
                Ok(Outcome::Suspended) => {
                    if let Err(err) = storage.set_trial_status(&trial.id, Status::Suspended, trial.timestamps.heartbeat, now()) {
                        warn!(%err, trial_id = %trial.id, "orion.worker::workon lost the race marking trial suspended");
                    }
                }
                Err(err) => {
                    error!(%err, trial_id = %trial.id, "orion.worker::workon consumer propagated an error, terminating worker");
                    return WorkerExit::ChildMisuse;
                }
            },
        }

        if worker_trials.is_some_and(|quota| completed_by_this_worker >= quota) {
            info!(completed_by_this_worker, "orion.worker::workon worker trial quota reached");
            return WorkerExit::Done;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orion_adapters::AdapterChain;
    use orion_evc::Refers;
    use orion_experiment::ExperimentConfig;
    use orion_producer::{MaxObservedLie, RandomSearch};
    use orion_space::{Dimension, Prior, Space, Template};
    use orion_storage::MemoryStorage;
    use orion_types::ParamKind;
    use std::sync::Arc;

    fn make_experiment(storage: Arc<dyn StorageBackend>, max_trials: Option<u64>) -> Experiment {
        let mut space = Space::new();
        space.insert(Dimension::new("lr", Prior::parse("uniform(0,1)").unwrap(), ParamKind::Real)).unwrap();
        let config = ExperimentConfig {
            name: "exp".into(),
            version: 1,
            user: "tester".into(),
            space,
            algorithm: serde_json::json!({"kind": "random"}),
            max_trials,
            max_broken: 10,
            pool_size: 4,
            metadata: serde_json::json!({}),
            refers: Refers { root_id: "exp".into(), parent_id: None, adapter_chain: AdapterChain::default() },
        };
        Experiment::create(config, storage).unwrap()
    }

    #[test]
    fn workon_returns_done_when_no_trials_requested() {
        let storage: Arc<MemoryStorage> = Arc::new(MemoryStorage::new());
        let backend: Arc<dyn StorageBackend> = storage.clone();
        let experiment = make_experiment(backend, Some(0));
        let space = experiment.config.space.clone();
        let template = Template::default();
        let mut producer = Producer::new(experiment.id(), &space, 1, Box::new(RandomSearch::new(experiment.id())), Box::new(MaxObservedLie), storage.as_ref());
        let consumer = Consumer::new("exp", "true", &template);

        let exit = workon(&experiment, &mut producer, &consumer, storage.as_ref(), 60_000, None);
        assert_eq!(exit, WorkerExit::Done);
    }

    #[test]
    fn workon_reports_pool_saturation() {
        let storage: Arc<MemoryStorage> = Arc::new(MemoryStorage::new());
        let backend: Arc<dyn StorageBackend> = storage.clone();
        let experiment = make_experiment(backend, None);
        // Fill the pool with already-reserved trials so `workers_running`
        // meets `pool_size` before the loop does anything else.
        for i in 0..experiment.config.pool_size {
            let trial = orion_trial::Trial::new(
                experiment.id(),
                vec![orion_trial::Param { name: "lr".into(), kind: ParamKind::Real, value: orion_types::Value::Real(f64::from(i) / 10.0) }],
            );
            storage.register_trial(trial).unwrap();
        }
        for _ in 0..experiment.config.pool_size {
            storage.reserve_trial(experiment.id(), 60_000, Timestamp(1));
        }

        let space = experiment.config.space.clone();
        let template = Template::default();
        let mut producer = Producer::new(experiment.id(), &space, 1, Box::new(RandomSearch::new(experiment.id())), Box::new(MaxObservedLie), storage.as_ref());
        let consumer = Consumer::new("exp", "true", &template);

        let exit = workon(&experiment, &mut producer, &consumer, storage.as_ref(), 60_000, None);
        assert_eq!(exit, WorkerExit::PoolSaturated);
    }
}
