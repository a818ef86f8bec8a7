//! Experiment: the stateful facade binding a search space, an EVC version,
//! an algorithm configuration, and a storage backend (spec §3 "Experiment",
//! §4.6's "current experiment version").
//!
//! Mirrors the role `TransactionController` plays for a connection in the
//! teacher crate: a thin struct wrapping state plus a handful of queries
//! delegated to the storage layer, rather than owning any data itself.

use orion_error::{OrionError, Result};
use orion_evc::Refers;
use orion_space::Space;
use orion_storage::{ExperimentPatch, ExperimentQuery, ExperimentRecord, StorageBackend};
use orion_trial::Status;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};

/// Per-experiment budgets and identity (spec §3 Experiment fields not owned
/// by storage).
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    pub name: String,
    pub version: u32,
    pub user: String,
    pub space: Space,
    pub algorithm: serde_json::Value,
    pub max_trials: Option<u64>,
    pub max_broken: u32,
    pub pool_size: u32,
    pub metadata: serde_json::Value,
    pub refers: Refers,
}

impl ExperimentConfig {
    /// Stable identity over the parts of the configuration that define
    /// "the same experiment version" (spec §3: name, version, space,
    /// algorithm). Independent of storage-assigned ids so two processes
    /// building the same configuration agree without coordinating.
    #[must_use]
    pub fn code_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.name.as_bytes());
        hasher.update(self.version.to_le_bytes());
        hasher.update(self.space.canonical().as_bytes());
        hasher.update(self.algorithm.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// A bound experiment: configuration plus the storage it reads and writes
/// through (spec §4.6, §4.7, §4.8 all operate against this type).
pub struct Experiment {
    pub record: ExperimentRecord,
    pub config: ExperimentConfig,
    storage: Arc<dyn StorageBackend>,
}

impl Experiment {
    /// Registers a brand-new experiment version with storage (spec §4.2
    /// "no conflicts" path, §4.6 step 1 when no prior version exists).
    pub fn create(config: ExperimentConfig, storage: Arc<dyn StorageBackend>) -> Result<Self> {
        let id = config.code_hash();
        let record = ExperimentRecord {
            id: id.clone(),
            name: config.name.clone(),
            version: config.version,
            user: config.user.clone(),
            config: serde_json::json!({
                "space": config.space.canonical(),
                "algorithm": config.algorithm,
                "max_trials": config.max_trials,
                "max_broken": config.max_broken,
                "pool_size": config.pool_size,
                "metadata": config.metadata,
                "refers": {
                    "root_id": config.refers.root_id,
                    "parent_id": config.refers.parent_id,
                },
            }),
        };
        let record = storage.create_experiment(record)?;
        info!(experiment_id = %record.id, name = %record.name, version = record.version, "orion.experiment::create registered experiment version");
        Ok(Self { record, config, storage })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.record.id
    }

    /// `is_done` (spec §3, §4.8): `max_trials` is unset or not yet reached.
    #[must_use]
    pub fn is_done(&self) -> bool {
        match self.config.max_trials {
            Some(max) => self.storage.count_completed_trials(self.id()) as u64 >= max,
            None => false,
        }
    }

    /// `is_broken` (spec §3, §7 `BrokenExperiment`): too many trials ended
    /// in the `broken` status.
    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.storage.count_broken_trials(self.id()) as u32 >= self.config.max_broken
    }

    /// Returns `Err(BrokenExperiment)` once the broken-trial budget is
    /// exceeded, for call sites that need to fail fast rather than poll
    /// `is_broken` (spec §7).
    pub fn check_not_broken(&self) -> Result<()> {
        if self.is_broken() {
            warn!(experiment_id = %self.id(), max_broken = self.config.max_broken, "orion.experiment::check_not_broken exceeded max_broken");
            return Err(OrionError::BrokenExperiment {
                name: self.config.name.clone(),
                max_broken: self.config.max_broken,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn stats(&self) -> ExperimentStats {
        ExperimentStats {
            completed: self.storage.count_completed_trials(self.id()) as u64,
            broken: self.storage.count_broken_trials(self.id()) as u64,
            pending: self.storage.fetch_pending_trials(self.id()).len() as u64,
            reserved: self.storage.fetch_trials_by_status(self.id(), Status::Reserved).len() as u64,
        }
    }

    pub fn update_metadata(&mut self, metadata: serde_json::Value) -> Result<()> {
        self.config.metadata = metadata.clone();
        let patch = ExperimentPatch {
            name: None,
            config: Some(serde_json::json!({
                "space": self.config.space.canonical(),
                "algorithm": self.config.algorithm,
                "max_trials": self.config.max_trials,
                "max_broken": self.config.max_broken,
                "pool_size": self.config.pool_size,
                "metadata": metadata,
                "refers": {
                    "root_id": self.config.refers.root_id,
                    "parent_id": self.config.refers.parent_id,
                },
            })),
        };
        self.storage.update_experiment(self.id(), patch)
    }

    /// Looks up every registered version of an experiment by name (spec
    /// §4.4: the EVC tree is built from these).
    #[must_use]
    pub fn fetch_versions(storage: &dyn StorageBackend, name: &str) -> Vec<ExperimentRecord> {
        storage.fetch_experiments(&ExperimentQuery { name: Some(name.to_owned()), user: None })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExperimentStats {
    pub completed: u64,
    pub broken: u64,
    pub pending: u64,
    pub reserved: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use orion_adapters::AdapterChain;
    use orion_space::{Dimension, Prior};
    use orion_storage::MemoryStorage;
    use orion_trial::{Param, Trial};
    use orion_types::{ParamKind, Timestamp, Value};

    fn config(max_trials: Option<u64>, max_broken: u32) -> ExperimentConfig {
        let mut space = Space::new();
        space.insert(Dimension::new("lr", Prior::parse("uniform(0,1)").unwrap(), ParamKind::Real)).unwrap();
        ExperimentConfig {
            name: "exp".into(),
            version: 1,
            user: "tester".into(),
            space,
            algorithm: serde_json::json!({"kind": "random"}),
            max_trials,
            max_broken,
            pool_size: 1,
            metadata: serde_json::json!({}),
            refers: Refers { root_id: "exp".into(), parent_id: None, adapter_chain: AdapterChain::default() },
        }
    }

    #[test]
    fn create_registers_with_a_stable_code_hash_id() {
        let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
        let experiment = Experiment::create(config(Some(2), 1), storage).unwrap();
        assert_eq!(experiment.id(), experiment.config.code_hash());
    }

    #[test]
    fn is_done_tracks_completed_trial_count() {
        let storage: Arc<MemoryStorage> = Arc::new(MemoryStorage::new());
        let backend: Arc<dyn StorageBackend> = storage.clone();
        let experiment = Experiment::create(config(Some(1), 3), backend).unwrap();
        assert!(!experiment.is_done());

        let trial = Trial::new(experiment.id(), vec![Param { name: "lr".into(), kind: ParamKind::Real, value: Value::Real(0.5) }]);
        storage.register_trial(trial.clone()).unwrap();
        storage.reserve_trial(experiment.id(), 60_000, Timestamp(1)).unwrap();
        storage.set_trial_status(&trial.id, Status::Completed, Some(Timestamp(1)), Timestamp(2)).unwrap();

        assert!(experiment.is_done());
    }

    #[test]
    fn check_not_broken_fails_past_max_broken() {
        let storage: Arc<MemoryStorage> = Arc::new(MemoryStorage::new());
        let backend: Arc<dyn StorageBackend> = storage.clone();
        let experiment = Experiment::create(config(None, 0), backend).unwrap();
        let trial = Trial::new(experiment.id(), vec![Param { name: "lr".into(), kind: ParamKind::Real, value: Value::Real(0.5) }]);
        storage.register_trial(trial.clone()).unwrap();
        storage.reserve_trial(experiment.id(), 60_000, Timestamp(1)).unwrap();
        storage.set_trial_status(&trial.id, Status::Broken, Some(Timestamp(1)), Timestamp(2)).unwrap();

        let err = experiment.check_not_broken().unwrap_err();
        assert!(matches!(err, OrionError::BrokenExperiment { .. }));
    }
}
