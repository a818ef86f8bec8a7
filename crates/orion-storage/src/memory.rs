use crate::{ExperimentPatch, ExperimentQuery, ExperimentRecord, StorageBackend};
use orion_error::{OrionError, Result};
use orion_trial::{Status, Trial, TrialResult};
use orion_types::Timestamp;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Default)]
struct Inner {
    experiments: Vec<ExperimentRecord>,
    trials: Vec<Trial>,
    trial_index: HashMap<String, usize>,
    lies: HashMap<String, Trial>,
}

impl Inner {
    fn sweep_heartbeats(&mut self, experiment_id: &str, heartbeat_ttl_ms: u64, now: Timestamp) {
        for trial in &mut self.trials {
            if trial.experiment_id != experiment_id || trial.status != Status::Reserved {
                continue;
            }
            let expired = trial
                .timestamps
                .heartbeat
                .is_none_or(|hb| now.saturating_sub(hb) > heartbeat_ttl_ms);
            if expired {
                debug!(trial_id = %trial.id, "orion.storage::reserve heartbeat expired, recovering");
                trial.status = Status::Interrupted;
            }
        }
    }
}

/// In-process `StorageBackend`, grounded on `fsqlite-pager`'s
/// `Arc<Mutex<PagerInner>>` pattern: one coarse lock gives `reserve_trial`
/// check-then-set semantics without a lock-free structure.
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn create_experiment(&self, record: ExperimentRecord) -> Result<ExperimentRecord> {
        let mut inner = self.inner.lock();
        if inner.experiments.iter().any(|e| e.name == record.name && e.version == record.version && e.user == record.user) {
            return Err(OrionError::duplicate_key("experiment", record.id.clone()));
        }
        inner.experiments.push(record.clone());
        Ok(record)
    }

    fn update_experiment(&self, id: &str, patch: ExperimentPatch) -> Result<()> {
        let mut inner = self.inner.lock();
        let record = inner
            .experiments
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| OrionError::not_found("experiment", id))?;
        if let Some(name) = patch.name {
            record.name = name;
        }
        if let Some(config) = patch.config {
            record.config = config;
        }
        Ok(())
    }

    fn fetch_experiments(&self, query: &ExperimentQuery) -> Vec<ExperimentRecord> {
        let inner = self.inner.lock();
        inner
            .experiments
            .iter()
            .filter(|e| query.name.as_deref().is_none_or(|n| n == e.name))
            .filter(|e| query.user.as_deref().is_none_or(|u| u == e.user))
            .cloned()
            .collect()
    }

    fn register_trial(&self, trial: Trial) -> Result<Trial> {
        let mut inner = self.inner.lock();
        if inner.trial_index.contains_key(&trial.id) {
            return Err(OrionError::duplicate_key("trial", trial.id.clone()));
        }
        inner.trial_index.insert(trial.id.clone(), inner.trials.len());
        inner.trials.push(trial.clone());
        Ok(trial)
    }

    fn get_trial(&self, id: &str) -> Option<Trial> {
        let inner = self.inner.lock();
        inner.trial_index.get(id).map(|&i| inner.trials[i].clone())
    }

    fn fetch_trials(&self, experiment_id: &str) -> Vec<Trial> {
        let inner = self.inner.lock();
        inner.trials.iter().filter(|t| t.experiment_id == experiment_id).cloned().collect()
    }

    fn fetch_trials_by_status(&self, experiment_id: &str, status: Status) -> Vec<Trial> {
        let inner = self.inner.lock();
        inner
            .trials
            .iter()
            .filter(|t| t.experiment_id == experiment_id && t.status == status)
            .cloned()
            .collect()
    }

    fn fetch_noncompleted_trials(&self, experiment_id: &str) -> Vec<Trial> {
        let inner = self.inner.lock();
        inner
            .trials
            .iter()
            .filter(|t| t.experiment_id == experiment_id && t.status != Status::Completed)
            .cloned()
            .collect()
    }

    fn fetch_pending_trials(&self, experiment_id: &str) -> Vec<Trial> {
        let inner = self.inner.lock();
        inner
            .trials
            .iter()
            .filter(|t| t.experiment_id == experiment_id && matches!(t.status, Status::New | Status::Reserved | Status::Interrupted | Status::Suspended))
            .cloned()
            .collect()
    }

    fn fetch_lost_trials(&self, experiment_id: &str, heartbeat_ttl_ms: u64, now: Timestamp) -> Vec<Trial> {
        let inner = self.inner.lock();
        inner
            .trials
            .iter()
            .filter(|t| {
                t.experiment_id == experiment_id
                    && t.status == Status::Reserved
                    && t.timestamps.heartbeat.is_none_or(|hb| now.saturating_sub(hb) > heartbeat_ttl_ms)
            })
            .cloned()
            .collect()
    }

    fn reserve_trial(&self, experiment_id: &str, heartbeat_ttl_ms: u64, now: Timestamp) -> Option<Trial> {
        let mut inner = self.inner.lock();
        inner.sweep_heartbeats(experiment_id, heartbeat_ttl_ms, now);

        let index = inner
            .trials
            .iter()
            .position(|t| t.experiment_id == experiment_id && t.status.is_reservable())?;

        let trial = &mut inner.trials[index];
        trial.status = Status::Reserved;
        trial.timestamps.start_time.get_or_insert(now);
        trial.timestamps.heartbeat = Some(now);
        debug!(trial_id = %trial.id, %experiment_id, "orion.storage::reserve reserved trial");
        Some(trial.clone())
    }

    fn set_trial_status(&self, trial_id: &str, status: Status, expected_heartbeat: Option<Timestamp>, now: Timestamp) -> Result<Trial> {
        let mut inner = self.inner.lock();
        let index = *inner
            .trial_index
            .get(trial_id)
            .ok_or_else(|| OrionError::not_found("trial", trial_id))?;

        let current_status = inner.trials[index].status;
        let current_heartbeat = inner.trials[index].timestamps.heartbeat;
        if let Some(expected) = expected_heartbeat {
            if current_heartbeat != Some(expected) {
                return Err(OrionError::failed_update(format!(
                    "heartbeat CAS mismatch for trial {trial_id}"
                )));
            }
        }
        if !current_status.can_transition_to(status) {
            return Err(OrionError::failed_update(format!(
                "illegal transition {current_status:?} -> {status:?} for trial {trial_id}"
            )));
        }

        let trial = &mut inner.trials[index];
        trial.status = status;
        if status.is_terminal() {
            trial.timestamps.end_time = Some(now);
        }
        Ok(trial.clone())
    }

    fn push_trial_results(&self, trial_id: &str, results: Vec<TrialResult>) -> Result<()> {
        let mut inner = self.inner.lock();
        let index = *inner
            .trial_index
            .get(trial_id)
            .ok_or_else(|| OrionError::not_found("trial", trial_id))?;
        inner.trials[index].results = results;
        Ok(())
    }

    fn update_heartbeat(&self, trial_id: &str, now: Timestamp) -> Result<()> {
        let mut inner = self.inner.lock();
        let index = *inner
            .trial_index
            .get(trial_id)
            .ok_or_else(|| OrionError::not_found("trial", trial_id))?;
        if inner.trials[index].status != Status::Reserved {
            warn!(trial_id, "orion.storage::heartbeat updating heartbeat of a non-reserved trial");
        }
        inner.trials[index].timestamps.heartbeat = Some(now);
        Ok(())
    }

    fn register_lie(&self, trial: Trial) -> Result<Trial> {
        let mut inner = self.inner.lock();
        if inner.lies.contains_key(&trial.id) {
            return Err(OrionError::duplicate_key("lie", trial.id.clone()));
        }
        inner.lies.insert(trial.id.clone(), trial.clone());
        Ok(trial)
    }

    fn count_completed_trials(&self, experiment_id: &str) -> usize {
        let inner = self.inner.lock();
        inner.trials.iter().filter(|t| t.experiment_id == experiment_id && t.status == Status::Completed).count()
    }

    fn count_broken_trials(&self, experiment_id: &str) -> usize {
        let inner = self.inner.lock();
        inner.trials.iter().filter(|t| t.experiment_id == experiment_id && t.status == Status::Broken).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orion_trial::Param;
    use orion_types::{ParamKind, Value};
    use std::sync::Arc;
    use std::thread;

    fn trial(experiment_id: &str, v: f64) -> Trial {
        Trial::new(experiment_id, vec![Param { name: "a".into(), kind: ParamKind::Real, value: Value::Real(v) }])
    }

    #[test]
    fn register_trial_rejects_duplicates() {
        let storage = MemoryStorage::new();
        let t = trial("exp", 1.0);
        storage.register_trial(t.clone()).unwrap();
        let err = storage.register_trial(t).unwrap_err();
        assert!(matches!(err, OrionError::DuplicateKey { .. }));
    }

    #[test]
    fn reserve_trial_is_exclusive_under_concurrency() {
        let storage = Arc::new(MemoryStorage::new());
        storage.register_trial(trial("exp", 1.0)).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let storage = Arc::clone(&storage);
                thread::spawn(move || storage.reserve_trial("exp", 60_000, Timestamp(1)))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let reserved = results.into_iter().filter(Option::is_some).count();
        assert_eq!(reserved, 1);
    }

    #[test]
    fn reserve_trial_with_m_eligible_returns_min_n_m_distinct() {
        let storage = Arc::new(MemoryStorage::new());
        for i in 0..3 {
            storage.register_trial(trial("exp", f64::from(i))).unwrap();
        }

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let storage = Arc::clone(&storage);
                thread::spawn(move || storage.reserve_trial("exp", 60_000, Timestamp(1)))
            })
            .collect();

        let mut ids = std::collections::HashSet::new();
        let mut none_count = 0;
        for h in handles {
            match h.join().unwrap() {
                Some(t) => {
                    ids.insert(t.id);
                }
                None => none_count += 1,
            }
        }
        assert_eq!(ids.len(), 3);
        assert_eq!(none_count, 5);
    }

    #[test]
    fn heartbeat_recovery_makes_trial_reservable_again() {
        let storage = MemoryStorage::new();
        storage.register_trial(trial("exp", 1.0)).unwrap();
        let reserved = storage.reserve_trial("exp", 1_000, Timestamp(0)).unwrap();
        assert_eq!(reserved.status, Status::Reserved);

        // No eligible trial yet: TTL has not expired.
        assert!(storage.reserve_trial("exp", 1_000, Timestamp(500)).is_none());

        // Past TTL, the sweep recovers it into `interrupted` then
        // immediately re-reserves it.
        let recovered = storage.reserve_trial("exp", 1_000, Timestamp(2_000)).unwrap();
        assert_eq!(recovered.id, reserved.id);
        assert_eq!(recovered.status, Status::Reserved);
    }

    #[test]
    fn set_trial_status_rejects_cas_mismatch() {
        let storage = MemoryStorage::new();
        storage.register_trial(trial("exp", 1.0)).unwrap();
        let reserved = storage.reserve_trial("exp", 60_000, Timestamp(1)).unwrap();
        let stale_heartbeat = Some(Timestamp(0));
        let err = storage
            .set_trial_status(&reserved.id, Status::Completed, stale_heartbeat, Timestamp(2))
            .unwrap_err();
        assert!(matches!(err, OrionError::FailedUpdate { .. }));
    }

    #[test]
    fn lies_never_appear_in_fetch_trials() {
        let storage = MemoryStorage::new();
        let lie = trial("exp", 42.0);
        storage.register_lie(lie.clone()).unwrap();
        assert!(storage.fetch_trials("exp").is_empty());
        assert!(storage.get_trial(&lie.id).is_none());
    }

    #[test]
    fn completed_count_is_monotonically_non_decreasing() {
        let storage = MemoryStorage::new();
        storage.register_trial(trial("exp", 1.0)).unwrap();
        let t = storage.reserve_trial("exp", 60_000, Timestamp(1)).unwrap();
        assert_eq!(storage.count_completed_trials("exp"), 0);
        storage.set_trial_status(&t.id, Status::Completed, Some(Timestamp(1)), Timestamp(2)).unwrap();
        assert_eq!(storage.count_completed_trials("exp"), 1);
    }
}
