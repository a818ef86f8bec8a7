//! Storage protocol (spec §4.5): the backend-agnostic contract every
//! storage implementation must uphold, plus one concrete in-process
//! backend used by the worker loop, the producer, and the test harness.
//!
//! The atomic `reserve_trial` CAS and the heartbeat recovery sweep are the
//! hardest invariants here; `MemoryStorage` gets them for free from a
//! single coarse lock, the same trick `fsqlite-pager`'s `PagerInner` uses
//! rather than lock-free structures.

mod memory;

pub use memory::MemoryStorage;

use orion_error::Result;
use orion_trial::{Status, Trial, TrialResult};
use orion_types::Timestamp;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub id: String,
    pub name: String,
    pub version: u32,
    pub user: String,
    /// Opaque experiment configuration (space canonical form, algorithm,
    /// budgets, metadata); storage never interprets it.
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct ExperimentQuery {
    pub name: Option<String>,
    pub user: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ExperimentPatch {
    pub name: Option<String>,
    pub config: Option<serde_json::Value>,
}

/// Backend contract from spec §4.5's protocol table.
pub trait StorageBackend: Send + Sync {
    fn create_experiment(&self, record: ExperimentRecord) -> Result<ExperimentRecord>;
    fn update_experiment(&self, id: &str, patch: ExperimentPatch) -> Result<()>;
    fn fetch_experiments(&self, query: &ExperimentQuery) -> Vec<ExperimentRecord>;

    fn register_trial(&self, trial: Trial) -> Result<Trial>;
    fn get_trial(&self, id: &str) -> Option<Trial>;
    fn fetch_trials(&self, experiment_id: &str) -> Vec<Trial>;
    fn fetch_trials_by_status(&self, experiment_id: &str, status: Status) -> Vec<Trial>;
    fn fetch_noncompleted_trials(&self, experiment_id: &str) -> Vec<Trial>;
    fn fetch_pending_trials(&self, experiment_id: &str) -> Vec<Trial>;
    /// `reserved` trials whose heartbeat has expired, without recovering
    /// them (pure query; the sweep inside `reserve_trial` does the CAS).
    fn fetch_lost_trials(&self, experiment_id: &str, heartbeat_ttl_ms: u64, now: Timestamp) -> Vec<Trial>;

    /// Atomically transitions exactly one eligible trial (`new | interrupted
    /// | suspended`) to `reserved`, stamping `start_time` and `heartbeat`.
    /// Runs the heartbeat-recovery sweep first (spec §4.5).
    fn reserve_trial(&self, experiment_id: &str, heartbeat_ttl_ms: u64, now: Timestamp) -> Option<Trial>;

    fn set_trial_status(&self, trial_id: &str, status: Status, expected_heartbeat: Option<Timestamp>, now: Timestamp) -> Result<Trial>;
    fn push_trial_results(&self, trial_id: &str, results: Vec<TrialResult>) -> Result<()>;
    fn update_heartbeat(&self, trial_id: &str, now: Timestamp) -> Result<()>;

    /// Persists a fabricated completed trial (spec §3 "Lie"). Lies are
    /// keyed by id and never returned from `fetch_trials`.
    fn register_lie(&self, trial: Trial) -> Result<Trial>;

    fn count_completed_trials(&self, experiment_id: &str) -> usize;
    fn count_broken_trials(&self, experiment_id: &str) -> usize;
}
