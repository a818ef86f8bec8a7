//! Trial record and its status state machine (spec §3).

use orion_error::{OrionError, Result};
use orion_types::{ParamKind, ResultKind, Timestamp, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub name: String,
    pub kind: ResultKind,
    pub value: Value,
}

/// Authoritative state machine (spec §3 "Status transitions"):
///
/// ```text
/// new ──reserve──▶ reserved ──succeed──▶ completed
///                     │      ──fail────▶ broken
///                     │      ──interrupt─▶ interrupted ──reserve──▶ reserved
///                     │      ──suspend──▶ suspended     ──reserve──▶ reserved
///                     └──heartbeat-expire─▶ interrupted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    New,
    Reserved,
    Interrupted,
    Suspended,
    Completed,
    Broken,
}

impl Status {
    /// Trials eligible for `reserve_trial` (spec §4.5).
    #[must_use]
    pub fn is_reservable(self) -> bool {
        matches!(self, Status::New | Status::Interrupted | Status::Suspended)
    }

    /// `completed` and `broken` are terminal (spec §3 invariant).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Broken)
    }

    /// True if `self -> next` is a legal transition in the state machine
    /// above. Used by storage backends to reject malformed `set_trial_status`
    /// calls before they ever reach a CAS.
    #[must_use]
    pub fn can_transition_to(self, next: Status) -> bool {
        use Status::{Broken, Completed, Interrupted, New, Reserved, Suspended};
        matches!(
            (self, next),
            (New | Interrupted | Suspended, Reserved)
                | (Reserved, Completed | Broken | Interrupted | Suspended)
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timestamps {
    pub submit_time: Option<Timestamp>,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub heartbeat: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    /// Stable identity: hash over the sorted parameter assignment.
    pub id: String,
    pub experiment_id: String,
    pub params: Vec<Param>,
    pub results: Vec<TrialResult>,
    pub status: Status,
    pub timestamps: Timestamps,
    pub parents: Vec<String>,
    /// Warning tags attached by `unsure` change-type adapters (spec §4.3);
    /// never filters a trial, purely informational.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Trial {
    #[must_use]
    pub fn new(experiment_id: impl Into<String>, mut params: Vec<Param>) -> Self {
        params.sort_by(|a, b| a.name.cmp(&b.name));
        let id = hash_params(&params);
        Self {
            id,
            experiment_id: experiment_id.into(),
            params,
            results: Vec::new(),
            status: Status::New,
            timestamps: Timestamps::default(),
            parents: Vec::new(),
            tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn objective(&self) -> Option<&TrialResult> {
        self.results.iter().find(|r| r.kind == ResultKind::Objective)
    }

    /// Validates the completion invariant from spec §3: "exactly one
    /// `objective` after completion".
    pub fn validate_completed(&self) -> Result<()> {
        let objective_count = self.results.iter().filter(|r| r.kind == ResultKind::Objective).count();
        if self.status == Status::Completed && objective_count != 1 {
            return Err(OrionError::invalid_definition(format!(
                "completed trial {} must carry exactly one objective, found {objective_count}",
                self.id
            )));
        }
        Ok(())
    }

    pub fn transition(&mut self, next: Status) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(OrionError::invalid_definition(format!(
                "illegal transition {:?} -> {:?} for trial {}",
                self.status, next, self.id
            )));
        }
        self.status = next;
        Ok(())
    }
}

/// Stable hash over the sorted parameter assignment (spec §3, §8). Sorting
/// by name makes the hash invariant under reordering of parameters in the
/// caller's serialized form.
#[must_use]
pub fn hash_params(params: &[Param]) -> String {
    hash_params_filtered(params, |_| true)
}

/// As [`hash_params`] but skipping dimensions whose kind is `Fidelity`
/// (spec §3 "optionally ignoring fidelity dimensions", §8 scenario 6).
#[must_use]
pub fn hash_params_no_fidelity(params: &[Param]) -> String {
    hash_params_filtered(params, |p| p.kind != ParamKind::Fidelity)
}

fn hash_params_filtered(params: &[Param], keep: impl Fn(&Param) -> bool) -> String {
    let mut sorted: Vec<&Param> = params.iter().filter(|p| keep(p)).collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    let mut hasher = blake3::Hasher::new();
    for param in sorted {
        hasher.update(param.name.as_bytes());
        hasher.update(b"=");
        hasher.update(param.value.to_string().as_bytes());
        hasher.update(b";");
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str, kind: ParamKind, value: Value) -> Param {
        Param { name: name.to_owned(), kind, value }
    }

    #[test]
    fn hash_is_invariant_under_param_reordering() {
        let a = vec![
            param("lr", ParamKind::Real, Value::Real(0.1)),
            param("batch", ParamKind::Integer, Value::Integer(32)),
        ];
        let b = vec![
            param("batch", ParamKind::Integer, Value::Integer(32)),
            param("lr", ParamKind::Real, Value::Real(0.1)),
        ];
        assert_eq!(hash_params(&a), hash_params(&b));
    }

    #[test]
    fn hash_differs_when_value_changes() {
        let a = vec![param("lr", ParamKind::Real, Value::Real(0.1))];
        let b = vec![param("lr", ParamKind::Real, Value::Real(0.2))];
        assert_ne!(hash_params(&a), hash_params(&b));
    }

    #[test]
    fn fidelity_ignoring_hash_matches_across_fidelity_values() {
        let a = vec![
            param("lr", ParamKind::Real, Value::Real(0.1)),
            param("epoch", ParamKind::Fidelity, Value::Integer(1)),
        ];
        let b = vec![
            param("lr", ParamKind::Real, Value::Real(0.1)),
            param("epoch", ParamKind::Fidelity, Value::Integer(4)),
        ];
        assert_eq!(hash_params_no_fidelity(&a), hash_params_no_fidelity(&b));
        assert_ne!(hash_params(&a), hash_params(&b));
    }

    #[test]
    fn status_transitions_follow_state_machine() {
        assert!(Status::New.can_transition_to(Status::Reserved));
        assert!(Status::Reserved.can_transition_to(Status::Completed));
        assert!(Status::Reserved.can_transition_to(Status::Interrupted));
        assert!(!Status::Completed.can_transition_to(Status::Reserved));
        assert!(!Status::New.can_transition_to(Status::Completed));
    }

    #[test]
    fn completed_trial_requires_exactly_one_objective() {
        let mut trial = Trial::new("exp", vec![param("a", ParamKind::Real, Value::Real(1.0))]);
        trial.status = Status::Completed;
        assert!(trial.validate_completed().is_err());
        trial.results.push(TrialResult {
            name: "loss".into(),
            kind: ResultKind::Objective,
            value: Value::Real(0.5),
        });
        assert!(trial.validate_completed().is_ok());
    }
}
