//! Conflict kinds and detection (spec §4.2 "Detection").

use crate::config::ExperimentConfigView;
use orion_space::{Prior, SpaceBuilder};
use orion_types::ParamKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConflictKind {
    Algorithm,
    ChangedDimension,
    Code,
    CommandLine,
    ExperimentName,
    MissingDimension,
    NewDimension,
    ScriptConfig,
}

impl ConflictKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ConflictKind::Algorithm => "Algorithm",
            ConflictKind::ChangedDimension => "ChangedDimension",
            ConflictKind::Code => "Code",
            ConflictKind::CommandLine => "CommandLine",
            ConflictKind::ExperimentName => "ExperimentName",
            ConflictKind::MissingDimension => "MissingDimension",
            ConflictKind::NewDimension => "NewDimension",
            ConflictKind::ScriptConfig => "ScriptConfig",
        }
    }
}

#[derive(Debug, Clone)]
pub enum ConflictPayload {
    NewDimension { name: String, prior: Prior, kind: ParamKind },
    MissingDimension { name: String, prior: Prior, kind: ParamKind },
    ChangedDimension { name: String, old_prior: Prior, new_prior: Prior },
    Algorithm { old: String, new: String },
    Code { old: Option<String>, new: Option<String> },
    CommandLine { old: String, new: String },
    ScriptConfig { old: Option<String>, new: Option<String> },
    ExperimentName { old: String, new: String },
}

#[derive(Debug, Clone)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub payload: ConflictPayload,
    /// Index into `Conflicts::resolutions`, set once this conflict is resolved.
    pub resolution: Option<usize>,
    /// True once removed from consideration by a side-effecting revert
    /// (spec §9 open question: "a deprecated conflict is removed entirely,
    /// not marked resolved").
    pub deprecated: bool,
}

impl Conflict {
    #[must_use]
    fn new(kind: ConflictKind, payload: ConflictPayload) -> Self {
        Self { kind, payload, resolution: None, deprecated: false }
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }
}

type Detector = fn(&ExperimentConfigView, &ExperimentConfigView) -> Vec<Conflict>;

/// Detectors in alphabetical order of their [`ConflictKind`] name (spec §4.2:
/// "the engine sorts conflict classes by name before dispatch").
const DETECTORS: &[Detector] = &[
    detect_algorithm,
    detect_changed_dimension,
    detect_code,
    detect_command_line,
    detect_experiment_name,
    detect_missing_dimension,
    detect_new_dimension,
    detect_script_config,
];

/// Runs every conflict class against `(old_config, new_config)` in
/// deterministic, order-independent fashion (spec §4.2).
#[must_use]
pub fn detect_conflicts(old: &ExperimentConfigView, new: &ExperimentConfigView) -> Vec<Conflict> {
    DETECTORS.iter().flat_map(|detector| detector(old, new)).collect()
}

fn detect_new_dimension(old: &ExperimentConfigView, new: &ExperimentConfigView) -> Vec<Conflict> {
    new.space
        .iter()
        .filter(|dim| old.space.get(&dim.name).is_none())
        .map(|dim| {
            Conflict::new(
                ConflictKind::NewDimension,
                ConflictPayload::NewDimension { name: dim.name.clone(), prior: dim.prior.clone(), kind: dim.kind },
            )
        })
        .collect()
}

fn detect_missing_dimension(old: &ExperimentConfigView, new: &ExperimentConfigView) -> Vec<Conflict> {
    old.space
        .iter()
        .filter(|dim| new.space.get(&dim.name).is_none())
        .map(|dim| {
            Conflict::new(
                ConflictKind::MissingDimension,
                ConflictPayload::MissingDimension { name: dim.name.clone(), prior: dim.prior.clone(), kind: dim.kind },
            )
        })
        .collect()
}

fn detect_changed_dimension(old: &ExperimentConfigView, new: &ExperimentConfigView) -> Vec<Conflict> {
    old.space
        .iter()
        .filter_map(|old_dim| {
            let new_dim = new.space.get(&old_dim.name)?;
            if old_dim.canonical() == new_dim.canonical() {
                return None;
            }
            Some(Conflict::new(
                ConflictKind::ChangedDimension,
                ConflictPayload::ChangedDimension {
                    name: old_dim.name.clone(),
                    old_prior: old_dim.prior.clone(),
                    new_prior: new_dim.prior.clone(),
                },
            ))
        })
        .collect()
}

fn detect_algorithm(old: &ExperimentConfigView, new: &ExperimentConfigView) -> Vec<Conflict> {
    if old.algorithm == new.algorithm {
        return Vec::new();
    }
    vec![Conflict::new(
        ConflictKind::Algorithm,
        ConflictPayload::Algorithm { old: old.algorithm.clone(), new: new.algorithm.clone() },
    )]
}

fn detect_code(old: &ExperimentConfigView, new: &ExperimentConfigView) -> Vec<Conflict> {
    if old.code_hash == new.code_hash {
        return Vec::new();
    }
    vec![Conflict::new(
        ConflictKind::Code,
        ConflictPayload::Code { old: old.code_hash.clone(), new: new.code_hash.clone() },
    )]
}

fn detect_command_line(old: &ExperimentConfigView, new: &ExperimentConfigView) -> Vec<Conflict> {
    let old_nameless = SpaceBuilder::nameless_args(&old.cli_tokens);
    let new_nameless = SpaceBuilder::nameless_args(&new.cli_tokens);
    if old_nameless == new_nameless {
        return Vec::new();
    }
    vec![Conflict::new(
        ConflictKind::CommandLine,
        ConflictPayload::CommandLine { old: old_nameless, new: new_nameless },
    )]
}

fn detect_script_config(old: &ExperimentConfigView, new: &ExperimentConfigView) -> Vec<Conflict> {
    if old.script_config_hash == new.script_config_hash {
        return Vec::new();
    }
    vec![Conflict::new(
        ConflictKind::ScriptConfig,
        ConflictPayload::ScriptConfig { old: old.script_config_hash.clone(), new: new.script_config_hash.clone() },
    )]
}

fn detect_experiment_name(old: &ExperimentConfigView, new: &ExperimentConfigView) -> Vec<Conflict> {
    // Always emitted (spec §4.2): every branch is, at minimum, a name change.
    vec![Conflict::new(
        ConflictKind::ExperimentName,
        ConflictPayload::ExperimentName { old: old.name.clone(), new: new.name.clone() },
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use orion_space::{Dimension, Space};
    use orion_types::ParamKind;

    fn config(name: &str, dims: &[(&str, &str)]) -> ExperimentConfigView {
        let mut space = Space::new();
        for (dim_name, prior) in dims {
            space
                .insert(Dimension::new(*dim_name, Prior::parse(prior).unwrap(), ParamKind::Real))
                .unwrap();
        }
        ExperimentConfigView {
            name: name.to_owned(),
            space,
            algorithm: "random".to_owned(),
            code_hash: None,
            cli_tokens: Vec::new(),
            script_config_hash: None,
        }
    }

    #[test]
    fn experiment_name_always_detected() {
        let old = config("exp-v1", &[]);
        let new = config("exp-v2", &[]);
        let conflicts = detect_conflicts(&old, &new);
        assert!(conflicts.iter().any(|c| c.kind == ConflictKind::ExperimentName));
    }

    #[test]
    fn new_and_missing_dimension_detected() {
        let old = config("exp", &[("a", "uniform(0,1)")]);
        let new = config("exp", &[("b", "uniform(0,1)")]);
        let conflicts = detect_conflicts(&old, &new);
        assert!(conflicts.iter().any(|c| c.kind == ConflictKind::NewDimension));
        assert!(conflicts.iter().any(|c| c.kind == ConflictKind::MissingDimension));
    }

    #[test]
    fn changed_dimension_requires_differing_canonical_strings() {
        let old = config("exp", &[("a", "uniform(0,1)")]);
        let new = config("exp", &[("a", "uniform(0,10)")]);
        let conflicts = detect_conflicts(&old, &new);
        let changed: Vec<_> = conflicts.iter().filter(|c| c.kind == ConflictKind::ChangedDimension).collect();
        assert_eq!(changed.len(), 1);
        if let ConflictPayload::ChangedDimension { old_prior, new_prior, .. } = &changed[0].payload {
            assert_ne!(old_prior.to_string(), new_prior.to_string());
        } else {
            unreachable!();
        }
    }

    #[test]
    fn unchanged_dimension_is_not_a_conflict() {
        let old = config("exp", &[("a", "uniform(0,1)")]);
        let new = config("exp", &[("a", "uniform(0,1)")]);
        let conflicts = detect_conflicts(&old, &new);
        assert!(!conflicts.iter().any(|c| c.kind == ConflictKind::ChangedDimension));
    }
}
