//! Resolutions, the `Conflicts` collection, and marker-driven non-interactive
//! branching (spec §4.2 "Resolution", "Marked arguments", "Rename/Remove
//! tie-break", "Reverting").

use crate::conflict::{Conflict, ConflictKind, ConflictPayload};
use orion_adapters::{Adapter, ChangeType};
use orion_error::{OrionError, Result};
use orion_space::{Marker, Prior};
use orion_types::{ParamKind, Value};

/// Explicit parameter struct per resolution kind (spec §9 design note:
/// "Each resolution constructor takes an explicit parameter struct; marker
/// discovery returns that struct" — replacing `try_resolve(**kwargs)`).
#[derive(Debug, Clone)]
pub enum ResolutionParams {
    AddDimension { name: String, default: Value, kind: ParamKind },
    RemoveDimension { name: String, default: Value, kind: ParamKind },
    RenameDimension { old: String, new: String },
    ChangeDimension { name: String, new_prior: Prior },
    Code(ChangeType),
    CommandLine(ChangeType),
    ScriptConfig(ChangeType),
    Algorithm(ChangeType),
    ExperimentName { new_name: String },
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub conflict_index: usize,
    pub params: ResolutionParams,
    /// Conflict indices created as a side effect of this resolution, so
    /// `revert` can remove exactly what it introduced.
    pub side_effects: Vec<usize>,
    /// For a rename, the `NewDimension` conflict it consumed; un-deprecated
    /// on revert (spec: "Reverting a rename also un-marks the paired
    /// NewDimension").
    pub paired_new_dimension: Option<usize>,
}

impl Resolution {
    /// The adapter this resolution emits, per the exhaustive table in
    /// spec §4.2 ("Adapters emitted per resolution"). `ExperimentName`
    /// emits no adapter — identity change only.
    #[must_use]
    pub fn adapter(&self) -> Option<Adapter> {
        match &self.params {
            ResolutionParams::AddDimension { name, default, kind } => {
                Some(Adapter::DimensionAddition { name: name.clone(), default: default.clone(), kind: *kind })
            }
            ResolutionParams::RemoveDimension { name, default, kind } => {
                Some(Adapter::DimensionDeletion { name: name.clone(), default: default.clone(), kind: *kind })
            }
            ResolutionParams::RenameDimension { old, new } => {
                Some(Adapter::DimensionRenaming { old: old.clone(), new: new.clone() })
            }
            ResolutionParams::ChangeDimension { name, new_prior } => {
                Some(Adapter::DimensionPriorChange { name: name.clone(), new_prior: new_prior.clone() })
            }
            ResolutionParams::Code(ct) => Some(Adapter::CodeChange(*ct)),
            ResolutionParams::CommandLine(ct) => Some(Adapter::CommandLineChange(*ct)),
            ResolutionParams::ScriptConfig(ct) => Some(Adapter::ScriptConfigChange(*ct)),
            ResolutionParams::Algorithm(ct) => Some(Adapter::AlgorithmChange(*ct)),
            ResolutionParams::ExperimentName { .. } => None,
        }
    }
}

/// Owns both conflicts and resolutions by index, sidestepping the cyclic
/// `conflict -> resolution -> conflict` back-references the original
/// implementation used weak references for (spec §9 design note).
#[derive(Debug, Clone, Default)]
pub struct Conflicts {
    conflicts: Vec<Conflict>,
    resolutions: Vec<Resolution>,
}

impl Conflicts {
    #[must_use]
    pub fn from_detected(conflicts: Vec<Conflict>) -> Self {
        Self { conflicts, resolutions: Vec::new() }
    }

    pub fn register(&mut self, conflict: Conflict) -> usize {
        self.conflicts.push(conflict);
        self.conflicts.len() - 1
    }

    #[must_use]
    pub fn get(&self, index: usize) -> &Conflict {
        &self.conflicts[index]
    }

    #[must_use]
    pub fn all(&self) -> &[Conflict] {
        &self.conflicts
    }

    /// Conflicts neither resolved nor deprecated.
    #[must_use]
    pub fn get_remaining(&self) -> Vec<(usize, &Conflict)> {
        self.conflicts
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_resolved() && !c.deprecated)
            .collect()
    }

    #[must_use]
    pub fn get_resolved(&self) -> Vec<(usize, &Conflict)> {
        self.conflicts.iter().enumerate().filter(|(_, c)| c.is_resolved()).collect()
    }

    #[must_use]
    pub fn get_resolutions(&self) -> &[Resolution] {
        &self.resolutions
    }

    /// `all(resolved)` over every non-deprecated conflict (spec §4.2).
    #[must_use]
    pub fn are_resolved(&self) -> bool {
        self.conflicts.iter().all(|c| c.deprecated || c.is_resolved())
    }

    pub fn deprecate(&mut self, index: usize) {
        self.conflicts[index].deprecated = true;
        self.conflicts[index].resolution = None;
    }

    fn find_new_dimension(&self, name: &str) -> Option<usize> {
        self.conflicts.iter().position(|c| {
            !c.deprecated && matches!(&c.payload, ConflictPayload::NewDimension { name: n, .. } if n == name)
        })
    }

    /// Answers `try_resolve(params) -> Resolution` (spec §4.2). Registers
    /// side-effect conflicts (e.g. a rename whose priors differ) into the
    /// live set.
    pub fn try_resolve(&mut self, conflict_index: usize, params: ResolutionParams) -> Result<usize> {
        if self.conflicts[conflict_index].is_resolved() {
            return Err(OrionError::invalid_definition("conflict already resolved"));
        }

        let mut side_effects = Vec::new();
        let mut paired_new_dimension = None;

        if let ResolutionParams::RenameDimension { old, new } = &params {
            if self.conflicts[conflict_index].kind != ConflictKind::MissingDimension {
                return Err(OrionError::invalid_definition("rename must target a MissingDimension conflict"));
            }
            let ConflictPayload::MissingDimension { prior: old_prior, .. } = self.conflicts[conflict_index].payload.clone() else {
                return Err(OrionError::invalid_definition("malformed MissingDimension conflict"));
            };
            if let Some(new_dim_idx) = self.find_new_dimension(new) {
                paired_new_dimension = Some(new_dim_idx);
                self.conflicts[new_dim_idx].deprecated = true;
                // Side effect (spec §4.2 scenario 2): if the renamed-into
                // dimension's prior differs from the old one's, surface a
                // ChangedDimension tied to the new name so it can still be
                // resolved (e.g. with a DimensionPriorChange).
                let ConflictPayload::NewDimension { prior: new_prior, .. } = self.conflicts[new_dim_idx].payload.clone() else {
                    unreachable!("find_new_dimension only matches NewDimension payloads");
                };
                if old_prior.to_string() != new_prior.to_string() {
                    let side_effect = Conflict {
                        kind: ConflictKind::ChangedDimension,
                        payload: ConflictPayload::ChangedDimension { name: new.clone(), old_prior, new_prior },
                        resolution: None,
                        deprecated: false,
                    };
                    side_effects.push(self.register(side_effect));
                }
            }
        }

        let resolution_index = self.resolutions.len();
        self.resolutions.push(Resolution { conflict_index, params, side_effects, paired_new_dimension });
        self.conflicts[conflict_index].resolution = Some(resolution_index);
        Ok(resolution_index)
    }

    /// Nulls the conflict's resolution pointer and removes (deprecates)
    /// every side-effect conflict the resolution introduced; un-deprecates
    /// a rename's paired `NewDimension` (spec §4.2 "Reverting").
    pub fn revert(&mut self, resolution_index: usize) {
        let resolution = self.resolutions[resolution_index].clone();
        self.conflicts[resolution.conflict_index].resolution = None;
        for side_effect in &resolution.side_effects {
            self.conflicts[*side_effect].deprecated = true;
        }
        if let Some(paired) = resolution.paired_new_dimension {
            self.conflicts[paired].deprecated = false;
        }
    }

    /// Discover non-interactive resolutions from the new command line and
    /// global branching flags (spec §4.2 "Marked arguments"). Applies the
    /// rename/remove tie-break: when both a `NewDimension` conflict and a
    /// remove marker target the same `MissingDimension`, remove wins.
    #[must_use]
    pub fn discover_markers(&self, tokens: &[String], flags: &BranchingFlags) -> Vec<(usize, ResolutionParams)> {
        let mut markers: Vec<Marker> = tokens.iter().filter_map(|t| Marker::parse(t)).collect();

        let mut resolutions = Vec::new();
        for (index, conflict) in self.conflicts.iter().enumerate() {
            if conflict.deprecated || conflict.is_resolved() {
                continue;
            }
            match (conflict.kind, &conflict.payload) {
                (ConflictKind::MissingDimension, ConflictPayload::MissingDimension { name, kind, .. }) => {
                    let remove_marker = markers.iter().position(|m| matches!(m, Marker::Remove { name: n, .. } if n == name));
                    let rename_marker = markers.iter().position(|m| matches!(m, Marker::Rename { old, .. } if old == name));
                    if let Some(pos) = remove_marker {
                        // Tie-break: remove wins even if a rename marker is
                        // also present (spec §4.2).
                        if let Marker::Remove { default, .. } = &markers[pos] {
                            resolutions.push((
                                index,
                                ResolutionParams::RemoveDimension {
                                    name: name.clone(),
                                    default: marker_default_value(default, *kind),
                                    kind: *kind,
                                },
                            ));
                        }
                    } else if let Some(pos) = rename_marker {
                        if let Marker::Rename { new, .. } = &markers[pos] {
                            resolutions.push((index, ResolutionParams::RenameDimension { old: name.clone(), new: new.clone() }));
                        }
                    }
                }
                (ConflictKind::NewDimension, ConflictPayload::NewDimension { name, kind, .. }) => {
                    if let Some(pos) = markers.iter().position(|m| matches!(m, Marker::Add { name: n, .. } if n == name)) {
                        if let Marker::Add { default, .. } = &markers[pos] {
                            resolutions.push((
                                index,
                                ResolutionParams::AddDimension {
                                    name: name.clone(),
                                    default: marker_default_value(default, *kind),
                                    kind: *kind,
                                },
                            ));
                        }
                    }
                }
                (ConflictKind::ChangedDimension, ConflictPayload::ChangedDimension { name, new_prior, .. }) => {
                    resolutions.push((
                        index,
                        ResolutionParams::ChangeDimension { name: name.clone(), new_prior: new_prior.clone() },
                    ));
                }
                (ConflictKind::Code, _) => {
                    if let Some(ct) = flags.code_change_type {
                        resolutions.push((index, ResolutionParams::Code(ct)));
                    }
                }
                (ConflictKind::CommandLine, _) => {
                    if let Some(ct) = flags.cli_change_type {
                        resolutions.push((index, ResolutionParams::CommandLine(ct)));
                    }
                }
                (ConflictKind::ScriptConfig, _) => {
                    if let Some(ct) = flags.config_change_type {
                        resolutions.push((index, ResolutionParams::ScriptConfig(ct)));
                    }
                }
                (ConflictKind::Algorithm, _) => {
                    if flags.algorithm_change {
                        resolutions.push((index, ResolutionParams::Algorithm(ChangeType::Break)));
                    }
                }
                (ConflictKind::ExperimentName, ConflictPayload::ExperimentName { .. }) => {
                    if let Some(new_name) = &flags.branch {
                        resolutions.push((index, ResolutionParams::ExperimentName { new_name: new_name.clone() }));
                    }
                }
                _ => {}
            }
        }
        markers.clear();
        resolutions
    }
}

/// Parses a marker's raw default string against the target dimension's
/// declared kind, matching `orion_space::prior::parse_choice_value`'s
/// per-kind typing instead of always falling back to `Categorical`.
fn marker_default_value(raw: &str, kind: ParamKind) -> Value {
    match kind {
        ParamKind::Real => raw.parse::<f64>().map_or_else(|_| Value::Categorical(raw.to_owned()), Value::Real),
        ParamKind::Integer | ParamKind::Fidelity => {
            raw.parse::<i64>().map_or_else(|_| Value::Categorical(raw.to_owned()), Value::Integer)
        }
        ParamKind::Categorical => Value::Categorical(raw.to_owned()),
    }
}

/// Global branching flags discovered from the command line (spec §6
/// "Branching flags"). Presence of any field switches the builder to
/// non-interactive mode.
#[derive(Debug, Clone, Default)]
pub struct BranchingFlags {
    pub branch: Option<String>,
    pub algorithm_change: bool,
    pub code_change_type: Option<ChangeType>,
    pub cli_change_type: Option<ChangeType>,
    pub config_change_type: Option<ChangeType>,
}
