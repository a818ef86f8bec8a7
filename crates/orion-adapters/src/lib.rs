//! Adapters: pure, invertible-in-intent rewrites of trials when crossing an
//! EVC edge (spec §3 "Adapter chain", §4.3).

use orion_space::Prior;
use orion_trial::{Param, Trial};
use orion_types::{ParamKind, Value};

/// Controls whether a change-type adapter passes trials through, drops
/// them, or flags them (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Unsure,
    NoEffect,
    Break,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Adapter {
    DimensionAddition { name: String, default: Value, kind: ParamKind },
    DimensionDeletion { name: String, default: Value, kind: ParamKind },
    DimensionRenaming { old: String, new: String },
    DimensionPriorChange { name: String, new_prior: Prior },
    CodeChange(ChangeType),
    CommandLineChange(ChangeType),
    ScriptConfigChange(ChangeType),
    AlgorithmChange(ChangeType),
}

impl Adapter {
    /// Parent-view trial -> child-view trial(s); empty if filtered.
    #[must_use]
    pub fn forward(&self, trial: &Trial) -> Vec<Trial> {
        match self {
            Adapter::DimensionAddition { name, default, kind } => {
                let mut t = trial.clone();
                t.params.push(Param { name: name.clone(), kind: *kind, value: default.clone() });
                vec![t]
            }
            Adapter::DimensionDeletion { name, .. } => {
                let mut t = trial.clone();
                t.params.retain(|p| &p.name != name);
                vec![t]
            }
            Adapter::DimensionRenaming { old, new } => {
                let mut t = trial.clone();
                for p in &mut t.params {
                    if &p.name == old {
                        p.name.clone_from(new);
                    }
                }
                vec![t]
            }
            Adapter::DimensionPriorChange { name, new_prior } => {
                let in_range = trial
                    .params
                    .iter()
                    .find(|p| &p.name == name)
                    .is_none_or(|p| new_prior.contains(&p.value));
                if in_range { vec![trial.clone()] } else { Vec::new() }
            }
            Adapter::CodeChange(ct)
            | Adapter::CommandLineChange(ct)
            | Adapter::ScriptConfigChange(ct)
            | Adapter::AlgorithmChange(ct) => change_type_forward(*ct, trial, self.tag()),
        }
    }

    /// Child-view trial -> parent-view trial(s); empty if filtered.
    #[must_use]
    pub fn backward(&self, trial: &Trial) -> Vec<Trial> {
        match self {
            Adapter::DimensionAddition { name, .. } => {
                let mut t = trial.clone();
                t.params.retain(|p| &p.name != name);
                vec![t]
            }
            Adapter::DimensionDeletion { name, default, kind } => {
                let mut t = trial.clone();
                t.params.push(Param { name: name.clone(), kind: *kind, value: default.clone() });
                vec![t]
            }
            Adapter::DimensionRenaming { old, new } => {
                let mut t = trial.clone();
                for p in &mut t.params {
                    if &p.name == new {
                        p.name.clone_from(old);
                    }
                }
                vec![t]
            }
            // Filtering only occurs crossing into the narrower (child) view;
            // a trial already valid in the child is, by construction, valid
            // in the parent's wider view too.
            Adapter::DimensionPriorChange { .. } => vec![trial.clone()],
            Adapter::CodeChange(_) | Adapter::CommandLineChange(_) | Adapter::ScriptConfigChange(_)
            | Adapter::AlgorithmChange(_) => vec![trial.clone()],
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            Adapter::CodeChange(_) => "code-change",
            Adapter::CommandLineChange(_) => "cli-change",
            Adapter::ScriptConfigChange(_) => "config-change",
            Adapter::AlgorithmChange(_) => "algorithm-change",
            _ => "",
        }
    }
}

fn change_type_forward(ct: ChangeType, trial: &Trial, tag: &str) -> Vec<Trial> {
    match ct {
        ChangeType::NoEffect => vec![trial.clone()],
        ChangeType::Unsure => {
            let mut t = trial.clone();
            t.tags.push(tag.to_owned());
            vec![t]
        }
        ChangeType::Break => Vec::new(),
    }
}

/// An ordered sequence of adapters applied along one EVC edge
/// (spec §3 "Adapter chain").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdapterChain(pub Vec<Adapter>);

impl AdapterChain {
    #[must_use]
    pub fn new(adapters: Vec<Adapter>) -> Self {
        Self(adapters)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Apply every adapter in order, parent-view -> child-view. Filtering
    /// at any stage drops the trial from the result.
    #[must_use]
    pub fn forward(&self, trial: &Trial) -> Vec<Trial> {
        let mut frontier = vec![trial.clone()];
        for adapter in &self.0 {
            frontier = frontier.iter().flat_map(|t| adapter.forward(t)).collect();
            if frontier.is_empty() {
                break;
            }
        }
        frontier
    }

    /// Apply every adapter in reverse order, child-view -> parent-view.
    #[must_use]
    pub fn backward(&self, trial: &Trial) -> Vec<Trial> {
        let mut frontier = vec![trial.clone()];
        for adapter in self.0.iter().rev() {
            frontier = frontier.iter().flat_map(|t| adapter.backward(t)).collect();
            if frontier.is_empty() {
                break;
            }
        }
        frontier
    }
}
