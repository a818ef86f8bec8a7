//! Search space: typed dimensions, priors, and the annotated command-line
//! builder (spec §3, §4.1, §6).

mod prior;

pub use prior::Prior;

use orion_error::{OrionError, Result};
use orion_types::{ParamKind, Value};
use std::collections::HashMap;
use std::fmt;

/// Scalar or fixed-length vector dimension (spec §3 Dimension.shape).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Scalar,
    Vector(usize),
}

/// A named search variable. Immutable after construction (spec §3).
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub name: String,
    pub prior: Prior,
    pub shape: Shape,
    pub default: Option<Value>,
    pub kind: ParamKind,
}

impl Dimension {
    #[must_use]
    pub fn new(name: impl Into<String>, prior: Prior, kind: ParamKind) -> Self {
        Self { name: name.into(), prior, shape: Shape::Scalar, default: None, kind }
    }

    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Canonical string form, e.g. `lr~loguniform(1e-5,1)`. Round-trips
    /// through `Space::parse_declaration`.
    #[must_use]
    pub fn canonical(&self) -> String {
        format!("{}~{}", self.name, self.prior)
    }

    #[must_use]
    pub fn contains(&self, value: &Value) -> bool {
        self.prior.contains(value)
    }
}

/// Ordered mapping from dimension name to [`Dimension`] (spec §3 Space).
#[derive(Debug, Clone, Default)]
pub struct Space {
    order: Vec<Dimension>,
    index: HashMap<String, usize>,
}

impl Space {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, dim: Dimension) -> Result<()> {
        if self.index.contains_key(&dim.name) {
            return Err(OrionError::invalid_definition(format!(
                "duplicate dimension name: {}",
                dim.name
            )));
        }
        self.index.insert(dim.name.clone(), self.order.len());
        self.order.push(dim);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Dimension> {
        self.index.get(name).map(|&i| &self.order[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dimension> {
        self.order.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Membership test for a parameter assignment (name -> value pairs):
    /// every dimension must be present and every value must satisfy its
    /// dimension's prior, with no unknown names.
    #[must_use]
    pub fn contains_assignment(&self, assignment: &[(String, Value)]) -> bool {
        if assignment.len() != self.order.len() {
            return false;
        }
        assignment.iter().all(|(name, value)| {
            self.get(name).is_some_and(|dim| dim.contains(value))
        })
    }

    /// Canonical string form of the whole space: dimension canonicals in
    /// declared order, space-joined. `Space::parse_declarations(s.canonical())`
    /// reconstructs an equal space (spec §8 Parse(Canonical(Space)) == Space).
    #[must_use]
    pub fn canonical(&self) -> String {
        self.order.iter().map(Dimension::canonical).collect::<Vec<_>>().join(" ")
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

/// One slot of a rehydration template (spec §4.1).
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateSlot {
    Literal(String),
    Dimension(String),
    ConfigPath(String),
}

/// Records, per positional command-line slot, how to rehydrate a concrete
/// argument vector from a trial's parameters (spec §4.1, §4.7 step 2).
#[derive(Debug, Clone, Default)]
pub struct Template {
    pub slots: Vec<TemplateSlot>,
}

impl Template {
    /// Rehydrate into a concrete argument vector given a trial's parameters.
    pub fn build_to(&self, params: &HashMap<String, Value>) -> Result<Vec<String>> {
        self.slots
            .iter()
            .map(|slot| match slot {
                TemplateSlot::Literal(s) => Ok(s.clone()),
                TemplateSlot::Dimension(name) => params
                    .get(name)
                    .map(Value::to_string)
                    .ok_or_else(|| OrionError::invalid_definition(format!(
                        "template references unknown dimension: {name}"
                    ))),
                TemplateSlot::ConfigPath(path) => Ok(path.clone()),
            })
            .collect()
    }
}

/// Turns a user's annotated command line into a [`Space`] plus a [`Template`]
/// (spec §4.1).
pub struct SpaceBuilder;

impl SpaceBuilder {
    /// `build(tokens) -> (space, template)` (spec §4.1 contract).
    pub fn build(tokens: &[String]) -> Result<(Space, Template)> {
        let mut space = Space::new();
        let mut template = Template::default();

        for token in tokens {
            if let Some(config_path) = token.strip_prefix("--config ") {
                template.slots.push(TemplateSlot::ConfigPath(config_path.to_owned()));
                continue;
            }
            if Marker::parse(token).is_some() {
                // Branching markers are consumed by the EVC conflict-resolution
                // flow before the space is built; they never reach the template.
                continue;
            }
            match parse_declaration(token) {
                Some((name, prior_text)) => {
                    let prior = Prior::parse(prior_text)?;
                    let kind = infer_kind(&prior);
                    space.insert(Dimension::new(name, prior, kind))?;
                    template.slots.push(TemplateSlot::Dimension(name.to_owned()));
                }
                None => template.slots.push(TemplateSlot::Literal(token.clone())),
            }
        }

        Ok((space, template))
    }

    /// A stable string built from `tokens` with every dimension
    /// declaration removed, used by the EVC engine to detect command-line
    /// changes while ignoring dimension declarations (spec §4.1).
    #[must_use]
    pub fn nameless_args(tokens: &[String]) -> String {
        tokens
            .iter()
            .filter(|t| parse_declaration(t).is_none() && Marker::parse(t).is_none())
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A non-interactive branching marker discovered on the command line
/// (spec §4.2 "Marked arguments", §6).
#[derive(Debug, Clone, PartialEq)]
pub enum Marker {
    /// `name~+default` — add dimension with default value.
    Add { name: String, default: String },
    /// `name~-default` — remove dimension, falling back to default value.
    Remove { name: String, default: String },
    /// `old~>new` — rename dimension.
    Rename { old: String, new: String },
}

impl Marker {
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        let (name, rest) = token.split_once('~')?;
        if name.is_empty() {
            return None;
        }
        if let Some(new) = rest.strip_prefix('>') {
            return Some(Marker::Rename { old: name.to_owned(), new: new.to_owned() });
        }
        if let Some(default) = rest.strip_prefix('+') {
            // A bare `+prior(...)` is a plain dimension declaration, not a
            // marker; only a literal default value (no parens) counts.
            if !default.contains('(') && !default.contains('[') {
                return Some(Marker::Add { name: name.to_owned(), default: default.to_owned() });
            }
        }
        if let Some(default) = rest.strip_prefix('-') {
            return Some(Marker::Remove { name: name.to_owned(), default: default.to_owned() });
        }
        None
    }
}

/// Parses a plain `name~prior(...)` declaration, distinct from a [`Marker`].
fn parse_declaration(token: &str) -> Option<(&str, &str)> {
    let (name, rest) = token.split_once('~')?;
    if name.is_empty() || rest.starts_with('>') || rest.starts_with('-') {
        return None;
    }
    let rest = rest.strip_prefix('+').unwrap_or(rest);
    if rest.contains('(') || rest.starts_with("choices[") {
        Some((name, rest))
    } else {
        None
    }
}

fn infer_kind(prior: &Prior) -> ParamKind {
    match prior {
        Prior::Fidelity { .. } => ParamKind::Fidelity,
        Prior::Choices(_) => ParamKind::Categorical,
        Prior::Uniform { .. } | Prior::LogUniform { .. } | Prior::Normal { .. } => ParamKind::Real,
    }
}
