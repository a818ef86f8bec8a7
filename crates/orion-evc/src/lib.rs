//! Experiment Version Control: conflict detection, resolution, adapters,
//! and the version tree (spec §4.2, §4.4).

mod config;
mod conflict;
mod resolution;
mod tree;

pub use config::ExperimentConfigView;
pub use conflict::{detect_conflicts, Conflict, ConflictKind, ConflictPayload};
pub use resolution::{BranchingFlags, Conflicts, Resolution, ResolutionParams};
pub use tree::{EvcNode, EvcTree, Refers};
