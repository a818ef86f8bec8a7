//! The slice of experiment configuration that conflict detection compares.
//! Deliberately independent of `orion-experiment` so the engine can be
//! unit-tested without a storage backend or a live experiment.

use orion_space::Space;

#[derive(Debug, Clone)]
pub struct ExperimentConfigView {
    pub name: String,
    pub space: Space,
    pub algorithm: String,
    pub code_hash: Option<String>,
    pub cli_tokens: Vec<String>,
    pub script_config_hash: Option<String>,
}
