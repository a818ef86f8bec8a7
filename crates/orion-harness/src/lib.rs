//! Shared scenario builders for the cross-crate tests under `tests/`
//! (spec §8's named scenarios), grounded on `fsqlite-harness`'s convention
//! of exposing its corpus builders as a library rather than duplicating
//! them per test file.

use orion::{AdapterChain, Dimension, ExperimentConfig, Prior, Refers, Space};

/// A single-dimension space, `lr ~ uniform(0,1)`, reused across scenarios
/// that don't care about the space's shape.
#[must_use]
pub fn single_dimension_space() -> Space {
    let mut space = Space::new();
    space
        .insert(Dimension::new("lr", Prior::parse("uniform(0,1)").unwrap(), orion::ParamKind::Real))
        .unwrap();
    space
}

#[must_use]
pub fn standard_config(name: &str, max_trials: Option<u64>, max_broken: u32, pool_size: u32) -> ExperimentConfig {
    ExperimentConfig {
        name: name.to_owned(),
        version: 1,
        user: "harness".to_owned(),
        space: single_dimension_space(),
        algorithm: serde_json::json!({"kind": "random"}),
        max_trials,
        max_broken,
        pool_size,
        metadata: serde_json::json!({}),
        refers: Refers { root_id: name.to_owned(), parent_id: None, adapter_chain: AdapterChain::default() },
    }
}
