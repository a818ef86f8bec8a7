//! Public API facade over the `orion-*` workspace.

pub use orion_adapters::{Adapter, AdapterChain, ChangeType};
pub use orion_consumer::{Consumer, Outcome as ConsumeOutcome};
pub use orion_error::{OrionError, Result};
pub use orion_evc::{
    detect_conflicts, BranchingFlags, Conflict, ConflictKind, ConflictPayload, Conflicts,
    EvcNode, EvcTree, ExperimentConfigView, Refers, Resolution, ResolutionParams,
};
pub use orion_experiment::{Experiment, ExperimentConfig, ExperimentStats};
pub use orion_observability::init as init_logging;
pub use orion_producer::{Algorithm, MaxObservedLie, Point, Producer, RandomSearch, Strategy};
pub use orion_space::{Dimension, Marker, Prior, Shape, Space, SpaceBuilder, Template, TemplateSlot};
pub use orion_storage::{ExperimentPatch, ExperimentQuery, ExperimentRecord, MemoryStorage, StorageBackend};
pub use orion_trial::{hash_params, hash_params_no_fidelity, Param, Status, Timestamps, Trial, TrialResult};
pub use orion_types::{ParamKind, ResultKind, Timestamp, Value};
pub use orion_worker::{workon, WorkerExit};
