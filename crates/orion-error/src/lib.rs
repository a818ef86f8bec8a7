//! Error taxonomy for the orion optimization core (spec §7).
//!
//! One enum, `OrionError`, covers every crate in the workspace. Variants
//! that are "recovered locally" by callers (`FailedUpdate`, `DuplicateKey`)
//! are not meant to always propagate to a user — callers match on them
//! explicitly; see `orion-storage::reserve_trial` and
//! `orion-producer::Producer::produce`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrionError {
    /// User-supplied space or CLI is malformed. Fatal to the current command.
    #[error("invalid definition: {reason}")]
    InvalidDefinition { reason: String },

    /// Branching cannot proceed without interactive input and no marker
    /// resolved the conflict.
    #[error("conflict unresolvable: {reason}")]
    ConflictUnresolvable { reason: String },

    /// A uniqueness constraint in storage was violated (experiment name,
    /// trial id, or lie id already present).
    #[error("duplicate key: {kind} {id}")]
    DuplicateKey { kind: &'static str, id: String },

    /// A compare-and-set precondition did not hold; the caller lost a race.
    #[error("failed update: {reason}")]
    FailedUpdate { reason: String },

    /// `max_broken` was exceeded for an experiment.
    #[error("experiment broken: {name} exceeded max_broken={max_broken}")]
    BrokenExperiment { name: String, max_broken: u32 },

    /// The requested entity does not exist.
    #[error("not found: {kind} {id}")]
    NotFound { kind: &'static str, id: String },

    /// An I/O failure not otherwise classified (results file, working
    /// directory, child process spawn).
    #[error("io error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Catch-all for invariants that should be unreachable in correct
    /// callers; carries a message rather than a `String` payload per
    /// variant so call sites stay terse.
    #[error("internal error: {0}")]
    Internal(String),
}

impl OrionError {
    #[must_use]
    pub fn invalid_definition(reason: impl Into<String>) -> Self {
        Self::InvalidDefinition { reason: reason.into() }
    }

    #[must_use]
    pub fn failed_update(reason: impl Into<String>) -> Self {
        Self::FailedUpdate { reason: reason.into() }
    }

    #[must_use]
    pub fn duplicate_key(kind: &'static str, id: impl Into<String>) -> Self {
        Self::DuplicateKey { kind, id: id.into() }
    }

    #[must_use]
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    /// True for errors that a caller in a retry loop (reservation, heartbeat
    /// sweep) should treat as "try the next candidate" rather than abort.
    #[must_use]
    pub fn is_recoverable_race(&self) -> bool {
        matches!(self, Self::FailedUpdate { .. } | Self::DuplicateKey { .. })
    }
}

pub type Result<T> = std::result::Result<T, OrionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_race_classification() {
        assert!(OrionError::failed_update("cas lost").is_recoverable_race());
        assert!(OrionError::duplicate_key("trial", "abc").is_recoverable_race());
        assert!(!OrionError::invalid_definition("bad prior").is_recoverable_race());
    }

    #[test]
    fn display_messages_are_stable() {
        let err = OrionError::BrokenExperiment { name: "exp1".into(), max_broken: 3 };
        assert_eq!(err.to_string(), "experiment broken: exp1 exceeded max_broken=3");
    }
}
