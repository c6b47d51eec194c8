//! Error taxonomy for EC4X
//!
//! Order-level failures are values carried in rejection reports and never
//! abort a turn. Integrity failures are fatal to the turn: the pipeline
//! rolls back to the pre-phase snapshot and surfaces them to the host.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-order validation failures. Each rejected order surfaces exactly one
/// of these as its reason code.
#[derive(Debug, Clone, Serialize, Deserialize, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("order references an entity the house does not own")]
    OwnershipViolation,

    #[error("order target is invalid: {0}")]
    TargetInvalid(String),

    #[error("insufficient treasury: need {required} PP, {available} remaining")]
    InsufficientTreasury { required: i64, available: i64 },

    #[error("no free docking slots at the colony")]
    InsufficientDocks,

    #[error("insufficient capacity: {0}")]
    InsufficientCapacity(String),

    #[error("fleet lacks a required capability: {0}")]
    CapabilityMissing(String),

    #[error("prerequisite missing: {0}")]
    PrerequisiteMissing(String),
}

/// State-level integrity failures. Fatal to the current turn.
#[derive(Debug, Clone, Serialize, Deserialize, Error, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("dangling reference: {kind} {id} does not resolve")]
    DanglingReference { kind: String, id: String },

    #[error("owner mismatch: {detail}")]
    OwnerMismatch { detail: String },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

/// Transport-boundary failures. Non-fatal to the engine; retried per host
/// policy and eventually dead-lettered.
#[derive(Debug, Clone, Serialize, Deserialize, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("relay unreachable: {0}")]
    RelayUnreachable(String),

    #[error("duplicate event suppressed: {0}")]
    DuplicateEvent(String),

    #[error("payload sealing failed: {0}")]
    EncryptionFailure(String),
}

/// Config loading/validation failures. Fatal at startup.
#[derive(Debug, Clone, Serialize, Deserialize, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    LoadFailure(String),

    #[error("config validation failed: {0}")]
    ValidationFailure(String),
}

/// Combined error type for all engine failures.
#[derive(Debug, Clone, Serialize, Deserialize, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("unknown game: {0}")]
    UnknownGame(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_errors_convert_into_engine_errors() {
        let err = IntegrityError::DanglingReference {
            kind: "fleet".to_string(),
            id: "F9".to_string(),
        };
        let engine: EngineError = err.clone().into();
        assert_eq!(engine, EngineError::Integrity(err));
    }

    #[test]
    fn order_errors_render_reason_text() {
        let err = OrderError::InsufficientTreasury {
            required: 120,
            available: 45,
        };
        assert!(err.to_string().contains("120"));
        assert!(err.to_string().contains("45"));
    }
}
