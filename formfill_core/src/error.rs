//! Error taxonomy for the mapping engine.
//!
//! `ValueError` is carried as data on normalized entities and filled fields;
//! it never aborts a session. `SchemaError` is the only condition that
//! prevents a session from being created.

use serde::{Deserialize, Serialize};

use crate::entity::ValueType;

/// A value failed its type-specific validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ValueError {
    #[error("{kind:?} value is malformed: {reason}")]
    Format { kind: ValueType, reason: String },
    #[error("{kind:?} value {value} is outside [{min}, {max}]")]
    Range {
        kind: ValueType,
        value: i64,
        min: i64,
        max: i64,
    },
}

impl ValueError {
    pub fn format(kind: ValueType, reason: impl Into<String>) -> Self {
        ValueError::Format {
            kind,
            reason: reason.into(),
        }
    }
}

/// Malformed or duplicate identifiers handed over by an upstream collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum SchemaError {
    #[error("field descriptor at position {0} has an empty id")]
    EmptyFieldId(usize),
    #[error("duplicate field id: {0}")]
    DuplicateField(String),
    #[error("entity at position {0} has an empty id")]
    EmptyEntityId(usize),
    #[error("duplicate entity id: {0}")]
    DuplicateEntity(String),
    #[error("entity {id} has confidence {confidence} outside [0, 1]")]
    ConfidenceOutOfRange { id: String, confidence: f32 },
}

/// Rejected tuning values.
#[derive(Debug, thiserror::Error)]
pub enum CfgError {
    #[error("{name} must be within [0, 1], got {value}")]
    OutOfUnitRange { name: &'static str, value: f32 },
    #[error("signal weights must be non-negative and sum to a positive value")]
    Weights,
    #[error("minimum-consideration threshold {min} exceeds confident-assignment threshold {confident}")]
    ThresholdOrder { min: f32, confident: f32 },
    #[error("invalid cfg json: {0}")]
    Json(#[from] serde_json::Error),
}
