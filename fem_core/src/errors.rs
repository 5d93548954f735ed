//! # Error Types
//!
//! Structured error types for fem_core. Every variant carries enough context
//! (entity kind, id, field, path, run id) for a caller to point the user at
//! the exact thing that needs fixing.
//!
//! Two families live here:
//!
//! - [`ModelError`] is returned from fallible operations (`add`, `remove`,
//!   load, export, results access).
//! - [`ValidationIssue`] is a *value*. Model integrity problems are collected
//!   into an ordered list by validation instead of being raised.
//!
//! ## Example
//!
//! ```rust
//! use fem_core::errors::{ModelError, ModelResult};
//!
//! fn check_steps(steps: u32) -> ModelResult<()> {
//!     if steps == 0 {
//!         return Err(ModelError::invalid_input("steps", "0", "At least one step is required"));
//!     }
//!     Ok(())
//! }
//!
//! assert_eq!(check_steps(0).unwrap_err().error_code(), "INVALID_INPUT");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{EntityId, EntityKind, EntityRef};

/// Result type alias for fem_core operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Structured error type for model, file and results operations.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "details")]
pub enum ModelError {
    /// An entity with this id already exists in its registry
    #[error("Duplicate id: {kind} {id} already exists")]
    DuplicateId { kind: EntityKind, id: EntityId },

    /// No entity with this id exists in its registry
    #[error("Not found: {kind} {id}")]
    NotFound { kind: EntityKind, id: EntityId },

    /// Removal refused because other entities still refer to the target
    #[error("{kind} {id} is referenced by {count} other entities", count = .dependents.len())]
    ReferencedByOthers {
        kind: EntityKind,
        id: EntityId,
        dependents: Vec<EntityRef>,
    },

    /// A model integrity problem on one field of one entity
    #[error("Validation error on {entity_kind} {id}, field '{field}': {reason}")]
    ValidationError {
        entity_kind: EntityKind,
        id: EntityId,
        field: String,
        reason: String,
    },

    /// A stage introduces nodes of another dimension without declaring a
    /// model-builder override
    #[error("Stage {stage_id}: node {node_id} is {found}D but the model is {expected}D and the stage declares no override")]
    StageDimensionMismatch {
        stage_id: EntityId,
        node_id: EntityId,
        expected: u8,
        found: u8,
    },

    /// The file was written by a newer (or unknown) schema
    #[error("Unsupported file version {file_version} (this build reads up to {supported})")]
    UnsupportedVersion {
        file_version: String,
        supported: String,
    },

    /// One step of the upgrade chain failed
    #[error("Migration from {from} to {to} failed: {reason}")]
    MigrationFailed {
        from: String,
        to: String,
        reason: String,
    },

    /// No emitter is registered for this entity type in this dialect
    #[error("No {dialect} emitter registered for {entity_kind} type '{type_tag}'")]
    EntityTypeUnsupported {
        entity_kind: EntityKind,
        type_tag: String,
        dialect: String,
    },

    /// A results run is unreadable or malformed
    #[error("Results run '{run_id}' is corrupt: {reason}")]
    CorruptResultsStore { run_id: String, reason: String },

    /// Requested step is past the committed step count of a run
    #[error("Step {step} is out of range for run '{run_id}' ({committed} committed steps)")]
    StepOutOfRange {
        run_id: String,
        step: u64,
        committed: u64,
    },

    /// A run or series does not exist in the results store
    #[error("Results not found for run '{run_id}': {path}")]
    ResultsNotFound { run_id: String, path: String },

    /// An input value is invalid (out of range, wrong type, etc.)
    #[error("Invalid input for '{field}': {value} - {reason}")]
    InvalidInput {
        field: String,
        value: String,
        reason: String,
    },

    /// File I/O error
    #[error("File error: {operation} on '{path}' - {reason}")]
    FileError {
        operation: String,
        path: String,
        reason: String,
    },

    /// File is locked by another user/process
    #[error("File locked: '{path}' is locked by {locked_by} since {locked_at}")]
    FileLocked {
        path: String,
        locked_by: String,
        locked_at: String,
    },

    /// JSON/TOML serialization or deserialization error
    #[error("Serialization error: {reason}")]
    SerializationError { reason: String },

    /// Generic internal error (should be rare)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ModelError {
    /// Create an InvalidInput error
    pub fn invalid_input(field: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        ModelError::InvalidInput {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a ValidationError
    pub fn validation(entity_kind: EntityKind, id: EntityId, field: impl Into<String>, reason: impl Into<String>) -> Self {
        ModelError::ValidationError {
            entity_kind,
            id,
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a FileError
    pub fn file_error(operation: impl Into<String>, path: impl Into<String>, reason: impl Into<String>) -> Self {
        ModelError::FileError {
            operation: operation.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a FileLocked error
    pub fn file_locked(path: impl Into<String>, locked_by: impl Into<String>, locked_at: impl Into<String>) -> Self {
        ModelError::FileLocked {
            path: path.into(),
            locked_by: locked_by.into(),
            locked_at: locked_at.into(),
        }
    }

    /// Create a SerializationError
    pub fn serialization(reason: impl fmt::Display) -> Self {
        ModelError::SerializationError {
            reason: reason.to_string(),
        }
    }

    /// Create a CorruptResultsStore error
    pub fn corrupt_run(run_id: impl Into<String>, reason: impl Into<String>) -> Self {
        ModelError::CorruptResultsStore {
            run_id: run_id.into(),
            reason: reason.into(),
        }
    }

    /// Check if this is a recoverable error (e.g., can retry)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ModelError::FileLocked { .. })
    }

    /// Get a short error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ModelError::DuplicateId { .. } => "DUPLICATE_ID",
            ModelError::NotFound { .. } => "NOT_FOUND",
            ModelError::ReferencedByOthers { .. } => "REFERENCED_BY_OTHERS",
            ModelError::ValidationError { .. } => "VALIDATION_ERROR",
            ModelError::StageDimensionMismatch { .. } => "STAGE_DIMENSION_MISMATCH",
            ModelError::UnsupportedVersion { .. } => "UNSUPPORTED_VERSION",
            ModelError::MigrationFailed { .. } => "MIGRATION_FAILED",
            ModelError::EntityTypeUnsupported { .. } => "ENTITY_TYPE_UNSUPPORTED",
            ModelError::CorruptResultsStore { .. } => "CORRUPT_RESULTS_STORE",
            ModelError::StepOutOfRange { .. } => "STEP_OUT_OF_RANGE",
            ModelError::ResultsNotFound { .. } => "RESULTS_NOT_FOUND",
            ModelError::InvalidInput { .. } => "INVALID_INPUT",
            ModelError::FileError { .. } => "FILE_ERROR",
            ModelError::FileLocked { .. } => "FILE_LOCKED",
            ModelError::SerializationError { .. } => "SERIALIZATION_ERROR",
            ModelError::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

// ============================================================================
// Validation issues
// ============================================================================

/// One integrity problem found by model validation.
///
/// Issues cite the entity and the field at fault. They are ordered by entity
/// kind (declaration order), then registry insertion order, then field order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub entity_kind: EntityKind,
    pub id: EntityId,
    pub field: String,
    pub reason: IssueReason,
}

impl ValidationIssue {
    pub fn new(entity: EntityRef, field: impl Into<String>, reason: IssueReason) -> Self {
        ValidationIssue {
            entity_kind: entity.kind,
            id: entity.id,
            field: field.into(),
            reason,
        }
    }

    /// The entity this issue is attached to
    pub fn entity(&self) -> EntityRef {
        EntityRef::new(self.entity_kind, self.id)
    }

    /// Convert to the error raised when an operation requires a valid model.
    pub fn to_error(&self) -> ModelError {
        match &self.reason {
            IssueReason::StageDimensionMismatch { node_id, expected, found } => {
                ModelError::StageDimensionMismatch {
                    stage_id: self.id,
                    node_id: *node_id,
                    expected: *expected,
                    found: *found,
                }
            }
            reason => ModelError::validation(self.entity_kind, self.id, self.field.clone(), reason.to_string()),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [{}]: {}", self.entity_kind, self.id, self.field, self.reason)
    }
}

/// Why a field failed validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code")]
pub enum IssueReason {
    /// The referenced entity does not exist
    DanglingReference { target_kind: EntityKind, target_id: EntityId },
    /// Fixed-dof vector length does not match the coordinate count
    DofCountMismatch { expected: usize, actual: usize },
    /// Coordinate count outside 1..=3
    InvalidDimension { count: usize },
    /// Node dimension differs from the dimension in effect
    DimensionMismatch { expected: u8, found: u8 },
    /// A stage activates a node of another dimension without an override
    StageDimensionMismatch { node_id: EntityId, expected: u8, found: u8 },
    /// Wrong number of nodes for the element or constraint type
    NodeCountMismatch { expected: String, actual: usize },
    /// The referenced entity only becomes active in a later stage
    ActivationOrder { target_kind: EntityKind, target_id: EntityId, stage_id: EntityId },
    /// A vector has the wrong number of components
    LengthMismatch { expected: usize, actual: usize },
    /// Type-specific payload check failed
    InvalidValue { message: String },
}

impl fmt::Display for IssueReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueReason::DanglingReference { target_kind, target_id } => {
                write!(f, "references missing {target_kind} {target_id}")
            }
            IssueReason::DofCountMismatch { expected, actual } => {
                write!(f, "dof count mismatch: expected {expected} flags, found {actual}")
            }
            IssueReason::InvalidDimension { count } => {
                write!(f, "{count} coordinates given, expected 1 to 3")
            }
            IssueReason::DimensionMismatch { expected, found } => {
                write!(f, "node is {found}D but the model is {expected}D")
            }
            IssueReason::StageDimensionMismatch { node_id, expected, found } => write!(
                f,
                "node {node_id} is {found}D but the model is {expected}D and no override is declared"
            ),
            IssueReason::NodeCountMismatch { expected, actual } => {
                write!(f, "expected {expected} nodes, found {actual}")
            }
            IssueReason::ActivationOrder { target_kind, target_id, stage_id } => {
                write!(f, "{target_kind} {target_id} is not active until stage {stage_id}")
            }
            IssueReason::LengthMismatch { expected, actual } => {
                write!(f, "expected {expected} components, found {actual}")
            }
            IssueReason::InvalidValue { message } => f.write_str(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let error = ModelError::DuplicateId {
            kind: EntityKind::Node,
            id: 3,
        };
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("\"type\":\"DuplicateId\""));
        let roundtrip: ModelError = serde_json::from_str(&json).unwrap();
        assert_eq!(error, roundtrip);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ModelError::invalid_input("x", "1", "bad").error_code(), "INVALID_INPUT");
        assert_eq!(ModelError::corrupt_run("r1", "bad header").error_code(), "CORRUPT_RESULTS_STORE");
        assert!(ModelError::file_locked("a", "b", "c").is_recoverable());
        assert!(!ModelError::serialization("x").is_recoverable());
    }

    #[test]
    fn test_referenced_by_others_message_counts_dependents() {
        let error = ModelError::ReferencedByOthers {
            kind: EntityKind::Node,
            id: 1,
            dependents: vec![
                EntityRef::new(EntityKind::Element, 1),
                EntityRef::new(EntityKind::Load, 4),
            ],
        };
        assert_eq!(error.to_string(), "Node 1 is referenced by 2 other entities");
    }

    #[test]
    fn test_issue_to_error() {
        let issue = ValidationIssue::new(
            EntityRef::new(EntityKind::Element, 5),
            "material",
            IssueReason::DanglingReference {
                target_kind: EntityKind::Material,
                target_id: 9,
            },
        );
        match issue.to_error() {
            ModelError::ValidationError { entity_kind, id, field, reason } => {
                assert_eq!(entity_kind, EntityKind::Element);
                assert_eq!(id, 5);
                assert_eq!(field, "material");
                assert!(reason.contains("Material 9"));
            }
            other => panic!("unexpected error {other:?}"),
        }

        let stage_issue = ValidationIssue::new(
            EntityRef::new(EntityKind::Stage, 2),
            "node_ids",
            IssueReason::StageDimensionMismatch {
                node_id: 8,
                expected: 2,
                found: 3,
            },
        );
        assert_eq!(stage_issue.to_error().error_code(), "STAGE_DIMENSION_MISMATCH");
    }
}
