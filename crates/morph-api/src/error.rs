use serde::{Deserialize, Serialize};

use crate::CrudAction;

pub type Result<T> = std::result::Result<T, ApiError>;

/// Structured error types for morph operations.
///
/// Authorization and invariant failures are distinct variants so callers can
/// render specific messages; everything else is a generic failure carrying a
/// diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid field descriptor: {message}")]
    InvalidDescriptor { message: String },

    #[error("Entity type already exists: {name}")]
    AlreadyExists { name: String },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Unknown entity type: {name}")]
    UnknownEntity { name: String },

    #[error("Role '{role}' may not {action} '{entity}'")]
    AuthorizationDenied {
        role: String,
        action: CrudAction,
        entity: String,
    },

    #[error("Invariant violation: {message}")]
    InvariantViolation { message: String },

    #[error("Validation failed for '{field}': {message}")]
    ValidationError { field: String, message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ApiError {
    pub fn invalid_descriptor(message: impl Into<String>) -> Self {
        ApiError::InvalidDescriptor {
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        ApiError::NotFound { what: what.into() }
    }

    pub fn unknown_entity(name: impl Into<String>) -> Self {
        ApiError::UnknownEntity { name: name.into() }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        ApiError::InvariantViolation {
            message: message.into(),
        }
    }

    /// Stable machine-readable code for the variant.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidDescriptor { .. } => "invalid_descriptor",
            ApiError::AlreadyExists { .. } => "already_exists",
            ApiError::NotFound { .. } => "not_found",
            ApiError::UnknownEntity { .. } => "unknown_entity",
            ApiError::AuthorizationDenied { .. } => "authorization_denied",
            ApiError::InvariantViolation { .. } => "invariant_violation",
            ApiError::ValidationError { .. } => "validation_error",
            ApiError::Storage { .. } => "storage_error",
            ApiError::Internal { .. } => "internal_error",
        }
    }

    pub fn is_authorization_denied(&self) -> bool {
        matches!(self, ApiError::AuthorizationDenied { .. })
    }

    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, ApiError::InvariantViolation { .. })
    }
}

/// One failed reverse-relation update.
///
/// Never propagated as an operation error; the primary write has already
/// committed. Logged and collected into a sync report instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error(
    "relation sync failed: {target_entity}/{target_id}.{reverse_field} <- {source_entity}/{source_id}: {reason}"
)]
pub struct RelationSyncFailure {
    pub source_entity: String,
    pub source_id: String,
    pub target_entity: String,
    pub target_id: String,
    pub reverse_field: String,
    pub reason: String,
}
