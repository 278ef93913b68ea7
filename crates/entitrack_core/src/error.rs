//! Error types for the tracking engine.

use entitrack_metadata::{MetadataError, ValueKind};
use thiserror::Error;

/// Result type for tracking operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in tracking operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Model configuration fault.
    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// The entry id does not refer to a tracked entry of this manager.
    #[error("entry {entry} is not tracked by this manager")]
    EntryNotTracked {
        /// The unknown entry id.
        entry: u32,
    },

    /// A second entry with an already-registered key was started tracking.
    #[error("duplicate key for entity type {entity_type}: {key}")]
    DuplicateKey {
        /// Name of the entity type.
        entity_type: String,
        /// Rendering of the conflicting key.
        key: String,
    },

    /// A key could not be constructed because a component was null.
    #[error("null key value in field {field} of entity type {entity_type}")]
    NullKeyValue {
        /// Name of the entity type.
        entity_type: String,
        /// Name of the null key field.
        field: String,
    },

    /// A written value's kind does not match the field's declared kind.
    #[error("value kind mismatch on field {field}: expected {expected:?}, got {actual:?}")]
    ValueKindMismatch {
        /// Name of the field.
        field: String,
        /// Declared kind.
        expected: ValueKind,
        /// Kind of the rejected value.
        actual: ValueKind,
    },

    /// The backing storage does not fit the entity type.
    #[error("accessor mismatch for entity type {entity_type}: {message}")]
    AccessorMismatch {
        /// Name of the entity type.
        entity_type: String,
        /// Description of the mismatch.
        message: String,
    },

    /// A navigation id was used on a type that does not declare it.
    #[error("navigation {navigation} is not declared on entity type {entity_type}")]
    UnknownNavigation {
        /// Name of the entity type.
        entity_type: String,
        /// Display of the navigation id.
        navigation: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// Key generation was canceled before a value was produced.
    #[error("key generation canceled")]
    KeyGenerationCanceled,

    /// A key generator failed to produce a value.
    #[error("key generation failed: {message}")]
    KeyGeneration {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates an entry-not-tracked error.
    pub fn entry_not_tracked(entry: u32) -> Self {
        Self::EntryNotTracked { entry }
    }

    /// Creates a duplicate key error.
    pub fn duplicate_key(entity_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self::DuplicateKey {
            entity_type: entity_type.into(),
            key: key.into(),
        }
    }

    /// Creates a null key value error.
    pub fn null_key_value(entity_type: impl Into<String>, field: impl Into<String>) -> Self {
        Self::NullKeyValue {
            entity_type: entity_type.into(),
            field: field.into(),
        }
    }

    /// Creates an accessor mismatch error.
    pub fn accessor_mismatch(entity_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AccessorMismatch {
            entity_type: entity_type.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a key generation failure error.
    pub fn key_generation(message: impl Into<String>) -> Self {
        Self::KeyGeneration {
            message: message.into(),
        }
    }
}
