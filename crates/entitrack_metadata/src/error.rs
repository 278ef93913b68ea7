//! Error types for model construction.

use thiserror::Error;

use crate::value::ValueKind;

/// Result type for metadata operations.
pub type MetadataResult<T> = Result<T, MetadataError>;

/// Errors raised while building or querying a model.
///
/// All of these are configuration faults: they are detected eagerly when the
/// model is built and are never tolerated at tracking time.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Two entity types share a name.
    #[error("duplicate entity type: {name}")]
    DuplicateEntityType {
        /// Name of the entity type.
        name: String,
    },

    /// A spec referenced an entity type that was never declared.
    #[error("unknown entity type: {name}")]
    UnknownEntityType {
        /// Name of the entity type.
        name: String,
    },

    /// Two fields of the same entity type share a name.
    #[error("duplicate field {field} on entity type {entity_type}")]
    DuplicateField {
        /// Owning entity type.
        entity_type: String,
        /// Name of the field.
        field: String,
    },

    /// A spec referenced a field that does not exist on its entity type.
    #[error("unknown field {field} on entity type {entity_type}")]
    UnknownField {
        /// Owning entity type.
        entity_type: String,
        /// Name of the field.
        field: String,
    },

    /// An entity type declared no key fields.
    #[error("entity type {entity_type} has no key")]
    MissingKey {
        /// Name of the entity type.
        entity_type: String,
    },

    /// A key field was declared nullable.
    #[error("key field {field} on entity type {entity_type} must not be nullable")]
    NullableKeyField {
        /// Owning entity type.
        entity_type: String,
        /// Name of the field.
        field: String,
    },

    /// A foreign key's dependent field count differs from the principal key.
    #[error(
        "foreign key on {dependent_type} has {dependent_fields} field(s) \
         but the key of {principal_type} has {principal_fields}"
    )]
    ForeignKeyArity {
        /// Dependent entity type.
        dependent_type: String,
        /// Number of dependent-side fields.
        dependent_fields: usize,
        /// Principal entity type.
        principal_type: String,
        /// Number of principal key fields.
        principal_fields: usize,
    },

    /// A foreign key field's kind differs from the paired principal key field.
    #[error(
        "foreign key field {dependent_field} is {dependent_kind:?} \
         but principal key field {principal_field} is {principal_kind:?}"
    )]
    ForeignKeyTypeMismatch {
        /// Dependent-side field name.
        dependent_field: String,
        /// Dependent-side field kind.
        dependent_kind: ValueKind,
        /// Principal key field name.
        principal_field: String,
        /// Principal key field kind.
        principal_kind: ValueKind,
    },

    /// Two navigations (or a navigation and a field) on one type share a name.
    #[error("duplicate navigation {navigation} on entity type {entity_type}")]
    DuplicateNavigation {
        /// Declaring entity type.
        entity_type: String,
        /// Name of the navigation.
        navigation: String,
    },

    /// A collection navigation was paired with a unique (one-to-one) foreign key.
    #[error("collection navigation {navigation} cannot pair with a unique foreign key")]
    CollectionOnUniqueForeignKey {
        /// Name of the navigation.
        navigation: String,
    },

    /// A principal-side reference navigation was paired with a non-unique foreign key.
    #[error("reference navigation {navigation} requires a unique foreign key")]
    ReferenceForMultipleDependents {
        /// Name of the navigation.
        navigation: String,
    },

    /// A foreign key declared both a principal-side collection and reference.
    #[error("foreign key on {dependent_type} declares two principal-side navigations")]
    ConflictingPrincipalNavigations {
        /// Dependent entity type.
        dependent_type: String,
    },
}

impl MetadataError {
    /// Creates an unknown entity type error.
    pub fn unknown_entity_type(name: impl Into<String>) -> Self {
        Self::UnknownEntityType { name: name.into() }
    }

    /// Creates an unknown field error.
    pub fn unknown_field(entity_type: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            entity_type: entity_type.into(),
            field: field.into(),
        }
    }

    /// Creates a duplicate field error.
    pub fn duplicate_field(entity_type: impl Into<String>, field: impl Into<String>) -> Self {
        Self::DuplicateField {
            entity_type: entity_type.into(),
            field: field.into(),
        }
    }

    /// Creates a duplicate navigation error.
    pub fn duplicate_navigation(
        entity_type: impl Into<String>,
        navigation: impl Into<String>,
    ) -> Self {
        Self::DuplicateNavigation {
            entity_type: entity_type.into(),
            navigation: navigation.into(),
        }
    }
}
