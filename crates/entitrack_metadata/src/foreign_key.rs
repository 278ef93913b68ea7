//! Foreign key and navigation descriptors.

use std::fmt;

use crate::entity_type::EntityTypeId;
use crate::field::FieldId;

/// Identifier for a foreign key, global within a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ForeignKeyId(pub u32);

impl ForeignKeyId {
    /// Creates a new foreign key id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the id as an index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ForeignKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fk:{}", self.0)
    }
}

/// Identifier for a navigation, global within a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NavigationId(pub u32);

impl NavigationId {
    /// Creates a new navigation id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the id as an index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NavigationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nav:{}", self.0)
    }
}

/// Cardinality of a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationKind {
    /// Points at a single entity.
    Reference,
    /// Holds a set of entities.
    Collection,
}

/// A relationship between a dependent and a principal entity type.
///
/// The dependent side holds the foreign key fields; the principal side holds
/// the referenced key. Zero, one, or two navigations may pair with the
/// relationship. Foreign keys are read-only configuration: the tracking
/// engine consumes them, it never creates or mutates them.
#[derive(Debug, Clone)]
pub struct ForeignKey {
    id: ForeignKeyId,
    dependent_type: EntityTypeId,
    dependent_fields: Vec<FieldId>,
    principal_type: EntityTypeId,
    principal_key: Vec<FieldId>,
    unique: bool,
    dependent_to_principal: Option<NavigationId>,
    principal_to_dependents: Option<NavigationId>,
}

impl ForeignKey {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: ForeignKeyId,
        dependent_type: EntityTypeId,
        dependent_fields: Vec<FieldId>,
        principal_type: EntityTypeId,
        principal_key: Vec<FieldId>,
        unique: bool,
        dependent_to_principal: Option<NavigationId>,
        principal_to_dependents: Option<NavigationId>,
    ) -> Self {
        Self {
            id,
            dependent_type,
            dependent_fields,
            principal_type,
            principal_key,
            unique,
            dependent_to_principal,
            principal_to_dependents,
        }
    }

    /// Returns the foreign key id.
    #[must_use]
    pub fn id(&self) -> ForeignKeyId {
        self.id
    }

    /// Returns the dependent entity type (the side holding the foreign key).
    #[must_use]
    pub fn dependent_type(&self) -> EntityTypeId {
        self.dependent_type
    }

    /// Returns the dependent-side fields, ordered to match the principal key.
    #[must_use]
    pub fn dependent_fields(&self) -> &[FieldId] {
        &self.dependent_fields
    }

    /// Returns the principal entity type (the side holding the referenced key).
    #[must_use]
    pub fn principal_type(&self) -> EntityTypeId {
        self.principal_type
    }

    /// Returns the principal key fields.
    #[must_use]
    pub fn principal_key(&self) -> &[FieldId] {
        &self.principal_key
    }

    /// Returns true if at most one dependent may reference a given principal.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Returns the dependent-to-principal reference navigation, if declared.
    #[must_use]
    pub fn dependent_to_principal(&self) -> Option<NavigationId> {
        self.dependent_to_principal
    }

    /// Returns the principal-to-dependent(s) navigation, if declared.
    ///
    /// A collection for ordinary foreign keys, a reference for unique ones.
    #[must_use]
    pub fn principal_to_dependents(&self) -> Option<NavigationId> {
        self.principal_to_dependents
    }

    /// Returns true if `field` is one of the dependent-side fields.
    #[must_use]
    pub fn contains_dependent_field(&self, field: FieldId) -> bool {
        self.dependent_fields.contains(&field)
    }

    /// Returns true if the relationship references its own entity type.
    #[must_use]
    pub fn is_self_referencing(&self) -> bool {
        self.dependent_type == self.principal_type
    }
}

/// A navigation property paired with a foreign key.
#[derive(Debug, Clone)]
pub struct Navigation {
    id: NavigationId,
    name: String,
    declaring_type: EntityTypeId,
    foreign_key: ForeignKeyId,
    kind: NavigationKind,
    to_principal: bool,
}

impl Navigation {
    pub(crate) fn new(
        id: NavigationId,
        name: String,
        declaring_type: EntityTypeId,
        foreign_key: ForeignKeyId,
        kind: NavigationKind,
        to_principal: bool,
    ) -> Self {
        Self {
            id,
            name,
            declaring_type,
            foreign_key,
            kind,
            to_principal,
        }
    }

    /// Returns the navigation id.
    #[must_use]
    pub fn id(&self) -> NavigationId {
        self.id
    }

    /// Returns the navigation name, unique within the declaring type.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the type declaring this navigation.
    #[must_use]
    pub fn declaring_type(&self) -> EntityTypeId {
        self.declaring_type
    }

    /// Returns the paired foreign key.
    #[must_use]
    pub fn foreign_key(&self) -> ForeignKeyId {
        self.foreign_key
    }

    /// Returns the navigation's cardinality.
    #[must_use]
    pub fn kind(&self) -> NavigationKind {
        self.kind
    }

    /// Returns true if the navigation points from dependent to principal.
    #[must_use]
    pub fn points_to_principal(&self) -> bool {
        self.to_principal
    }
}
