//! Entity type descriptors.

use std::fmt;

use crate::field::{FieldDef, FieldId};
use crate::foreign_key::{ForeignKeyId, NavigationId};

/// Identifier for an entity type within a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityTypeId(pub u32);

impl EntityTypeId {
    /// Creates a new entity type id.
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

impl fmt::Display for EntityTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type:{}", self.0)
    }
}

/// How changes to instances of a type are detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeTracking {
    /// All writes flow through the tracker; original values are captured
    /// lazily the first time a field changes. `detect_changes` is a no-op.
    #[default]
    Notifying,
    /// Instances may be mutated directly; a full original-values snapshot is
    /// captured when tracking starts and `detect_changes` compares against it.
    Snapshot,
}

/// Describes one entity type: its fields, key, relationships, and navigations.
///
/// Entity types are immutable once the owning model is built.
#[derive(Debug)]
pub struct EntityType {
    id: EntityTypeId,
    name: String,
    fields: Vec<FieldDef>,
    key: Vec<FieldId>,
    change_tracking: ChangeTracking,
    has_shadow_fields: bool,
    /// Foreign keys where this type is the dependent.
    foreign_keys: Vec<ForeignKeyId>,
    /// Foreign keys where this type is the principal.
    referencing_keys: Vec<ForeignKeyId>,
    /// Navigations declared on this type.
    navigations: Vec<NavigationId>,
}

impl EntityType {
    pub(crate) fn new(
        id: EntityTypeId,
        name: String,
        fields: Vec<FieldDef>,
        key: Vec<FieldId>,
        change_tracking: ChangeTracking,
    ) -> Self {
        let has_shadow_fields = fields.iter().any(FieldDef::is_shadow);
        Self {
            id,
            name,
            fields,
            key,
            change_tracking,
            has_shadow_fields,
            foreign_keys: Vec::new(),
            referencing_keys: Vec::new(),
            navigations: Vec::new(),
        }
    }

    pub(crate) fn add_foreign_key(&mut self, fk: ForeignKeyId) {
        self.foreign_keys.push(fk);
    }

    pub(crate) fn add_referencing_key(&mut self, fk: ForeignKeyId) {
        self.referencing_keys.push(fk);
    }

    pub(crate) fn add_navigation(&mut self, nav: NavigationId) {
        self.navigations.push(nav);
    }

    /// Returns the entity type id.
    #[must_use]
    pub fn id(&self) -> EntityTypeId {
        self.id
    }

    /// Returns the entity type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns all fields in ordinal order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Returns the field with the given id.
    ///
    /// # Panics
    ///
    /// Panics if the id does not belong to this type. Field ids obtained
    /// from this type or its model are always valid.
    #[must_use]
    pub fn field(&self, id: FieldId) -> &FieldDef {
        &self.fields[id.index()]
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn field_named(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Looks up a field id by name.
    #[must_use]
    pub fn field_id(&self, name: &str) -> Option<FieldId> {
        self.field_named(name).map(FieldDef::id)
    }

    /// Returns the key fields in declaration order.
    #[must_use]
    pub fn key(&self) -> &[FieldId] {
        &self.key
    }

    /// Returns true if `field` is part of the key.
    #[must_use]
    pub fn is_key_field(&self, field: FieldId) -> bool {
        self.key.contains(&field)
    }

    /// Returns the change tracking strategy for this type.
    #[must_use]
    pub fn change_tracking(&self) -> ChangeTracking {
        self.change_tracking
    }

    /// Returns true if any field is shadow-only.
    #[must_use]
    pub fn has_shadow_fields(&self) -> bool {
        self.has_shadow_fields
    }

    /// Returns the foreign keys where this type is the dependent.
    #[must_use]
    pub fn foreign_keys(&self) -> &[ForeignKeyId] {
        &self.foreign_keys
    }

    /// Returns the foreign keys where this type is the principal.
    #[must_use]
    pub fn referencing_keys(&self) -> &[ForeignKeyId] {
        &self.referencing_keys
    }

    /// Returns the navigations declared on this type.
    #[must_use]
    pub fn navigations(&self) -> &[NavigationId] {
        &self.navigations
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
