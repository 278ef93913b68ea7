//! Model registry and builder.

use std::collections::HashMap;
use std::sync::Arc;

use crate::entity_type::{ChangeTracking, EntityType, EntityTypeId};
use crate::error::{MetadataError, MetadataResult};
use crate::field::{FieldDef, FieldId};
use crate::foreign_key::{ForeignKey, ForeignKeyId, Navigation, NavigationId, NavigationKind};
use crate::value::ValueKind;

/// Declares one field of an entity type.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    name: String,
    kind: ValueKind,
    nullable: bool,
    shadow: bool,
}

impl FieldSpec {
    /// Creates a non-nullable, non-shadow field spec.
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            shadow: false,
        }
    }

    /// Marks the field nullable.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Marks the field shadow-only (stored in tracking state, absent from
    /// the typed instance).
    #[must_use]
    pub fn shadow(mut self) -> Self {
        self.shadow = true;
        self
    }
}

/// Declares one entity type.
#[derive(Debug, Clone)]
pub struct EntityTypeSpec {
    name: String,
    fields: Vec<FieldSpec>,
    key: Vec<String>,
    change_tracking: ChangeTracking,
}

impl EntityTypeSpec {
    /// Creates an entity type spec with no fields and notifying change tracking.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            key: Vec::new(),
            change_tracking: ChangeTracking::default(),
        }
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Declares the key fields, in order.
    #[must_use]
    pub fn key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the change tracking strategy.
    #[must_use]
    pub fn change_tracking(mut self, strategy: ChangeTracking) -> Self {
        self.change_tracking = strategy;
        self
    }
}

/// Declares a relationship between a dependent and a principal type.
///
/// The dependent fields must line up with the principal type's key, in
/// order. Navigations are optional on both sides.
#[derive(Debug, Clone)]
pub struct ForeignKeySpec {
    dependent_type: String,
    dependent_fields: Vec<String>,
    principal_type: String,
    unique: bool,
    reference: Option<String>,
    collection: Option<String>,
    inverse_reference: Option<String>,
}

impl ForeignKeySpec {
    /// Creates a foreign key spec.
    pub fn new<I, S>(
        dependent_type: impl Into<String>,
        dependent_fields: I,
        principal_type: impl Into<String>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dependent_type: dependent_type.into(),
            dependent_fields: dependent_fields.into_iter().map(Into::into).collect(),
            principal_type: principal_type.into(),
            unique: false,
            reference: None,
            collection: None,
            inverse_reference: None,
        }
    }

    /// Marks the relationship one-to-one: at most one dependent per principal.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Declares the dependent-to-principal reference navigation.
    #[must_use]
    pub fn with_reference(mut self, name: impl Into<String>) -> Self {
        self.reference = Some(name.into());
        self
    }

    /// Declares the principal-to-dependents collection navigation.
    ///
    /// Only valid for non-unique relationships.
    #[must_use]
    pub fn with_collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    /// Declares the principal-to-dependent reference navigation.
    ///
    /// Only valid for unique (one-to-one) relationships.
    #[must_use]
    pub fn with_inverse_reference(mut self, name: impl Into<String>) -> Self {
        self.inverse_reference = Some(name.into());
        self
    }
}

/// An immutable registry of entity types, foreign keys, and navigations.
///
/// Built once per schema via [`Model::builder`] and shared (it is handed out
/// as an `Arc`) by every state manager tracking instances of its types.
#[derive(Debug)]
pub struct Model {
    entity_types: Vec<Arc<EntityType>>,
    foreign_keys: Vec<ForeignKey>,
    navigations: Vec<Navigation>,
    by_name: HashMap<String, EntityTypeId>,
}

impl Model {
    /// Starts building a model.
    #[must_use]
    pub fn builder() -> ModelBuilder {
        ModelBuilder::default()
    }

    /// Returns the entity type with the given id.
    ///
    /// # Panics
    ///
    /// Panics if the id does not belong to this model. Ids obtained from
    /// this model are always valid.
    #[must_use]
    pub fn entity_type(&self, id: EntityTypeId) -> &Arc<EntityType> {
        &self.entity_types[id.index()]
    }

    /// Looks up an entity type by name.
    #[must_use]
    pub fn entity_type_named(&self, name: &str) -> Option<&Arc<EntityType>> {
        self.by_name.get(name).map(|id| self.entity_type(*id))
    }

    /// Returns all entity types.
    #[must_use]
    pub fn entity_types(&self) -> &[Arc<EntityType>] {
        &self.entity_types
    }

    /// Returns the foreign key with the given id.
    ///
    /// # Panics
    ///
    /// Panics if the id does not belong to this model.
    #[must_use]
    pub fn foreign_key(&self, id: ForeignKeyId) -> &ForeignKey {
        &self.foreign_keys[id.index()]
    }

    /// Returns all foreign keys.
    #[must_use]
    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    /// Returns the navigation with the given id.
    ///
    /// # Panics
    ///
    /// Panics if the id does not belong to this model.
    #[must_use]
    pub fn navigation(&self, id: NavigationId) -> &Navigation {
        &self.navigations[id.index()]
    }

    /// Returns all navigations.
    #[must_use]
    pub fn navigations(&self) -> &[Navigation] {
        &self.navigations
    }

    /// Looks up a navigation by declaring type and name.
    #[must_use]
    pub fn navigation_named(&self, entity_type: EntityTypeId, name: &str) -> Option<&Navigation> {
        self.navigations
            .iter()
            .find(|n| n.declaring_type() == entity_type && n.name() == name)
    }
}

/// Builds a [`Model`] from entity type and foreign key specs.
///
/// All validation happens in [`build`](ModelBuilder::build): unknown names,
/// arity and kind mismatches between foreign keys and principal keys,
/// nullable key fields, and navigation pairing faults are reported eagerly
/// as [`MetadataError`]s.
#[derive(Debug, Default)]
pub struct ModelBuilder {
    entities: Vec<EntityTypeSpec>,
    foreign_keys: Vec<ForeignKeySpec>,
}

impl ModelBuilder {
    /// Adds an entity type.
    #[must_use]
    pub fn entity(mut self, spec: EntityTypeSpec) -> Self {
        self.entities.push(spec);
        self
    }

    /// Adds a foreign key.
    #[must_use]
    pub fn foreign_key(mut self, spec: ForeignKeySpec) -> Self {
        self.foreign_keys.push(spec);
        self
    }

    /// Resolves and validates all specs, producing the model.
    pub fn build(self) -> MetadataResult<Arc<Model>> {
        let mut by_name: HashMap<String, EntityTypeId> = HashMap::new();
        let mut types: Vec<EntityType> = Vec::new();

        for (i, spec) in self.entities.into_iter().enumerate() {
            let id = EntityTypeId::new(u32::try_from(i).unwrap_or(u32::MAX));
            if by_name.insert(spec.name.clone(), id).is_some() {
                return Err(MetadataError::DuplicateEntityType { name: spec.name });
            }

            let mut fields: Vec<FieldDef> = Vec::with_capacity(spec.fields.len());
            for (j, f) in spec.fields.into_iter().enumerate() {
                if fields.iter().any(|d| d.name() == f.name) {
                    return Err(MetadataError::duplicate_field(spec.name.as_str(), f.name));
                }
                fields.push(FieldDef::new(
                    f.name,
                    FieldId::new(u32::try_from(j).unwrap_or(u32::MAX)),
                    f.kind,
                    f.nullable,
                    f.shadow,
                ));
            }

            if spec.key.is_empty() {
                return Err(MetadataError::MissingKey {
                    entity_type: spec.name,
                });
            }
            let mut key = Vec::with_capacity(spec.key.len());
            for key_name in &spec.key {
                let def = fields
                    .iter()
                    .find(|d| d.name() == *key_name)
                    .ok_or_else(|| MetadataError::unknown_field(spec.name.as_str(), key_name.as_str()))?;
                if def.is_nullable() {
                    return Err(MetadataError::NullableKeyField {
                        entity_type: spec.name,
                        field: key_name.clone(),
                    });
                }
                key.push(def.id());
            }

            types.push(EntityType::new(id, spec.name, fields, key, spec.change_tracking));
        }

        let mut foreign_keys: Vec<ForeignKey> = Vec::new();
        let mut navigations: Vec<Navigation> = Vec::new();

        for (i, spec) in self.foreign_keys.into_iter().enumerate() {
            let fk_id = ForeignKeyId::new(u32::try_from(i).unwrap_or(u32::MAX));
            let dependent_type = *by_name
                .get(&spec.dependent_type)
                .ok_or_else(|| MetadataError::unknown_entity_type(spec.dependent_type.as_str()))?;
            let principal_type = *by_name
                .get(&spec.principal_type)
                .ok_or_else(|| MetadataError::unknown_entity_type(spec.principal_type.as_str()))?;

            let mut dependent_fields = Vec::with_capacity(spec.dependent_fields.len());
            for name in &spec.dependent_fields {
                let def = types[dependent_type.index()]
                    .field_named(name)
                    .ok_or_else(|| MetadataError::unknown_field(spec.dependent_type.as_str(), name.as_str()))?;
                dependent_fields.push(def.id());
            }

            let principal_key = types[principal_type.index()].key().to_vec();
            if dependent_fields.len() != principal_key.len() {
                return Err(MetadataError::ForeignKeyArity {
                    dependent_type: spec.dependent_type,
                    dependent_fields: dependent_fields.len(),
                    principal_type: spec.principal_type,
                    principal_fields: principal_key.len(),
                });
            }
            for (df, pf) in dependent_fields.iter().zip(principal_key.iter()) {
                let dep_def = types[dependent_type.index()].field(*df);
                let prin_def = types[principal_type.index()].field(*pf);
                if dep_def.kind() != prin_def.kind() {
                    return Err(MetadataError::ForeignKeyTypeMismatch {
                        dependent_field: dep_def.name().to_owned(),
                        dependent_kind: dep_def.kind(),
                        principal_field: prin_def.name().to_owned(),
                        principal_kind: prin_def.kind(),
                    });
                }
            }

            if spec.collection.is_some() && spec.inverse_reference.is_some() {
                return Err(MetadataError::ConflictingPrincipalNavigations {
                    dependent_type: spec.dependent_type,
                });
            }
            if let (Some(name), true) = (&spec.collection, spec.unique) {
                return Err(MetadataError::CollectionOnUniqueForeignKey {
                    navigation: name.clone(),
                });
            }
            if let (Some(name), false) = (&spec.inverse_reference, spec.unique) {
                return Err(MetadataError::ReferenceForMultipleDependents {
                    navigation: name.clone(),
                });
            }

            let mut add_navigation = |navigations: &mut Vec<Navigation>,
                                      types: &mut Vec<EntityType>,
                                      name: String,
                                      declaring: EntityTypeId,
                                      kind: NavigationKind,
                                      to_principal: bool|
             -> MetadataResult<NavigationId> {
                let declaring_type = &types[declaring.index()];
                let clashes = declaring_type.field_named(&name).is_some()
                    || navigations
                        .iter()
                        .any(|n| n.declaring_type() == declaring && n.name() == name);
                if clashes {
                    return Err(MetadataError::duplicate_navigation(
                        declaring_type.name(),
                        name,
                    ));
                }
                let nav_id = NavigationId::new(u32::try_from(navigations.len()).unwrap_or(u32::MAX));
                navigations.push(Navigation::new(nav_id, name, declaring, fk_id, kind, to_principal));
                types[declaring.index()].add_navigation(nav_id);
                Ok(nav_id)
            };

            let dependent_to_principal = match spec.reference {
                Some(name) => Some(add_navigation(
                    &mut navigations,
                    &mut types,
                    name,
                    dependent_type,
                    NavigationKind::Reference,
                    true,
                )?),
                None => None,
            };
            let principal_to_dependents = match (spec.collection, spec.inverse_reference) {
                (Some(name), _) => Some(add_navigation(
                    &mut navigations,
                    &mut types,
                    name,
                    principal_type,
                    NavigationKind::Collection,
                    false,
                )?),
                (None, Some(name)) => Some(add_navigation(
                    &mut navigations,
                    &mut types,
                    name,
                    principal_type,
                    NavigationKind::Reference,
                    false,
                )?),
                (None, None) => None,
            };

            foreign_keys.push(ForeignKey::new(
                fk_id,
                dependent_type,
                dependent_fields,
                principal_type,
                principal_key,
                spec.unique,
                dependent_to_principal,
                principal_to_dependents,
            ));
            types[dependent_type.index()].add_foreign_key(fk_id);
            types[principal_type.index()].add_referencing_key(fk_id);
        }

        Ok(Arc::new(Model {
            entity_types: types.into_iter().map(Arc::new).collect(),
            foreign_keys,
            navigations,
            by_name,
        }))
    }
}
