//! Fixture model and graph helpers.
//!
//! Provides the canonical catalog model used across the test suites and a
//! [`TestGraph`] wrapper for setting up tracked entries with little
//! ceremony.

use std::sync::Arc;

use entitrack_core::{Backing, EntityState, EntryId, StateManager, TypedAccess};
use entitrack_metadata::{
    ChangeTracking, EntityTypeId, EntityTypeSpec, FieldDef, FieldId, FieldSpec, ForeignKeySpec,
    Model, NavigationId, Value, ValueKind,
};

/// Builds the canonical catalog model:
///
/// - `Category` (self-referencing `parent`/`children`)
/// - `Product` (many per `Category`, one shadow field)
/// - `ProductDetail` (one-to-one with `Product`)
/// - `Review` (snapshot-tracked, many per `Product`)
#[must_use]
pub fn catalog_model() -> Arc<Model> {
    Model::builder()
        .entity(
            EntityTypeSpec::new("Category")
                .field(FieldSpec::new("id", ValueKind::Integer))
                .field(FieldSpec::new("name", ValueKind::Text).nullable())
                .field(FieldSpec::new("parent_id", ValueKind::Integer).nullable())
                .key(["id"]),
        )
        .entity(
            EntityTypeSpec::new("Product")
                .field(FieldSpec::new("id", ValueKind::Integer))
                .field(FieldSpec::new("name", ValueKind::Text).nullable())
                .field(FieldSpec::new("price", ValueKind::Integer).nullable())
                .field(FieldSpec::new("category_id", ValueKind::Integer).nullable())
                .field(FieldSpec::new("row_version", ValueKind::Bytes).nullable().shadow())
                .key(["id"]),
        )
        .entity(
            EntityTypeSpec::new("ProductDetail")
                .field(FieldSpec::new("id", ValueKind::Integer))
                .field(FieldSpec::new("product_id", ValueKind::Integer).nullable())
                .field(FieldSpec::new("notes", ValueKind::Text).nullable())
                .key(["id"]),
        )
        .entity(
            EntityTypeSpec::new("Review")
                .field(FieldSpec::new("id", ValueKind::Integer))
                .field(FieldSpec::new("body", ValueKind::Text).nullable())
                .field(FieldSpec::new("product_id", ValueKind::Integer).nullable())
                .key(["id"])
                .change_tracking(ChangeTracking::Snapshot),
        )
        .foreign_key(
            ForeignKeySpec::new("Category", ["parent_id"], "Category")
                .with_reference("parent")
                .with_collection("children"),
        )
        .foreign_key(
            ForeignKeySpec::new("Product", ["category_id"], "Category")
                .with_reference("category")
                .with_collection("products"),
        )
        .foreign_key(
            ForeignKeySpec::new("ProductDetail", ["product_id"], "Product")
                .unique()
                .with_reference("product")
                .with_inverse_reference("detail"),
        )
        .foreign_key(
            ForeignKeySpec::new("Review", ["product_id"], "Product")
                .with_reference("product")
                .with_collection("reviews"),
        )
        .build()
        .expect("catalog model is valid")
}

/// A state manager over the catalog model with setup helpers.
#[derive(Debug)]
pub struct TestGraph {
    /// The wrapped manager.
    pub manager: StateManager,
}

impl TestGraph {
    /// Creates a graph over a fresh catalog model.
    #[must_use]
    pub fn new() -> Self {
        Self {
            manager: StateManager::new(catalog_model()),
        }
    }

    /// Returns the id of the named entity type.
    #[must_use]
    pub fn entity_type(&self, name: &str) -> EntityTypeId {
        self.manager
            .model()
            .entity_type_named(name)
            .expect("known entity type")
            .id()
    }

    /// Returns a field id by type and field name.
    #[must_use]
    pub fn field(&self, type_name: &str, field_name: &str) -> FieldId {
        self.manager
            .model()
            .entity_type_named(type_name)
            .expect("known entity type")
            .field_id(field_name)
            .expect("known field")
    }

    /// Returns a navigation id by declaring type and name.
    #[must_use]
    pub fn nav(&self, type_name: &str, nav_name: &str) -> NavigationId {
        let type_id = self.entity_type(type_name);
        self.manager
            .model()
            .navigation_named(type_id, nav_name)
            .expect("known navigation")
            .id()
    }

    /// Creates a detached shadow-backed entry of the named type.
    pub fn detached(&mut self, type_name: &str) -> EntryId {
        let et = Arc::clone(
            self.manager
                .model()
                .entity_type_named(type_name)
                .expect("known entity type"),
        );
        self.manager
            .create_entry(et.id(), Backing::shadow(et.field_count()))
            .expect("backing fits")
    }

    fn tracked(&mut self, type_name: &str, values: &[(&str, Value)]) -> EntryId {
        let id = self.detached(type_name);
        for (field_name, value) in values {
            let field = self.field(type_name, field_name);
            self.manager
                .set_value(id, field, value.clone())
                .expect("fixture value fits field");
        }
        self.manager
            .set_entity_state(id, EntityState::Unchanged)
            .expect("fixture key is unique");
        id
    }

    /// Tracks a category as `Unchanged`.
    pub fn tracked_category(&mut self, id: i64) -> EntryId {
        self.tracked("Category", &[("id", Value::Integer(id))])
    }

    /// Tracks a product as `Unchanged`, optionally inside a category.
    pub fn tracked_product(&mut self, id: i64, category: Option<i64>) -> EntryId {
        self.tracked(
            "Product",
            &[
                ("id", Value::Integer(id)),
                ("category_id", Value::from(category)),
            ],
        )
    }

    /// Tracks a product detail as `Unchanged`, optionally bound to a product.
    pub fn tracked_detail(&mut self, id: i64, product: Option<i64>) -> EntryId {
        self.tracked(
            "ProductDetail",
            &[
                ("id", Value::Integer(id)),
                ("product_id", Value::from(product)),
            ],
        )
    }

    /// Tracks a review as `Unchanged`, optionally bound to a product.
    pub fn tracked_review(&mut self, id: i64, product: Option<i64>) -> EntryId {
        self.tracked(
            "Review",
            &[
                ("id", Value::Integer(id)),
                ("product_id", Value::from(product)),
            ],
        )
    }
}

impl Default for TestGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestGraph {
    type Target = StateManager;

    fn deref(&self) -> &Self::Target {
        &self.manager
    }
}

impl std::ops::DerefMut for TestGraph {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.manager
    }
}

/// A typed product instance for accessor tests.
///
/// Covers every non-shadow field of the fixture `Product` type; the shadow
/// `row_version` field never reaches the instance.
#[derive(Debug, Default, Clone)]
pub struct TypedProduct {
    /// Primary key.
    pub id: i64,
    /// Display name.
    pub name: Option<String>,
    /// Unit price.
    pub price: Option<i64>,
    /// Owning category key, if any.
    pub category_id: Option<i64>,
}

impl TypedAccess for TypedProduct {
    fn read(&self, field: &FieldDef) -> Value {
        match field.name() {
            "id" => Value::Integer(self.id),
            "name" => self.name.clone().map_or(Value::Null, Value::Text),
            "price" => self.price.map_or(Value::Null, Value::Integer),
            "category_id" => self.category_id.map_or(Value::Null, Value::Integer),
            other => panic!("TypedProduct has no field {other}"),
        }
    }

    fn write(&mut self, field: &FieldDef, value: Value) {
        match field.name() {
            "id" => self.id = value.as_integer().expect("integer id"),
            "name" => {
                self.name = match value {
                    Value::Text(text) => Some(text),
                    _ => None,
                }
            }
            "price" => self.price = value.as_integer(),
            "category_id" => self.category_id = value.as_integer(),
            other => panic!("TypedProduct has no field {other}"),
        }
    }
}
