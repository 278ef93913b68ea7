//! Field accessor strategies.
//!
//! Tracked instances come in three shapes: fully typed (a user struct that
//! exposes its fields through [`TypedAccess`]), shadow-only (every field
//! lives in a value array owned by the entry), and hybrid (typed fields on
//! the instance, shadow fields in the array). The shape is selected once
//! per entry at materialization time; per-field dispatch goes through this
//! closed set of variants rather than any per-call reflection.

use std::fmt;

use entitrack_metadata::{EntityType, FieldDef, Value};

/// Capability interface for reading and writing a typed instance's fields.
///
/// Implementations match on the field's name or id and convert between the
/// instance's native representation and [`Value`].
pub trait TypedAccess: fmt::Debug + Send {
    /// Reads the current value of a non-shadow field.
    fn read(&self, field: &FieldDef) -> Value;

    /// Writes a value into a non-shadow field.
    fn write(&mut self, field: &FieldDef, value: Value);
}

/// The accessor shape of an entry's backing storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorKind {
    /// All fields live on the typed instance.
    Typed,
    /// All fields live in the entry's shadow array.
    Shadow,
    /// Typed fields on the instance, shadow fields in the array.
    Hybrid,
}

/// Backing storage for one entry's field values.
#[derive(Debug)]
pub enum Backing {
    /// A typed instance.
    Typed(Box<dyn TypedAccess>),
    /// A shadow value array, one slot per field ordinal.
    Shadow(Box<[Value]>),
    /// A typed instance plus a shadow array for shadow-only fields.
    Hybrid {
        /// The typed instance holding non-shadow fields.
        typed: Box<dyn TypedAccess>,
        /// One slot per field ordinal; only shadow positions are used.
        shadow: Box<[Value]>,
    },
}

impl Backing {
    /// Creates typed backing around an instance.
    #[must_use]
    pub fn typed(instance: Box<dyn TypedAccess>) -> Self {
        Backing::Typed(instance)
    }

    /// Creates shadow backing sized for `field_count` fields, all null.
    #[must_use]
    pub fn shadow(field_count: usize) -> Self {
        Backing::Shadow(vec![Value::Null; field_count].into_boxed_slice())
    }

    /// Creates hybrid backing around an instance, with null shadow slots.
    #[must_use]
    pub fn hybrid(instance: Box<dyn TypedAccess>, field_count: usize) -> Self {
        Backing::Hybrid {
            typed: instance,
            shadow: vec![Value::Null; field_count].into_boxed_slice(),
        }
    }

    /// Returns the accessor shape.
    #[must_use]
    pub fn kind(&self) -> AccessorKind {
        match self {
            Backing::Typed(_) => AccessorKind::Typed,
            Backing::Shadow(_) => AccessorKind::Shadow,
            Backing::Hybrid { .. } => AccessorKind::Hybrid,
        }
    }

    /// Returns true if this backing can store every field of `entity_type`.
    #[must_use]
    pub fn supports(&self, entity_type: &EntityType) -> bool {
        match self {
            Backing::Typed(_) => !entity_type.has_shadow_fields(),
            Backing::Shadow(values) => values.len() == entity_type.field_count(),
            Backing::Hybrid { shadow, .. } => shadow.len() == entity_type.field_count(),
        }
    }

    /// Returns the typed instance, if the backing has one.
    #[must_use]
    pub fn as_typed(&self) -> Option<&dyn TypedAccess> {
        match self {
            Backing::Typed(typed) | Backing::Hybrid { typed, .. } => Some(typed.as_ref()),
            Backing::Shadow(_) => None,
        }
    }

    /// Returns the typed instance mutably, if the backing has one.
    #[must_use]
    pub fn as_typed_mut(&mut self) -> Option<&mut dyn TypedAccess> {
        match self {
            Backing::Typed(typed) | Backing::Hybrid { typed, .. } => Some(typed.as_mut()),
            Backing::Shadow(_) => None,
        }
    }

    /// Reads the raw value of `field` from the appropriate store.
    pub(crate) fn read(&self, field: &FieldDef) -> Value {
        match self {
            Backing::Typed(typed) => typed.read(field),
            Backing::Shadow(values) => values[field.id().index()].clone(),
            Backing::Hybrid { typed, shadow } => {
                if field.is_shadow() {
                    shadow[field.id().index()].clone()
                } else {
                    typed.read(field)
                }
            }
        }
    }

    /// Writes the raw value of `field` into the appropriate store.
    pub(crate) fn write(&mut self, field: &FieldDef, value: Value) {
        match self {
            Backing::Typed(typed) => typed.write(field, value),
            Backing::Shadow(values) => values[field.id().index()] = value,
            Backing::Hybrid { typed, shadow } => {
                if field.is_shadow() {
                    shadow[field.id().index()] = value;
                } else {
                    typed.write(field, value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitrack_metadata::{EntityTypeSpec, FieldSpec, Model, ValueKind};

    #[derive(Debug, Default)]
    struct Point {
        x: i64,
        y: i64,
    }

    impl TypedAccess for Point {
        fn read(&self, field: &FieldDef) -> Value {
            match field.name() {
                "x" => Value::Integer(self.x),
                "y" => Value::Integer(self.y),
                other => panic!("unknown field {other}"),
            }
        }

        fn write(&mut self, field: &FieldDef, value: Value) {
            let value = value.as_integer().expect("integer field");
            match field.name() {
                "x" => self.x = value,
                "y" => self.y = value,
                other => panic!("unknown field {other}"),
            }
        }
    }

    fn point_model() -> std::sync::Arc<Model> {
        Model::builder()
            .entity(
                EntityTypeSpec::new("Point")
                    .field(FieldSpec::new("x", ValueKind::Integer))
                    .field(FieldSpec::new("y", ValueKind::Integer))
                    .field(FieldSpec::new("tag", ValueKind::Text).nullable().shadow())
                    .key(["x"]),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn typed_backing_round_trips() {
        let model = point_model();
        let point_type = model.entity_type_named("Point").unwrap();
        let x = point_type.field_named("x").unwrap();

        let mut backing = Backing::typed(Box::new(Point::default()));
        backing.write(x, Value::Integer(3));
        assert_eq!(backing.read(x), Value::Integer(3));
        assert_eq!(backing.kind(), AccessorKind::Typed);
    }

    #[test]
    fn typed_backing_rejects_shadow_types() {
        let model = point_model();
        let point_type = model.entity_type_named("Point").unwrap();

        let backing = Backing::typed(Box::new(Point::default()));
        assert!(!backing.supports(point_type));
    }

    #[test]
    fn shadow_backing_round_trips() {
        let model = point_model();
        let point_type = model.entity_type_named("Point").unwrap();
        let tag = point_type.field_named("tag").unwrap();

        let mut backing = Backing::shadow(point_type.field_count());
        assert!(backing.supports(point_type));
        assert_eq!(backing.read(tag), Value::Null);

        backing.write(tag, Value::Text("origin".into()));
        assert_eq!(backing.read(tag), Value::Text("origin".into()));
    }

    #[test]
    fn hybrid_backing_splits_by_shadow_flag() {
        let model = point_model();
        let point_type = model.entity_type_named("Point").unwrap();
        let y = point_type.field_named("y").unwrap();
        let tag = point_type.field_named("tag").unwrap();

        let mut backing = Backing::hybrid(Box::new(Point::default()), point_type.field_count());
        assert!(backing.supports(point_type));

        backing.write(y, Value::Integer(7));
        backing.write(tag, Value::Text("t".into()));

        assert_eq!(backing.read(y), Value::Integer(7));
        assert_eq!(backing.read(tag), Value::Text("t".into()));
        assert!(backing.as_typed().is_some());
    }
}
