//! Key factories.
//!
//! A factory builds [`KeyValue`]s for a fixed field list from any
//! [`ValueSource`]: a live tracked entry or a raw row buffer. The simple
//! variant avoids tuple allocation for the common single-field case; the
//! composite variant carries an ordered tuple. Selection between the two is
//! a pure function of the field count.

use entitrack_metadata::{EntityTypeId, FieldId, Value};

use crate::key::KeyValue;

/// A source of field values for key construction.
pub trait ValueSource {
    /// Returns the current value of `field`.
    fn value_of(&self, field: FieldId) -> Value;
}

/// A raw buffer of field values ordered by field ordinal.
///
/// Materializers hand these over alongside instances for query results.
/// The buffer must hold one value per field of the owning type; a null in
/// a non-nullable position is a caller contract violation.
#[derive(Debug, Clone)]
pub struct RowBuffer {
    values: Vec<Value>,
}

impl RowBuffer {
    /// Creates a row buffer from values in field-ordinal order.
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Returns the number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the value at a field position, if present.
    #[must_use]
    pub fn get(&self, field: FieldId) -> Option<&Value> {
        self.values.get(field.index())
    }
}

impl ValueSource for RowBuffer {
    fn value_of(&self, field: FieldId) -> Value {
        self.values[field.index()].clone()
    }
}

/// Factory for single-field keys.
#[derive(Debug, Clone)]
pub struct SimpleKeyFactory {
    owner: EntityTypeId,
    field: FieldId,
}

impl SimpleKeyFactory {
    /// Creates a factory for the given owner and key field.
    #[must_use]
    pub fn new(owner: EntityTypeId, field: FieldId) -> Self {
        Self { owner, field }
    }

    /// Builds a key from the source, or `None` if the component is null.
    #[must_use]
    pub fn create(&self, source: &dyn ValueSource) -> Option<KeyValue> {
        let value = source.value_of(self.field);
        if value.is_null() {
            return None;
        }
        Some(KeyValue::Simple {
            entity_type: self.owner,
            value,
        })
    }
}

/// Factory for multi-field keys.
#[derive(Debug, Clone)]
pub struct CompositeKeyFactory {
    owner: EntityTypeId,
    fields: Box<[FieldId]>,
}

impl CompositeKeyFactory {
    /// Creates a factory for the given owner and ordered key fields.
    #[must_use]
    pub fn new(owner: EntityTypeId, fields: Box<[FieldId]>) -> Self {
        Self { owner, fields }
    }

    /// Builds a key from the source, or `None` if any component is null.
    #[must_use]
    pub fn create(&self, source: &dyn ValueSource) -> Option<KeyValue> {
        let mut values = Vec::with_capacity(self.fields.len());
        for field in self.fields.iter() {
            let value = source.value_of(*field);
            if value.is_null() {
                return None;
            }
            values.push(value);
        }
        Some(KeyValue::Composite {
            entity_type: self.owner,
            values: values.into_boxed_slice(),
        })
    }
}

/// A key factory for a fixed owner and field list.
///
/// The variant is chosen purely by field count: one field selects
/// [`SimpleKeyFactory`], more select [`CompositeKeyFactory`].
#[derive(Debug, Clone)]
pub enum KeyFactory {
    /// Single-field keys.
    Simple(SimpleKeyFactory),
    /// Multi-field keys.
    Composite(CompositeKeyFactory),
}

impl KeyFactory {
    /// Creates a factory for the given owner and ordered fields.
    ///
    /// # Panics
    ///
    /// Panics if `fields` is empty. Model validation guarantees every key
    /// and foreign key has at least one field.
    #[must_use]
    pub fn new(owner: EntityTypeId, fields: &[FieldId]) -> Self {
        match fields {
            [] => panic!("key factory requires at least one field"),
            [field] => KeyFactory::Simple(SimpleKeyFactory::new(owner, *field)),
            _ => KeyFactory::Composite(CompositeKeyFactory::new(owner, fields.into())),
        }
    }

    /// Builds a key from the source, or `None` if any component is null.
    #[must_use]
    pub fn create(&self, source: &dyn ValueSource) -> Option<KeyValue> {
        match self {
            KeyFactory::Simple(factory) => factory.create(source),
            KeyFactory::Composite(factory) => factory.create(source),
        }
    }
}
