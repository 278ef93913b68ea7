//! Key values, key factories, and key generators.

mod factory;
mod generator;

pub use factory::{CompositeKeyFactory, KeyFactory, RowBuffer, SimpleKeyFactory, ValueSource};
pub use generator::{
    AsyncKeyGenerator, BoxFuture, CanceledKeyGenerator, KeyGenerator, SequenceKeyGenerator,
    UuidKeyGenerator,
};

use std::fmt;
use std::slice;

use entitrack_metadata::{EntityTypeId, Value};

/// An immutable, structurally-comparable key.
///
/// A key value is an ordered tuple of field values plus the id of the
/// owning entity type. Two key values are equal iff they have the same
/// owning type and element-wise equal components, regardless of whether
/// they were built from a live entry or a raw row buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyValue {
    /// A single-field key.
    Simple {
        /// The owning entity type.
        entity_type: EntityTypeId,
        /// The key component.
        value: Value,
    },
    /// A multi-field key.
    Composite {
        /// The owning entity type.
        entity_type: EntityTypeId,
        /// The ordered key components.
        values: Box<[Value]>,
    },
}

impl KeyValue {
    /// Returns the owning entity type.
    #[must_use]
    pub fn entity_type(&self) -> EntityTypeId {
        match self {
            KeyValue::Simple { entity_type, .. } | KeyValue::Composite { entity_type, .. } => {
                *entity_type
            }
        }
    }

    /// Returns the key components in order.
    #[must_use]
    pub fn components(&self) -> &[Value] {
        match self {
            KeyValue::Simple { value, .. } => slice::from_ref(value),
            KeyValue::Composite { values, .. } => values,
        }
    }

    /// Returns the number of components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components().len()
    }

    /// Returns true if the key has no components.
    ///
    /// Factories never produce empty keys; this exists for completeness.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components().is_empty()
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.entity_type())?;
        for (i, value) in self.components().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, ")")
    }
}
