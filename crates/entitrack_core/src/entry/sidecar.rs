//! Auxiliary value slots.
//!
//! A sidecar is a named side-map of field values attached to one entry.
//! The originals sidecar snapshots pre-change values for change detection
//! and rollback; the store-generated sidecar stages values the backing
//! store has not produced yet. Slots are created lazily, coexist, and
//! commit or roll back independently of each other.

use std::collections::HashMap;
use std::fmt;

use entitrack_metadata::{FieldId, Value};

/// Well-known sidecar names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidecarName {
    /// Snapshot of values as of the last synchronization point.
    OriginalValues,
    /// Values staged on behalf of the backing store.
    StoreGeneratedValues,
}

impl fmt::Display for SidecarName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SidecarName::OriginalValues => write!(f, "original-values"),
            SidecarName::StoreGeneratedValues => write!(f, "store-generated-values"),
        }
    }
}

/// A named side-store of field values scoped to one entry.
#[derive(Debug, Clone)]
pub struct Sidecar {
    name: SidecarName,
    values: HashMap<FieldId, Value>,
    transparent_read: bool,
    transparent_write: bool,
    auto_commit: bool,
}

impl Sidecar {
    /// Creates an originals sidecar: opaque, manually committed.
    #[must_use]
    pub fn originals() -> Self {
        Self {
            name: SidecarName::OriginalValues,
            values: HashMap::new(),
            transparent_read: false,
            transparent_write: false,
            auto_commit: false,
        }
    }

    /// Creates a store-generated sidecar: transparent for reads and writes,
    /// committed automatically when changes are accepted.
    #[must_use]
    pub fn store_generated() -> Self {
        Self {
            name: SidecarName::StoreGeneratedValues,
            values: HashMap::new(),
            transparent_read: true,
            transparent_write: true,
            auto_commit: true,
        }
    }

    /// Returns the sidecar name.
    #[must_use]
    pub fn name(&self) -> SidecarName {
        self.name
    }

    /// Returns true if entry reads consult this sidecar first.
    #[must_use]
    pub fn is_transparent_read(&self) -> bool {
        self.transparent_read
    }

    /// Returns true if entry writes land in this sidecar.
    #[must_use]
    pub fn is_transparent_write(&self) -> bool {
        self.transparent_write
    }

    /// Returns true if accepting changes merges this sidecar back.
    #[must_use]
    pub fn auto_commits(&self) -> bool {
        self.auto_commit
    }

    /// Returns true if the sidecar holds a value for `field`.
    #[must_use]
    pub fn has_value(&self, field: FieldId) -> bool {
        self.values.contains_key(&field)
    }

    /// Returns the stored value for `field`, if any.
    #[must_use]
    pub fn value(&self, field: FieldId) -> Option<&Value> {
        self.values.get(&field)
    }

    /// Stores a value for `field`, replacing any previous one.
    pub fn set_value(&mut self, field: FieldId, value: Value) {
        self.values.insert(field, value);
    }

    /// Captures `current` for `field` unless a value was already captured.
    pub fn ensure_snapshot(&mut self, field: FieldId, current: &Value) {
        self.values.entry(field).or_insert_with(|| current.clone());
    }

    /// Returns true if no values are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Takes all stored values, leaving the sidecar empty.
    ///
    /// Committing a sidecar writes the taken values back through the
    /// owning entry's main storage.
    pub fn take_values(&mut self) -> HashMap<FieldId, Value> {
        std::mem::take(&mut self.values)
    }

    /// Discards all stored values.
    pub fn rollback(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn originals_flags() {
        let sidecar = Sidecar::originals();
        assert_eq!(sidecar.name(), SidecarName::OriginalValues);
        assert!(!sidecar.is_transparent_read());
        assert!(!sidecar.is_transparent_write());
        assert!(!sidecar.auto_commits());
    }

    #[test]
    fn store_generated_flags() {
        let sidecar = Sidecar::store_generated();
        assert!(sidecar.is_transparent_read());
        assert!(sidecar.is_transparent_write());
        assert!(sidecar.auto_commits());
    }

    #[test]
    fn ensure_snapshot_captures_once() {
        let mut sidecar = Sidecar::originals();
        let field = FieldId::new(0);

        sidecar.ensure_snapshot(field, &Value::Integer(1));
        sidecar.ensure_snapshot(field, &Value::Integer(2));

        assert_eq!(sidecar.value(field), Some(&Value::Integer(1)));
    }

    #[test]
    fn set_value_replaces() {
        let mut sidecar = Sidecar::store_generated();
        let field = FieldId::new(1);

        sidecar.set_value(field, Value::Integer(1));
        sidecar.set_value(field, Value::Integer(2));

        assert_eq!(sidecar.value(field), Some(&Value::Integer(2)));
    }

    #[test]
    fn take_values_empties() {
        let mut sidecar = Sidecar::store_generated();
        sidecar.set_value(FieldId::new(0), Value::Integer(1));

        let taken = sidecar.take_values();
        assert_eq!(taken.len(), 1);
        assert!(sidecar.is_empty());
    }

    #[test]
    fn rollback_discards() {
        let mut sidecar = Sidecar::originals();
        sidecar.set_value(FieldId::new(0), Value::Integer(1));
        sidecar.rollback();
        assert!(sidecar.is_empty());
        assert!(!sidecar.has_value(FieldId::new(0)));
    }
}
