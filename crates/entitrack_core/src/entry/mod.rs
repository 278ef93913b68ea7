//! Tracking records.
//!
//! One [`EntityEntry`] exists per tracked instance. It owns the instance's
//! lifecycle state, its per-field dirty bits, any attached sidecars, the
//! backing storage for field values, and the entry's navigation slots.
//! Entries are arena-owned by the state manager; everything that mutates
//! them goes through the manager so that dirty tracking and fixup always
//! observe the change.

mod accessor;
mod bits;
mod sidecar;

pub use accessor::{AccessorKind, Backing, TypedAccess};
pub use bits::FieldBits;
pub use sidecar::{Sidecar, SidecarName};

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use entitrack_metadata::{EntityType, FieldId, Model, NavigationId, NavigationKind, Value};

use crate::key::ValueSource;

/// Lifecycle state of a tracked instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityState {
    /// Not tracked.
    Detached,
    /// New; will be inserted on synchronization.
    Added,
    /// Tracked and unmodified since the last synchronization point.
    Unchanged,
    /// Tracked with at least one changed field.
    Modified,
    /// Marked for removal on synchronization.
    Deleted,
}

impl EntityState {
    /// Returns true for every state except `Detached`.
    #[must_use]
    pub fn is_tracked(self) -> bool {
        !matches!(self, EntityState::Detached)
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityState::Detached => "detached",
            EntityState::Added => "added",
            EntityState::Unchanged => "unchanged",
            EntityState::Modified => "modified",
            EntityState::Deleted => "deleted",
        };
        write!(f, "{name}")
    }
}

/// Handle to a tracking record within one state manager.
///
/// Entry ids are assigned in tracking order and never reused for the
/// lifetime of their manager, so a stale handle can never alias a newer
/// entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(pub u32);

impl EntryId {
    /// Creates an entry id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the id as an index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entry:{}", self.0)
    }
}

/// Per-entry storage for one navigation.
#[derive(Debug, Clone)]
pub(crate) enum NavigationSlot {
    /// A reference navigation's current target.
    Reference(Option<EntryId>),
    /// A collection navigation's current members.
    Collection(Vec<EntryId>),
}

const EMPTY_COLLECTION: &[EntryId] = &[];

/// The tracking record for one instance.
#[derive(Debug)]
pub struct EntityEntry {
    id: EntryId,
    entity_type: Arc<EntityType>,
    state: EntityState,
    dirty: FieldBits,
    sidecars: Vec<Sidecar>,
    backing: Backing,
    navigations: HashMap<NavigationId, NavigationSlot>,
    conceptual_nulls: BTreeSet<FieldId>,
}

impl EntityEntry {
    pub(crate) fn new(
        id: EntryId,
        entity_type: Arc<EntityType>,
        backing: Backing,
        model: &Model,
    ) -> Self {
        let mut navigations = HashMap::new();
        for nav_id in entity_type.navigations() {
            let slot = match model.navigation(*nav_id).kind() {
                NavigationKind::Reference => NavigationSlot::Reference(None),
                NavigationKind::Collection => NavigationSlot::Collection(Vec::new()),
            };
            navigations.insert(*nav_id, slot);
        }
        let dirty = FieldBits::new(entity_type.field_count());
        Self {
            id,
            entity_type,
            state: EntityState::Detached,
            dirty,
            sidecars: Vec::new(),
            backing,
            navigations,
            conceptual_nulls: BTreeSet::new(),
        }
    }

    /// Returns the entry id.
    #[must_use]
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// Returns the entity type descriptor.
    #[must_use]
    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> EntityState {
        self.state
    }

    pub(crate) fn set_state_raw(&mut self, state: EntityState) {
        self.state = state;
    }

    /// Returns the accessor shape of the backing storage.
    #[must_use]
    pub fn accessor_kind(&self) -> AccessorKind {
        self.backing.kind()
    }

    /// Returns the typed instance, if the backing has one.
    #[must_use]
    pub fn typed(&self) -> Option<&dyn TypedAccess> {
        self.backing.as_typed()
    }

    pub(crate) fn typed_mut(&mut self) -> Option<&mut dyn TypedAccess> {
        self.backing.as_typed_mut()
    }

    /// Returns true if any sidecar is attached.
    #[must_use]
    pub fn has_active_sidecar(&self) -> bool {
        !self.sidecars.is_empty()
    }

    /// Returns the sidecar with the given name, if attached.
    #[must_use]
    pub fn sidecar(&self, name: SidecarName) -> Option<&Sidecar> {
        self.sidecars.iter().find(|s| s.name() == name)
    }

    /// Returns the attached sidecar with the given name, creating it lazily.
    pub(crate) fn ensure_sidecar(&mut self, name: SidecarName) -> &mut Sidecar {
        if let Some(pos) = self.sidecars.iter().position(|s| s.name() == name) {
            return &mut self.sidecars[pos];
        }
        let sidecar = match name {
            SidecarName::OriginalValues => Sidecar::originals(),
            SidecarName::StoreGeneratedValues => Sidecar::store_generated(),
        };
        let pos = self.sidecars.len();
        self.sidecars.push(sidecar);
        &mut self.sidecars[pos]
    }

    pub(crate) fn take_sidecar(&mut self, name: SidecarName) -> Option<Sidecar> {
        let pos = self.sidecars.iter().position(|s| s.name() == name)?;
        Some(self.sidecars.remove(pos))
    }

    /// Returns the original (pre-change) value of `field`, if captured.
    #[must_use]
    pub fn original_value(&self, field: FieldId) -> Option<&Value> {
        self.sidecar(SidecarName::OriginalValues)
            .and_then(|s| s.value(field))
    }

    pub(crate) fn ensure_original(&mut self, field: FieldId, current: &Value) {
        self.ensure_sidecar(SidecarName::OriginalValues)
            .ensure_snapshot(field, current);
    }

    /// Captures the current value of every field into the originals sidecar,
    /// replacing any previous snapshot.
    pub(crate) fn capture_snapshot(&mut self) {
        let entity_type = Arc::clone(&self.entity_type);
        self.ensure_sidecar(SidecarName::OriginalValues).rollback();
        for def in entity_type.fields() {
            let value = self.backing.read(def);
            self.ensure_sidecar(SidecarName::OriginalValues)
                .set_value(def.id(), value);
        }
    }

    /// Reads the visible value of `field`: transparent sidecars first, then
    /// the backing storage.
    #[must_use]
    pub fn read_value(&self, field: FieldId) -> Value {
        if self.has_active_sidecar() {
            for sidecar in &self.sidecars {
                if sidecar.is_transparent_read() {
                    if let Some(value) = sidecar.value(field) {
                        return value.clone();
                    }
                }
            }
        }
        self.backing.read(self.entity_type.field(field))
    }

    /// Writes `value` through transparent sidecars or into backing storage.
    pub(crate) fn write_value(&mut self, field: FieldId, value: Value) {
        for sidecar in &mut self.sidecars {
            if sidecar.is_transparent_write() {
                sidecar.set_value(field, value);
                return;
            }
        }
        let entity_type = Arc::clone(&self.entity_type);
        self.backing.write(entity_type.field(field), value);
    }

    /// Writes `value` into backing storage, bypassing transparent sidecars.
    pub(crate) fn write_value_direct(&mut self, field: FieldId, value: Value) {
        let entity_type = Arc::clone(&self.entity_type);
        self.backing.write(entity_type.field(field), value);
    }

    /// Returns true if `field` is marked modified.
    ///
    /// Dirty bits are only meaningful in the `Modified` state; in every
    /// other state this returns false regardless of bit content.
    #[must_use]
    pub fn is_property_modified(&self, field: FieldId) -> bool {
        self.state == EntityState::Modified && self.dirty.get(field.index())
    }

    pub(crate) fn set_dirty(&mut self, field: FieldId, value: bool) {
        self.dirty.set(field.index(), value);
    }

    pub(crate) fn mark_all_dirty(&mut self) {
        self.dirty.set_all();
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    pub(crate) fn any_dirty(&self) -> bool {
        self.dirty.any()
    }

    /// Iterates the fields currently marked modified.
    pub fn dirty_fields(&self) -> impl Iterator<Item = FieldId> + '_ {
        let meaningful = self.state == EntityState::Modified;
        self.dirty
            .iter_set()
            .filter(move |_| meaningful)
            .map(|i| FieldId::new(i as u32))
    }

    /// Returns the current target of a reference navigation.
    #[must_use]
    pub fn reference(&self, navigation: NavigationId) -> Option<EntryId> {
        match self.navigations.get(&navigation) {
            Some(NavigationSlot::Reference(target)) => *target,
            _ => None,
        }
    }

    /// Returns the current members of a collection navigation.
    #[must_use]
    pub fn collection(&self, navigation: NavigationId) -> &[EntryId] {
        match self.navigations.get(&navigation) {
            Some(NavigationSlot::Collection(members)) => members,
            _ => EMPTY_COLLECTION,
        }
    }

    pub(crate) fn set_reference_raw(&mut self, navigation: NavigationId, target: Option<EntryId>) {
        if let Some(NavigationSlot::Reference(slot)) = self.navigations.get_mut(&navigation) {
            *slot = target;
        }
    }

    /// Adds a member to a collection slot. Returns false if already present.
    pub(crate) fn collection_add_raw(&mut self, navigation: NavigationId, member: EntryId) -> bool {
        if let Some(NavigationSlot::Collection(members)) = self.navigations.get_mut(&navigation) {
            if members.contains(&member) {
                return false;
            }
            members.push(member);
            return true;
        }
        false
    }

    /// Removes a member from a collection slot. Returns false if absent.
    pub(crate) fn collection_remove_raw(
        &mut self,
        navigation: NavigationId,
        member: EntryId,
    ) -> bool {
        if let Some(NavigationSlot::Collection(members)) = self.navigations.get_mut(&navigation) {
            if let Some(pos) = members.iter().position(|m| *m == member) {
                members.remove(pos);
                return true;
            }
        }
        false
    }

    /// Drops every navigation link to `other`, in both slot kinds.
    pub(crate) fn forget_entry(&mut self, other: EntryId) {
        for slot in self.navigations.values_mut() {
            match slot {
                NavigationSlot::Reference(target) => {
                    if *target == Some(other) {
                        *target = None;
                    }
                }
                NavigationSlot::Collection(members) => {
                    members.retain(|m| *m != other);
                }
            }
        }
    }

    /// Returns true if `field` carries an unresolved conceptual null: a
    /// non-nullable foreign key that fixup logically needed to clear.
    #[must_use]
    pub fn has_conceptual_null(&self, field: FieldId) -> bool {
        self.conceptual_nulls.contains(&field)
    }

    /// Returns true if any field carries a conceptual null.
    #[must_use]
    pub fn has_conceptual_nulls(&self) -> bool {
        !self.conceptual_nulls.is_empty()
    }

    pub(crate) fn mark_conceptual_null(&mut self, field: FieldId) {
        self.conceptual_nulls.insert(field);
    }

    pub(crate) fn clear_conceptual_null(&mut self, field: FieldId) {
        self.conceptual_nulls.remove(&field);
    }
}

/// Reads key components from an entry's visible values.
pub(crate) struct EntryValueSource<'a> {
    entry: &'a EntityEntry,
}

impl<'a> EntryValueSource<'a> {
    pub(crate) fn new(entry: &'a EntityEntry) -> Self {
        Self { entry }
    }
}

impl ValueSource for EntryValueSource<'_> {
    fn value_of(&self, field: FieldId) -> Value {
        self.entry.read_value(field)
    }
}

/// Reads key components from an entry while substituting one field's value.
///
/// Used to reconstruct the pre-change key after a field write: every
/// component comes from the entry's current values except the changed
/// field, which reads its old value.
pub(crate) struct OverrideValueSource<'a> {
    entry: &'a EntityEntry,
    field: FieldId,
    value: &'a Value,
}

impl<'a> OverrideValueSource<'a> {
    pub(crate) fn new(entry: &'a EntityEntry, field: FieldId, value: &'a Value) -> Self {
        Self {
            entry,
            field,
            value,
        }
    }
}

impl ValueSource for OverrideValueSource<'_> {
    fn value_of(&self, field: FieldId) -> Value {
        if field == self.field {
            self.value.clone()
        } else {
            self.entry.read_value(field)
        }
    }
}
