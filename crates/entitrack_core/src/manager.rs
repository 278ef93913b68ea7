//! Identity map and state manager.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::Receiver;

use tracing::{debug, trace};

use entitrack_metadata::{
    ChangeTracking, EntityType, EntityTypeId, FieldId, ForeignKey, ForeignKeyId, Model,
    NavigationId, NavigationKind, Value,
};

use crate::config::TrackerConfig;
use crate::entry::{
    AccessorKind, Backing, EntityEntry, EntityState, EntryId, EntryValueSource,
    OverrideValueSource, Sidecar, SidecarName, TypedAccess,
};
use crate::error::{CoreError, CoreResult};
use crate::events::{TrackingEvent, TrackingEventKind, TrackingFeed};
use crate::fixup::NavigationFixer;
use crate::key::{AsyncKeyGenerator, KeyFactory, KeyGenerator, KeyValue, RowBuffer, ValueSource};

/// Reads key components straight from a backing store, before any entry
/// exists to wrap it.
struct BackingValueSource<'a> {
    backing: &'a Backing,
    entity_type: &'a EntityType,
}

impl ValueSource for BackingValueSource<'_> {
    fn value_of(&self, field: FieldId) -> Value {
        self.backing.read(self.entity_type.field(field))
    }
}

/// The identity map and single mutation surface for one unit of work.
///
/// The manager owns every tracking record (arena-style): all cross-entry
/// references are non-owning [`EntryId`] handles resolved through it, which
/// keeps cyclic object graphs free of ownership cycles. It registers
/// entries by key as they leave `Detached`, guarantees at most one entry
/// per key, routes every field and navigation mutation through dirty
/// tracking, and drives the navigation fixup engine so callers observe a
/// consistent graph after every single mutation.
///
/// A manager is meant to live exactly as long as one logical unit of work,
/// owned by one thread of control; it has no internal locking.
///
/// # Example
///
/// ```rust,ignore
/// let mut manager = StateManager::new(model);
/// let id = manager.create_entry(product_type, Backing::shadow(field_count))?;
/// manager.set_value(id, price, Value::Integer(100))?;
/// manager.set_entity_state(id, EntityState::Added)?;
/// ```
pub struct StateManager {
    /// The model describing tracked types. Immutable for the session.
    model: Arc<Model>,
    /// Configuration.
    config: TrackerConfig,
    /// Entry arena; slots are never reused after a detach.
    entries: Vec<Option<EntityEntry>>,
    /// Identity map: registered key -> entry.
    key_index: HashMap<KeyValue, EntryId>,
    /// Primary key factories, one per entity type.
    primary_factories: Vec<KeyFactory>,
    /// Foreign key factories, one per foreign key; they build
    /// principal-typed keys from dependent-side field values.
    fk_factories: Vec<KeyFactory>,
    /// Synchronous key generators by (type, key field).
    generators: HashMap<(EntityTypeId, FieldId), Box<dyn KeyGenerator>>,
    /// Asynchronous key generators by (type, key field).
    async_generators: HashMap<(EntityTypeId, FieldId), Box<dyn AsyncKeyGenerator>>,
    /// The navigation fixup engine's re-entrancy guard.
    pub(crate) fixer: NavigationFixer,
    /// Tracking event feed.
    feed: TrackingFeed,
    /// Sequence counter for emitted events.
    next_sequence: u64,
}

impl StateManager {
    /// Creates a manager for the given model with default configuration.
    #[must_use]
    pub fn new(model: Arc<Model>) -> Self {
        Self::with_config(model, TrackerConfig::default())
    }

    /// Creates a manager with explicit configuration.
    #[must_use]
    pub fn with_config(model: Arc<Model>, config: TrackerConfig) -> Self {
        let primary_factories = model
            .entity_types()
            .iter()
            .map(|t| KeyFactory::new(t.id(), t.key()))
            .collect();
        let fk_factories = model
            .foreign_keys()
            .iter()
            .map(|fk| KeyFactory::new(fk.principal_type(), fk.dependent_fields()))
            .collect();
        let feed = TrackingFeed::with_max_history(config.max_event_history);
        let entries = Vec::with_capacity(config.initial_capacity);
        Self {
            model,
            config,
            entries,
            key_index: HashMap::new(),
            primary_factories,
            fk_factories,
            generators: HashMap::new(),
            async_generators: HashMap::new(),
            fixer: NavigationFixer::new(),
            feed,
            next_sequence: 0,
        }
    }

    /// Returns the model this manager tracks against.
    #[must_use]
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    // ---- entry access -------------------------------------------------

    /// Returns the entry with the given id, if it is still alive.
    ///
    /// Detached-but-never-tracked entries (fresh from
    /// [`create_entry`](Self::create_entry)) are alive; entries that left
    /// tracking are gone.
    #[must_use]
    pub fn entry(&self, id: EntryId) -> Option<&EntityEntry> {
        self.entries.get(id.index()).and_then(Option::as_ref)
    }

    pub(crate) fn entry_ref(&self, id: EntryId) -> CoreResult<&EntityEntry> {
        self.entry(id)
            .ok_or_else(|| CoreError::entry_not_tracked(id.as_u32()))
    }

    pub(crate) fn entry_mut(&mut self, id: EntryId) -> CoreResult<&mut EntityEntry> {
        self.entries
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| CoreError::entry_not_tracked(id.as_u32()))
    }

    /// Iterates all registered (non-detached) entries.
    pub fn entries(&self) -> impl Iterator<Item = &EntityEntry> {
        self.entries
            .iter()
            .filter_map(Option::as_ref)
            .filter(|e| e.state().is_tracked())
    }

    /// Returns the number of registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().count()
    }

    /// Returns true if no entries are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }

    pub(crate) fn live_entries(&self) -> impl Iterator<Item = &EntityEntry> {
        self.entries.iter().filter_map(Option::as_ref)
    }

    /// Looks up the registered entry with the given key.
    #[must_use]
    pub fn lookup(&self, key: &KeyValue) -> Option<EntryId> {
        self.key_index.get(key).copied()
    }

    pub(crate) fn primary_factory(&self, entity_type: EntityTypeId) -> &KeyFactory {
        &self.primary_factories[entity_type.index()]
    }

    pub(crate) fn fk_factory(&self, fk: ForeignKeyId) -> &KeyFactory {
        &self.fk_factories[fk.index()]
    }

    // ---- materialization ----------------------------------------------

    /// Creates a detached entry wrapping `backing`.
    ///
    /// The entry participates in the graph (navigation mutations fix up
    /// against it) but is not registered until its state leaves
    /// `Detached`.
    pub fn create_entry(
        &mut self,
        entity_type: EntityTypeId,
        backing: Backing,
    ) -> CoreResult<EntryId> {
        let et = Arc::clone(self.model.entity_type(entity_type));
        if !backing.supports(&et) {
            let message = match backing.kind() {
                AccessorKind::Typed => "typed backing cannot store shadow fields".to_owned(),
                _ => "shadow array length does not match field count".to_owned(),
            };
            return Err(CoreError::accessor_mismatch(et.name(), message));
        }
        let id = EntryId::new(u32::try_from(self.entries.len()).unwrap_or(u32::MAX));
        let entry = EntityEntry::new(id, et, backing, &self.model);
        self.entries.push(Some(entry));
        trace!(entry = %id, "entry created");
        Ok(id)
    }

    /// Wraps a materialized instance in a tracking record, deduplicating by
    /// key.
    ///
    /// Query results supply `row`, a raw value buffer in field-ordinal
    /// order: the key is computed from it and shadow fields are loaded out
    /// of it. Without a row, the key is read from the backing itself. If an
    /// entry with the same key is already registered, its id is returned
    /// and `backing` is discarded; otherwise a new entry is created,
    /// loaded, and registered as `Unchanged`.
    pub fn materialize(
        &mut self,
        entity_type: EntityTypeId,
        backing: Backing,
        row: Option<RowBuffer>,
    ) -> CoreResult<EntryId> {
        let et = Arc::clone(self.model.entity_type(entity_type));
        let key = match &row {
            Some(buffer) => self.primary_factories[entity_type.index()].create(buffer),
            None => {
                let source = BackingValueSource {
                    backing: &backing,
                    entity_type: &et,
                };
                self.primary_factories[entity_type.index()].create(&source)
            }
        };
        let Some(key) = key else {
            return Err(self.null_key_error(&et));
        };
        if let Some(existing) = self.key_index.get(&key) {
            trace!(entry = %existing, key = %key, "materialize deduplicated");
            return Ok(*existing);
        }

        let id = self.create_entry(entity_type, backing)?;
        if let Some(buffer) = row {
            let entry = self.entry_mut(id)?;
            match entry.accessor_kind() {
                AccessorKind::Shadow => {
                    for def in et.fields() {
                        entry.write_value_direct(def.id(), buffer.value_of(def.id()));
                    }
                }
                AccessorKind::Hybrid => {
                    for def in et.fields().iter().filter(|d| d.is_shadow()) {
                        entry.write_value_direct(def.id(), buffer.value_of(def.id()));
                    }
                }
                AccessorKind::Typed => {}
            }
        }
        self.transition(id, EntityState::Unchanged, false)?;
        Ok(id)
    }

    // ---- values -------------------------------------------------------

    /// Returns the visible value of `field` on an entry.
    pub fn get_value(&self, id: EntryId, field: FieldId) -> CoreResult<Value> {
        Ok(self.entry_ref(id)?.read_value(field))
    }

    /// Writes `value` into `field`, marking dirty state and fixing up
    /// relationships as needed.
    ///
    /// Writing a value equal to the current one is a no-op. An actual
    /// change captures the pre-change original (for lazily-snapshotting
    /// types), writes through the entry's accessor, marks the field dirty
    /// (promoting `Unchanged` to `Modified`), re-indexes the identity map
    /// when a key field changed, and runs foreign-key fixup when the field
    /// participates in a relationship — all before returning.
    pub fn set_value(&mut self, id: EntryId, field: FieldId, value: Value) -> CoreResult<()> {
        let entry = self.entry_mut(id)?;
        let entity_type = Arc::clone(entry.entity_type());
        let def = entity_type.field(field);
        if let Some(actual) = value.kind() {
            if actual != def.kind() {
                return Err(CoreError::ValueKindMismatch {
                    field: def.name().to_owned(),
                    expected: def.kind(),
                    actual,
                });
            }
        }

        let old = entry.read_value(field);
        if old == value {
            return Ok(());
        }
        trace!(entry = %id, field = %def.name(), "value changing");

        if entity_type.change_tracking() == ChangeTracking::Notifying && entry.state().is_tracked()
        {
            entry.ensure_original(field, &old);
        }

        entry.write_value(field, value);
        entry.clear_conceptual_null(field);

        if entity_type.is_key_field(field) && self.entry_ref(id)?.state().is_tracked() {
            self.reindex_key(id, field, &old)?;
        }

        self.property_changed(id, field)?;

        let fks: Vec<ForeignKeyId> = entity_type
            .foreign_keys()
            .iter()
            .copied()
            .filter(|fk_id| self.model.foreign_key(*fk_id).contains_dependent_field(field))
            .collect();
        if !fks.is_empty() {
            self.fixup_foreign_key_changed(id, field, &old, &fks)?;
        }
        Ok(())
    }

    /// Returns the typed instance behind an entry, if it has one.
    pub fn typed(&self, id: EntryId) -> CoreResult<&dyn TypedAccess> {
        let entry = self.entry_ref(id)?;
        let name = entry.entity_type().name().to_owned();
        entry
            .typed()
            .ok_or_else(|| CoreError::accessor_mismatch(name, "backing has no typed instance"))
    }

    /// Returns the typed instance mutably for direct (untracked) mutation.
    ///
    /// Only snapshot-tracked types should be mutated this way; call
    /// [`detect_changes`](Self::detect_changes) afterwards to fold the
    /// edits into dirty state.
    pub fn typed_mut(&mut self, id: EntryId) -> CoreResult<&mut dyn TypedAccess> {
        let entry = self.entry_mut(id)?;
        let name = entry.entity_type().name().to_owned();
        entry
            .typed_mut()
            .ok_or_else(|| CoreError::accessor_mismatch(name, "backing has no typed instance"))
    }

    // ---- lifecycle state ----------------------------------------------

    /// Returns the lifecycle state of an entry.
    pub fn entity_state(&self, id: EntryId) -> CoreResult<EntityState> {
        Ok(self.entry_ref(id)?.state())
    }

    /// Sets the lifecycle state of an entry.
    ///
    /// Entering `Added` first generates values for null key fields with
    /// registered synchronous generators. Setting `Modified` explicitly
    /// marks every field dirty. The first transition out of `Detached`
    /// registers the entry with the identity map and runs initial fixup;
    /// transitioning to `Detached` unregisters it and drops the record.
    pub fn set_entity_state(&mut self, id: EntryId, target: EntityState) -> CoreResult<()> {
        self.check_transition(id, target)?;
        if target == EntityState::Added {
            self.generate_missing_keys(id)?;
        }
        self.transition(id, target, target == EntityState::Modified)
    }

    /// Sets the lifecycle state, awaiting asynchronous key generators.
    ///
    /// Behaves like [`set_entity_state`](Self::set_entity_state) but
    /// prefers a registered asynchronous generator for each missing key
    /// value. A canceled generation surfaces as
    /// [`CoreError::KeyGenerationCanceled`] and leaves the entry's state
    /// (and key field) untouched.
    pub async fn set_entity_state_async(
        &mut self,
        id: EntryId,
        target: EntityState,
    ) -> CoreResult<()> {
        self.check_transition(id, target)?;
        if target == EntityState::Added {
            self.generate_missing_keys_async(id).await?;
        }
        self.transition(id, target, target == EntityState::Modified)
    }

    fn check_transition(&self, id: EntryId, target: EntityState) -> CoreResult<()> {
        let current = self.entry_ref(id)?.state();
        if target == EntityState::Added && current.is_tracked() && current != EntityState::Added {
            return Err(CoreError::invalid_operation(format!(
                "cannot move a {current} entry to added"
            )));
        }
        Ok(())
    }

    /// Registers a synchronous key generator for a key field.
    pub fn register_key_generator(
        &mut self,
        entity_type: EntityTypeId,
        field: FieldId,
        generator: Box<dyn KeyGenerator>,
    ) {
        self.generators.insert((entity_type, field), generator);
    }

    /// Registers an asynchronous key generator for a key field.
    pub fn register_async_key_generator(
        &mut self,
        entity_type: EntityTypeId,
        field: FieldId,
        generator: Box<dyn AsyncKeyGenerator>,
    ) {
        self.async_generators.insert((entity_type, field), generator);
    }

    fn generate_missing_keys(&mut self, id: EntryId) -> CoreResult<()> {
        let entry = self.entry_ref(id)?;
        if entry.state() == EntityState::Added {
            return Ok(());
        }
        let et = Arc::clone(entry.entity_type());
        for field in et.key() {
            if !self.entry_ref(id)?.read_value(*field).is_null() {
                continue;
            }
            let generated = match self.generators.get(&(et.id(), *field)) {
                Some(generator) => Some(generator.generate()?),
                None => None,
            };
            if let Some(value) = generated {
                trace!(entry = %id, field = %field, "generated key value");
                self.set_value(id, *field, value)?;
            }
        }
        Ok(())
    }

    async fn generate_missing_keys_async(&mut self, id: EntryId) -> CoreResult<()> {
        let entry = self.entry_ref(id)?;
        if entry.state() == EntityState::Added {
            return Ok(());
        }
        let et = Arc::clone(entry.entity_type());
        for field in et.key() {
            if !self.entry_ref(id)?.read_value(*field).is_null() {
                continue;
            }
            let generated = match self.async_generators.get(&(et.id(), *field)) {
                Some(generator) => Some(generator.generate_async().await?),
                None => match self.generators.get(&(et.id(), *field)) {
                    Some(generator) => Some(generator.generate()?),
                    None => None,
                },
            };
            if let Some(value) = generated {
                trace!(entry = %id, field = %field, "generated key value");
                self.set_value(id, *field, value)?;
            }
        }
        Ok(())
    }

    /// Applies a state transition with its registration side effects.
    ///
    /// Callers have already performed target-specific preparation (key
    /// generation for `Added`); `mark_all` carries the sticky-Modified
    /// rule.
    fn transition(&mut self, id: EntryId, target: EntityState, mark_all: bool) -> CoreResult<()> {
        let (current, et_id) = {
            let entry = self.entry_ref(id)?;
            (entry.state(), entry.entity_type().id())
        };
        if current == target {
            if target == EntityState::Modified && mark_all {
                self.entry_mut(id)?.mark_all_dirty();
            }
            return Ok(());
        }
        trace!(entry = %id, from = %current, to = %target, "state changing");

        let was_tracked = current.is_tracked();
        let becomes_tracked = target.is_tracked();

        if !was_tracked && becomes_tracked {
            self.start_tracking(id, target)?;
        }

        {
            let entry = self.entry_mut(id)?;
            entry.set_state_raw(target);
            match target {
                EntityState::Modified if mark_all => entry.mark_all_dirty(),
                EntityState::Modified => {}
                _ => entry.clear_dirty(),
            }
        }

        if !was_tracked && becomes_tracked {
            let et = Arc::clone(self.entry_ref(id)?.entity_type());
            if et.change_tracking() == ChangeTracking::Snapshot {
                self.entry_mut(id)?.capture_snapshot();
            }
            self.fixup_initial(id)?;
        }

        if was_tracked && !becomes_tracked {
            self.stop_tracking(id)?;
        }

        let kind = if !was_tracked && becomes_tracked {
            TrackingEventKind::StartedTracking
        } else if was_tracked && !becomes_tracked {
            TrackingEventKind::Detached
        } else {
            TrackingEventKind::StateChanged {
                from: current,
                to: target,
            }
        };
        self.emit_event(id, et_id, kind);
        Ok(())
    }

    /// Registers the entry's key in the identity map.
    ///
    /// `Added` entries may not have a key yet (generation pending or
    /// manual); they are tracked but unreachable by lookup until the key
    /// is written. Every other target state requires a complete key.
    fn start_tracking(&mut self, id: EntryId, target: EntityState) -> CoreResult<()> {
        let entry = self.entry_ref(id)?;
        let et = Arc::clone(entry.entity_type());
        let key = self.primary_factories[et.id().index()].create(&EntryValueSource::new(entry));
        match key {
            Some(key) => {
                if let Some(existing) = self.key_index.get(&key) {
                    if *existing != id {
                        return Err(CoreError::duplicate_key(et.name(), key.to_string()));
                    }
                }
                debug!(entry = %id, key = %key, "start tracking");
                self.key_index.insert(key, id);
                Ok(())
            }
            None if target == EntityState::Added => {
                debug!(entry = %id, "start tracking without key");
                Ok(())
            }
            None => Err(self.null_key_error(&et)),
        }
    }

    /// Unregisters the entry and drops its record.
    ///
    /// Navigation handles held by other entries are scrubbed so no stale
    /// id survives; the arena slot is never reused.
    fn stop_tracking(&mut self, id: EntryId) -> CoreResult<()> {
        let key = {
            let entry = self.entry_ref(id)?;
            self.primary_factories[entry.entity_type().id().index()]
                .create(&EntryValueSource::new(entry))
        };
        if let Some(key) = key {
            if self.key_index.get(&key) == Some(&id) {
                self.key_index.remove(&key);
            }
        }
        for slot in &mut self.entries {
            if let Some(entry) = slot.as_mut() {
                if entry.id() != id {
                    entry.forget_entry(id);
                }
            }
        }
        self.entries[id.index()] = None;
        debug!(entry = %id, "stopped tracking");
        Ok(())
    }

    fn null_key_error(&self, et: &EntityType) -> CoreError {
        let field = et
            .key()
            .first()
            .map(|f| et.field(*f).name().to_owned())
            .unwrap_or_default();
        CoreError::null_key_value(et.name(), field)
    }

    /// Moves the entry's identity map registration after a key field write.
    ///
    /// A collision with another registered entry restores the old value
    /// and surfaces `DuplicateKey`.
    fn reindex_key(&mut self, id: EntryId, field: FieldId, old: &Value) -> CoreResult<()> {
        let (old_key, new_key) = {
            let entry = self.entry_ref(id)?;
            let factory = &self.primary_factories[entry.entity_type().id().index()];
            let old_key = factory.create(&OverrideValueSource::new(entry, field, old));
            let new_key = factory.create(&EntryValueSource::new(entry));
            (old_key, new_key)
        };
        if old_key == new_key {
            return Ok(());
        }
        if let Some(key) = &old_key {
            if self.key_index.get(key) == Some(&id) {
                self.key_index.remove(key);
            }
        }
        if let Some(key) = new_key {
            if let Some(existing) = self.key_index.get(&key) {
                if *existing != id {
                    let entity_type = {
                        let entry = self.entry_ref(id)?;
                        entry.entity_type().name().to_owned()
                    };
                    let rendered = key.to_string();
                    self.entry_mut(id)?.write_value_direct(field, old.clone());
                    if let Some(previous) = old_key {
                        self.key_index.insert(previous, id);
                    }
                    return Err(CoreError::duplicate_key(entity_type, rendered));
                }
            }
            self.key_index.insert(key, id);
        }
        Ok(())
    }

    /// Marks `field` dirty after an actual value change, promoting
    /// `Unchanged` entries to `Modified`.
    fn property_changed(&mut self, id: EntryId, field: FieldId) -> CoreResult<()> {
        let state = self.entry_ref(id)?.state();
        match state {
            EntityState::Unchanged => {
                self.entry_mut(id)?.set_dirty(field, true);
                self.transition(id, EntityState::Modified, false)
            }
            EntityState::Modified => {
                self.entry_mut(id)?.set_dirty(field, true);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    // ---- dirty bits ---------------------------------------------------

    /// Returns true if `field` is marked modified on the entry.
    pub fn is_property_modified(&self, id: EntryId, field: FieldId) -> CoreResult<bool> {
        Ok(self.entry_ref(id)?.is_property_modified(field))
    }

    /// Explicitly marks or unmarks `field` as modified.
    ///
    /// Marking a field on an `Unchanged` entry promotes it to `Modified`;
    /// clearing the last marked field demotes `Modified` back to
    /// `Unchanged`. `Added` and `Deleted` entries never change state here.
    pub fn set_property_modified(
        &mut self,
        id: EntryId,
        field: FieldId,
        modified: bool,
    ) -> CoreResult<()> {
        let state = self.entry_ref(id)?.state();
        match state {
            EntityState::Detached => Err(CoreError::invalid_operation(
                "cannot mark properties on a detached entry",
            )),
            EntityState::Unchanged => {
                if modified {
                    self.entry_mut(id)?.set_dirty(field, true);
                    self.transition(id, EntityState::Modified, false)?;
                }
                Ok(())
            }
            EntityState::Modified => {
                let entry = self.entry_mut(id)?;
                entry.set_dirty(field, modified);
                if !modified && !entry.any_dirty() {
                    self.transition(id, EntityState::Unchanged, false)?;
                }
                Ok(())
            }
            EntityState::Added | EntityState::Deleted => {
                self.entry_mut(id)?.set_dirty(field, modified);
                Ok(())
            }
        }
    }

    /// Compares every field of a snapshot-tracked entry against its
    /// originals sidecar, synchronizing dirty bits.
    ///
    /// Returns true if any field currently differs from its original.
    /// No-op (false) for notifying types, which already observed every
    /// change as it happened.
    pub fn detect_changes(&mut self, id: EntryId) -> CoreResult<bool> {
        let entry = self.entry_ref(id)?;
        let et = Arc::clone(entry.entity_type());
        if et.change_tracking() != ChangeTracking::Snapshot {
            return Ok(false);
        }
        if !matches!(
            entry.state(),
            EntityState::Unchanged | EntityState::Modified
        ) {
            return Ok(false);
        }

        let mut any_different = false;
        for def in et.fields() {
            let field = def.id();
            let (current, original) = {
                let entry = self.entry_ref(id)?;
                (entry.read_value(field), entry.original_value(field).cloned())
            };
            let differs = match original {
                Some(original) => original != current,
                None => false,
            };
            if differs {
                any_different = true;
            }
            self.set_property_modified(id, field, differs)?;
        }
        Ok(any_different)
    }

    /// Runs [`detect_changes`](Self::detect_changes) over every registered
    /// entry. Returns true if any entry changed.
    pub fn detect_all_changes(&mut self) -> CoreResult<bool> {
        let ids: Vec<EntryId> = self.entries().map(EntityEntry::id).collect();
        let mut any = false;
        for id in ids {
            if self.detect_changes(id)? {
                any = true;
            }
        }
        Ok(any)
    }

    /// Accepts the entry's pending changes after a successful
    /// synchronization.
    ///
    /// `Added`/`Modified`/`Unchanged` entries become `Unchanged` with a
    /// fresh originals snapshot and committed auto-commit sidecars;
    /// `Deleted` entries detach.
    pub fn accept_changes(&mut self, id: EntryId) -> CoreResult<()> {
        let state = self.entry_ref(id)?.state();
        match state {
            EntityState::Detached => Ok(()),
            EntityState::Deleted => self.transition(id, EntityState::Detached, false),
            EntityState::Added | EntityState::Modified | EntityState::Unchanged => {
                self.commit_auto_sidecars(id)?;
                let et = Arc::clone(self.entry_ref(id)?.entity_type());
                match et.change_tracking() {
                    ChangeTracking::Snapshot => self.entry_mut(id)?.capture_snapshot(),
                    ChangeTracking::Notifying => {
                        let _ = self.entry_mut(id)?.take_sidecar(SidecarName::OriginalValues);
                    }
                }
                // Committing sidecars may itself have marked fields dirty;
                // read the state again rather than trusting the snapshot.
                if self.entry_ref(id)?.state() == EntityState::Unchanged {
                    Ok(())
                } else {
                    self.transition(id, EntityState::Unchanged, false)
                }
            }
        }
    }

    /// Accepts pending changes on every registered entry.
    pub fn accept_all_changes(&mut self) -> CoreResult<()> {
        let ids: Vec<EntryId> = self.entries().map(EntityEntry::id).collect();
        for id in ids {
            self.accept_changes(id)?;
        }
        Ok(())
    }

    // ---- sidecars -----------------------------------------------------

    /// Attaches the named sidecar to an entry, creating it if absent.
    pub fn add_sidecar(&mut self, id: EntryId, name: SidecarName) -> CoreResult<()> {
        self.entry_mut(id)?.ensure_sidecar(name);
        Ok(())
    }

    /// Stores a value in the named sidecar, attaching it if absent.
    pub fn sidecar_set_value(
        &mut self,
        id: EntryId,
        name: SidecarName,
        field: FieldId,
        value: Value,
    ) -> CoreResult<()> {
        self.entry_mut(id)?.ensure_sidecar(name).set_value(field, value);
        Ok(())
    }

    /// Captures the current value of `field` into the originals sidecar,
    /// unless already captured.
    pub fn ensure_snapshot(&mut self, id: EntryId, field: FieldId) -> CoreResult<()> {
        let current = self.entry_ref(id)?.read_value(field);
        self.entry_mut(id)?.ensure_original(field, &current);
        Ok(())
    }

    /// Merges the named sidecar's values into the entry's main storage and
    /// removes the slot. No-op if the sidecar is absent.
    pub fn commit_sidecar(&mut self, id: EntryId, name: SidecarName) -> CoreResult<()> {
        let Some(mut sidecar) = self.entry_mut(id)?.take_sidecar(name) else {
            return Ok(());
        };
        for (field, value) in sidecar.take_values() {
            self.set_value(id, field, value)?;
        }
        Ok(())
    }

    /// Discards the named sidecar. No-op if absent.
    pub fn rollback_sidecar(&mut self, id: EntryId, name: SidecarName) -> CoreResult<()> {
        let _ = self.entry_mut(id)?.take_sidecar(name);
        Ok(())
    }

    fn commit_auto_sidecars(&mut self, id: EntryId) -> CoreResult<()> {
        let names: Vec<SidecarName> = [SidecarName::OriginalValues, SidecarName::StoreGeneratedValues]
            .into_iter()
            .filter(|name| {
                self.entry(id)
                    .and_then(|e| e.sidecar(*name))
                    .is_some_and(Sidecar::auto_commits)
            })
            .collect();
        for name in names {
            self.commit_sidecar(id, name)?;
        }
        Ok(())
    }

    // ---- keys ---------------------------------------------------------

    /// Builds the entry's primary key from its current field values.
    pub fn primary_key(&self, id: EntryId) -> CoreResult<KeyValue> {
        let entry = self.entry_ref(id)?;
        let et = Arc::clone(entry.entity_type());
        self.primary_factories[et.id().index()]
            .create(&EntryValueSource::new(entry))
            .ok_or_else(|| self.null_key_error(&et))
    }

    /// Builds the principal-typed key held in the entry's foreign key
    /// fields, or `None` if any component is null.
    pub fn foreign_key(&self, id: EntryId, fk: ForeignKeyId) -> CoreResult<Option<KeyValue>> {
        let entry = self.entry_ref(id)?;
        let descriptor = self.model.foreign_key(fk);
        if descriptor.dependent_type() != entry.entity_type().id() {
            return Err(CoreError::invalid_operation(format!(
                "entity type {} is not the dependent of {}",
                entry.entity_type().name(),
                fk
            )));
        }
        Ok(self.fk_factories[fk.index()].create(&EntryValueSource::new(entry)))
    }

    /// Builds the key a principal-side entry exposes to the relationship.
    pub fn principal_key(&self, id: EntryId, fk: ForeignKeyId) -> CoreResult<KeyValue> {
        let entry = self.entry_ref(id)?;
        let descriptor = self.model.foreign_key(fk);
        if descriptor.principal_type() != entry.entity_type().id() {
            return Err(CoreError::invalid_operation(format!(
                "entity type {} is not the principal of {}",
                entry.entity_type().name(),
                fk
            )));
        }
        self.primary_key(id)
    }

    // ---- navigations --------------------------------------------------

    /// Returns the current target of a reference navigation.
    pub fn reference(&self, id: EntryId, navigation: NavigationId) -> CoreResult<Option<EntryId>> {
        self.validate_navigation(id, navigation, NavigationKind::Reference)?;
        Ok(self.entry_ref(id)?.reference(navigation))
    }

    /// Returns the current members of a collection navigation.
    pub fn collection(&self, id: EntryId, navigation: NavigationId) -> CoreResult<&[EntryId]> {
        self.validate_navigation(id, navigation, NavigationKind::Collection)?;
        Ok(self.entry_ref(id)?.collection(navigation))
    }

    /// Points a reference navigation at `target`, fixing up foreign keys
    /// and inverse navigations on both the old and new targets.
    pub fn set_reference(
        &mut self,
        id: EntryId,
        navigation: NavigationId,
        target: Option<EntryId>,
    ) -> CoreResult<()> {
        self.validate_navigation(id, navigation, NavigationKind::Reference)?;
        if let Some(target_id) = target {
            self.validate_navigation_target(navigation, target_id)?;
        }
        let old = self.entry_ref(id)?.reference(navigation);
        if old == target {
            return Ok(());
        }
        trace!(entry = %id, navigation = %navigation, "reference changing");
        self.entry_mut(id)?.set_reference_raw(navigation, target);
        self.fixup_reference_changed(id, navigation, old, target)
    }

    /// Adds `member` to a collection navigation, setting its foreign key
    /// and inverse reference. Adding a present member is a no-op.
    pub fn add_to_collection(
        &mut self,
        id: EntryId,
        navigation: NavigationId,
        member: EntryId,
    ) -> CoreResult<()> {
        self.validate_navigation(id, navigation, NavigationKind::Collection)?;
        self.validate_navigation_target(navigation, member)?;
        if !self.entry_mut(id)?.collection_add_raw(navigation, member) {
            return Ok(());
        }
        trace!(entry = %id, navigation = %navigation, member = %member, "collection add");
        self.fixup_collection_changed(id, navigation, &[member], &[])
    }

    /// Removes `member` from a collection navigation, conditionally
    /// clearing its foreign key. Removing an absent member is a no-op.
    pub fn remove_from_collection(
        &mut self,
        id: EntryId,
        navigation: NavigationId,
        member: EntryId,
    ) -> CoreResult<()> {
        self.validate_navigation(id, navigation, NavigationKind::Collection)?;
        if !self.entry_mut(id)?.collection_remove_raw(navigation, member) {
            return Ok(());
        }
        trace!(entry = %id, navigation = %navigation, member = %member, "collection remove");
        self.fixup_collection_changed(id, navigation, &[], &[member])
    }

    fn validate_navigation(
        &self,
        id: EntryId,
        navigation: NavigationId,
        expected: NavigationKind,
    ) -> CoreResult<()> {
        let entry = self.entry_ref(id)?;
        if !entry.entity_type().navigations().contains(&navigation) {
            return Err(CoreError::UnknownNavigation {
                entity_type: entry.entity_type().name().to_owned(),
                navigation: navigation.to_string(),
            });
        }
        let nav = self.model.navigation(navigation);
        if nav.kind() != expected {
            return Err(CoreError::invalid_operation(format!(
                "navigation {} is not a {expected:?} navigation",
                nav.name()
            )));
        }
        Ok(())
    }

    fn validate_navigation_target(
        &self,
        navigation: NavigationId,
        target: EntryId,
    ) -> CoreResult<()> {
        let nav = self.model.navigation(navigation);
        let fk = self.model.foreign_key(nav.foreign_key());
        let expected = if nav.points_to_principal() {
            fk.principal_type()
        } else {
            fk.dependent_type()
        };
        let entry = self.entry_ref(target)?;
        if entry.entity_type().id() != expected {
            return Err(CoreError::invalid_operation(format!(
                "navigation {} expects {} but {} is a {}",
                nav.name(),
                self.model.entity_type(expected).name(),
                target,
                entry.entity_type().name()
            )));
        }
        Ok(())
    }

    // ---- diagnostics ---------------------------------------------------

    /// Returns true if `field` carries an unresolved conceptual null.
    pub fn has_conceptual_null(&self, id: EntryId, field: FieldId) -> CoreResult<bool> {
        Ok(self.entry_ref(id)?.has_conceptual_null(field))
    }

    // ---- events -------------------------------------------------------

    /// Subscribes to the tracking event feed.
    pub fn subscribe(&self) -> Receiver<TrackingEvent> {
        self.feed.subscribe()
    }

    /// Polls tracking events after `cursor`, up to `limit`.
    #[must_use]
    pub fn poll_events(&self, cursor: u64, limit: usize) -> Vec<TrackingEvent> {
        self.feed.poll(cursor, limit)
    }

    fn emit_event(&mut self, entry: EntryId, entity_type: EntityTypeId, kind: TrackingEventKind) {
        self.next_sequence += 1;
        self.feed.emit(TrackingEvent {
            sequence: self.next_sequence,
            entry,
            entity_type,
            kind,
        });
    }

    pub(crate) fn foreign_key_with_override(
        &self,
        id: EntryId,
        fk: &ForeignKey,
        field: FieldId,
        value: &Value,
    ) -> CoreResult<Option<KeyValue>> {
        let entry = self.entry_ref(id)?;
        let source = OverrideValueSource::new(entry, field, value);
        Ok(self.fk_factories[fk.id().index()].create(&source))
    }
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("tracked", &self.len())
            .field("indexed_keys", &self.key_index.len())
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{CanceledKeyGenerator, SequenceKeyGenerator};
    use entitrack_metadata::{EntityTypeSpec, FieldSpec, ForeignKeySpec};

    fn catalog_model() -> Arc<Model> {
        Model::builder()
            .entity(
                EntityTypeSpec::new("Category")
                    .field(FieldSpec::new("id", entitrack_metadata::ValueKind::Integer))
                    .field(FieldSpec::new("name", entitrack_metadata::ValueKind::Text).nullable())
                    .key(["id"]),
            )
            .entity(
                EntityTypeSpec::new("Product")
                    .field(FieldSpec::new("id", entitrack_metadata::ValueKind::Integer))
                    .field(FieldSpec::new("price", entitrack_metadata::ValueKind::Integer).nullable())
                    .field(
                        FieldSpec::new("category_id", entitrack_metadata::ValueKind::Integer)
                            .nullable(),
                    )
                    .key(["id"]),
            )
            .entity(
                EntityTypeSpec::new("Note")
                    .field(FieldSpec::new("id", entitrack_metadata::ValueKind::Integer))
                    .field(FieldSpec::new("body", entitrack_metadata::ValueKind::Text).nullable())
                    .key(["id"])
                    .change_tracking(ChangeTracking::Snapshot),
            )
            .foreign_key(
                ForeignKeySpec::new("Product", ["category_id"], "Category")
                    .with_reference("category")
                    .with_collection("products"),
            )
            .build()
            .unwrap()
    }

    fn shadow_entry(manager: &mut StateManager, type_name: &str) -> EntryId {
        let et = Arc::clone(manager.model().entity_type_named(type_name).unwrap());
        manager
            .create_entry(et.id(), Backing::shadow(et.field_count()))
            .unwrap()
    }

    fn tracked(manager: &mut StateManager, type_name: &str, id_value: i64) -> EntryId {
        let id = shadow_entry(manager, type_name);
        let id_field = manager
            .model()
            .entity_type_named(type_name)
            .unwrap()
            .field_id("id")
            .unwrap();
        manager.set_value(id, id_field, Value::Integer(id_value)).unwrap();
        manager.set_entity_state(id, EntityState::Unchanged).unwrap();
        id
    }

    fn field(manager: &StateManager, type_name: &str, field_name: &str) -> FieldId {
        manager
            .model()
            .entity_type_named(type_name)
            .unwrap()
            .field_id(field_name)
            .unwrap()
    }

    #[test]
    fn create_entry_starts_detached() {
        let mut manager = StateManager::new(catalog_model());
        let id = shadow_entry(&mut manager, "Product");
        assert_eq!(manager.entity_state(id).unwrap(), EntityState::Detached);
        assert!(manager.is_empty());
    }

    #[test]
    fn tracking_registers_key() {
        let mut manager = StateManager::new(catalog_model());
        let id = tracked(&mut manager, "Category", 1);

        let key = manager.primary_key(id).unwrap();
        assert_eq!(manager.lookup(&key), Some(id));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn duplicate_key_rejected() {
        let mut manager = StateManager::new(catalog_model());
        let _first = tracked(&mut manager, "Category", 1);

        let second = shadow_entry(&mut manager, "Category");
        let id_field = field(&manager, "Category", "id");
        manager.set_value(second, id_field, Value::Integer(1)).unwrap();
        let err = manager
            .set_entity_state(second, EntityState::Unchanged)
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateKey { .. }));
        assert_eq!(manager.entity_state(second).unwrap(), EntityState::Detached);
    }

    #[test]
    fn tracking_without_key_requires_added() {
        let mut manager = StateManager::new(catalog_model());
        let id = shadow_entry(&mut manager, "Category");

        let err = manager
            .set_entity_state(id, EntityState::Unchanged)
            .unwrap_err();
        assert!(matches!(err, CoreError::NullKeyValue { .. }));

        manager.set_entity_state(id, EntityState::Added).unwrap();
        assert_eq!(manager.entity_state(id).unwrap(), EntityState::Added);
    }

    #[test]
    fn equal_write_is_a_no_op() {
        let mut manager = StateManager::new(catalog_model());
        let id = tracked(&mut manager, "Product", 1);
        let price = field(&manager, "Product", "price");

        manager.set_value(id, price, Value::Null).unwrap();
        assert_eq!(manager.entity_state(id).unwrap(), EntityState::Unchanged);
    }

    #[test]
    fn change_promotes_and_marks_exactly_one_field() {
        let mut manager = StateManager::new(catalog_model());
        let id = tracked(&mut manager, "Product", 1);
        let price = field(&manager, "Product", "price");
        let category_id = field(&manager, "Product", "category_id");

        manager.set_value(id, price, Value::Integer(100)).unwrap();

        assert_eq!(manager.entity_state(id).unwrap(), EntityState::Modified);
        assert!(manager.is_property_modified(id, price).unwrap());
        assert!(!manager.is_property_modified(id, category_id).unwrap());
    }

    #[test]
    fn clearing_last_dirty_bit_demotes() {
        let mut manager = StateManager::new(catalog_model());
        let id = tracked(&mut manager, "Product", 1);
        let price = field(&manager, "Product", "price");

        manager.set_value(id, price, Value::Integer(100)).unwrap();
        manager.set_property_modified(id, price, false).unwrap();

        assert_eq!(manager.entity_state(id).unwrap(), EntityState::Unchanged);
    }

    #[test]
    fn explicit_modified_is_sticky() {
        let mut manager = StateManager::new(catalog_model());
        let id = tracked(&mut manager, "Product", 1);

        manager.set_entity_state(id, EntityState::Modified).unwrap();

        let product_type = Arc::clone(manager.model().entity_type_named("Product").unwrap());
        for def in product_type.fields() {
            assert!(manager.is_property_modified(id, def.id()).unwrap());
        }
    }

    #[test]
    fn dirty_bits_meaningless_outside_modified() {
        let mut manager = StateManager::new(catalog_model());
        let id = tracked(&mut manager, "Product", 1);
        let price = field(&manager, "Product", "price");

        manager.set_value(id, price, Value::Integer(1)).unwrap();
        manager.set_entity_state(id, EntityState::Deleted).unwrap();

        assert!(!manager.is_property_modified(id, price).unwrap());
    }

    #[test]
    fn value_kind_mismatch_rejected() {
        let mut manager = StateManager::new(catalog_model());
        let id = tracked(&mut manager, "Product", 1);
        let price = field(&manager, "Product", "price");

        let err = manager
            .set_value(id, price, Value::Text("not a number".into()))
            .unwrap_err();
        assert!(matches!(err, CoreError::ValueKindMismatch { .. }));
    }

    #[test]
    fn added_generates_missing_key() {
        let mut manager = StateManager::new(catalog_model());
        let category_type = manager.model().entity_type_named("Category").unwrap().id();
        let id_field = field(&manager, "Category", "id");
        manager.register_key_generator(category_type, id_field, Box::new(SequenceKeyGenerator::new()));

        let id = shadow_entry(&mut manager, "Category");
        manager.set_entity_state(id, EntityState::Added).unwrap();

        assert_eq!(manager.get_value(id, id_field).unwrap(), Value::Integer(-1));
        let key = manager.primary_key(id).unwrap();
        assert_eq!(manager.lookup(&key), Some(id));
    }

    #[test]
    fn generator_leaves_existing_key_alone() {
        let mut manager = StateManager::new(catalog_model());
        let category_type = manager.model().entity_type_named("Category").unwrap().id();
        let id_field = field(&manager, "Category", "id");
        manager.register_key_generator(category_type, id_field, Box::new(SequenceKeyGenerator::new()));

        let id = shadow_entry(&mut manager, "Category");
        manager.set_value(id, id_field, Value::Integer(42)).unwrap();
        manager.set_entity_state(id, EntityState::Added).unwrap();

        assert_eq!(manager.get_value(id, id_field).unwrap(), Value::Integer(42));
    }

    #[tokio::test]
    async fn canceled_async_generation_leaves_state_unchanged() {
        let mut manager = StateManager::new(catalog_model());
        let category_type = manager.model().entity_type_named("Category").unwrap().id();
        let id_field = field(&manager, "Category", "id");
        manager.register_async_key_generator(category_type, id_field, Box::new(CanceledKeyGenerator));

        let id = shadow_entry(&mut manager, "Category");
        let err = manager
            .set_entity_state_async(id, EntityState::Added)
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::KeyGenerationCanceled));
        assert_eq!(manager.entity_state(id).unwrap(), EntityState::Detached);
        assert_eq!(manager.get_value(id, id_field).unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn async_added_uses_async_generator() {
        let mut manager = StateManager::new(catalog_model());
        let category_type = manager.model().entity_type_named("Category").unwrap().id();
        let id_field = field(&manager, "Category", "id");
        manager.register_async_key_generator(
            category_type,
            id_field,
            Box::new(SequenceKeyGenerator::new()),
        );

        let id = shadow_entry(&mut manager, "Category");
        manager
            .set_entity_state_async(id, EntityState::Added)
            .await
            .unwrap();

        assert_eq!(manager.get_value(id, id_field).unwrap(), Value::Integer(-1));
    }

    #[test]
    fn accept_changes_added_becomes_unchanged() {
        let mut manager = StateManager::new(catalog_model());
        let id = shadow_entry(&mut manager, "Category");
        let id_field = field(&manager, "Category", "id");
        manager.set_value(id, id_field, Value::Integer(1)).unwrap();
        manager.set_entity_state(id, EntityState::Added).unwrap();

        manager.accept_changes(id).unwrap();
        assert_eq!(manager.entity_state(id).unwrap(), EntityState::Unchanged);
    }

    #[test]
    fn accept_changes_deleted_detaches() {
        let mut manager = StateManager::new(catalog_model());
        let id = tracked(&mut manager, "Category", 1);
        let key = manager.primary_key(id).unwrap();

        manager.set_entity_state(id, EntityState::Deleted).unwrap();
        assert_eq!(manager.lookup(&key), Some(id));

        manager.accept_changes(id).unwrap();
        assert!(manager.entry(id).is_none());
        assert_eq!(manager.lookup(&key), None);
    }

    #[test]
    fn materialize_deduplicates_by_key() {
        let mut manager = StateManager::new(catalog_model());
        let category_type = manager.model().entity_type_named("Category").unwrap().id();

        let row = RowBuffer::new(vec![Value::Integer(1), Value::Text("tools".into())]);
        let first = manager
            .materialize(category_type, Backing::shadow(2), Some(row.clone()))
            .unwrap();
        let second = manager
            .materialize(category_type, Backing::shadow(2), Some(row))
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(manager.len(), 1);
        let name = field(&manager, "Category", "name");
        assert_eq!(
            manager.get_value(first, name).unwrap(),
            Value::Text("tools".into())
        );
    }

    #[test]
    fn detect_changes_tracks_snapshot_types() {
        let mut manager = StateManager::new(catalog_model());
        let id = tracked(&mut manager, "Note", 1);
        let body = field(&manager, "Note", "body");

        manager.set_value(id, body, Value::Text("draft".into())).unwrap();
        assert_eq!(manager.entity_state(id).unwrap(), EntityState::Modified);

        // Revert to the original value; the bit clears on the next scan.
        manager.set_value(id, body, Value::Null).unwrap();
        let changed = manager.detect_changes(id).unwrap();

        assert!(!changed);
        assert_eq!(manager.entity_state(id).unwrap(), EntityState::Unchanged);
    }

    #[test]
    fn detect_changes_is_a_no_op_for_notifying_types() {
        let mut manager = StateManager::new(catalog_model());
        let id = tracked(&mut manager, "Product", 1);
        assert!(!manager.detect_changes(id).unwrap());
    }

    #[test]
    fn store_generated_sidecar_routes_reads_and_writes() {
        let mut manager = StateManager::new(catalog_model());
        let id = tracked(&mut manager, "Product", 1);
        let price = field(&manager, "Product", "price");

        manager.add_sidecar(id, SidecarName::StoreGeneratedValues).unwrap();
        manager.set_value(id, price, Value::Integer(100)).unwrap();

        // The staged value is visible but has not reached the backing yet.
        assert_eq!(manager.get_value(id, price).unwrap(), Value::Integer(100));
        let entry = manager.entry(id).unwrap();
        assert!(entry
            .sidecar(SidecarName::StoreGeneratedValues)
            .unwrap()
            .has_value(price));

        manager.accept_changes(id).unwrap();
        assert_eq!(manager.get_value(id, price).unwrap(), Value::Integer(100));
        assert!(manager
            .entry(id)
            .unwrap()
            .sidecar(SidecarName::StoreGeneratedValues)
            .is_none());
    }

    #[test]
    fn rollback_sidecar_discards_staged_values() {
        let mut manager = StateManager::new(catalog_model());
        let id = tracked(&mut manager, "Product", 1);
        let price = field(&manager, "Product", "price");

        manager.set_value(id, price, Value::Integer(50)).unwrap();
        manager.add_sidecar(id, SidecarName::StoreGeneratedValues).unwrap();
        manager.set_value(id, price, Value::Integer(999)).unwrap();
        assert_eq!(manager.get_value(id, price).unwrap(), Value::Integer(999));

        manager
            .rollback_sidecar(id, SidecarName::StoreGeneratedValues)
            .unwrap();
        assert_eq!(manager.get_value(id, price).unwrap(), Value::Integer(50));
    }

    #[test]
    fn key_mutation_reindexes_identity_map() {
        let mut manager = StateManager::new(catalog_model());
        let id = tracked(&mut manager, "Category", 1);
        let id_field = field(&manager, "Category", "id");
        let old_key = manager.primary_key(id).unwrap();

        manager.set_value(id, id_field, Value::Integer(2)).unwrap();

        assert_eq!(manager.lookup(&old_key), None);
        let new_key = manager.primary_key(id).unwrap();
        assert_eq!(manager.lookup(&new_key), Some(id));
    }

    #[test]
    fn key_mutation_collision_restores_old_value() {
        let mut manager = StateManager::new(catalog_model());
        let _other = tracked(&mut manager, "Category", 2);
        let id = tracked(&mut manager, "Category", 1);
        let id_field = field(&manager, "Category", "id");

        let err = manager.set_value(id, id_field, Value::Integer(2)).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateKey { .. }));
        assert_eq!(manager.get_value(id, id_field).unwrap(), Value::Integer(1));
        let key = manager.primary_key(id).unwrap();
        assert_eq!(manager.lookup(&key), Some(id));
    }

    #[test]
    fn events_report_lifecycle_transitions() {
        let mut manager = StateManager::new(catalog_model());
        let rx = manager.subscribe();

        let id = tracked(&mut manager, "Category", 1);
        manager.set_entity_state(id, EntityState::Deleted).unwrap();
        manager.accept_changes(id).unwrap();

        let first = rx.recv().unwrap();
        assert_eq!(first.kind, TrackingEventKind::StartedTracking);
        let second = rx.recv().unwrap();
        assert_eq!(
            second.kind,
            TrackingEventKind::StateChanged {
                from: EntityState::Unchanged,
                to: EntityState::Deleted,
            }
        );
        let third = rx.recv().unwrap();
        assert_eq!(third.kind, TrackingEventKind::Detached);
    }

    #[test]
    fn moving_tracked_entry_to_added_is_rejected() {
        let mut manager = StateManager::new(catalog_model());
        let id = tracked(&mut manager, "Category", 1);

        let err = manager.set_entity_state(id, EntityState::Added).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
    }

    #[test]
    fn detached_entry_operations_fail_cleanly() {
        let mut manager = StateManager::new(catalog_model());
        let id = tracked(&mut manager, "Category", 1);
        manager.set_entity_state(id, EntityState::Detached).unwrap();

        let id_field = field(&manager, "Category", "id");
        let err = manager.get_value(id, id_field).unwrap_err();
        assert!(matches!(err, CoreError::EntryNotTracked { .. }));
    }
}
