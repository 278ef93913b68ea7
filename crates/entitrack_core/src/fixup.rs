//! Navigation fixup engine.
//!
//! Every foreign-key field change, reference-navigation change, and
//! collection-navigation change lands here, and the engine repairs the
//! paired side of each affected relationship: foreign keys follow
//! navigations, navigations follow foreign keys, and both ends of a
//! bidirectional association stay visible from each other.
//!
//! The engine's own repair writes go back through the state manager's
//! mutation surface, which would re-enter fixup; a per-engine guard
//! suppresses those nested invocations so exactly one logical fixup runs
//! per top-level mutation. All repair work completes before the triggering
//! mutation returns.
//!
//! Repair steps never fail structurally: they only touch metadata the
//! model validated at build time. The one unresolvable case — a
//! non-nullable foreign key that logically needs clearing — leaves the
//! value in place and marks the field as a conceptual null for the caller
//! to resolve.

use std::sync::Arc;

use tracing::{debug, trace};

use entitrack_metadata::{FieldId, ForeignKey, ForeignKeyId, NavigationId, NavigationKind, Value};

use crate::entry::{EntryId, EntryValueSource};
use crate::error::CoreResult;
use crate::key::KeyValue;
use crate::manager::StateManager;

/// Re-entrancy guard for one fixup engine instance.
///
/// The guard is per engine, not per entry: a fixup action may touch many
/// entries, and every nested notification raised by its own writes must be
/// suppressed regardless of which entry raised it.
#[derive(Debug)]
pub(crate) struct NavigationFixer {
    in_fixup: bool,
}

impl NavigationFixer {
    pub(crate) fn new() -> Self {
        Self { in_fixup: false }
    }

    /// Claims the guard. Returns false if a fixup is already running.
    pub(crate) fn try_begin(&mut self) -> bool {
        if self.in_fixup {
            return false;
        }
        self.in_fixup = true;
        true
    }

    pub(crate) fn end(&mut self) {
        self.in_fixup = false;
    }
}

impl StateManager {
    /// Reacts to a foreign-key field write on `id`.
    ///
    /// For each relationship the field participates in: the old principal
    /// (located through the pre-change key) drops the dependent from its
    /// paired navigations, and the new principal (if tracked) gains it —
    /// stealing it from a previous dependent when the relationship is
    /// one-to-one.
    pub(crate) fn fixup_foreign_key_changed(
        &mut self,
        id: EntryId,
        field: FieldId,
        old: &Value,
        fks: &[ForeignKeyId],
    ) -> CoreResult<()> {
        if !self.fixer.try_begin() {
            return Ok(());
        }
        let result = self.foreign_key_changed_inner(id, field, old, fks);
        self.fixer.end();
        result
    }

    fn foreign_key_changed_inner(
        &mut self,
        id: EntryId,
        field: FieldId,
        old: &Value,
        fks: &[ForeignKeyId],
    ) -> CoreResult<()> {
        let model = Arc::clone(self.model());
        for fk_id in fks {
            let fk = model.foreign_key(*fk_id);
            let old_key = self.foreign_key_with_override(id, fk, field, old)?;
            let new_key = {
                let entry = self.entry_ref(id)?;
                self.fk_factory(*fk_id).create(&EntryValueSource::new(entry))
            };
            if old_key == new_key {
                continue;
            }
            trace!(entry = %id, fk = %fk_id, "foreign key changed");

            if let Some(key) = &old_key {
                if let Some(principal) = self.lookup(key) {
                    self.detach_pair(principal, id, fk)?;
                }
            }
            if let Some(key) = &new_key {
                if let Some(principal) = self.lookup(key) {
                    if fk.is_unique() {
                        self.steal_principal(principal, id, fk)?;
                    }
                    self.attach_pair(principal, id, fk)?;
                }
            }
        }
        Ok(())
    }

    /// Reacts to a reference-navigation write on `id`.
    ///
    /// Toward the principal, the dependent's foreign key follows the new
    /// target (or clears); toward the dependent (one-to-one), the newly
    /// referenced dependent's foreign key is written from `id`'s key and
    /// the previously referenced dependent is conditionally released. The
    /// old target's inverse membership is cleared and the new target's is
    /// set in both directions.
    pub(crate) fn fixup_reference_changed(
        &mut self,
        id: EntryId,
        navigation: NavigationId,
        old: Option<EntryId>,
        new: Option<EntryId>,
    ) -> CoreResult<()> {
        if !self.fixer.try_begin() {
            return Ok(());
        }
        let result = self.reference_changed_inner(id, navigation, old, new);
        self.fixer.end();
        result
    }

    fn reference_changed_inner(
        &mut self,
        id: EntryId,
        navigation: NavigationId,
        old: Option<EntryId>,
        new: Option<EntryId>,
    ) -> CoreResult<()> {
        let model = Arc::clone(self.model());
        let nav = model.navigation(navigation);
        let fk = model.foreign_key(nav.foreign_key());

        if nav.points_to_principal() {
            // `id` is the dependent.
            if let Some(old_principal) = old {
                if self.entry(old_principal).is_some() {
                    self.clear_inverse(old_principal, id, fk)?;
                }
            }
            match new {
                Some(principal) => {
                    if fk.is_unique() {
                        self.steal_principal(principal, id, fk)?;
                    }
                    self.set_foreign_key_from(id, fk, principal)?;
                    self.set_inverse(principal, id, fk)?;
                }
                None => {
                    self.clear_foreign_key(id, fk)?;
                }
            }
        } else {
            // `id` is the principal of a one-to-one relationship.
            if let Some(old_dependent) = old {
                if self.entry(old_dependent).is_some() {
                    self.clear_foreign_key_if_points_at(old_dependent, fk, id)?;
                    self.clear_dependent_reference(old_dependent, id, fk)?;
                }
            }
            if let Some(new_dependent) = new {
                self.set_foreign_key_from(new_dependent, fk, id)?;
                if let Some(reference) = fk.dependent_to_principal() {
                    self.entry_mut(new_dependent)?
                        .set_reference_raw(reference, Some(id));
                }
            }
        }
        Ok(())
    }

    /// Reacts to collection membership changes on the principal `id`.
    ///
    /// Removed members conditionally lose their foreign key (only while it
    /// still points at `id`, so a concurrent reassignment is not
    /// clobbered); added members gain `id`'s key and inverse reference.
    pub(crate) fn fixup_collection_changed(
        &mut self,
        id: EntryId,
        navigation: NavigationId,
        added: &[EntryId],
        removed: &[EntryId],
    ) -> CoreResult<()> {
        if !self.fixer.try_begin() {
            return Ok(());
        }
        let result = self.collection_changed_inner(id, navigation, added, removed);
        self.fixer.end();
        result
    }

    fn collection_changed_inner(
        &mut self,
        id: EntryId,
        navigation: NavigationId,
        added: &[EntryId],
        removed: &[EntryId],
    ) -> CoreResult<()> {
        let model = Arc::clone(self.model());
        let nav = model.navigation(navigation);
        let fk = model.foreign_key(nav.foreign_key());

        for member in removed {
            if self.entry(*member).is_none() {
                continue;
            }
            self.clear_foreign_key_if_points_at(*member, fk, id)?;
            self.clear_dependent_reference(*member, id, fk)?;
        }
        for member in added {
            self.set_foreign_key_from(*member, fk, id)?;
            if let Some(reference) = fk.dependent_to_principal() {
                self.entry_mut(*member)?.set_reference_raw(reference, Some(id));
            }
        }
        Ok(())
    }

    /// Wires up both directions of every relationship `id` participates in
    /// against the entries already tracked.
    ///
    /// Runs once, on the entry's first transition out of `Detached`, so
    /// graphs loaded in arbitrary order converge: a dependent attached
    /// before its principal is picked up here when the principal arrives,
    /// and vice versa.
    pub(crate) fn fixup_initial(&mut self, id: EntryId) -> CoreResult<()> {
        if !self.fixer.try_begin() {
            return Ok(());
        }
        let result = self.initial_fixup_inner(id);
        self.fixer.end();
        result
    }

    fn initial_fixup_inner(&mut self, id: EntryId) -> CoreResult<()> {
        let model = Arc::clone(self.model());
        let et = Arc::clone(self.entry_ref(id)?.entity_type());

        // As dependent: locate an already-tracked principal.
        for fk_id in et.foreign_keys() {
            let fk = model.foreign_key(*fk_id);
            let key = {
                let entry = self.entry_ref(id)?;
                self.fk_factory(*fk_id).create(&EntryValueSource::new(entry))
            };
            let Some(key) = key else { continue };
            let Some(principal) = self.lookup(&key) else {
                continue;
            };
            if fk.is_unique() {
                self.steal_principal(principal, id, fk)?;
            }
            self.attach_pair(principal, id, fk)?;
        }

        // As principal: locate already-tracked dependents referencing us.
        let my_key = {
            let entry = self.entry_ref(id)?;
            self.primary_factory(et.id()).create(&EntryValueSource::new(entry))
        };
        let Some(my_key) = my_key else { return Ok(()) };
        for fk_id in et.referencing_keys() {
            let fk = model.foreign_key(*fk_id);
            let dependents = self.dependents_with_key(fk, &my_key, Some(id));
            for dependent in dependents {
                if fk.is_unique() {
                    self.steal_principal(id, dependent, fk)?;
                }
                self.attach_pair(id, dependent, fk)?;
            }
        }
        Ok(())
    }

    // ---- repair helpers -----------------------------------------------

    /// Adds `dependent` to `principal`'s paired navigations and points the
    /// dependent's reference at the principal. Idempotent.
    fn attach_pair(
        &mut self,
        principal: EntryId,
        dependent: EntryId,
        fk: &ForeignKey,
    ) -> CoreResult<()> {
        self.set_inverse(principal, dependent, fk)?;
        if let Some(reference) = fk.dependent_to_principal() {
            self.entry_mut(dependent)?
                .set_reference_raw(reference, Some(principal));
        }
        Ok(())
    }

    /// Removes `dependent` from `principal`'s paired navigations and clears
    /// the dependent's reference if it still points at the principal.
    /// Idempotent.
    fn detach_pair(
        &mut self,
        principal: EntryId,
        dependent: EntryId,
        fk: &ForeignKey,
    ) -> CoreResult<()> {
        self.clear_inverse(principal, dependent, fk)?;
        self.clear_dependent_reference(dependent, principal, fk)?;
        Ok(())
    }

    /// Sets `principal`'s inverse navigation membership for `dependent`.
    fn set_inverse(
        &mut self,
        principal: EntryId,
        dependent: EntryId,
        fk: &ForeignKey,
    ) -> CoreResult<()> {
        let Some(inverse) = fk.principal_to_dependents() else {
            return Ok(());
        };
        let model = Arc::clone(self.model());
        match model.navigation(inverse).kind() {
            NavigationKind::Collection => {
                self.entry_mut(principal)?.collection_add_raw(inverse, dependent);
            }
            NavigationKind::Reference => {
                self.entry_mut(principal)?
                    .set_reference_raw(inverse, Some(dependent));
            }
        }
        Ok(())
    }

    /// Clears `principal`'s inverse navigation membership for `dependent`.
    fn clear_inverse(
        &mut self,
        principal: EntryId,
        dependent: EntryId,
        fk: &ForeignKey,
    ) -> CoreResult<()> {
        let Some(inverse) = fk.principal_to_dependents() else {
            return Ok(());
        };
        let model = Arc::clone(self.model());
        match model.navigation(inverse).kind() {
            NavigationKind::Collection => {
                self.entry_mut(principal)?.collection_remove_raw(inverse, dependent);
            }
            NavigationKind::Reference => {
                let entry = self.entry_mut(principal)?;
                if entry.reference(inverse) == Some(dependent) {
                    entry.set_reference_raw(inverse, None);
                }
            }
        }
        Ok(())
    }

    /// Clears `dependent`'s reference navigation if it points at
    /// `principal`; a reference already redirected elsewhere is left alone.
    fn clear_dependent_reference(
        &mut self,
        dependent: EntryId,
        principal: EntryId,
        fk: &ForeignKey,
    ) -> CoreResult<()> {
        if let Some(reference) = fk.dependent_to_principal() {
            let entry = self.entry_mut(dependent)?;
            if entry.reference(reference) == Some(principal) {
                entry.set_reference_raw(reference, None);
            }
        }
        Ok(())
    }

    /// Writes `dependent`'s foreign key fields from `principal`'s key
    /// values, positionally.
    ///
    /// The dependent's previous principal, if a different one is tracked,
    /// is released first: the nested write below runs with the guard held,
    /// so the old pairing would otherwise never be cleaned.
    fn set_foreign_key_from(
        &mut self,
        dependent: EntryId,
        fk: &ForeignKey,
        principal: EntryId,
    ) -> CoreResult<()> {
        let old_key = {
            let entry = self.entry_ref(dependent)?;
            self.fk_factory(fk.id()).create(&EntryValueSource::new(entry))
        };
        if let Some(key) = old_key {
            if let Some(old_principal) = self.lookup(&key) {
                if old_principal != principal {
                    self.detach_pair(old_principal, dependent, fk)?;
                }
            }
        }

        let values: Vec<Value> = {
            let entry = self.entry_ref(principal)?;
            fk.principal_key()
                .iter()
                .map(|field| entry.read_value(*field))
                .collect()
        };
        for (field, value) in fk.dependent_fields().iter().zip(values) {
            self.set_value(dependent, *field, value)?;
        }
        Ok(())
    }

    /// Clears `dependent`'s foreign key fields.
    ///
    /// Nullable fields are set to null; a non-nullable field keeps its
    /// value and is marked as a conceptual null, observable via
    /// [`StateManager::has_conceptual_null`], until a later write resolves
    /// it.
    fn clear_foreign_key(&mut self, dependent: EntryId, fk: &ForeignKey) -> CoreResult<()> {
        let model = Arc::clone(self.model());
        let dependent_type = model.entity_type(fk.dependent_type());
        for field in fk.dependent_fields() {
            if dependent_type.field(*field).is_nullable() {
                self.set_value(dependent, *field, Value::Null)?;
            } else {
                debug!(entry = %dependent, field = %field, "conceptual null");
                self.entry_mut(dependent)?.mark_conceptual_null(*field);
            }
        }
        Ok(())
    }

    /// Clears `dependent`'s foreign key only while it still equals
    /// `principal`'s key, guarding against concurrent reassignment.
    fn clear_foreign_key_if_points_at(
        &mut self,
        dependent: EntryId,
        fk: &ForeignKey,
        principal: EntryId,
    ) -> CoreResult<()> {
        let principal_key = {
            let entry = self.entry_ref(principal)?;
            self.primary_factory(fk.principal_type())
                .create(&EntryValueSource::new(entry))
        };
        let dependent_key = {
            let entry = self.entry_ref(dependent)?;
            self.fk_factory(fk.id()).create(&EntryValueSource::new(entry))
        };
        if principal_key.is_some() && dependent_key == principal_key {
            self.clear_foreign_key(dependent, fk)?;
        }
        Ok(())
    }

    /// Releases the dependent currently claiming `principal` so that
    /// `new_dependent` can take its place in a one-to-one relationship.
    fn steal_principal(
        &mut self,
        principal: EntryId,
        new_dependent: EntryId,
        fk: &ForeignKey,
    ) -> CoreResult<()> {
        let Some(previous) = self.current_dependent_of(principal, fk)? else {
            return Ok(());
        };
        if previous == new_dependent {
            return Ok(());
        }
        debug!(principal = %principal, from = %previous, to = %new_dependent, "one-to-one steal");
        self.clear_foreign_key(previous, fk)?;
        self.detach_pair(principal, previous, fk)?;
        Ok(())
    }

    /// Finds the dependent currently paired with `principal` on a unique
    /// relationship.
    ///
    /// With an inverse navigation this is a slot read; without one it
    /// falls back to scanning live entries of the dependent type.
    fn current_dependent_of(
        &self,
        principal: EntryId,
        fk: &ForeignKey,
    ) -> CoreResult<Option<EntryId>> {
        if let Some(inverse) = fk.principal_to_dependents() {
            return Ok(self.entry_ref(principal)?.reference(inverse));
        }
        let key = {
            let entry = self.entry_ref(principal)?;
            self.primary_factory(fk.principal_type())
                .create(&EntryValueSource::new(entry))
        };
        let Some(key) = key else { return Ok(None) };
        Ok(self.dependents_with_key(fk, &key, None).into_iter().next())
    }

    /// Collects live dependents of `fk` whose foreign key equals `key`,
    /// skipping `except`.
    fn dependents_with_key(
        &self,
        fk: &ForeignKey,
        key: &KeyValue,
        except: Option<EntryId>,
    ) -> Vec<EntryId> {
        self.live_entries()
            .filter(|entry| entry.entity_type().id() == fk.dependent_type())
            .filter(|entry| Some(entry.id()) != except)
            .filter(|entry| {
                self.fk_factory(fk.id())
                    .create(&EntryValueSource::new(entry))
                    .as_ref()
                    == Some(key)
            })
            .map(|entry| entry.id())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Backing, EntityState};
    use crate::manager::StateManager;
    use entitrack_metadata::{
        EntityTypeSpec, FieldSpec, ForeignKeySpec, Model, ValueKind,
    };

    fn catalog_model() -> Arc<Model> {
        Model::builder()
            .entity(
                EntityTypeSpec::new("Category")
                    .field(FieldSpec::new("id", ValueKind::Integer))
                    .key(["id"]),
            )
            .entity(
                EntityTypeSpec::new("Product")
                    .field(FieldSpec::new("id", ValueKind::Integer))
                    .field(FieldSpec::new("category_id", ValueKind::Integer).nullable())
                    .key(["id"]),
            )
            .foreign_key(
                ForeignKeySpec::new("Product", ["category_id"], "Category")
                    .with_reference("category")
                    .with_collection("products"),
            )
            .build()
            .unwrap()
    }

    fn one_to_one_model(nullable_fk: bool) -> Arc<Model> {
        let fk_field = if nullable_fk {
            FieldSpec::new("user_id", ValueKind::Integer).nullable()
        } else {
            FieldSpec::new("user_id", ValueKind::Integer)
        };
        Model::builder()
            .entity(
                EntityTypeSpec::new("User")
                    .field(FieldSpec::new("id", ValueKind::Integer))
                    .key(["id"]),
            )
            .entity(
                EntityTypeSpec::new("Profile")
                    .field(FieldSpec::new("id", ValueKind::Integer))
                    .field(fk_field)
                    .key(["id"]),
            )
            .foreign_key(
                ForeignKeySpec::new("Profile", ["user_id"], "User")
                    .unique()
                    .with_reference("user")
                    .with_inverse_reference("profile"),
            )
            .build()
            .unwrap()
    }

    fn tracked(manager: &mut StateManager, type_name: &str, id_value: i64) -> EntryId {
        let et = Arc::clone(manager.model().entity_type_named(type_name).unwrap());
        let id = manager
            .create_entry(et.id(), Backing::shadow(et.field_count()))
            .unwrap();
        let id_field = et.field_id("id").unwrap();
        manager
            .set_value(id, id_field, entitrack_metadata::Value::Integer(id_value))
            .unwrap();
        manager.set_entity_state(id, EntityState::Unchanged).unwrap();
        id
    }

    fn detached(manager: &mut StateManager, type_name: &str) -> EntryId {
        let et = Arc::clone(manager.model().entity_type_named(type_name).unwrap());
        manager
            .create_entry(et.id(), Backing::shadow(et.field_count()))
            .unwrap()
    }

    fn field(manager: &StateManager, type_name: &str, name: &str) -> FieldId {
        manager
            .model()
            .entity_type_named(type_name)
            .unwrap()
            .field_id(name)
            .unwrap()
    }

    fn nav(manager: &StateManager, type_name: &str, name: &str) -> NavigationId {
        let type_id = manager.model().entity_type_named(type_name).unwrap().id();
        manager.model().navigation_named(type_id, name).unwrap().id()
    }

    #[test]
    fn setting_reference_writes_foreign_key_and_collection() {
        let mut manager = StateManager::new(catalog_model());
        let category = tracked(&mut manager, "Category", 1);
        let product = detached(&mut manager, "Product");
        let category_id = field(&manager, "Product", "category_id");
        let category_nav = nav(&manager, "Product", "category");
        let products_nav = nav(&manager, "Category", "products");

        manager
            .set_reference(product, category_nav, Some(category))
            .unwrap();

        assert_eq!(
            manager.get_value(product, category_id).unwrap(),
            Value::Integer(1)
        );
        assert_eq!(manager.collection(category, products_nav).unwrap(), &[product]);
    }

    #[test]
    fn clearing_reference_nulls_foreign_key() {
        let mut manager = StateManager::new(catalog_model());
        let category = tracked(&mut manager, "Category", 1);
        let product = tracked(&mut manager, "Product", 10);
        let category_id = field(&manager, "Product", "category_id");
        let category_nav = nav(&manager, "Product", "category");
        let products_nav = nav(&manager, "Category", "products");

        manager
            .set_reference(product, category_nav, Some(category))
            .unwrap();
        manager.set_reference(product, category_nav, None).unwrap();

        assert_eq!(manager.get_value(product, category_id).unwrap(), Value::Null);
        assert!(manager.collection(category, products_nav).unwrap().is_empty());
    }

    #[test]
    fn foreign_key_write_moves_between_principals() {
        let mut manager = StateManager::new(catalog_model());
        let first = tracked(&mut manager, "Category", 1);
        let second = tracked(&mut manager, "Category", 2);
        let product = tracked(&mut manager, "Product", 10);
        let category_id = field(&manager, "Product", "category_id");
        let category_nav = nav(&manager, "Product", "category");
        let products_nav = nav(&manager, "Category", "products");

        manager.set_value(product, category_id, Value::Integer(1)).unwrap();
        assert_eq!(manager.collection(first, products_nav).unwrap(), &[product]);
        assert_eq!(manager.reference(product, category_nav).unwrap(), Some(first));

        manager.set_value(product, category_id, Value::Integer(2)).unwrap();
        assert!(manager.collection(first, products_nav).unwrap().is_empty());
        assert_eq!(manager.collection(second, products_nav).unwrap(), &[product]);
        assert_eq!(manager.reference(product, category_nav).unwrap(), Some(second));
    }

    #[test]
    fn collection_add_and_remove_fix_up_the_member() {
        let mut manager = StateManager::new(catalog_model());
        let category = tracked(&mut manager, "Category", 1);
        let product = tracked(&mut manager, "Product", 10);
        let category_id = field(&manager, "Product", "category_id");
        let category_nav = nav(&manager, "Product", "category");
        let products_nav = nav(&manager, "Category", "products");

        manager.add_to_collection(category, products_nav, product).unwrap();
        assert_eq!(
            manager.get_value(product, category_id).unwrap(),
            Value::Integer(1)
        );
        assert_eq!(manager.reference(product, category_nav).unwrap(), Some(category));

        // Adding again is a no-op.
        manager.add_to_collection(category, products_nav, product).unwrap();
        assert_eq!(manager.collection(category, products_nav).unwrap().len(), 1);

        manager
            .remove_from_collection(category, products_nav, product)
            .unwrap();
        assert_eq!(manager.get_value(product, category_id).unwrap(), Value::Null);
        assert_eq!(manager.reference(product, category_nav).unwrap(), None);

        // Removing an absent member is a no-op.
        manager
            .remove_from_collection(category, products_nav, product)
            .unwrap();
    }

    #[test]
    fn initial_fixup_wires_graphs_loaded_in_any_order() {
        let mut manager = StateManager::new(catalog_model());
        let product = detached(&mut manager, "Product");
        let id_field = field(&manager, "Product", "id");
        let category_id = field(&manager, "Product", "category_id");
        manager.set_value(product, id_field, Value::Integer(10)).unwrap();
        manager.set_value(product, category_id, Value::Integer(1)).unwrap();
        manager.set_entity_state(product, EntityState::Unchanged).unwrap();

        // The principal arrives after its dependent.
        let category = tracked(&mut manager, "Category", 1);

        let category_nav = nav(&manager, "Product", "category");
        let products_nav = nav(&manager, "Category", "products");
        assert_eq!(manager.reference(product, category_nav).unwrap(), Some(category));
        assert_eq!(manager.collection(category, products_nav).unwrap(), &[product]);
    }

    #[test]
    fn one_to_one_steal_releases_previous_dependent() {
        let mut manager = StateManager::new(one_to_one_model(true));
        let user = tracked(&mut manager, "User", 1);
        let first = tracked(&mut manager, "Profile", 10);
        let second = tracked(&mut manager, "Profile", 11);
        let user_id = field(&manager, "Profile", "user_id");
        let user_nav = nav(&manager, "Profile", "user");
        let profile_nav = nav(&manager, "User", "profile");

        manager.set_value(first, user_id, Value::Integer(1)).unwrap();
        assert_eq!(manager.reference(user, profile_nav).unwrap(), Some(first));

        manager.set_value(second, user_id, Value::Integer(1)).unwrap();

        assert_eq!(manager.get_value(first, user_id).unwrap(), Value::Null);
        assert_eq!(manager.reference(first, user_nav).unwrap(), None);
        assert_eq!(manager.reference(user, profile_nav).unwrap(), Some(second));
        assert_eq!(manager.reference(second, user_nav).unwrap(), Some(user));
    }

    #[test]
    fn steal_with_non_nullable_key_marks_conceptual_null() {
        let mut manager = StateManager::new(one_to_one_model(false));
        let user = tracked(&mut manager, "User", 1);
        let first = detached(&mut manager, "Profile");
        let id_field = field(&manager, "Profile", "id");
        let user_id = field(&manager, "Profile", "user_id");
        manager.set_value(first, id_field, Value::Integer(10)).unwrap();
        manager.set_value(first, user_id, Value::Integer(1)).unwrap();
        manager.set_entity_state(first, EntityState::Unchanged).unwrap();

        let second = detached(&mut manager, "Profile");
        manager.set_value(second, id_field, Value::Integer(11)).unwrap();
        manager.set_value(second, user_id, Value::Integer(1)).unwrap();

        // The foreign key could not be nulled: the value stays, flagged.
        assert_eq!(manager.get_value(first, user_id).unwrap(), Value::Integer(1));
        assert!(manager.has_conceptual_null(first, user_id).unwrap());

        let profile_nav = nav(&manager, "User", "profile");
        assert_eq!(manager.reference(user, profile_nav).unwrap(), Some(second));

        // A later write resolves the marker.
        manager.set_value(first, user_id, Value::Integer(2)).unwrap();
        assert!(!manager.has_conceptual_null(first, user_id).unwrap());
    }

    #[test]
    fn principal_side_reference_reassignment_releases_old_dependent() {
        let mut manager = StateManager::new(one_to_one_model(true));
        let user = tracked(&mut manager, "User", 1);
        let first = tracked(&mut manager, "Profile", 10);
        let second = tracked(&mut manager, "Profile", 11);
        let user_id = field(&manager, "Profile", "user_id");
        let profile_nav = nav(&manager, "User", "profile");
        let user_nav = nav(&manager, "Profile", "user");

        manager.set_reference(user, profile_nav, Some(first)).unwrap();
        assert_eq!(manager.get_value(first, user_id).unwrap(), Value::Integer(1));

        manager.set_reference(user, profile_nav, Some(second)).unwrap();

        assert_eq!(manager.get_value(first, user_id).unwrap(), Value::Null);
        assert_eq!(manager.reference(first, user_nav).unwrap(), None);
        assert_eq!(manager.get_value(second, user_id).unwrap(), Value::Integer(1));
        assert_eq!(manager.reference(second, user_nav).unwrap(), Some(user));
    }

    #[test]
    fn detaching_an_entry_scrubs_navigation_handles() {
        let mut manager = StateManager::new(catalog_model());
        let category = tracked(&mut manager, "Category", 1);
        let product = tracked(&mut manager, "Product", 10);
        let category_id = field(&manager, "Product", "category_id");
        let products_nav = nav(&manager, "Category", "products");

        manager.set_value(product, category_id, Value::Integer(1)).unwrap();
        assert_eq!(manager.collection(category, products_nav).unwrap(), &[product]);

        manager.set_entity_state(product, EntityState::Detached).unwrap();
        assert!(manager.collection(category, products_nav).unwrap().is_empty());
    }
}
