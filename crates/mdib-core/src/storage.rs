// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Versioned in-memory storage of the entity tree.
use std::collections::{BTreeMap, BTreeSet};

use crate::batch::{DescriptionBatch, DescriptionChange, StateBatch};
use crate::commit::{DescriptionCommit, StateCommit};
use crate::ident::Handle;
use crate::ledger::{LedgerEntry, VersionLedger};
use crate::model::{Descriptor, DescriptorKind, Entity, State, StateKind};
use crate::preprocessing::{PreprocessingError, SegmentName};
use crate::version::MdibVersion;

/// Committed MDIB: entity tree, version ledger and document counters.
///
/// Queries are available to anyone holding a shared reference (read
/// transactions and observers). Mutation is reserved to [`crate::LocalMdib`],
/// which runs the preprocessing chain first.
///
/// Both apply operations are all-or-nothing. Description batches record the
/// prior value of each entry they touch and roll back on failure; state
/// batches are validated completely before the first state is written.
#[derive(Debug, Clone)]
pub struct MdibStorage {
    entities: BTreeMap<Handle, Entity>,
    roots: Vec<Handle>,
    /// Context state handle -> owning descriptor handle.
    context_owners: BTreeMap<Handle, Handle>,
    ledger: VersionLedger,
    mdib_version: MdibVersion,
    description_version: u64,
    state_version: u64,
}

impl MdibStorage {
    /// Creates an empty storage starting at `mdib_version`.
    #[must_use]
    pub fn new(mdib_version: MdibVersion) -> Self {
        Self {
            entities: BTreeMap::new(),
            roots: Vec::new(),
            context_owners: BTreeMap::new(),
            ledger: VersionLedger::new(),
            mdib_version,
            description_version: 0,
            state_version: 0,
        }
    }

    /// Current document version.
    #[must_use]
    pub fn mdib_version(&self) -> &MdibVersion {
        &self.mdib_version
    }

    /// Number of committed description changes.
    #[must_use]
    pub fn description_version(&self) -> u64 {
        self.description_version
    }

    /// Number of committed writes of any kind.
    #[must_use]
    pub fn state_version(&self) -> u64 {
        self.state_version
    }

    /// Per-handle version ledger.
    #[must_use]
    pub fn ledger(&self) -> &VersionLedger {
        &self.ledger
    }

    /// Returns the entity with descriptor handle `handle`.
    pub fn entity(&self, handle: &str) -> Option<&Entity> {
        self.entities.get(handle)
    }

    /// Returns the descriptor with handle `handle`.
    pub fn descriptor(&self, handle: &str) -> Option<&Descriptor> {
        self.entities.get(handle).map(Entity::descriptor)
    }

    /// Returns the state with handle `handle`: the single state of the entity
    /// sharing that handle, or a context state instance.
    pub fn state(&self, handle: &str) -> Option<&State> {
        if let Some(entity) = self.entities.get(handle) {
            return entity.single_state();
        }
        let owner = self.context_owners.get(handle)?;
        self.entities
            .get(owner)?
            .states
            .iter()
            .find(|state| state.handle.as_str() == handle)
    }

    /// Descriptor handle owning the context state `handle`.
    pub fn context_owner(&self, handle: &str) -> Option<&Handle> {
        self.context_owners.get(handle)
    }

    /// Returns `true` if `handle` names a descriptor or a context state.
    pub fn contains_handle(&self, handle: &str) -> bool {
        self.entities.contains_key(handle) || self.context_owners.contains_key(handle)
    }

    /// All entities in handle order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if no entity is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Root entities in insertion order.
    pub fn root_entities(&self) -> Vec<&Entity> {
        self.resolve(&self.roots)
    }

    /// Direct children of `handle` in insertion order.
    pub fn children(&self, handle: &str) -> Vec<&Entity> {
        self.entities
            .get(handle)
            .map(|entity| self.resolve(&entity.children))
            .unwrap_or_default()
    }

    /// Direct children of `handle` whose descriptor is of `kind`.
    pub fn children_by_kind(&self, handle: &str, kind: DescriptorKind) -> Vec<&Entity> {
        let mut children = self.children(handle);
        children.retain(|child| child.kind() == kind);
        children
    }

    /// Descendants of `handle` (depth-first, pre-order, excluding `handle`)
    /// whose descriptor is of `kind`.
    pub fn subtree_by_kind(&self, handle: &str, kind: DescriptorKind) -> Vec<&Entity> {
        let Some(start) = self.entities.get(handle) else {
            return Vec::new();
        };
        let mut found = Vec::new();
        let mut stack: Vec<&Handle> = start.children.iter().rev().collect();
        while let Some(next) = stack.pop() {
            let Some(entity) = self.entities.get(next) else {
                continue;
            };
            if entity.kind() == kind {
                found.push(entity);
            }
            stack.extend(entity.children.iter().rev());
        }
        found
    }

    /// Every entity whose descriptor is of `kind`, in handle order.
    pub fn find_entities_by_kind(&self, kind: DescriptorKind) -> Vec<&Entity> {
        self.entities
            .values()
            .filter(|entity| entity.kind() == kind)
            .collect()
    }

    /// Context states of `descriptor_handle` whose kind is `kind`.
    ///
    /// Empty if the descriptor is missing or not a context descriptor.
    pub fn context_states(&self, descriptor_handle: &str, kind: StateKind) -> Vec<&State> {
        self.entities
            .get(descriptor_handle)
            .filter(|entity| entity.is_context())
            .map(|entity| {
                entity
                    .states
                    .iter()
                    .filter(|state| state.kind == kind)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every context state of `kind` across all context descriptors.
    pub fn all_context_states(&self, kind: StateKind) -> Vec<&State> {
        self.entities
            .values()
            .filter(|entity| entity.is_context())
            .flat_map(|entity| entity.states.iter())
            .filter(|state| state.kind == kind)
            .collect()
    }

    fn resolve<'a>(&'a self, handles: &[Handle]) -> Vec<&'a Entity> {
        handles
            .iter()
            .filter_map(|handle| self.entities.get(handle))
            .collect()
    }
}

fn storage_error(handle: &Handle, reason: impl Into<String>) -> PreprocessingError {
    PreprocessingError::new(SegmentName::Storage, handle.clone(), reason)
}

impl MdibStorage {
    /// Applies a preprocessed description batch.
    ///
    /// Inserts attach under their parent (which must already be stored or be
    /// inserted earlier in the batch), updates replace in place and bump the
    /// descriptor and every state of the entity, deletes remove the entity
    /// and all descendants without resetting the ledger. The description,
    /// state and document counters each advance by exactly one.
    ///
    /// Every entry is recorded in an [`UndoLog`] before its first mutation;
    /// on failure the log is replayed and storage is left as it was.
    pub(crate) fn apply_description(
        &mut self,
        batch: DescriptionBatch,
    ) -> Result<DescriptionCommit, PreprocessingError> {
        let mut undo = UndoLog::default();
        let applied = match self.apply_changes(batch, &mut undo) {
            Ok(applied) => applied,
            Err(err) => {
                self.rollback(undo);
                return Err(err);
            }
        };

        self.description_version += 1;
        self.state_version += 1;
        self.mdib_version.bump();

        Ok(DescriptionCommit {
            inserted: self.snapshots(&applied.inserted),
            updated: self.snapshots(&applied.updated),
            deleted: applied.deleted,
            mdib_version: self.mdib_version.clone(),
            description_version: self.description_version,
            state_version: self.state_version,
        })
    }

    fn apply_changes(
        &mut self,
        batch: DescriptionBatch,
        undo: &mut UndoLog,
    ) -> Result<AppliedChanges, PreprocessingError> {
        let mut applied = AppliedChanges::default();
        let mut removed: BTreeSet<Handle> = BTreeSet::new();
        for change in batch.into_changes() {
            match change {
                DescriptionChange::Insert { descriptor, states } => {
                    let handle = descriptor.handle.clone();
                    self.insert_entity(descriptor, states, undo)?;
                    applied.inserted.push(handle);
                }
                DescriptionChange::Update { descriptor, states } => {
                    let handle = descriptor.handle.clone();
                    self.update_entity(descriptor, states, undo)?;
                    applied.updated.push(handle);
                }
                DescriptionChange::Delete { handle } => {
                    if removed.contains(&handle) {
                        continue;
                    }
                    for entity in self.delete_entity(&handle, undo)? {
                        removed.insert(entity.handle().clone());
                        applied.deleted.push(entity);
                    }
                }
            }
        }
        Ok(applied)
    }

    fn rollback(&mut self, undo: UndoLog) {
        for (handle, entity) in undo.entities {
            if let Some(entity) = entity {
                self.entities.insert(handle, entity);
            } else {
                self.entities.remove(&handle);
            }
        }
        for (handle, owner) in undo.context_owners {
            if let Some(owner) = owner {
                self.context_owners.insert(handle, owner);
            } else {
                self.context_owners.remove(&handle);
            }
        }
        for (handle, entry) in undo.ledger {
            self.ledger.restore(handle, entry);
        }
        if let Some(roots) = undo.roots {
            self.roots = roots;
        }
    }

    /// Applies a preprocessed state batch.
    ///
    /// Every state must name a stored descriptor of matching shape; context
    /// states with an unknown handle become new instances. Only the state and
    /// document counters advance.
    pub(crate) fn apply_states(
        &mut self,
        batch: StateBatch,
    ) -> Result<StateCommit, PreprocessingError> {
        let category = batch.category();
        let states = batch.into_states();
        for state in &states {
            self.check_state_target(state)?;
        }

        let mut written: BTreeMap<Handle, Vec<State>> = BTreeMap::new();
        for mut state in states {
            let Some(entity) = self.entities.get_mut(&state.descriptor_handle) else {
                debug_assert!(false, "validated state lost its descriptor: {}", state.handle);
                continue;
            };
            state.descriptor_version = entity.descriptor.descriptor_version;
            state.state_version = Some(
                self.ledger
                    .assign_state_version(&state.handle, state.state_version),
            );
            if state.kind.is_context() {
                self.context_owners
                    .insert(state.handle.clone(), state.descriptor_handle.clone());
                upsert_state(&mut entity.states, state.clone());
            } else {
                entity.states = vec![state.clone()];
            }
            written
                .entry(state.descriptor_handle.clone())
                .or_default()
                .push(state);
        }

        self.state_version += 1;
        self.mdib_version.bump();
        Ok(StateCommit {
            category,
            states: written,
            mdib_version: self.mdib_version.clone(),
            state_version: self.state_version,
        })
    }

    fn check_state_target(&self, state: &State) -> Result<(), PreprocessingError> {
        let Some(entity) = self.entities.get(&state.descriptor_handle) else {
            return Err(storage_error(
                &state.handle,
                format!("unknown descriptor {}", state.descriptor_handle),
            ));
        };
        if entity.is_context() != state.kind.is_context() {
            return Err(storage_error(
                &state.handle,
                "state shape does not match its descriptor",
            ));
        }
        if state.kind.is_context() {
            self.check_context_handle(&state.handle, &state.descriptor_handle)?;
        }
        Ok(())
    }

    fn check_context_handle(
        &self,
        handle: &Handle,
        owner: &Handle,
    ) -> Result<(), PreprocessingError> {
        if self.entities.contains_key(handle) {
            return Err(storage_error(
                handle,
                "context state handle collides with a descriptor handle",
            ));
        }
        match self.context_owners.get(handle) {
            Some(existing) if existing != owner => Err(storage_error(
                handle,
                format!("context state is owned by {existing}"),
            )),
            _ => Ok(()),
        }
    }

    fn insert_entity(
        &mut self,
        mut descriptor: Descriptor,
        mut states: Vec<State>,
        undo: &mut UndoLog,
    ) -> Result<(), PreprocessingError> {
        let handle = descriptor.handle.clone();
        if self.contains_handle(handle.as_str()) {
            return Err(storage_error(&handle, "handle already exists"));
        }
        if let Some(parent) = &descriptor.parent {
            if !self.entities.contains_key(parent) {
                return Err(storage_error(&handle, format!("unresolved parent {parent}")));
            }
        }
        let multi_state = descriptor.kind.is_multi_state();
        if !multi_state && states.len() != 1 {
            return Err(storage_error(
                &handle,
                "single-state entity requires exactly one state",
            ));
        }

        undo.ledger(&self.ledger, &handle);
        let descriptor_version = self.ledger.assign_descriptor_version(&handle);
        descriptor.descriptor_version = descriptor_version;
        for state in &mut states {
            if multi_state {
                self.check_context_handle(&state.handle, &handle)?;
                undo.context_owner(&self.context_owners, &state.handle);
                self.context_owners
                    .insert(state.handle.clone(), handle.clone());
            }
            undo.ledger(&self.ledger, &state.handle);
            state.descriptor_version = descriptor_version;
            state.state_version = Some(
                self.ledger
                    .assign_state_version(&state.handle, state.state_version),
            );
        }

        if let Some(parent) = &descriptor.parent {
            undo.entity(&self.entities, parent);
            if let Some(parent) = self.entities.get_mut(parent) {
                parent.children.push(handle.clone());
            }
        } else {
            undo.roots(&self.roots);
            self.roots.push(handle.clone());
        }
        undo.entity(&self.entities, &handle);
        self.entities.insert(handle, Entity::new(descriptor, states));
        Ok(())
    }

    fn update_entity(
        &mut self,
        mut descriptor: Descriptor,
        incoming: Vec<State>,
        undo: &mut UndoLog,
    ) -> Result<(), PreprocessingError> {
        let handle = descriptor.handle.clone();
        let Some(stored) = self.entities.get(&handle) else {
            return Err(storage_error(&handle, "cannot update an unknown entity"));
        };
        if stored.descriptor.parent != descriptor.parent {
            return Err(storage_error(&handle, "re-parenting is not supported"));
        }
        if stored.kind() != descriptor.kind {
            return Err(storage_error(&handle, "descriptor kind cannot change"));
        }
        let multi_state = descriptor.kind.is_multi_state();
        if multi_state {
            for state in &incoming {
                self.check_context_handle(&state.handle, &handle)?;
            }
        }

        undo.ledger(&self.ledger, &handle);
        let descriptor_version = self.ledger.assign_descriptor_version(&handle);
        descriptor.descriptor_version = descriptor_version;

        undo.entity(&self.entities, &handle);
        let Some(entity) = self.entities.get_mut(&handle) else {
            return Err(storage_error(&handle, "cannot update an unknown entity"));
        };
        let mut merged: Vec<State> = entity
            .states
            .iter()
            .cloned()
            .map(|mut state| {
                state.state_version = None;
                state
            })
            .collect();
        for state in incoming {
            if multi_state {
                undo.context_owner(&self.context_owners, &state.handle);
                self.context_owners
                    .insert(state.handle.clone(), handle.clone());
                upsert_state(&mut merged, state);
            } else {
                merged = vec![state];
            }
        }
        for state in &mut merged {
            undo.ledger(&self.ledger, &state.handle);
            state.descriptor_version = descriptor_version;
            state.state_version = Some(
                self.ledger
                    .assign_state_version(&state.handle, state.state_version),
            );
        }
        entity.descriptor = descriptor;
        entity.states = merged;
        Ok(())
    }

    fn delete_entity(
        &mut self,
        handle: &Handle,
        undo: &mut UndoLog,
    ) -> Result<Vec<Entity>, PreprocessingError> {
        let Some(entity) = self.entities.get(handle) else {
            return Err(storage_error(handle, "cannot delete an unknown entity"));
        };
        if let Some(parent) = entity.descriptor.parent.clone() {
            undo.entity(&self.entities, &parent);
            if let Some(parent) = self.entities.get_mut(&parent) {
                parent.children.retain(|child| child != handle);
            }
        } else {
            undo.roots(&self.roots);
            self.roots.retain(|root| root != handle);
        }

        let mut removed = Vec::new();
        let mut stack = vec![handle.clone()];
        while let Some(next) = stack.pop() {
            undo.entity(&self.entities, &next);
            let Some(entity) = self.entities.remove(&next) else {
                continue;
            };
            if entity.is_context() {
                for state in &entity.states {
                    undo.context_owner(&self.context_owners, &state.handle);
                    self.context_owners.remove(&state.handle);
                }
            }
            stack.extend(entity.children.iter().rev().cloned());
            removed.push(entity);
        }
        Ok(removed)
    }

    fn snapshots(&self, handles: &[Handle]) -> Vec<Entity> {
        handles
            .iter()
            .filter_map(|handle| self.entities.get(handle).cloned())
            .collect()
    }
}

/// Handles touched by one description batch, in batch order.
#[derive(Debug, Default)]
struct AppliedChanges {
    inserted: Vec<Handle>,
    updated: Vec<Handle>,
    deleted: Vec<Entity>,
}

/// Pre-batch values of every entry a description batch touched.
///
/// Only the first touch of an entry is recorded, so replaying the log
/// restores the storage as it was before the batch.
#[derive(Debug, Default)]
struct UndoLog {
    entities: BTreeMap<Handle, Option<Entity>>,
    context_owners: BTreeMap<Handle, Option<Handle>>,
    ledger: BTreeMap<Handle, Option<LedgerEntry>>,
    roots: Option<Vec<Handle>>,
}

impl UndoLog {
    fn entity(&mut self, entities: &BTreeMap<Handle, Entity>, handle: &Handle) {
        if !self.entities.contains_key(handle) {
            self.entities
                .insert(handle.clone(), entities.get(handle).cloned());
        }
    }

    fn context_owner(&mut self, owners: &BTreeMap<Handle, Handle>, handle: &Handle) {
        if !self.context_owners.contains_key(handle) {
            self.context_owners
                .insert(handle.clone(), owners.get(handle).cloned());
        }
    }

    fn ledger(&mut self, ledger: &VersionLedger, handle: &Handle) {
        if !self.ledger.contains_key(handle) {
            self.ledger
                .insert(handle.clone(), ledger.entry(handle.as_str()).copied());
        }
    }

    fn roots(&mut self, roots: &[Handle]) {
        if self.roots.is_none() {
            self.roots = Some(roots.to_vec());
        }
    }
}

fn upsert_state(states: &mut Vec<State>, state: State) {
    match states.iter_mut().find(|existing| existing.handle == state.handle) {
        Some(existing) => *existing = state,
        None => states.push(state),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{StateCategory, StateKind};

    fn storage() -> MdibStorage {
        MdibStorage::new(MdibVersion::new("urn:uuid:test", 0))
    }

    fn single(handle: &str, kind: DescriptorKind, state: StateKind) -> (Descriptor, Vec<State>) {
        (Descriptor::new(handle, kind), vec![State::new(handle, state)])
    }

    fn tree() -> DescriptionBatch {
        let mut batch = DescriptionBatch::new();
        let (mds, mds_state) = single("mds", DescriptorKind::Mds, StateKind::Mds);
        let (vmd, vmd_state) = single("vmd", DescriptorKind::Vmd, StateKind::Vmd);
        let (ch, ch_state) = single("ch", DescriptorKind::Channel, StateKind::Channel);
        let inserted = batch
            .insert(mds, mds_state)
            .and_then(|b| b.insert(vmd.with_parent("mds"), vmd_state))
            .and_then(|b| b.insert(ch.with_parent("vmd"), ch_state));
        assert!(inserted.is_ok(), "{inserted:?}");
        batch
    }

    #[test]
    fn insert_links_parents_and_children() {
        let mut storage = storage();
        let commit = storage.apply_description(tree());
        assert!(commit.is_ok(), "{commit:?}");
        assert_eq!(storage.root_entities().len(), 1);
        let children: Vec<_> = storage
            .children("mds")
            .iter()
            .map(|e| e.handle().clone())
            .collect();
        assert_eq!(children, vec![Handle::from("vmd")]);
        assert_eq!(storage.subtree_by_kind("mds", DescriptorKind::Channel).len(), 1);
    }

    #[test]
    fn unresolved_parent_leaves_storage_untouched() {
        let mut storage = storage();
        let mut batch = DescriptionBatch::new();
        let (mds, state) = single("mds", DescriptorKind::Mds, StateKind::Mds);
        let (vmd, vmd_state) = single("vmd", DescriptorKind::Vmd, StateKind::Vmd);
        assert!(batch.insert(mds, state).is_ok());
        assert!(batch.insert(vmd.with_parent("missing"), vmd_state).is_ok());
        let result = storage.apply_description(batch);
        assert!(matches!(
            result,
            Err(PreprocessingError {
                segment: SegmentName::Storage,
                ..
            })
        ));
        assert!(storage.is_empty());
        assert_eq!(storage.mdib_version().version(), 0);
        assert!(storage.ledger().is_empty());
    }

    #[test]
    fn failed_batch_rolls_back_every_touched_entry() {
        let mut storage = storage();
        assert!(storage.apply_description(tree()).is_ok());
        let entities: Vec<Entity> = storage.entities().cloned().collect();
        let ledger = storage.ledger().clone();

        let mut batch = DescriptionBatch::new();
        let (vmd, vmd_state) = single("vmd", DescriptorKind::Vmd, StateKind::Vmd);
        let (root, root_state) = single("mds1", DescriptorKind::Mds, StateKind::Mds);
        let (orphan, orphan_state) = single("ch9", DescriptorKind::Channel, StateKind::Channel);
        let queued = batch
            .update(vmd.with_parent("mds"), vmd_state)
            .and_then(|b| b.delete("ch"))
            .and_then(|b| b.insert(root, root_state))
            .and_then(|b| {
                b.insert(
                    Descriptor::new("pc", DescriptorKind::PatientContext).with_parent("mds"),
                    vec![State::context("p0", "pc", StateKind::PatientContext)],
                )
            })
            .and_then(|b| b.insert(orphan.with_parent("missing"), orphan_state));
        assert!(queued.is_ok(), "{queued:?}");

        assert!(storage.apply_description(batch).is_err());
        assert_eq!(storage.entities().cloned().collect::<Vec<_>>(), entities);
        let roots: Vec<_> = storage
            .root_entities()
            .iter()
            .map(|e| e.handle().clone())
            .collect();
        assert_eq!(roots, vec![Handle::from("mds")]);
        assert!(storage.context_owner("p0").is_none());
        for handle in ["mds", "vmd", "ch", "mds1", "pc", "p0", "ch9"] {
            assert_eq!(storage.ledger().entry(handle), ledger.entry(handle), "{handle}");
        }
        assert_eq!(storage.ledger().len(), ledger.len());
        assert_eq!(storage.description_version(), 1);
        assert_eq!(storage.mdib_version().version(), 1);
    }

    #[test]
    fn delete_cascades_to_descendants() {
        let mut storage = storage();
        assert!(storage.apply_description(tree()).is_ok());
        let mut batch = DescriptionBatch::new();
        assert!(batch.delete("vmd").is_ok());
        let commit = storage.apply_description(batch);
        let Ok(commit) = commit else {
            unreachable!("delete failed: {commit:?}");
        };
        let deleted: Vec<_> = commit.deleted_handles().cloned().collect();
        assert_eq!(deleted, vec![Handle::from("vmd"), Handle::from("ch")]);
        assert!(storage.children("mds").is_empty());
        assert_eq!(storage.ledger().descriptor_version("ch"), Some(0));
    }

    #[test]
    fn state_writes_to_unknown_descriptors_fail_without_mutation() {
        let mut storage = storage();
        assert!(storage.apply_description(tree()).is_ok());
        let mut batch = StateBatch::new(StateCategory::Component);
        assert!(batch.add(State::new("vmd", StateKind::Vmd)).is_ok());
        assert!(batch.add(State::new("ghost", StateKind::Channel)).is_ok());
        let before = storage.state("vmd").cloned();
        assert!(storage.apply_states(batch).is_err());
        assert_eq!(storage.state("vmd").cloned(), before);
        assert_eq!(storage.state_version(), 1);
    }
}
