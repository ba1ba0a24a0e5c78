// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Handle collision checks against storage and within one batch.

use std::collections::{BTreeMap, BTreeSet};

use super::{BatchView, Disposition, ItemMut, PreprocessingError, PreprocessingSegment, SegmentName};
use crate::batch::DescriptionChange;
use crate::ident::Handle;
use crate::model::State;
use crate::storage::MdibStorage;

/// Rejects handle collisions.
///
/// - An inserted descriptor handle must not be in use (as a descriptor or a
///   context state) in storage.
/// - A descriptor handle may appear under only one change type per batch.
/// - A context state handle owned by descriptor A in storage may not be
///   written under descriptor B, and may not shadow a descriptor handle.
/// - A state handle may appear only once per batch.
#[derive(Debug, Default)]
pub struct DuplicateChecker {
    descriptors: BTreeSet<Handle>,
    states: BTreeMap<Handle, Handle>,
}

impl DuplicateChecker {
    /// Creates the segment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn reject(handle: &Handle, reason: impl Into<String>) -> PreprocessingError {
        PreprocessingError::new(SegmentName::DuplicateChecker, handle.clone(), reason)
    }

    fn check_change(
        &mut self,
        change: &DescriptionChange,
        storage: &MdibStorage,
    ) -> Result<(), PreprocessingError> {
        let handle = change.handle();
        if !self.descriptors.insert(handle.clone()) {
            return Err(Self::reject(
                handle,
                "descriptor handle appears under more than one change type",
            ));
        }
        if self.states.contains_key(handle) {
            return Err(Self::reject(
                handle,
                "descriptor handle is also used as a context state handle in this batch",
            ));
        }
        if let DescriptionChange::Insert { .. } = change {
            if storage.contains_handle(handle.as_str()) {
                return Err(Self::reject(handle, "handle already exists in storage"));
            }
        }
        let multi_state = change
            .descriptor()
            .is_some_and(|descriptor| descriptor.kind.is_multi_state());
        if multi_state {
            for state in change.states() {
                self.check_context_state(state, storage)?;
            }
        }
        Ok(())
    }

    fn check_context_state(
        &mut self,
        state: &State,
        storage: &MdibStorage,
    ) -> Result<(), PreprocessingError> {
        if storage.entity(state.handle.as_str()).is_some()
            || self.descriptors.contains(&state.handle)
        {
            return Err(Self::reject(
                &state.handle,
                "context state handle collides with a descriptor handle",
            ));
        }
        if let Some(owner) = storage.context_owner(state.handle.as_str()) {
            if *owner != state.descriptor_handle {
                return Err(Self::reject(
                    &state.handle,
                    format!(
                        "context state is owned by {owner}, not {}",
                        state.descriptor_handle
                    ),
                ));
            }
        }
        self.check_unique_state(state)
    }

    fn check_unique_state(&mut self, state: &State) -> Result<(), PreprocessingError> {
        if self
            .states
            .insert(state.handle.clone(), state.descriptor_handle.clone())
            .is_some()
        {
            return Err(Self::reject(
                &state.handle,
                "state handle appears more than once in the batch",
            ));
        }
        Ok(())
    }
}

impl PreprocessingSegment for DuplicateChecker {
    fn name(&self) -> SegmentName {
        SegmentName::DuplicateChecker
    }

    fn before_batch(
        &mut self,
        _batch: BatchView<'_>,
        _storage: &MdibStorage,
    ) -> Result<(), PreprocessingError> {
        self.descriptors.clear();
        self.states.clear();
        Ok(())
    }

    fn process_item(
        &mut self,
        item: ItemMut<'_>,
        storage: &MdibStorage,
    ) -> Result<Disposition, PreprocessingError> {
        match item {
            ItemMut::Description(change) => self.check_change(change, storage)?,
            ItemMut::State(state) => {
                if state.kind.is_context() {
                    self.check_context_state(state, storage)?;
                } else {
                    self.check_unique_state(state)?;
                }
            }
        }
        Ok(Disposition::Keep)
    }

    fn after_batch(&mut self, _storage: &MdibStorage) -> Result<(), PreprocessingError> {
        self.descriptors.clear();
        self.states.clear();
        Ok(())
    }
}
