// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Change batch builders.
//!
//! A batch collects pending edits before they are handed to
//! [`crate::LocalMdib`]. Builders reject caller misuse immediately: adding the
//! same handle twice under the same change type, malformed single-state
//! shapes, or mixing state categories. Conflicts with the *stored* document
//! are detected later by the preprocessing chain.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::ident::Handle;
use crate::model::{Descriptor, State, StateCategory};

/// Kind of edit carried by a description change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeType {
    /// Attach a new entity.
    Insert,
    /// Replace an existing entity in place.
    Update,
    /// Remove an entity and its descendants.
    Delete,
}

impl core::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Programming-contract violations raised while building a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// The handle was already added under the same change type.
    #[error("handle {handle} added twice as {change} in one batch")]
    DuplicateHandle {
        /// Offending handle.
        handle: Handle,
        /// Change type under which it was added twice.
        change: ChangeType,
    },
    /// A state names a different descriptor than the one it is attached to.
    #[error("state {state} belongs to descriptor {actual}, expected {expected}")]
    ForeignState {
        /// State handle.
        state: Handle,
        /// Descriptor the state was attached to.
        expected: Handle,
        /// Descriptor the state names.
        actual: Handle,
    },
    /// Single-state descriptors need exactly one state sharing their handle.
    #[error("single-state descriptor {handle} requires one state with the same handle")]
    SingleStateShape {
        /// Descriptor handle.
        handle: Handle,
    },
    /// A context state reused its descriptor's handle.
    #[error("context state handle {handle} must differ from its descriptor handle")]
    ContextHandleCollision {
        /// Offending handle.
        handle: Handle,
    },
    /// A state of another category was added to a state batch.
    #[error("state {handle} is a {actual:?} state, batch carries {expected:?} states")]
    CategoryMismatch {
        /// State handle.
        handle: Handle,
        /// Category of the batch.
        expected: StateCategory,
        /// Category of the state.
        actual: StateCategory,
    },
}

/// One pending description edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptionChange {
    /// Insert a descriptor with its initial states.
    Insert {
        /// New descriptor; its parent must resolve at commit time.
        descriptor: Descriptor,
        /// Initial states.
        states: Vec<State>,
    },
    /// Replace a descriptor and, optionally, its states.
    Update {
        /// Replacement descriptor.
        descriptor: Descriptor,
        /// Replacement states; empty keeps the stored ones.
        states: Vec<State>,
    },
    /// Delete an entity and all its descendants.
    Delete {
        /// Handle of the entity to delete.
        handle: Handle,
    },
}

impl DescriptionChange {
    /// Descriptor handle this change targets.
    #[must_use]
    pub fn handle(&self) -> &Handle {
        match self {
            Self::Insert { descriptor, .. } | Self::Update { descriptor, .. } => {
                &descriptor.handle
            }
            Self::Delete { handle } => handle,
        }
    }

    /// Change type of this edit.
    #[must_use]
    pub fn change_type(&self) -> ChangeType {
        match self {
            Self::Insert { .. } => ChangeType::Insert,
            Self::Update { .. } => ChangeType::Update,
            Self::Delete { .. } => ChangeType::Delete,
        }
    }

    /// Descriptor carried by inserts and updates.
    #[must_use]
    pub fn descriptor(&self) -> Option<&Descriptor> {
        match self {
            Self::Insert { descriptor, .. } | Self::Update { descriptor, .. } => Some(descriptor),
            Self::Delete { .. } => None,
        }
    }

    /// States carried by inserts and updates (empty for deletes).
    #[must_use]
    pub fn states(&self) -> &[State] {
        match self {
            Self::Insert { states, .. } | Self::Update { states, .. } => states,
            Self::Delete { .. } => &[],
        }
    }

    pub(crate) fn states_mut(&mut self) -> Option<&mut Vec<State>> {
        match self {
            Self::Insert { states, .. } | Self::Update { states, .. } => Some(states),
            Self::Delete { .. } => None,
        }
    }
}

/// Fluent, duplicate-checked collection of description edits.
///
/// ```
/// # use mdib_core::{DescriptionBatch, Descriptor, DescriptorKind, State, StateKind};
/// # fn main() -> Result<(), mdib_core::BatchError> {
/// let mut batch = DescriptionBatch::new();
/// batch
///     .insert(
///         Descriptor::new("mds0", DescriptorKind::Mds),
///         vec![State::new("mds0", StateKind::Mds)],
///     )?
///     .insert(
///         Descriptor::new("vmd0", DescriptorKind::Vmd).with_parent("mds0"),
///         vec![State::new("vmd0", StateKind::Vmd)],
///     )?;
/// assert_eq!(batch.len(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptionBatch {
    changes: Vec<DescriptionChange>,
    inserted: BTreeSet<Handle>,
    updated: BTreeSet<Handle>,
    deleted: BTreeSet<Handle>,
}

impl DescriptionBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an insert.
    ///
    /// Single-state kinds need exactly one state sharing the descriptor
    /// handle; context kinds take zero or more instances with their own
    /// handles.
    ///
    /// # Errors
    /// [`BatchError::DuplicateHandle`] if `descriptor.handle` was already
    /// queued for insert, or a shape error described on [`BatchError`].
    pub fn insert(
        &mut self,
        descriptor: Descriptor,
        states: Vec<State>,
    ) -> Result<&mut Self, BatchError> {
        check_shape(&descriptor, &states, ChangeType::Insert)?;
        claim(&mut self.inserted, &descriptor.handle, ChangeType::Insert)?;
        self.changes
            .push(DescriptionChange::Insert { descriptor, states });
        Ok(self)
    }

    /// Queues an update. An empty `states` keeps the stored states and only
    /// bumps their versions.
    ///
    /// # Errors
    /// [`BatchError::DuplicateHandle`] if `descriptor.handle` was already
    /// queued for update, or a shape error described on [`BatchError`].
    pub fn update(
        &mut self,
        descriptor: Descriptor,
        states: Vec<State>,
    ) -> Result<&mut Self, BatchError> {
        check_shape(&descriptor, &states, ChangeType::Update)?;
        claim(&mut self.updated, &descriptor.handle, ChangeType::Update)?;
        self.changes
            .push(DescriptionChange::Update { descriptor, states });
        Ok(self)
    }

    /// Queues a delete of `handle` and its descendants.
    ///
    /// # Errors
    /// [`BatchError::DuplicateHandle`] if `handle` was already queued for delete.
    pub fn delete(&mut self, handle: impl Into<Handle>) -> Result<&mut Self, BatchError> {
        let handle = handle.into();
        claim(&mut self.deleted, &handle, ChangeType::Delete)?;
        self.changes.push(DescriptionChange::Delete { handle });
        Ok(self)
    }

    /// Queued changes in insertion order.
    #[must_use]
    pub fn changes(&self) -> &[DescriptionChange] {
        &self.changes
    }

    /// Handles queued for insert.
    #[must_use]
    pub fn inserted_handles(&self) -> &BTreeSet<Handle> {
        &self.inserted
    }

    /// Handles queued for update.
    #[must_use]
    pub fn updated_handles(&self) -> &BTreeSet<Handle> {
        &self.updated
    }

    /// Handles queued for delete.
    #[must_use]
    pub fn deleted_handles(&self) -> &BTreeSet<Handle> {
        &self.deleted
    }

    /// Number of queued changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub(crate) fn changes_mut(&mut self) -> &mut Vec<DescriptionChange> {
        &mut self.changes
    }

    pub(crate) fn into_changes(self) -> Vec<DescriptionChange> {
        self.changes
    }
}

/// Fluent collection of state-only writes of one [`StateCategory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateBatch {
    category: StateCategory,
    states: Vec<State>,
    handles: BTreeSet<Handle>,
}

impl StateBatch {
    /// Creates an empty batch for `category`.
    #[must_use]
    pub fn new(category: StateCategory) -> Self {
        Self {
            category,
            states: Vec::new(),
            handles: BTreeSet::new(),
        }
    }

    /// Queues one state.
    ///
    /// # Errors
    /// - [`BatchError::CategoryMismatch`] if the state is of another category.
    /// - [`BatchError::DuplicateHandle`] if the state handle is already queued.
    /// - [`BatchError::SingleStateShape`] / [`BatchError::ContextHandleCollision`]
    ///   if the state handle does not fit its kind.
    pub fn add(&mut self, state: State) -> Result<&mut Self, BatchError> {
        let actual = state.kind.category();
        if actual != self.category {
            return Err(BatchError::CategoryMismatch {
                handle: state.handle,
                expected: self.category,
                actual,
            });
        }
        if state.kind.is_context() {
            if state.handle == state.descriptor_handle {
                return Err(BatchError::ContextHandleCollision {
                    handle: state.handle,
                });
            }
        } else if state.handle != state.descriptor_handle {
            return Err(BatchError::SingleStateShape {
                handle: state.descriptor_handle,
            });
        }
        claim(&mut self.handles, &state.handle, ChangeType::Update)?;
        self.states.push(state);
        Ok(self)
    }

    /// Queues every state of `states`, stopping at the first error.
    ///
    /// # Errors
    /// See [`StateBatch::add`].
    pub fn add_all(
        &mut self,
        states: impl IntoIterator<Item = State>,
    ) -> Result<&mut Self, BatchError> {
        for state in states {
            self.add(state)?;
        }
        Ok(self)
    }

    /// Category of every state in this batch.
    #[must_use]
    pub fn category(&self) -> StateCategory {
        self.category
    }

    /// Queued states in insertion order.
    #[must_use]
    pub fn states(&self) -> &[State] {
        &self.states
    }

    /// Number of queued states.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub(crate) fn states_mut(&mut self) -> &mut Vec<State> {
        &mut self.states
    }

    pub(crate) fn into_states(self) -> Vec<State> {
        self.states
    }
}

fn claim(
    set: &mut BTreeSet<Handle>,
    handle: &Handle,
    change: ChangeType,
) -> Result<(), BatchError> {
    if set.insert(handle.clone()) {
        Ok(())
    } else {
        Err(BatchError::DuplicateHandle {
            handle: handle.clone(),
            change,
        })
    }
}

fn check_shape(
    descriptor: &Descriptor,
    states: &[State],
    change: ChangeType,
) -> Result<(), BatchError> {
    for state in states {
        if state.descriptor_handle != descriptor.handle {
            return Err(BatchError::ForeignState {
                state: state.handle.clone(),
                expected: descriptor.handle.clone(),
                actual: state.descriptor_handle.clone(),
            });
        }
    }
    if descriptor.kind.is_multi_state() {
        let mut seen = BTreeSet::new();
        for state in states {
            if state.handle == descriptor.handle {
                return Err(BatchError::ContextHandleCollision {
                    handle: state.handle.clone(),
                });
            }
            claim(&mut seen, &state.handle, change)?;
        }
        return Ok(());
    }
    let well_formed = match (change, states) {
        (ChangeType::Insert, [state]) => state.handle == descriptor.handle,
        (ChangeType::Update, []) => true,
        (ChangeType::Update, [state]) => state.handle == descriptor.handle,
        _ => false,
    };
    if well_formed {
        Ok(())
    } else {
        Err(BatchError::SingleStateShape {
            handle: descriptor.handle.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DescriptorKind, StateKind};

    fn mds(handle: &str) -> (Descriptor, Vec<State>) {
        (
            Descriptor::new(handle, DescriptorKind::Mds),
            vec![State::new(handle, StateKind::Mds)],
        )
    }

    #[test]
    fn duplicate_insert_fails_immediately() {
        let mut batch = DescriptionBatch::new();
        let (d, s) = mds("mds0");
        assert!(batch.insert(d.clone(), s.clone()).is_ok());
        let err = batch.insert(d, s);
        assert!(
            matches!(
                err,
                Err(BatchError::DuplicateHandle {
                    change: ChangeType::Insert,
                    ..
                })
            ),
            "expected duplicate insert, got {err:?}"
        );
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn same_handle_under_different_change_types_is_left_to_the_chain() {
        let mut batch = DescriptionBatch::new();
        let (d, s) = mds("mds0");
        assert!(batch.insert(d.clone(), s).is_ok());
        assert!(batch.update(d, Vec::new()).is_ok());
        assert!(batch.delete("mds0").is_ok());
        assert_eq!(batch.len(), 3);
        assert!(matches!(
            batch.delete("mds0"),
            Err(BatchError::DuplicateHandle {
                change: ChangeType::Delete,
                ..
            })
        ));
    }

    #[test]
    fn single_state_insert_requires_exactly_one_matching_state() {
        let mut batch = DescriptionBatch::new();
        let descriptor = Descriptor::new("mds0", DescriptorKind::Mds);
        assert!(matches!(
            batch.insert(descriptor.clone(), Vec::new()),
            Err(BatchError::SingleStateShape { .. })
        ));
        let wrong = State::context("other", "mds0", StateKind::Mds);
        assert!(matches!(
            batch.insert(descriptor, vec![wrong]),
            Err(BatchError::SingleStateShape { .. })
        ));
        assert!(batch.is_empty());
    }

    #[test]
    fn foreign_states_are_rejected() {
        let mut batch = DescriptionBatch::new();
        let result = batch.insert(
            Descriptor::new("mds0", DescriptorKind::Mds),
            vec![State::new("mds1", StateKind::Mds)],
        );
        assert!(matches!(result, Err(BatchError::ForeignState { .. })));
    }

    #[test]
    fn context_insert_accepts_many_distinct_instances() {
        let mut batch = DescriptionBatch::new();
        let result = batch.insert(
            Descriptor::new("ctx.patient", DescriptorKind::PatientContext),
            vec![
                State::context("p0", "ctx.patient", StateKind::PatientContext),
                State::context("p1", "ctx.patient", StateKind::PatientContext),
            ],
        );
        assert!(result.is_ok());

        let mut batch = DescriptionBatch::new();
        let result = batch.insert(
            Descriptor::new("ctx.patient", DescriptorKind::PatientContext),
            vec![
                State::context("p0", "ctx.patient", StateKind::PatientContext),
                State::context("p0", "ctx.patient", StateKind::PatientContext),
            ],
        );
        assert!(matches!(result, Err(BatchError::DuplicateHandle { .. })));
    }

    #[test]
    fn state_batch_rejects_other_categories() {
        let mut batch = StateBatch::new(StateCategory::Metric);
        assert!(batch
            .add(State::new("hr", StateKind::NumericMetric))
            .is_ok());
        let err = batch.add(State::new("ac0", StateKind::AlertCondition));
        assert!(matches!(
            err,
            Err(BatchError::CategoryMismatch {
                expected: StateCategory::Metric,
                actual: StateCategory::Alert,
                ..
            })
        ));
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn state_batch_rejects_duplicate_state_handles() {
        let mut batch = StateBatch::new(StateCategory::Metric);
        let state = State::new("hr", StateKind::NumericMetric);
        assert!(batch.add(state.clone()).is_ok());
        assert!(matches!(
            batch.add(state),
            Err(BatchError::DuplicateHandle { .. })
        ));
    }

    #[test]
    fn state_batch_checks_context_handles() {
        let mut batch = StateBatch::new(StateCategory::Context);
        let bad = State::context("ctx", "ctx", StateKind::LocationContext);
        assert!(matches!(
            batch.add(bad),
            Err(BatchError::ContextHandleCollision { .. })
        ));
        let good = State::context("loc0", "ctx", StateKind::LocationContext);
        assert!(batch.add_all([good]).is_ok());
    }
}
