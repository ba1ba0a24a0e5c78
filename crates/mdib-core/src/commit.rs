// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Commit diffs returned by the storage engine and delivered to observers.

use std::collections::BTreeMap;

use crate::ident::Handle;
use crate::model::{Entity, State, StateCategory};
use crate::version::MdibVersion;

/// Result of one committed description batch.
///
/// Entities are post-commit snapshots for `inserted` and `updated`, and the
/// last committed snapshot for `deleted` (descendants removed by a cascading
/// delete are listed after their ancestor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptionCommit {
    /// Newly attached entities in batch order.
    pub inserted: Vec<Entity>,
    /// Entities replaced in place.
    pub updated: Vec<Entity>,
    /// Removed entities.
    pub deleted: Vec<Entity>,
    /// Document version after this commit.
    pub mdib_version: MdibVersion,
    /// Description version after this commit.
    pub description_version: u64,
    /// State version after this commit.
    pub state_version: u64,
}

impl DescriptionCommit {
    /// Returns `true` if no entity changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Handles of inserted entities.
    pub fn inserted_handles(&self) -> impl Iterator<Item = &Handle> {
        self.inserted.iter().map(Entity::handle)
    }

    /// Handles of updated entities.
    pub fn updated_handles(&self) -> impl Iterator<Item = &Handle> {
        self.updated.iter().map(Entity::handle)
    }

    /// Handles of deleted entities.
    pub fn deleted_handles(&self) -> impl Iterator<Item = &Handle> {
        self.deleted.iter().map(Entity::handle)
    }
}

/// Result of one committed state batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateCommit {
    /// Category shared by every state in this commit.
    pub category: StateCategory,
    /// Written states keyed by their descriptor handle.
    pub states: BTreeMap<Handle, Vec<State>>,
    /// Document version after this commit.
    pub mdib_version: MdibVersion,
    /// State version after this commit.
    pub state_version: u64,
}

impl StateCommit {
    /// Category of this commit.
    #[must_use]
    pub fn category(&self) -> StateCategory {
        self.category
    }

    /// Total number of written states.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.values().map(Vec::len).sum()
    }

    /// Returns `true` if every state of the batch was dropped as stale.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Finds a written state by its own handle.
    pub fn state(&self, handle: &str) -> Option<&State> {
        self.states
            .values()
            .flatten()
            .find(|state| state.handle.as_str() == handle)
    }
}
