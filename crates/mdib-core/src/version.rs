// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Document-level version triple.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Version of the whole MDIB document.
///
/// `version` increases by exactly one on every committed write. Versions are
/// only comparable within one `(sequence_id, instance_id)` pair; across
/// sequences [`PartialOrd::partial_cmp`] returns `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MdibVersion {
    sequence_id: String,
    instance_id: u64,
    version: u64,
}

impl MdibVersion {
    /// Creates version `0` of the given sequence.
    #[must_use]
    pub fn new(sequence_id: impl Into<String>, instance_id: u64) -> Self {
        Self {
            sequence_id: sequence_id.into(),
            instance_id,
            version: 0,
        }
    }

    /// Creates version `0` of a freshly generated `urn:uuid:` sequence.
    #[must_use]
    pub fn random_sequence(instance_id: u64) -> Self {
        Self::new(format!("urn:uuid:{}", uuid::Uuid::new_v4()), instance_id)
    }

    /// Sequence identifier (stable for the lifetime of one MDIB).
    #[must_use]
    pub fn sequence_id(&self) -> &str {
        &self.sequence_id
    }

    /// Instance identifier within the sequence.
    #[must_use]
    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    /// Monotonic document version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns the next version of the same sequence.
    #[must_use]
    pub fn increment(&self) -> Self {
        Self {
            sequence_id: self.sequence_id.clone(),
            instance_id: self.instance_id,
            version: self.version.saturating_add(1),
        }
    }

    pub(crate) fn bump(&mut self) {
        self.version = self.version.saturating_add(1);
    }
}

impl PartialOrd for MdibVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.sequence_id != other.sequence_id || self.instance_id != other.instance_id {
            return None;
        }
        Some(self.version.cmp(&other.version))
    }
}

impl core::fmt::Display for MdibVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}/{}", self.sequence_id, self.instance_id, self.version)
    }
}
