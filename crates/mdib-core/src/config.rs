// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Runtime settings of a local MDIB.

use serde::{Deserialize, Serialize};

use crate::version::MdibVersion;

/// Settings consumed by [`crate::MdibBuilder`].
///
/// Stored as JSON through a config service; every field is optional on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MdibConfig {
    /// Sequence id of the document; a fresh `urn:uuid:` is generated when absent.
    pub sequence_id: Option<String>,
    /// Instance id of the document.
    pub instance_id: u64,
    /// Run the stale state filter.
    pub drop_stale_states: bool,
    /// Keep delivering a message to later observers after one fails.
    pub isolate_observers: bool,
}

impl Default for MdibConfig {
    fn default() -> Self {
        Self {
            sequence_id: None,
            instance_id: 0,
            drop_stale_states: true,
            isolate_observers: true,
        }
    }
}

impl MdibConfig {
    /// Initial document version for this configuration.
    #[must_use]
    pub fn initial_version(&self) -> MdibVersion {
        match &self.sequence_id {
            Some(sequence_id) => MdibVersion::new(sequence_id.clone(), self.instance_id),
            None => MdibVersion::random_sequence(self.instance_id),
        }
    }
}
