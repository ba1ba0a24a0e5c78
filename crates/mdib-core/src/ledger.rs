// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-handle version bookkeeping that survives deletion.

use std::collections::BTreeMap;

use crate::ident::Handle;

/// Last versions assigned to one handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Last descriptor version, if the handle ever named a descriptor.
    pub descriptor_version: Option<u64>,
    /// Last state version, if the handle ever named a state.
    pub state_version: Option<u64>,
}

/// Maps `handle -> last-known (descriptor_version, state_version)`.
///
/// Entries are never removed. Reinserting a deleted handle therefore continues
/// numbering at `last + 1` instead of restarting at `0`, which keeps versions
/// non-decreasing per handle for the lifetime of the document.
#[derive(Debug, Clone, Default)]
pub struct VersionLedger {
    entries: BTreeMap<Handle, LedgerEntry>,
}

impl VersionLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry recorded for `handle`.
    pub fn entry(&self, handle: &str) -> Option<&LedgerEntry> {
        self.entries.get(handle)
    }

    /// Last descriptor version assigned to `handle`.
    pub fn descriptor_version(&self, handle: &str) -> Option<u64> {
        self.entries.get(handle).and_then(|e| e.descriptor_version)
    }

    /// Last state version assigned to `handle`.
    pub fn state_version(&self, handle: &str) -> Option<u64> {
        self.entries.get(handle).and_then(|e| e.state_version)
    }

    /// Descriptor version the next write of `handle` will receive.
    pub fn next_descriptor_version(&self, handle: &str) -> u64 {
        next_after(self.descriptor_version(handle))
    }

    /// Assigns and records the next descriptor version of `handle`.
    pub(crate) fn assign_descriptor_version(&mut self, handle: &Handle) -> u64 {
        let version = self.next_descriptor_version(handle.as_str());
        self.entries
            .entry(handle.clone())
            .or_default()
            .descriptor_version = Some(version);
        version
    }

    /// Assigns and records the next state version of `handle`.
    ///
    /// A `claim` at or above the next version is kept as is; a missing or
    /// lower claim yields `last + 1` (or `0` for a never-seen handle).
    pub(crate) fn assign_state_version(&mut self, handle: &Handle, claim: Option<u64>) -> u64 {
        let next = next_after(self.state_version(handle.as_str()));
        let version = claim.map_or(next, |claimed| claimed.max(next));
        self.entries.entry(handle.clone()).or_default().state_version = Some(version);
        version
    }

    /// Puts back the entry of `handle` as it was before a failed batch.
    pub(crate) fn restore(&mut self, handle: Handle, entry: Option<LedgerEntry>) {
        if let Some(entry) = entry {
            self.entries.insert(handle, entry);
        } else {
            self.entries.remove(&handle);
        }
    }

    /// Number of handles ever recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no handle was ever recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn next_after(last: Option<u64>) -> u64 {
    last.map_or(0, |v| v.saturating_add(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_handles_start_at_zero() {
        let mut ledger = VersionLedger::new();
        let h = Handle::from("mds0");
        assert_eq!(ledger.next_descriptor_version("mds0"), 0);
        assert_eq!(ledger.assign_descriptor_version(&h), 0);
        assert_eq!(ledger.assign_state_version(&h, None), 0);
        assert_eq!(ledger.assign_descriptor_version(&h), 1);
    }

    #[test]
    fn claims_below_next_are_lifted() {
        let mut ledger = VersionLedger::new();
        let h = Handle::from("m");
        assert_eq!(ledger.assign_state_version(&h, Some(5)), 5);
        assert_eq!(ledger.assign_state_version(&h, Some(2)), 6);
        assert_eq!(ledger.assign_state_version(&h, Some(10)), 10);
        assert_eq!(ledger.state_version("m"), Some(10));
    }

    #[test]
    fn descriptor_and_state_counters_are_independent() {
        let mut ledger = VersionLedger::new();
        let h = Handle::from("vmd");
        let _ = ledger.assign_descriptor_version(&h);
        let _ = ledger.assign_descriptor_version(&h);
        assert_eq!(ledger.state_version("vmd"), None);
        assert_eq!(ledger.descriptor_version("vmd"), Some(1));
        assert_eq!(ledger.len(), 1);
    }
}
