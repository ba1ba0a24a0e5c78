// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Stale state filter.
//!
//! Replayed or reordered state reports must not roll a state back. A state
//! claiming a version not strictly greater than the last one recorded for its
//! handle is removed from the batch; this is not an error.

use tracing::debug;

use super::{BatchView, Disposition, ItemMut, PreprocessingError, PreprocessingSegment, SegmentName};
use crate::batch::ChangeType;
use crate::model::State;
use crate::storage::MdibStorage;

/// Drops states whose claimed version is not newer than the last seen one.
///
/// A state passes unchanged when it makes no version claim, when its handle
/// was never recorded, or when its owning entity is not in storage.
#[derive(Debug, Default)]
pub struct VersionFilter {
    dropped: usize,
}

impl VersionFilter {
    /// Creates the segment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn is_stale(&mut self, state: &State, storage: &MdibStorage) -> bool {
        let Some(claimed) = state.state_version else {
            return false;
        };
        if storage.entity(state.descriptor_handle.as_str()).is_none() {
            return false;
        }
        let Some(last) = storage.ledger().state_version(state.handle.as_str()) else {
            return false;
        };
        if claimed > last {
            return false;
        }
        debug!(
            handle = %state.handle,
            claimed,
            last,
            "dropping stale state"
        );
        self.dropped += 1;
        true
    }
}

impl PreprocessingSegment for VersionFilter {
    fn name(&self) -> SegmentName {
        SegmentName::VersionFilter
    }

    fn before_batch(
        &mut self,
        _batch: BatchView<'_>,
        _storage: &MdibStorage,
    ) -> Result<(), PreprocessingError> {
        self.dropped = 0;
        Ok(())
    }

    fn process_item(
        &mut self,
        item: ItemMut<'_>,
        storage: &MdibStorage,
    ) -> Result<Disposition, PreprocessingError> {
        match item {
            ItemMut::Description(change) => {
                if change.change_type() == ChangeType::Update {
                    if let Some(states) = change.states_mut() {
                        states.retain(|state| !self.is_stale(state, storage));
                    }
                }
                Ok(Disposition::Keep)
            }
            ItemMut::State(state) => {
                if self.is_stale(state, storage) {
                    Ok(Disposition::Drop)
                } else {
                    Ok(Disposition::Keep)
                }
            }
        }
    }

    fn after_batch(&mut self, _storage: &MdibStorage) -> Result<(), PreprocessingError> {
        if self.dropped > 0 {
            debug!(dropped = self.dropped, "stale states removed from batch");
        }
        self.dropped = 0;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::batch::{DescriptionBatch, StateBatch};
    use crate::model::{Descriptor, DescriptorKind, StateCategory, StateKind};
    use crate::preprocessing::PreprocessingChain;
    use crate::version::MdibVersion;

    fn chain() -> PreprocessingChain {
        let mut chain = PreprocessingChain::new();
        chain.push(Box::new(VersionFilter::new()));
        chain
    }

    fn metric(value: &str) -> State {
        State::new("m0", StateKind::NumericMetric).with_attribute("value", value)
    }

    fn metric_batch(state: State) -> StateBatch {
        let mut batch = StateBatch::new(StateCategory::Metric);
        batch.add(state).unwrap();
        batch
    }

    /// Storage with `mds` and the numeric metric `m0`, whose state version
    /// is `last`.
    fn storage(last: u64) -> MdibStorage {
        let mut storage = MdibStorage::new(MdibVersion::new("urn:uuid:filter", 0));
        let mut batch = DescriptionBatch::new();
        batch
            .insert(
                Descriptor::new("mds", DescriptorKind::Mds),
                vec![State::new("mds", StateKind::Mds)],
            )
            .unwrap();
        batch
            .insert(
                Descriptor::new("m0", DescriptorKind::NumericMetric).with_parent("mds"),
                vec![metric("seed")],
            )
            .unwrap();
        storage.apply_description(batch).unwrap();
        if last > 0 {
            storage
                .apply_states(metric_batch(metric("seed").with_version(last)))
                .unwrap();
        }
        storage
    }

    #[test]
    fn claims_at_or_below_last_are_dropped() {
        let storage = storage(5);
        for claim in [3, 5] {
            let mut batch = metric_batch(metric("old").with_version(claim));
            assert!(chain().run_states(&mut batch, &storage).is_ok());
            assert!(batch.is_empty(), "claim {claim} survived");
        }
        let mut batch = metric_batch(metric("new").with_version(6));
        assert!(chain().run_states(&mut batch, &storage).is_ok());
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn unclaimed_states_always_pass() {
        let storage = storage(5);
        let mut batch = metric_batch(metric("fresh"));
        assert!(chain().run_states(&mut batch, &storage).is_ok());
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn states_of_entities_missing_from_storage_pass() {
        let mut storage = storage(0);
        let mut delete = DescriptionBatch::new();
        delete.delete("m0").unwrap();
        storage.apply_description(delete).unwrap();
        assert_eq!(storage.ledger().state_version("m0"), Some(0));

        let mut batch = metric_batch(metric("again").with_version(0));
        assert!(chain().run_states(&mut batch, &storage).is_ok());
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn stale_state_inside_an_update_is_removed_from_the_change() {
        let mut storage = storage(5);
        let mut batch = DescriptionBatch::new();
        batch
            .update(
                Descriptor::new("m0", DescriptorKind::NumericMetric).with_parent("mds"),
                vec![metric("replayed").with_version(3)],
            )
            .unwrap();
        assert!(chain().run_description(&mut batch, &storage).is_ok());
        assert_eq!(batch.len(), 1);
        assert!(batch.changes()[0].states().is_empty());

        storage.apply_description(batch).unwrap();
        let state = storage.state("m0").unwrap();
        assert_eq!(state.attribute("value"), Some("seed"));
        assert_eq!(state.state_version, Some(6));
        assert_eq!(storage.descriptor("m0").unwrap().descriptor_version, 1);
    }
}
