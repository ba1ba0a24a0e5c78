// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Preprocessing chain run against the pre-commit storage.
//!
//! Every write passes through an ordered list of segments before the storage
//! engine touches anything. Each segment sees the batch three times:
//!
//! 1. [`PreprocessingSegment::before_batch`] once, with the whole batch;
//! 2. [`PreprocessingSegment::process_item`] once per item, in batch order,
//!    segment after segment (an item dropped by one segment is not shown to
//!    the segments after it);
//! 3. [`PreprocessingSegment::after_batch`] once at the end.
//!
//! Segments only get shared access to [`MdibStorage`]. A failing segment
//! aborts the write; since all validation precedes all mutation, storage is
//! untouched when an error comes back.

mod duplicate;
mod type_consistency;
mod version_filter;

use std::sync::Arc;

use thiserror::Error;
use tracing::trace;

use crate::batch::{DescriptionBatch, DescriptionChange, StateBatch};
use crate::ident::Handle;
use crate::model::State;
use crate::storage::MdibStorage;
use crate::validator::TypeValidator;

pub use duplicate::DuplicateChecker;
pub use type_consistency::TypeConsistencyChecker;
pub use version_filter::VersionFilter;

/// Stage of the write pipeline that rejected a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentName {
    /// Handle collision checks.
    DuplicateChecker,
    /// Descriptor/state kind checks.
    TypeConsistencyChecker,
    /// Stale state filter.
    VersionFilter,
    /// Structural checks performed by the storage engine itself.
    Storage,
    /// A segment added through [`PreprocessingChain::push`].
    Custom(&'static str),
}

impl core::fmt::Display for SegmentName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::DuplicateChecker => f.write_str("duplicate-checker"),
            Self::TypeConsistencyChecker => f.write_str("type-consistency-checker"),
            Self::VersionFilter => f.write_str("version-filter"),
            Self::Storage => f.write_str("storage"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// Business-rule violation: which stage rejected which handle, and why.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{segment} rejected {handle}: {reason}")]
pub struct PreprocessingError {
    /// Stage that rejected the batch.
    pub segment: SegmentName,
    /// Handle that caused the rejection.
    pub handle: Handle,
    /// Human-readable explanation.
    pub reason: String,
}

impl PreprocessingError {
    /// Creates an error for `segment` and `handle`.
    pub fn new(segment: SegmentName, handle: impl Into<Handle>, reason: impl Into<String>) -> Self {
        Self {
            segment,
            handle: handle.into(),
            reason: reason.into(),
        }
    }
}

/// Read-only view of the batch handed to [`PreprocessingSegment::before_batch`].
#[derive(Debug, Clone, Copy)]
pub enum BatchView<'a> {
    /// A description batch.
    Description(&'a DescriptionBatch),
    /// A state batch.
    States(&'a StateBatch),
}

/// One batch item handed to [`PreprocessingSegment::process_item`].
#[derive(Debug)]
pub enum ItemMut<'a> {
    /// A description change; segments may edit its states in place.
    Description(&'a mut DescriptionChange),
    /// A state of a state batch.
    State(&'a mut State),
}

/// What the chain does with an item after a segment processed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Pass the item on.
    Keep,
    /// Remove the item from the batch without failing.
    Drop,
}

/// One validator or normaliser of the chain.
///
/// Segments must not carry state from one batch to the next; per-batch
/// bookkeeping is reset in [`PreprocessingSegment::before_batch`].
pub trait PreprocessingSegment: Send + Sync {
    /// Name reported in errors.
    fn name(&self) -> SegmentName;

    /// Called once before the first item.
    fn before_batch(
        &mut self,
        _batch: BatchView<'_>,
        _storage: &MdibStorage,
    ) -> Result<(), PreprocessingError> {
        Ok(())
    }

    /// Called once per item.
    fn process_item(
        &mut self,
        item: ItemMut<'_>,
        storage: &MdibStorage,
    ) -> Result<Disposition, PreprocessingError>;

    /// Called once after the last item.
    fn after_batch(&mut self, _storage: &MdibStorage) -> Result<(), PreprocessingError> {
        Ok(())
    }
}

/// Ordered list of segments.
#[derive(Default)]
pub struct PreprocessingChain {
    segments: Vec<Box<dyn PreprocessingSegment>>,
}

impl core::fmt::Debug for PreprocessingChain {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl PreprocessingChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the standard chain: duplicate checker, type consistency
    /// checker and, when `drop_stale_states` is set, the version filter.
    #[must_use]
    pub fn standard(validator: Arc<dyn TypeValidator>, drop_stale_states: bool) -> Self {
        let mut chain = Self::new();
        chain.push(Box::new(DuplicateChecker::new()));
        chain.push(Box::new(TypeConsistencyChecker::new(validator)));
        if drop_stale_states {
            chain.push(Box::new(VersionFilter::new()));
        }
        chain
    }

    /// Appends a segment at the end of the chain.
    pub fn push(&mut self, segment: Box<dyn PreprocessingSegment>) -> &mut Self {
        self.segments.push(segment);
        self
    }

    /// Segment names in execution order.
    pub fn names(&self) -> impl Iterator<Item = SegmentName> + '_ {
        self.segments.iter().map(|segment| segment.name())
    }

    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns `true` if the chain has no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Runs every segment over a description batch, removing dropped items.
    ///
    /// # Errors
    /// The first [`PreprocessingError`] raised by any segment.
    pub fn run_description(
        &mut self,
        batch: &mut DescriptionBatch,
        storage: &MdibStorage,
    ) -> Result<(), PreprocessingError> {
        for segment in &mut self.segments {
            segment.before_batch(BatchView::Description(&*batch), storage)?;
        }
        let changes = std::mem::take(batch.changes_mut());
        let mut kept = Vec::with_capacity(changes.len());
        'items: for mut change in changes {
            for segment in &mut self.segments {
                let disposition =
                    segment.process_item(ItemMut::Description(&mut change), storage)?;
                if disposition == Disposition::Drop {
                    trace!(
                        segment = %segment.name(),
                        handle = %change.handle(),
                        "dropped description change"
                    );
                    continue 'items;
                }
            }
            kept.push(change);
        }
        *batch.changes_mut() = kept;
        for segment in &mut self.segments {
            segment.after_batch(storage)?;
        }
        Ok(())
    }

    /// Runs every segment over a state batch, removing dropped states.
    ///
    /// # Errors
    /// The first [`PreprocessingError`] raised by any segment.
    pub fn run_states(
        &mut self,
        batch: &mut StateBatch,
        storage: &MdibStorage,
    ) -> Result<(), PreprocessingError> {
        for segment in &mut self.segments {
            segment.before_batch(BatchView::States(&*batch), storage)?;
        }
        let states = std::mem::take(batch.states_mut());
        let mut kept = Vec::with_capacity(states.len());
        'items: for mut state in states {
            for segment in &mut self.segments {
                let disposition = segment.process_item(ItemMut::State(&mut state), storage)?;
                if disposition == Disposition::Drop {
                    trace!(segment = %segment.name(), handle = %state.handle, "dropped state");
                    continue 'items;
                }
            }
            kept.push(state);
        }
        *batch.states_mut() = kept;
        for segment in &mut self.segments {
            segment.after_batch(storage)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Descriptor, DescriptorKind, StateCategory, StateKind};
    use crate::validator::DefaultTypeValidator;

    struct DropEverything;

    impl PreprocessingSegment for DropEverything {
        fn name(&self) -> SegmentName {
            SegmentName::Custom("drop-everything")
        }

        fn process_item(
            &mut self,
            _item: ItemMut<'_>,
            _storage: &MdibStorage,
        ) -> Result<Disposition, PreprocessingError> {
            Ok(Disposition::Drop)
        }
    }

    struct RejectAfter;

    impl PreprocessingSegment for RejectAfter {
        fn name(&self) -> SegmentName {
            SegmentName::Custom("reject-after")
        }

        fn process_item(
            &mut self,
            _item: ItemMut<'_>,
            _storage: &MdibStorage,
        ) -> Result<Disposition, PreprocessingError> {
            Ok(Disposition::Keep)
        }

        fn after_batch(&mut self, _storage: &MdibStorage) -> Result<(), PreprocessingError> {
            Err(PreprocessingError::new(self.name(), "batch", "always fails"))
        }
    }

    #[test]
    fn standard_chain_runs_in_required_order() {
        let chain = PreprocessingChain::standard(Arc::new(DefaultTypeValidator), true);
        let names: Vec<_> = chain.names().collect();
        assert_eq!(
            names,
            vec![
                SegmentName::DuplicateChecker,
                SegmentName::TypeConsistencyChecker,
                SegmentName::VersionFilter,
            ]
        );
        let without_filter = PreprocessingChain::standard(Arc::new(DefaultTypeValidator), false);
        assert_eq!(without_filter.len(), 2);
    }

    #[test]
    fn dropped_items_leave_the_batch() {
        let storage = MdibStorage::new(crate::MdibVersion::new("s", 0));
        let mut chain = PreprocessingChain::new();
        chain.push(Box::new(DropEverything));
        let mut batch = StateBatch::new(StateCategory::Metric);
        assert!(batch.add(State::new("hr", StateKind::NumericMetric)).is_ok());
        let result = chain.run_states(&mut batch, &storage);
        assert!(result.is_ok(), "{result:?}");
        assert!(batch.is_empty());
    }

    #[test]
    fn after_batch_errors_abort() {
        let storage = MdibStorage::new(crate::MdibVersion::new("s", 0));
        let mut chain = PreprocessingChain::new();
        chain.push(Box::new(RejectAfter));
        let mut batch = DescriptionBatch::new();
        assert!(batch
            .insert(
                Descriptor::new("mds0", DescriptorKind::Mds),
                vec![State::new("mds0", StateKind::Mds)],
            )
            .is_ok());
        let err = chain.run_description(&mut batch, &storage);
        assert!(matches!(
            err,
            Err(PreprocessingError {
                segment: SegmentName::Custom("reject-after"),
                ..
            })
        ));
    }
}
