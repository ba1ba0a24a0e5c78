// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Descriptor/state kind consistency.

use std::sync::Arc;

use super::{Disposition, ItemMut, PreprocessingError, PreprocessingSegment, SegmentName};
use crate::batch::DescriptionChange;
use crate::model::{DescriptorKind, State};
use crate::storage::MdibStorage;
use crate::validator::TypeValidator;

/// Rejects kind changes on update and states of the wrong kind.
pub struct TypeConsistencyChecker {
    validator: Arc<dyn TypeValidator>,
}

impl core::fmt::Debug for TypeConsistencyChecker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TypeConsistencyChecker").finish_non_exhaustive()
    }
}

impl TypeConsistencyChecker {
    /// Creates the segment with the pairing supplied by `validator`.
    #[must_use]
    pub fn new(validator: Arc<dyn TypeValidator>) -> Self {
        Self { validator }
    }

    fn check_state(&self, owner: DescriptorKind, state: &State) -> Result<(), PreprocessingError> {
        if self.validator.is_compatible(owner, state.kind) {
            return Ok(());
        }
        Err(PreprocessingError::new(
            SegmentName::TypeConsistencyChecker,
            state.handle.clone(),
            format!(
                "{:?} state cannot belong to a {owner:?} descriptor (expected {:?})",
                state.kind,
                self.validator.state_kind_for(owner)
            ),
        ))
    }
}

impl PreprocessingSegment for TypeConsistencyChecker {
    fn name(&self) -> SegmentName {
        SegmentName::TypeConsistencyChecker
    }

    fn process_item(
        &mut self,
        item: ItemMut<'_>,
        storage: &MdibStorage,
    ) -> Result<Disposition, PreprocessingError> {
        match item {
            ItemMut::Description(DescriptionChange::Insert { descriptor, states }) => {
                for state in states.iter() {
                    self.check_state(descriptor.kind, state)?;
                }
            }
            ItemMut::Description(DescriptionChange::Update { descriptor, states }) => {
                if let Some(stored) = storage.entity(descriptor.handle.as_str()) {
                    if stored.kind() != descriptor.kind {
                        return Err(PreprocessingError::new(
                            SegmentName::TypeConsistencyChecker,
                            descriptor.handle.clone(),
                            format!(
                                "descriptor kind cannot change from {:?} to {:?}",
                                stored.kind(),
                                descriptor.kind
                            ),
                        ));
                    }
                }
                for state in states.iter() {
                    self.check_state(descriptor.kind, state)?;
                }
            }
            ItemMut::Description(DescriptionChange::Delete { .. }) => {}
            ItemMut::State(state) => {
                if let Some(owner) = storage.entity(state.descriptor_handle.as_str()) {
                    self.check_state(owner.kind(), state)?;
                }
            }
        }
        Ok(Disposition::Keep)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::batch::{DescriptionBatch, StateBatch};
    use crate::ident::Handle;
    use crate::model::{Descriptor, StateCategory, StateKind};
    use crate::preprocessing::PreprocessingChain;
    use crate::validator::DefaultTypeValidator;
    use crate::version::MdibVersion;

    fn chain() -> PreprocessingChain {
        let mut chain = PreprocessingChain::new();
        chain.push(Box::new(TypeConsistencyChecker::new(Arc::new(
            DefaultTypeValidator,
        ))));
        chain
    }

    /// Storage with `mds` and the numeric metric `m0` under it.
    fn storage() -> MdibStorage {
        let mut storage = MdibStorage::new(MdibVersion::new("urn:uuid:types", 0));
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
                vec![State::new("m0", StateKind::NumericMetric)],
            )
            .unwrap();
        storage.apply_description(batch).unwrap();
        storage
    }

    fn rejected_handle(result: Result<(), PreprocessingError>) -> Handle {
        match result {
            Err(err) => {
                assert_eq!(err.segment, SegmentName::TypeConsistencyChecker, "{err}");
                err.handle
            }
            Ok(()) => unreachable!("batch was accepted"),
        }
    }

    #[test]
    fn insert_with_wrong_state_kind_is_rejected() {
        let storage = storage();
        let mut batch = DescriptionBatch::new();
        batch
            .insert(
                Descriptor::new("v9", DescriptorKind::Vmd).with_parent("mds"),
                vec![State::new("v9", StateKind::Channel)],
            )
            .unwrap();
        let handle = rejected_handle(chain().run_description(&mut batch, &storage));
        assert_eq!(handle, Handle::from("v9"));
    }

    #[test]
    fn state_write_with_wrong_kind_is_rejected() {
        let storage = storage();
        let mut batch = StateBatch::new(StateCategory::Metric);
        batch.add(State::new("m0", StateKind::StringMetric)).unwrap();
        let handle = rejected_handle(chain().run_states(&mut batch, &storage));
        assert_eq!(handle, Handle::from("m0"));
    }

    #[test]
    fn context_state_on_a_metric_is_rejected() {
        let storage = storage();
        let mut batch = StateBatch::new(StateCategory::Context);
        batch
            .add(State::context("p0", "m0", StateKind::PatientContext))
            .unwrap();
        let handle = rejected_handle(chain().run_states(&mut batch, &storage));
        assert_eq!(handle, Handle::from("p0"));
    }

    #[test]
    fn kind_change_on_update_is_rejected() {
        let storage = storage();
        let mut batch = DescriptionBatch::new();
        batch
            .update(
                Descriptor::new("m0", DescriptorKind::StringMetric).with_parent("mds"),
                Vec::new(),
            )
            .unwrap();
        let handle = rejected_handle(chain().run_description(&mut batch, &storage));
        assert_eq!(handle, Handle::from("m0"));
    }

    #[test]
    fn matching_kinds_pass_untouched() {
        let storage = storage();
        let mut batch = StateBatch::new(StateCategory::Metric);
        batch.add(State::new("m0", StateKind::NumericMetric)).unwrap();
        assert!(chain().run_states(&mut batch, &storage).is_ok());
        assert_eq!(batch.len(), 1);
    }
}
