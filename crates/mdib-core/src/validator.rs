// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Descriptor/state type pairing.

use crate::model::{DescriptorKind, StateKind};

/// Maps a descriptor kind to the state kind it requires.
///
/// Injected into the type consistency segment so that profiles with extended
/// kinds can substitute their own pairing.
pub trait TypeValidator: Send + Sync {
    /// State kind that states of a `kind` descriptor must have.
    fn state_kind_for(&self, kind: DescriptorKind) -> StateKind;

    /// Returns `true` if `state` may be attached to a `descriptor` descriptor.
    fn is_compatible(&self, descriptor: DescriptorKind, state: StateKind) -> bool {
        self.state_kind_for(descriptor) == state
    }
}

/// One-to-one pairing of every descriptor kind with its namesake state kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTypeValidator;

impl TypeValidator for DefaultTypeValidator {
    fn state_kind_for(&self, kind: DescriptorKind) -> StateKind {
        match kind {
            DescriptorKind::Mds => StateKind::Mds,
            DescriptorKind::Vmd => StateKind::Vmd,
            DescriptorKind::Channel => StateKind::Channel,
            DescriptorKind::Sco => StateKind::Sco,
            DescriptorKind::SystemContext => StateKind::SystemContext,
            DescriptorKind::Battery => StateKind::Battery,
            DescriptorKind::Clock => StateKind::Clock,
            DescriptorKind::AlertSystem => StateKind::AlertSystem,
            DescriptorKind::AlertCondition => StateKind::AlertCondition,
            DescriptorKind::LimitAlertCondition => StateKind::LimitAlertCondition,
            DescriptorKind::AlertSignal => StateKind::AlertSignal,
            DescriptorKind::NumericMetric => StateKind::NumericMetric,
            DescriptorKind::StringMetric => StateKind::StringMetric,
            DescriptorKind::EnumStringMetric => StateKind::EnumStringMetric,
            DescriptorKind::DistributionSampleArrayMetric => {
                StateKind::DistributionSampleArrayMetric
            }
            DescriptorKind::RealTimeSampleArrayMetric => StateKind::RealTimeSampleArrayMetric,
            DescriptorKind::SetValueOperation => StateKind::SetValueOperation,
            DescriptorKind::SetStringOperation => StateKind::SetStringOperation,
            DescriptorKind::ActivateOperation => StateKind::ActivateOperation,
            DescriptorKind::SetContextStateOperation => StateKind::SetContextStateOperation,
            DescriptorKind::SetMetricStateOperation => StateKind::SetMetricStateOperation,
            DescriptorKind::SetComponentStateOperation => StateKind::SetComponentStateOperation,
            DescriptorKind::SetAlertStateOperation => StateKind::SetAlertStateOperation,
            DescriptorKind::PatientContext => StateKind::PatientContext,
            DescriptorKind::LocationContext => StateKind::LocationContext,
            DescriptorKind::EnsembleContext => StateKind::EnsembleContext,
            DescriptorKind::WorkflowContext => StateKind::WorkflowContext,
            DescriptorKind::OperatorContext => StateKind::OperatorContext,
            DescriptorKind::MeansContext => StateKind::MeansContext,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pairing_preserves_category() {
        let validator = DefaultTypeValidator;
        for kind in DescriptorKind::ALL {
            let state = validator.state_kind_for(*kind);
            assert_eq!(kind.category(), state.category(), "{kind:?}");
            assert!(validator.is_compatible(*kind, state));
        }
    }

    #[test]
    fn mismatched_pairs_are_incompatible() {
        let validator = DefaultTypeValidator;
        assert!(!validator.is_compatible(DescriptorKind::NumericMetric, StateKind::StringMetric));
        assert!(!validator.is_compatible(DescriptorKind::Mds, StateKind::Vmd));
    }
}
