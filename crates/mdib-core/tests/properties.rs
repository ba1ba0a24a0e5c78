// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Property tests for the version and rejection guarantees of the store.
#![allow(missing_docs, clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::{context_write, delete_one, insert_one, mdib_with_device, update_one, versions};
use mdib_core::{BatchError, DescriptionBatch, DescriptorKind, StateKind};
use mdib_dry_tests::{metric_update, single, test_mdib};
use proptest::prelude::*;
use proptest::sample::Index;

/// Random tree shape: `parents[i]` picks the parent of node `i + 1` among
/// nodes `0..=i`.
fn tree_batch(parents: &[Index]) -> DescriptionBatch {
    let mut batch = DescriptionBatch::new();
    let (root, root_states) = single("n0", DescriptorKind::Mds);
    batch.insert(root, root_states).unwrap();
    for (offset, parent) in parents.iter().enumerate() {
        let node = offset + 1;
        let (descriptor, states) = single(&format!("n{node}"), DescriptorKind::Channel);
        let parent = format!("n{}", parent.index(node));
        batch.insert(descriptor.with_parent(parent), states).unwrap();
    }
    batch
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn fresh_tree_insert_is_one_commit(parents in prop::collection::vec(any::<Index>(), 0..24)) {
        let mdib = test_mdib();
        let (v0, d0, s0) = versions(&mdib);
        let commit = mdib.write_description(tree_batch(&parents)).unwrap();
        prop_assert_eq!(commit.inserted.len(), parents.len() + 1);
        prop_assert!(commit.updated.is_empty());
        prop_assert!(commit.deleted.is_empty());
        prop_assert_eq!(versions(&mdib), (v0 + 1, d0 + 1, s0 + 1));
    }

    #[test]
    fn state_writes_leave_description_version_alone(
        values in prop::collection::vec(0_u32..1000, 1..12),
    ) {
        let (mdib, device) = mdib_with_device(1, 1);
        let metric = device.metrics[0].as_str();
        for value in values {
            let (v, d, s) = versions(&mdib);
            mdib.write_state(metric_update(metric, &value.to_string(), None)).unwrap();
            prop_assert_eq!(versions(&mdib), (v + 1, d, s + 1));
        }
    }

    #[test]
    fn reinsert_after_delete_continues_descriptor_version(updates in 0_u64..6) {
        let mdib = test_mdib();
        mdib.write_description(insert_one("h", DescriptorKind::Mds, None)).unwrap();
        for _ in 0..updates {
            mdib.write_description(update_one("h", DescriptorKind::Mds, None)).unwrap();
        }
        let before_delete = mdib.entity("h").unwrap().descriptor_version();
        prop_assert_eq!(before_delete, updates);
        mdib.write_description(delete_one("h")).unwrap();
        mdib.write_description(insert_one("h", DescriptorKind::Mds, None)).unwrap();
        prop_assert!(mdib.entity("h").unwrap().descriptor_version() > before_delete);
    }

    #[test]
    fn repeated_handle_in_one_batch_fails_before_writing(
        count in 1_usize..10,
        repeat in any::<Index>(),
        op in 0_u8..3,
    ) {
        let mdib = test_mdib();
        let before = versions(&mdib);
        let mut batch = DescriptionBatch::new();
        let mut queue = |handle: String| {
            let (descriptor, states) = single(&handle, DescriptorKind::Mds);
            match op {
                0 => batch.insert(descriptor, states).map(|_| ()),
                1 => batch.update(descriptor, states).map(|_| ()),
                _ => batch.delete(descriptor.handle).map(|_| ()),
            }
        };
        for i in 0..count {
            queue(format!("h{i}")).unwrap();
        }
        let outcome = queue(format!("h{}", repeat.index(count)));
        let duplicate = matches!(outcome, Err(BatchError::DuplicateHandle { .. }));
        prop_assert!(duplicate, "expected a duplicate handle error, got {:?}", outcome);
        prop_assert_eq!(versions(&mdib), before);
    }

    #[test]
    fn only_strictly_newer_claims_are_committed(last in 0_u64..50, claim in 0_u64..60) {
        let (mdib, device) = mdib_with_device(1, 1);
        let metric = device.metrics[0].as_str();
        if last > 0 {
            mdib.write_state(metric_update(metric, "seed", Some(last))).unwrap();
        }
        let commit = mdib.write_state(metric_update(metric, "probe", Some(claim))).unwrap();
        prop_assert_eq!(commit.state(metric).is_some(), claim > last);
        let stored = mdib.state(metric).unwrap();
        prop_assert_eq!(stored.attribute("value") == Some("probe"), claim > last);
    }

    #[test]
    fn context_handle_cannot_change_owner(instance in "[a-z]{1,8}") {
        let (mdib, device) = mdib_with_device(1, 1);
        let handle = format!("ctx.{instance}");
        mdib.write_states(context_write(
            &handle,
            device.patient_context.as_str(),
            StateKind::PatientContext,
        ))
        .unwrap();
        let before = versions(&mdib);
        let result = mdib.write_states(context_write(
            &handle,
            device.location_context.as_str(),
            StateKind::LocationContext,
        ));
        prop_assert!(result.is_err());
        prop_assert_eq!(versions(&mdib), before);
        prop_assert_eq!(
            mdib.context_states(device.patient_context.as_str(), StateKind::PatientContext).len(),
            1
        );
    }
}
