// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(dead_code)]

use mdib_core::{
    DescriptionBatch, DescriptionCommit, Descriptor, DescriptorKind, Entity, LocalMdib, State,
    StateBatch, StateCategory, StateKind,
};
use mdib_dry_tests::{nine_entity_tree, sample_device, single, test_mdib, SampleDevice};

/// `(document, description, state)` versions of `mdib`.
pub fn versions(mdib: &LocalMdib) -> (u64, u64, u64) {
    mdib.read(|tx| {
        (
            tx.mdib_version().version(),
            tx.description_version(),
            tx.state_version(),
        )
    })
}

/// MDIB holding the committed nine-entity tree.
pub fn mdib_with_tree() -> LocalMdib {
    let mdib = test_mdib();
    mdib.write_description(nine_entity_tree().expect("fixture batch"))
        .expect("fixture commit");
    mdib
}

/// MDIB holding a committed sample device.
pub fn mdib_with_device(vmds: usize, channels: usize) -> (LocalMdib, SampleDevice) {
    let mdib = test_mdib();
    let device = sample_device(vmds, channels).expect("fixture batch");
    mdib.write_description(device.batch.clone())
        .expect("fixture commit");
    (mdib, device)
}

/// Batch inserting one single-state entity.
pub fn insert_one(handle: &str, kind: DescriptorKind, parent: Option<&str>) -> DescriptionBatch {
    let (descriptor, states) = single(handle, kind);
    let descriptor = match parent {
        Some(parent) => descriptor.with_parent(parent),
        None => descriptor,
    };
    let mut batch = DescriptionBatch::new();
    batch.insert(descriptor, states).expect("single insert");
    batch
}

/// Batch updating one single-state entity, replacing its state.
pub fn update_one(handle: &str, kind: DescriptorKind, parent: Option<&str>) -> DescriptionBatch {
    let (descriptor, states) = single(handle, kind);
    let descriptor = match parent {
        Some(parent) => descriptor.with_parent(parent),
        None => descriptor,
    };
    let mut batch = DescriptionBatch::new();
    batch.update(descriptor, states).expect("single update");
    batch
}

/// Batch deleting one entity.
pub fn delete_one(handle: &str) -> DescriptionBatch {
    let mut batch = DescriptionBatch::new();
    batch.delete(handle).expect("single delete");
    batch
}

/// Context state batch with one instance.
pub fn context_write(handle: &str, descriptor: &str, kind: StateKind) -> StateBatch {
    let mut batch = StateBatch::new(StateCategory::Context);
    batch
        .add(State::context(handle, descriptor, kind))
        .expect("context state");
    batch
}

/// Descriptor versions of every inserted entity in `commit`.
pub fn inserted_descriptor_versions(commit: &DescriptionCommit) -> Vec<u64> {
    commit
        .inserted
        .iter()
        .map(Entity::descriptor_version)
        .collect()
}

/// Shorthand for a descriptor under `parent`.
pub fn child(handle: &str, kind: DescriptorKind, parent: &str) -> Descriptor {
    Descriptor::new(handle, kind).with_parent(parent)
}
