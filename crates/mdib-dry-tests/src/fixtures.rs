// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Sample entity trees and descriptor/state shorthands.

use mdib_core::{
    BatchError, DefaultTypeValidator, DescriptionBatch, Descriptor, DescriptorKind, Handle,
    HandleGenerator, LocalMdib, MdibConfig, State, StateKind, TypeValidator,
};

/// Handles of [`nine_entity_tree`] in batch order.
pub const NINE_ENTITY_HANDLES: [&str; 9] = [
    "mds0", "vmd0", "vmd1", "vmd2", "ch0", "ch1", "ch2", "sco0", "sc0",
];

/// Fixed configuration so versions print the same in every run.
pub fn test_config() -> MdibConfig {
    MdibConfig {
        sequence_id: Some("urn:uuid:00000000-0000-4000-8000-000000000000".to_owned()),
        ..MdibConfig::default()
    }
}

/// Empty MDIB built from [`test_config`].
pub fn test_mdib() -> LocalMdib {
    LocalMdib::new(test_config())
}

/// Descriptor of `kind` with its single state (same handle, kind chosen by
/// [`DefaultTypeValidator`]).
pub fn single(handle: &str, kind: DescriptorKind) -> (Descriptor, Vec<State>) {
    let state_kind = DefaultTypeValidator.state_kind_for(kind);
    (
        Descriptor::new(handle, kind),
        vec![State::new(handle, state_kind)],
    )
}

/// Context descriptor of `kind` under `parent`, without instances.
pub fn context_descriptor(handle: &str, kind: DescriptorKind, parent: &str) -> Descriptor {
    Descriptor::new(handle, kind).with_parent(parent)
}

/// Numeric metric state carrying `value`, optionally claiming a version.
pub fn metric_update(handle: &str, value: &str, version: Option<u64>) -> State {
    let state = State::new(handle, StateKind::NumericMetric).with_attribute("value", value);
    match version {
        Some(version) => state.with_version(version),
        None => state,
    }
}

fn insert_single(
    batch: &mut DescriptionBatch,
    handle: &str,
    kind: DescriptorKind,
    parent: Option<&str>,
) -> Result<(), BatchError> {
    let (descriptor, states) = single(handle, kind);
    let descriptor = match parent {
        Some(parent) => descriptor.with_parent(parent),
        None => descriptor,
    };
    batch.insert(descriptor, states)?;
    Ok(())
}

/// One MDS with three VMDs (one channel each), an SCO and a system context:
/// nine entities, all inserted in one batch.
pub fn nine_entity_tree() -> Result<DescriptionBatch, BatchError> {
    let mut batch = DescriptionBatch::new();
    insert_single(&mut batch, "mds0", DescriptorKind::Mds, None)?;
    for vmd in 0..3 {
        insert_single(&mut batch, &format!("vmd{vmd}"), DescriptorKind::Vmd, Some("mds0"))?;
    }
    for channel in 0..3 {
        insert_single(
            &mut batch,
            &format!("ch{channel}"),
            DescriptorKind::Channel,
            Some(&format!("vmd{channel}")),
        )?;
    }
    insert_single(&mut batch, "sco0", DescriptorKind::Sco, Some("mds0"))?;
    insert_single(&mut batch, "sc0", DescriptorKind::SystemContext, Some("mds0"))?;
    Ok(batch)
}

/// Generated sample device and the handles tests usually need.
#[derive(Debug, Clone)]
pub struct SampleDevice {
    /// Description batch inserting the whole device.
    pub batch: DescriptionBatch,
    /// Numeric metric handles in insertion order.
    pub metrics: Vec<Handle>,
    /// Patient context descriptor handle.
    pub patient_context: Handle,
    /// Location context descriptor handle.
    pub location_context: Handle,
}

/// MDS with an alert system, a system context (patient and location
/// descriptors), and `vmds` VMDs of `channels_per_vmd` channels holding one
/// numeric metric each.
pub fn sample_device(vmds: usize, channels_per_vmd: usize) -> Result<SampleDevice, BatchError> {
    let mut batch = DescriptionBatch::new();
    let mut metric_handles = HandleGenerator::new("nm");
    let mut metrics = Vec::with_capacity(vmds * channels_per_vmd);

    insert_single(&mut batch, "mds0", DescriptorKind::Mds, None)?;
    insert_single(&mut batch, "asy0", DescriptorKind::AlertSystem, Some("mds0"))?;
    insert_single(&mut batch, "sc0", DescriptorKind::SystemContext, Some("mds0"))?;
    batch.insert(
        context_descriptor("patient0", DescriptorKind::PatientContext, "sc0"),
        Vec::new(),
    )?;
    batch.insert(
        context_descriptor("location0", DescriptorKind::LocationContext, "sc0"),
        Vec::new(),
    )?;
    for vmd in 0..vmds {
        let vmd_handle = format!("vmd{vmd}");
        insert_single(&mut batch, &vmd_handle, DescriptorKind::Vmd, Some("mds0"))?;
        for channel in 0..channels_per_vmd {
            let channel_handle = format!("ch{vmd}.{channel}");
            insert_single(
                &mut batch,
                &channel_handle,
                DescriptorKind::Channel,
                Some(&vmd_handle),
            )?;
            let metric = metric_handles.next_handle();
            insert_single(
                &mut batch,
                metric.as_str(),
                DescriptorKind::NumericMetric,
                Some(&channel_handle),
            )?;
            metrics.push(metric);
        }
    }
    Ok(SampleDevice {
        batch,
        metrics,
        patient_context: Handle::from("patient0"),
        location_context: Handle::from("location0"),
    })
}
