// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Scripted run against a freshly built sample device.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use mdib_app_core::prefs::ProviderPrefs;
use mdib_core::{
    DescriptionBatch, Descriptor, DescriptorKind, Handle, HandleGenerator, LocalMdib, MdibMessage,
    MdibVersion, State, StateBatch, StateCategory, StateKind,
};
use serde::Serialize;
use tracing::info;

/// What the run left behind.
#[derive(Debug, Serialize)]
pub struct Summary {
    pub mdib_version: MdibVersion,
    pub description_version: u64,
    pub state_version: u64,
    pub entities: usize,
    pub metrics: usize,
    pub notifications: usize,
    pub stale_dropped: usize,
}

struct Device {
    batch: DescriptionBatch,
    metrics: Vec<Handle>,
}

fn build_device(vmds: usize, channels: usize) -> Result<Device> {
    let mut batch = DescriptionBatch::new();
    let mut metric_handles = HandleGenerator::new("nm");
    let mut metrics = Vec::new();
    batch.insert(
        Descriptor::new("mds0", DescriptorKind::Mds),
        vec![State::new("mds0", StateKind::Mds)],
    )?;
    batch.insert(
        Descriptor::new("sc0", DescriptorKind::SystemContext).with_parent("mds0"),
        vec![State::new("sc0", StateKind::SystemContext)],
    )?;
    batch.insert(
        Descriptor::new("patient0", DescriptorKind::PatientContext).with_parent("sc0"),
        Vec::new(),
    )?;
    for vmd in 0..vmds {
        let vmd_handle = format!("vmd{vmd}");
        batch.insert(
            Descriptor::new(vmd_handle.as_str(), DescriptorKind::Vmd).with_parent("mds0"),
            vec![State::new(vmd_handle.as_str(), StateKind::Vmd)],
        )?;
        for channel in 0..channels {
            let channel_handle = format!("ch{vmd}.{channel}");
            batch.insert(
                Descriptor::new(channel_handle.as_str(), DescriptorKind::Channel)
                    .with_parent(vmd_handle.as_str()),
                vec![State::new(channel_handle.as_str(), StateKind::Channel)],
            )?;
            let metric = metric_handles.next_handle();
            batch.insert(
                Descriptor::new(metric.clone(), DescriptorKind::NumericMetric)
                    .with_parent(channel_handle.as_str())
                    .with_attribute("unit", "bpm"),
                vec![State::new(metric.clone(), StateKind::NumericMetric)],
            )?;
            metrics.push(metric);
        }
    }
    Ok(Device { batch, metrics })
}

/// Builds the device described by `prefs`, then runs metric rounds, a patient
/// association, a stale replay, a descriptor update and a VMD removal.
pub fn run(prefs: &ProviderPrefs) -> Result<Summary> {
    let mdib = LocalMdib::new(prefs.mdib.clone());
    let notifications = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notifications);
    mdib.subscribe(move |message, storage| {
        counter.fetch_add(1, Ordering::Relaxed);
        let changed = match message {
            MdibMessage::Description(commit) => {
                commit.inserted.len() + commit.updated.len() + commit.deleted.len()
            }
            other => other.state_commit().map_or(0, |commit| commit.len()),
        };
        info!(
            message = message.label(),
            mdib_version = %message.mdib_version(),
            changed,
            entities = storage.len(),
            "notification"
        );
        Ok(())
    });

    let device = build_device(prefs.sample_vmds, prefs.channels_per_vmd)?;
    mdib.write_description(device.batch)
        .context("insert sample device")?;

    for round in 0..prefs.update_rounds {
        let mut batch = StateBatch::new(StateCategory::Metric);
        for (index, metric) in device.metrics.iter().enumerate() {
            batch.add(
                State::new(metric.clone(), StateKind::NumericMetric)
                    .with_attribute("value", (round * 10 + index as u64).to_string()),
            )?;
        }
        mdib.write_states(batch)
            .with_context(|| format!("metric round {round}"))?;
    }

    let mut patients = HandleGenerator::new("patient0.");
    mdib.write_state(
        State::context(patients.next_handle(), "patient0", StateKind::PatientContext)
            .with_attribute("association", "Assoc"),
    )
    .context("associate patient")?;

    let mut stale_dropped = 0;
    if let Some(first) = device.metrics.first() {
        let replay = mdib
            .write_state(
                State::new(first.clone(), StateKind::NumericMetric)
                    .with_attribute("value", "replayed")
                    .with_version(0),
            )
            .context("replay stale metric")?;
        if replay.is_empty() {
            stale_dropped += 1;
        }
    }

    if prefs.sample_vmds > 0 {
        let mut batch = DescriptionBatch::new();
        batch.update(
            Descriptor::new("vmd0", DescriptorKind::Vmd)
                .with_parent("mds0")
                .with_attribute("revision", "2"),
            Vec::new(),
        )?;
        mdib.write_description(batch).context("update vmd0")?;
    }
    if prefs.sample_vmds > 1 {
        let mut batch = DescriptionBatch::new();
        batch.delete(format!("vmd{}", prefs.sample_vmds - 1))?;
        mdib.write_description(batch).context("remove last vmd")?;
    }

    let tx = mdib.start_transaction();
    Ok(Summary {
        mdib_version: tx.mdib_version().clone(),
        description_version: tx.description_version(),
        state_version: tx.state_version(),
        entities: tx.len(),
        metrics: tx.find_entities_by_kind(DescriptorKind::NumericMetric).len(),
        notifications: notifications.load(Ordering::Relaxed),
        stale_dropped,
    })
}
