// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared test doubles and fixtures for MDIB crates.
#![forbid(unsafe_code)]
//!
//! # Modules
//!
//! - [`config`] - In-memory config store fake for testing without filesystem
//! - [`fixtures`] - Sample entity trees and descriptor/state shorthands
//! - [`observers`] - Recording and misbehaving observers

pub mod config;
pub mod fixtures;
pub mod observers;

pub use config::InMemoryConfigStore;
pub use fixtures::{
    context_descriptor, metric_update, nine_entity_tree, sample_device, single, test_config,
    test_mdib, SampleDevice, NINE_ENTITY_HANDLES,
};
pub use observers::{Delivery, FailingObserver, PanickingObserver, RecordingObserver};
