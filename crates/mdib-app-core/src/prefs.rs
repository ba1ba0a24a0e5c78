// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Persisted preferences of MDIB provider tools.

use mdib_core::MdibConfig;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ConfigService, ConfigStore};

/// Logical key the provider prefs are stored under.
pub const PROVIDER_PREFS_KEY: &str = "provider";

/// Settings a provider tool keeps between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderPrefs {
    /// Settings of the local MDIB.
    pub mdib: MdibConfig,
    /// Number of VMDs in the generated sample device.
    pub sample_vmds: usize,
    /// Channels per VMD in the generated sample device.
    pub channels_per_vmd: usize,
    /// Metric update rounds the demo runs.
    pub update_rounds: u64,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for ProviderPrefs {
    fn default() -> Self {
        Self {
            mdib: MdibConfig::default(),
            sample_vmds: 3,
            channels_per_vmd: 1,
            update_rounds: 3,
            log_filter: "info".to_owned(),
        }
    }
}

impl ProviderPrefs {
    /// Loads the prefs, or defaults when none were saved.
    pub fn load<S: ConfigStore>(service: &ConfigService<S>) -> Result<Self, ConfigError> {
        service.load_or_default(PROVIDER_PREFS_KEY)
    }

    /// Persists the prefs.
    pub fn save<S: ConfigStore>(&self, service: &ConfigService<S>) -> Result<(), ConfigError> {
        service.save(PROVIDER_PREFS_KEY, self)
    }
}
