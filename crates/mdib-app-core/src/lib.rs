// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared application services for MDIB tools (config, prefs).
//! Keeps CLI and test adapters thin and storage-agnostic.

pub mod config;
pub mod prefs;
