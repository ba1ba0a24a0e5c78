// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory config store fake for testing without filesystem I/O.

use std::collections::BTreeMap;
use std::sync::Arc;

use mdib_app_core::config::{ConfigError, ConfigStore};
use parking_lot::Mutex;

/// In-memory [`ConfigStore`] that counts calls and can be told to fail.
///
/// Clones share the same data, so a test can keep one handle while a
/// `ConfigService` owns another.
///
/// # Example
///
/// ```
/// use mdib_app_core::config::ConfigService;
/// use mdib_dry_tests::InMemoryConfigStore;
///
/// let store = InMemoryConfigStore::new();
/// let service = ConfigService::new(store.clone());
///
/// service.save("provider", &serde_json::json!({"sample_vmds": 2})).unwrap();
/// assert_eq!(store.save_count(), 1);
/// assert!(store.contains_key("provider"));
/// ```
#[derive(Clone, Default)]
pub struct InMemoryConfigStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    data: BTreeMap<String, Vec<u8>>,
    load_count: usize,
    save_count: usize,
    fail_on_load: bool,
    fail_on_save: bool,
}

impl InMemoryConfigStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed `key` with raw bytes without touching the counters.
    pub fn insert_raw(&self, key: impl Into<String>, data: Vec<u8>) {
        self.inner.lock().data.insert(key.into(), data);
    }

    /// Make every subsequent `load_raw` fail (or succeed again).
    pub fn set_fail_on_load(&self, fail: bool) {
        self.inner.lock().fail_on_load = fail;
    }

    /// Make every subsequent `save_raw` fail (or succeed again).
    pub fn set_fail_on_save(&self, fail: bool) {
        self.inner.lock().fail_on_save = fail;
    }

    /// Number of `load_raw` attempts, failed ones included.
    pub fn load_count(&self) -> usize {
        self.inner.lock().load_count
    }

    /// Number of `save_raw` attempts, failed ones included.
    pub fn save_count(&self) -> usize {
        self.inner.lock().save_count
    }

    /// Keys present, in order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().data.keys().cloned().collect()
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.lock().data.contains_key(key)
    }

    /// Raw bytes stored under `key`.
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().data.get(key).cloned()
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        let mut inner = self.inner.lock();
        inner.load_count += 1;
        if inner.fail_on_load {
            return Err(ConfigError::Other("simulated load failure".into()));
        }
        inner.data.get(key).cloned().ok_or(ConfigError::NotFound)
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        let mut inner = self.inner.lock();
        inner.save_count += 1;
        if inner.fail_on_save {
            return Err(ConfigError::Other("simulated save failure".into()));
        }
        inner.data.insert(key.to_owned(), data.to_vec());
        Ok(())
    }
}
