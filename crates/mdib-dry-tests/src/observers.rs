// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Observers for notification tests.

use std::sync::Arc;

use mdib_core::{Handle, MdibMessage, MdibObserver, MdibStorage, ObserverError};
use parking_lot::Mutex;

/// One message as seen by a [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// [`MdibMessage::label`] of the message.
    pub label: &'static str,
    /// Document version carried by the message.
    pub mdib_version: u64,
    /// Document version of the storage handed to the observer.
    pub storage_version: u64,
    /// Description version of that storage.
    pub description_version: u64,
    /// State version of that storage.
    pub state_version: u64,
    /// Inserted, updated and deleted handles (description messages) or
    /// written state handles (state messages).
    pub handles: Vec<Handle>,
}

impl Delivery {
    fn capture(message: &MdibMessage<'_>, storage: &MdibStorage) -> Self {
        let handles = match message {
            MdibMessage::Description(commit) => commit
                .inserted_handles()
                .chain(commit.updated_handles())
                .chain(commit.deleted_handles())
                .cloned()
                .collect(),
            other => other
                .state_commit()
                .map(|commit| {
                    commit
                        .states
                        .values()
                        .flatten()
                        .map(|state| state.handle.clone())
                        .collect()
                })
                .unwrap_or_default(),
        };
        Self {
            label: message.label(),
            mdib_version: message.mdib_version().version(),
            storage_version: storage.mdib_version().version(),
            description_version: storage.description_version(),
            state_version: storage.state_version(),
            handles,
        }
    }
}

/// Records every delivery. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    log: Arc<Mutex<Vec<Delivery>>>,
}

impl RecordingObserver {
    /// Creates an observer with an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the log.
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.log.lock().clone()
    }

    /// Labels of the recorded messages, in delivery order.
    pub fn labels(&self) -> Vec<&'static str> {
        self.log.lock().iter().map(|delivery| delivery.label).collect()
    }

    /// Document versions of the recorded messages, in delivery order.
    pub fn versions(&self) -> Vec<u64> {
        self.log
            .lock()
            .iter()
            .map(|delivery| delivery.mdib_version)
            .collect()
    }

    /// Number of deliveries.
    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    /// Whether nothing was delivered.
    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }

    /// Forgets recorded deliveries.
    pub fn clear(&self) {
        self.log.lock().clear();
    }
}

impl MdibObserver for RecordingObserver {
    fn on_message(
        &self,
        message: &MdibMessage<'_>,
        storage: &MdibStorage,
    ) -> Result<(), ObserverError> {
        self.log.lock().push(Delivery::capture(message, storage));
        Ok(())
    }
}

/// Fails every message with [`ObserverError::Failed`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingObserver;

impl MdibObserver for FailingObserver {
    fn on_message(
        &self,
        message: &MdibMessage<'_>,
        _storage: &MdibStorage,
    ) -> Result<(), ObserverError> {
        Err(ObserverError::Failed(format!(
            "refusing {} at {}",
            message.label(),
            message.mdib_version()
        )))
    }
}

/// Panics on every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanickingObserver;

impl MdibObserver for PanickingObserver {
    #[allow(clippy::panic)]
    fn on_message(
        &self,
        message: &MdibMessage<'_>,
        _storage: &MdibStorage,
    ) -> Result<(), ObserverError> {
        panic!("observer blew up on {}", message.label())
    }
}
