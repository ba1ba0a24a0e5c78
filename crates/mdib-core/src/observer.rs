// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Change notification: typed messages, observers and the registry that
//! delivers commits to them.
//!
//! Delivery is synchronous on the committing thread while the façade holds
//! the read lock, so every observer sees commits in commit order and each
//! message's storage reference reflects exactly that commit.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::warn;

use crate::commit::{DescriptionCommit, StateCommit};
use crate::model::StateCategory;
use crate::storage::MdibStorage;
use crate::version::MdibVersion;

/// One notification per commit.
///
/// State commits are routed to the variant matching their category.
#[derive(Debug, Clone, Copy)]
pub enum MdibMessage<'a> {
    /// A description batch was committed.
    Description(&'a DescriptionCommit),
    /// Component states were written.
    ComponentStates(&'a StateCommit),
    /// Alert states were written.
    AlertStates(&'a StateCommit),
    /// Context states were written.
    ContextStates(&'a StateCommit),
    /// Metric states were written.
    MetricStates(&'a StateCommit),
    /// Operation states were written.
    OperationStates(&'a StateCommit),
    /// Waveform states were written.
    WaveformStates(&'a StateCommit),
}

impl<'a> MdibMessage<'a> {
    /// Wraps a state commit in the variant for its category.
    #[must_use]
    pub fn for_states(commit: &'a StateCommit) -> Self {
        match commit.category {
            StateCategory::Component => Self::ComponentStates(commit),
            StateCategory::Alert => Self::AlertStates(commit),
            StateCategory::Context => Self::ContextStates(commit),
            StateCategory::Metric => Self::MetricStates(commit),
            StateCategory::Operation => Self::OperationStates(commit),
            StateCategory::Waveform => Self::WaveformStates(commit),
        }
    }

    /// Document version produced by the commit.
    #[must_use]
    pub fn mdib_version(&self) -> &'a MdibVersion {
        match self {
            Self::Description(commit) => &commit.mdib_version,
            Self::ComponentStates(commit)
            | Self::AlertStates(commit)
            | Self::ContextStates(commit)
            | Self::MetricStates(commit)
            | Self::OperationStates(commit)
            | Self::WaveformStates(commit) => &commit.mdib_version,
        }
    }

    /// State commit carried by this message, if any.
    #[must_use]
    pub fn state_commit(&self) -> Option<&'a StateCommit> {
        match self {
            Self::Description(_) => None,
            Self::ComponentStates(commit)
            | Self::AlertStates(commit)
            | Self::ContextStates(commit)
            | Self::MetricStates(commit)
            | Self::OperationStates(commit)
            | Self::WaveformStates(commit) => Some(commit),
        }
    }

    /// Short label used in logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Description(_) => "description",
            Self::ComponentStates(_) => "component-states",
            Self::AlertStates(_) => "alert-states",
            Self::ContextStates(_) => "context-states",
            Self::MetricStates(_) => "metric-states",
            Self::OperationStates(_) => "operation-states",
            Self::WaveformStates(_) => "waveform-states",
        }
    }
}

/// Failure reported by an observer. Logged by the dispatcher, never
/// propagated to the writer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ObserverError {
    /// The observer could not handle the message.
    #[error("observer failed: {0}")]
    Failed(String),
    /// The observer panicked while handling the message.
    #[error("observer panicked: {0}")]
    Panicked(String),
}

/// Receiver of commit notifications.
///
/// `storage` is the post-commit store, read-locked for the duration of the
/// call. Observers must not write to the same MDIB from inside the callback.
pub trait MdibObserver: Send + Sync {
    /// Handles one message.
    fn on_message(
        &self,
        message: &MdibMessage<'_>,
        storage: &MdibStorage,
    ) -> Result<(), ObserverError>;
}

impl<F> MdibObserver for F
where
    F: Fn(&MdibMessage<'_>, &MdibStorage) -> Result<(), ObserverError> + Send + Sync,
{
    fn on_message(
        &self,
        message: &MdibMessage<'_>,
        storage: &MdibStorage,
    ) -> Result<(), ObserverError> {
        self(message, storage)
    }
}

/// Token returned by [`ObserverRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Raw registration number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Outcome of delivering one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Observers that handled the message successfully.
    pub delivered: usize,
    /// Observers that failed or panicked.
    pub failed: usize,
    /// Observers skipped because an earlier one failed without isolation.
    pub skipped: usize,
}

#[derive(Default)]
struct Registrations {
    next_id: u64,
    observers: Vec<(ObserverId, Arc<dyn MdibObserver>)>,
}

/// Ordered set of observers.
///
/// Delivery order is registration order. Registration changes made while a
/// message is being delivered take effect from the next message.
#[derive(Default)]
pub struct ObserverRegistry {
    inner: Mutex<Registrations>,
}

impl core::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .finish_non_exhaustive()
    }
}

impl ObserverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an observer at the end of the delivery order.
    pub fn register(&self, observer: Arc<dyn MdibObserver>) -> ObserverId {
        let mut inner = self.inner.lock();
        let id = ObserverId(inner.next_id);
        inner.next_id += 1;
        inner.observers.push((id, observer));
        id
    }

    /// Adds a closure observer.
    pub fn register_fn<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&MdibMessage<'_>, &MdibStorage) -> Result<(), ObserverError>
            + Send
            + Sync
            + 'static,
    {
        self.register(Arc::new(observer))
    }

    /// Removes an observer. Returns `false` if `id` was not registered.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.observers.len();
        inner.observers.retain(|(registered, _)| *registered != id);
        inner.observers.len() != before
    }

    /// Number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().observers.len()
    }

    /// Returns `true` if nobody is listening.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `message` to every observer in registration order.
    ///
    /// With `isolate` set, a failing or panicking observer is logged and the
    /// next one still receives the message. Without it, delivery of this
    /// message stops at the first failure.
    pub fn dispatch(
        &self,
        message: &MdibMessage<'_>,
        storage: &MdibStorage,
        isolate: bool,
    ) -> DispatchReport {
        let snapshot: Vec<(ObserverId, Arc<dyn MdibObserver>)> =
            self.inner.lock().observers.clone();
        let mut report = DispatchReport::default();
        for (position, (id, observer)) in snapshot.iter().enumerate() {
            let outcome = catch_unwind(AssertUnwindSafe(|| observer.on_message(message, storage)))
                .unwrap_or_else(|payload| Err(ObserverError::Panicked(panic_text(&*payload))));
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    warn!(
                        observer = id.get(),
                        message = message.label(),
                        mdib_version = %message.mdib_version(),
                        error = %err,
                        "observer failed"
                    );
                    report.failed += 1;
                    if !isolate {
                        report.skipped = snapshot.len() - position - 1;
                        break;
                    }
                }
            }
        }
        report
    }
}

fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn commit() -> DescriptionCommit {
        DescriptionCommit {
            inserted: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
            mdib_version: MdibVersion::new("s", 0),
            description_version: 0,
            state_version: 0,
        }
    }

    fn storage() -> MdibStorage {
        MdibStorage::new(MdibVersion::new("s", 0))
    }

    #[test]
    fn panicking_observer_does_not_block_the_next_one() {
        let registry = ObserverRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        registry.register_fn(|_, _| panic!("boom"));
        let counter = Arc::clone(&hits);
        registry.register_fn(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let commit = commit();
        let report = registry.dispatch(&MdibMessage::Description(&commit), &storage(), true);
        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn without_isolation_delivery_stops_at_first_failure() {
        let registry = ObserverRegistry::new();
        registry.register_fn(|_, _| Err(ObserverError::Failed("nope".into())));
        registry.register_fn(|_, _| Ok(()));
        let commit = commit();
        let report = registry.dispatch(&MdibMessage::Description(&commit), &storage(), false);
        assert_eq!(
            report,
            DispatchReport {
                delivered: 0,
                failed: 1,
                skipped: 1
            }
        );
    }

    #[test]
    fn unregister_removes_only_the_named_observer() {
        let registry = ObserverRegistry::new();
        let first = registry.register_fn(|_, _| Ok(()));
        let second = registry.register_fn(|_, _| Ok(()));
        assert!(registry.unregister(first));
        assert!(!registry.unregister(first));
        assert_eq!(registry.len(), 1);
        assert!(registry.unregister(second));
        assert!(registry.is_empty());
    }

    #[test]
    fn state_commits_route_by_category() {
        let commit = StateCommit {
            category: StateCategory::Waveform,
            states: std::collections::BTreeMap::new(),
            mdib_version: MdibVersion::new("s", 0),
            state_version: 1,
        };
        let message = MdibMessage::for_states(&commit);
        assert!(matches!(message, MdibMessage::WaveformStates(_)));
        assert_eq!(message.label(), "waveform-states");
        assert!(message.state_commit().is_some());
    }
}
