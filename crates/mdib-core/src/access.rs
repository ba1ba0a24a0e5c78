// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Access façade: the only way to read or write a local MDIB.
//!
//! A single reader/writer lock guards storage and the preprocessing chain.
//! Every write runs:
//!
//! ```text
//! write lock -> preprocessing chain -> apply -> downgrade to read lock
//!            -> notify observers -> release
//! ```
//!
//! The downgrade is atomic, so no other writer can commit between a commit and
//! its notification, and readers waiting on the lock observe storage no older
//! than the notification being delivered.

use std::ops::Deref;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::batch::{BatchError, DescriptionBatch, StateBatch};
use crate::commit::{DescriptionCommit, StateCommit};
use crate::config::MdibConfig;
use crate::model::{Descriptor, DescriptorKind, Entity, State, StateKind};
use crate::observer::{MdibMessage, MdibObserver, ObserverError, ObserverId, ObserverRegistry};
use crate::preprocessing::{PreprocessingChain, PreprocessingError, PreprocessingSegment};
use crate::storage::MdibStorage;
use crate::validator::{DefaultTypeValidator, TypeValidator};
use crate::version::MdibVersion;

/// Failure of a write call. Storage is unchanged whenever this is returned.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The batch could not be assembled.
    #[error(transparent)]
    Batch(#[from] BatchError),
    /// A preprocessing segment or the storage engine rejected the batch.
    #[error(transparent)]
    Rejected(#[from] PreprocessingError),
}

struct MdibInner {
    storage: MdibStorage,
    chain: PreprocessingChain,
}

/// Assembles a [`LocalMdib`].
pub struct MdibBuilder {
    config: MdibConfig,
    validator: Arc<dyn TypeValidator>,
    segments: Vec<Box<dyn PreprocessingSegment>>,
}

impl Default for MdibBuilder {
    fn default() -> Self {
        Self {
            config: MdibConfig::default(),
            validator: Arc::new(DefaultTypeValidator),
            segments: Vec::new(),
        }
    }
}

impl core::fmt::Debug for MdibBuilder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MdibBuilder")
            .field("config", &self.config)
            .field("extra_segments", &self.segments.len())
            .finish_non_exhaustive()
    }
}

impl MdibBuilder {
    /// Starts from [`MdibConfig::default`] and [`DefaultTypeValidator`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: MdibConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the type validator used by the type consistency checker.
    pub fn with_type_validator(mut self, validator: Arc<dyn TypeValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Appends a segment after the standard ones.
    pub fn with_segment(mut self, segment: Box<dyn PreprocessingSegment>) -> Self {
        self.segments.push(segment);
        self
    }

    /// Builds the MDIB.
    #[must_use]
    pub fn build(self) -> LocalMdib {
        let mut chain = PreprocessingChain::standard(self.validator, self.config.drop_stale_states);
        for segment in self.segments {
            chain.push(segment);
        }
        let storage = MdibStorage::new(self.config.initial_version());
        info!(
            mdib_version = %storage.mdib_version(),
            segments = chain.len(),
            isolate_observers = self.config.isolate_observers,
            "local MDIB created"
        );
        LocalMdib {
            inner: RwLock::new(MdibInner { storage, chain }),
            observers: ObserverRegistry::new(),
            config: self.config,
        }
    }
}

/// Thread-safe local MDIB.
///
/// Share it behind an `Arc` (or a scoped borrow). Writers are serialized,
/// readers run concurrently. Observers run on the writing thread while the
/// read lock is held; they must not write to the same MDIB.
pub struct LocalMdib {
    inner: RwLock<MdibInner>,
    observers: ObserverRegistry,
    config: MdibConfig,
}

impl core::fmt::Debug for LocalMdib {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LocalMdib")
            .field("config", &self.config)
            .field("observers", &self.observers)
            .finish_non_exhaustive()
    }
}

impl Default for LocalMdib {
    fn default() -> Self {
        MdibBuilder::new().build()
    }
}

impl LocalMdib {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> MdibBuilder {
        MdibBuilder::new()
    }

    /// Builds an MDIB from `config` with the default type validator.
    #[must_use]
    pub fn new(config: MdibConfig) -> Self {
        MdibBuilder::new().with_config(config).build()
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &MdibConfig {
        &self.config
    }

    /// Commits a description batch and notifies observers.
    ///
    /// # Errors
    /// [`WriteError::Rejected`] naming the segment and handle that refused the
    /// batch. Nothing is committed and nobody is notified in that case.
    #[instrument(level = "debug", skip(self, batch), fields(changes = batch.len()))]
    pub fn write_description(
        &self,
        mut batch: DescriptionBatch,
    ) -> Result<DescriptionCommit, WriteError> {
        let mut guard = self.inner.write();
        let MdibInner { storage, chain } = &mut *guard;
        chain.run_description(&mut batch, storage)?;
        let commit = storage.apply_description(batch)?;
        debug!(
            mdib_version = %commit.mdib_version,
            inserted = commit.inserted.len(),
            updated = commit.updated.len(),
            deleted = commit.deleted.len(),
            "description committed"
        );
        let guard = RwLockWriteGuard::downgrade(guard);
        self.observers.dispatch(
            &MdibMessage::Description(&commit),
            &guard.storage,
            self.config.isolate_observers,
        );
        drop(guard);
        Ok(commit)
    }

    /// Clones `batch` and commits the copy.
    ///
    /// # Errors
    /// See [`LocalMdib::write_description`].
    pub fn write_description_ref(
        &self,
        batch: &DescriptionBatch,
    ) -> Result<DescriptionCommit, WriteError> {
        self.write_description(batch.clone())
    }

    /// Commits a state batch and notifies observers with one message for the
    /// batch's category.
    ///
    /// States dropped as stale are absent from the commit; the write still
    /// counts as a commit even if every state was dropped.
    ///
    /// # Errors
    /// [`WriteError::Rejected`] naming the segment and handle that refused the
    /// batch.
    #[instrument(
        level = "debug",
        skip(self, batch),
        fields(category = ?batch.category(), states = batch.len())
    )]
    pub fn write_states(&self, mut batch: StateBatch) -> Result<StateCommit, WriteError> {
        let mut guard = self.inner.write();
        let MdibInner { storage, chain } = &mut *guard;
        chain.run_states(&mut batch, storage)?;
        let commit = storage.apply_states(batch)?;
        debug!(
            mdib_version = %commit.mdib_version,
            category = ?commit.category,
            states = commit.len(),
            "states committed"
        );
        let guard = RwLockWriteGuard::downgrade(guard);
        self.observers.dispatch(
            &MdibMessage::for_states(&commit),
            &guard.storage,
            self.config.isolate_observers,
        );
        drop(guard);
        Ok(commit)
    }

    /// Clones `batch` and commits the copy.
    ///
    /// # Errors
    /// See [`LocalMdib::write_states`].
    pub fn write_states_ref(&self, batch: &StateBatch) -> Result<StateCommit, WriteError> {
        self.write_states(batch.clone())
    }

    /// Commits a single state in a batch of its own category.
    ///
    /// # Errors
    /// [`WriteError::Batch`] if the state cannot form a batch, otherwise see
    /// [`LocalMdib::write_states`].
    pub fn write_state(&self, state: State) -> Result<StateCommit, WriteError> {
        let mut batch = StateBatch::new(state.kind.category());
        batch.add(state)?;
        self.write_states(batch)
    }

    /// Opens a read transaction. The read lock is held until the returned
    /// value is dropped.
    pub fn start_transaction(&self) -> ReadTransaction<'_> {
        ReadTransaction {
            guard: self.inner.read(),
        }
    }

    /// Runs `f` inside a read transaction.
    pub fn read<R>(&self, f: impl FnOnce(&ReadTransaction<'_>) -> R) -> R {
        let tx = self.start_transaction();
        f(&tx)
    }

    /// Registers an observer; it receives every commit from now on.
    pub fn register(&self, observer: Arc<dyn MdibObserver>) -> ObserverId {
        self.observers.register(observer)
    }

    /// Registers a closure observer.
    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&MdibMessage<'_>, &MdibStorage) -> Result<(), ObserverError>
            + Send
            + Sync
            + 'static,
    {
        self.observers.register_fn(observer)
    }

    /// Removes an observer. Returns `false` if it was not registered.
    pub fn unregister(&self, id: ObserverId) -> bool {
        self.observers.unregister(id)
    }

    /// Number of registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Copy of the descriptor with `handle`.
    pub fn descriptor(&self, handle: &str) -> Option<Descriptor> {
        self.read(|tx| tx.descriptor(handle).cloned())
    }

    /// Copy of the state with `handle`.
    pub fn state(&self, handle: &str) -> Option<State> {
        self.read(|tx| tx.state(handle).cloned())
    }

    /// Copy of the entity with `handle`.
    pub fn entity(&self, handle: &str) -> Option<Entity> {
        self.read(|tx| tx.entity(handle).cloned())
    }

    /// Copies of the root entities.
    pub fn root_entities(&self) -> Vec<Entity> {
        self.read(|tx| tx.root_entities().into_iter().cloned().collect())
    }

    /// Copies of the children of `handle` with descriptor kind `kind`.
    pub fn children_by_kind(&self, handle: &str, kind: DescriptorKind) -> Vec<Entity> {
        self.read(|tx| tx.children_by_kind(handle, kind).into_iter().cloned().collect())
    }

    /// Copies of every entity with descriptor kind `kind`.
    pub fn find_entities_by_kind(&self, kind: DescriptorKind) -> Vec<Entity> {
        self.read(|tx| tx.find_entities_by_kind(kind).into_iter().cloned().collect())
    }

    /// Copies of the context states of `descriptor_handle` with kind `kind`.
    pub fn context_states(&self, descriptor_handle: &str, kind: StateKind) -> Vec<State> {
        self.read(|tx| {
            tx.context_states(descriptor_handle, kind)
                .into_iter()
                .cloned()
                .collect()
        })
    }

    /// Current document version.
    pub fn mdib_version(&self) -> MdibVersion {
        self.read(|tx| tx.mdib_version().clone())
    }

    /// Current description version.
    pub fn description_version(&self) -> u64 {
        self.read(|tx| tx.description_version())
    }

    /// Current state version.
    pub fn state_version(&self) -> u64 {
        self.read(|tx| tx.state_version())
    }
}

/// Snapshot-consistent read access.
///
/// Dereferences to [`MdibStorage`]; every reference obtained through it is
/// bound to the transaction. Dropping it releases the read lock on every exit
/// path, panics included.
pub struct ReadTransaction<'a> {
    guard: RwLockReadGuard<'a, MdibInner>,
}

impl core::fmt::Debug for ReadTransaction<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReadTransaction")
            .field("mdib_version", self.guard.storage.mdib_version())
            .finish_non_exhaustive()
    }
}

impl Deref for ReadTransaction<'_> {
    type Target = MdibStorage;

    fn deref(&self) -> &MdibStorage {
        &self.guard.storage
    }
}
