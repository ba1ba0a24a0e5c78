// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! mdib-core: versioned, hierarchical in-memory store for a medical device
//! information base (MDIB).
//!
//! The store holds a tree of entities (a descriptor plus its state or context
//! state instances), keeps per-handle version numbers that survive deletion,
//! validates every write through an ordered preprocessing chain and notifies
//! observers synchronously after each commit.
//!
//! ```
//! use mdib_core::{
//!     DescriptionBatch, Descriptor, DescriptorKind, LocalMdib, State, StateKind,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mdib = LocalMdib::default();
//! let mut batch = DescriptionBatch::new();
//! batch.insert(
//!     Descriptor::new("mds0", DescriptorKind::Mds),
//!     vec![State::new("mds0", StateKind::Mds)],
//! )?;
//! let commit = mdib.write_description(batch)?;
//! assert_eq!(commit.inserted.len(), 1);
//! assert_eq!(mdib.mdib_version().version(), 1);
//! # Ok(())
//! # }
//! ```
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::module_name_repetitions,
    clippy::multiple_crate_versions,
    clippy::use_self
)]

mod access;
mod batch;
mod commit;
mod config;
mod ident;
mod ledger;
mod model;
mod observer;
/// Preprocessing chain and its standard segments.
pub mod preprocessing;
mod storage;
mod validator;
mod version;

/// Access façade, read transactions and write errors.
pub use access::{LocalMdib, MdibBuilder, ReadTransaction, WriteError};
/// Change batch builders.
pub use batch::{BatchError, ChangeType, DescriptionBatch, DescriptionChange, StateBatch};
/// Commit diffs.
pub use commit::{DescriptionCommit, StateCommit};
/// MDIB settings.
pub use config::MdibConfig;
/// Handles and handle generation.
pub use ident::{Handle, HandleGenerator};
/// Per-handle version bookkeeping.
pub use ledger::{LedgerEntry, VersionLedger};
/// Entity tree model.
pub use model::{Descriptor, DescriptorKind, Entity, State, StateCategory, StateKind};
/// Change notification.
pub use observer::{
    DispatchReport, MdibMessage, MdibObserver, ObserverError, ObserverId, ObserverRegistry,
};
/// Preprocessing entry points used by most callers.
pub use preprocessing::{PreprocessingError, PreprocessingSegment, SegmentName};
/// Committed storage and its queries.
pub use storage::MdibStorage;
/// Descriptor to state kind mapping.
pub use validator::{DefaultTypeValidator, TypeValidator};
/// Document version.
pub use version::MdibVersion;
