// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Entity tree model: descriptors, states and committed entities.
//!
//! These are plain values. The storage engine owns the committed tree and is
//! the only place where parent/child links and version numbers are assigned;
//! callers construct [`Descriptor`] and [`State`] values, hand them to a batch
//! builder and read back [`Entity`] snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ident::Handle;

/// Category a state belongs to; drives notification dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StateCategory {
    /// Component states (MDS, VMD, channel, SCO, clock, battery, system context).
    Component,
    /// Alert system, condition and signal states.
    Alert,
    /// Multi-instance context states (patient, location, ...).
    Context,
    /// Metric states other than real-time sample arrays.
    Metric,
    /// Operation states.
    Operation,
    /// Real-time sample array (waveform) states.
    Waveform,
}

impl StateCategory {
    /// All categories in dispatch order.
    pub const ALL: [StateCategory; 6] = [
        StateCategory::Component,
        StateCategory::Alert,
        StateCategory::Context,
        StateCategory::Metric,
        StateCategory::Operation,
        StateCategory::Waveform,
    ];
}

macro_rules! kinds {
    ($( $(#[$meta:meta])* $name:ident => $category:ident ),+ $(,)?) => {
        /// Concrete kind of a descriptor.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum DescriptorKind {
            $( $(#[$meta])* $name, )+
        }

        /// Concrete kind of a state.
        ///
        /// Variants mirror [`DescriptorKind`]; which state kind a descriptor
        /// kind requires is decided by a [`crate::TypeValidator`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum StateKind {
            $( $(#[$meta])* $name, )+
        }

        impl DescriptorKind {
            /// Every descriptor kind.
            pub const ALL: &'static [DescriptorKind] = &[$( DescriptorKind::$name, )+];

            /// Category of the states this kind of descriptor owns.
            #[must_use]
            pub const fn category(self) -> StateCategory {
                match self {
                    $( DescriptorKind::$name => StateCategory::$category, )+
                }
            }
        }

        impl StateKind {
            /// Every state kind.
            pub const ALL: &'static [StateKind] = &[$( StateKind::$name, )+];

            /// Category used to route notifications for this state.
            #[must_use]
            pub const fn category(self) -> StateCategory {
                match self {
                    $( StateKind::$name => StateCategory::$category, )+
                }
            }
        }
    };
}

kinds! {
    /// Medical device system (tree root).
    Mds => Component,
    /// Virtual medical device.
    Vmd => Component,
    /// Channel grouping metrics.
    Channel => Component,
    /// Service control object hosting operations.
    Sco => Component,
    /// Container of context descriptors.
    SystemContext => Component,
    /// Battery component.
    Battery => Component,
    /// Clock component.
    Clock => Component,
    /// Alert system.
    AlertSystem => Alert,
    /// Alert condition.
    AlertCondition => Alert,
    /// Limit alert condition.
    LimitAlertCondition => Alert,
    /// Alert signal.
    AlertSignal => Alert,
    /// Numeric metric.
    NumericMetric => Metric,
    /// String metric.
    StringMetric => Metric,
    /// Enumerated string metric.
    EnumStringMetric => Metric,
    /// Distribution sample array metric.
    DistributionSampleArrayMetric => Metric,
    /// Real-time sample array metric (waveform).
    RealTimeSampleArrayMetric => Waveform,
    /// Set-value operation.
    SetValueOperation => Operation,
    /// Set-string operation.
    SetStringOperation => Operation,
    /// Activate operation.
    ActivateOperation => Operation,
    /// Set-context-state operation.
    SetContextStateOperation => Operation,
    /// Set-metric-state operation.
    SetMetricStateOperation => Operation,
    /// Set-component-state operation.
    SetComponentStateOperation => Operation,
    /// Set-alert-state operation.
    SetAlertStateOperation => Operation,
    /// Patient context.
    PatientContext => Context,
    /// Location context.
    LocationContext => Context,
    /// Ensemble context.
    EnsembleContext => Context,
    /// Workflow context.
    WorkflowContext => Context,
    /// Operator context.
    OperatorContext => Context,
    /// Means context.
    MeansContext => Context,
}

impl DescriptorKind {
    /// Returns `true` for kinds owning zero or more context state instances.
    #[must_use]
    pub const fn is_multi_state(self) -> bool {
        matches!(self.category(), StateCategory::Context)
    }
}

impl StateKind {
    /// Returns `true` for context (multi-instance) states.
    #[must_use]
    pub const fn is_context(self) -> bool {
        matches!(self.category(), StateCategory::Context)
    }
}

/// Description of a device component or feature.
///
/// `descriptor_version` is assigned by the storage engine on commit; any value
/// set by the caller is overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    /// Globally unique handle.
    pub handle: Handle,
    /// Concrete descriptor kind.
    pub kind: DescriptorKind,
    /// Parent handle; `None` for roots.
    pub parent: Option<Handle>,
    /// Version of this descriptor, monotonic per handle.
    pub descriptor_version: u64,
    /// Opaque descriptive attributes (type codes, labels, units, ...).
    pub attributes: BTreeMap<String, String>,
}

impl Descriptor {
    /// Creates a root descriptor without attributes.
    #[must_use]
    pub fn new(handle: impl Into<Handle>, kind: DescriptorKind) -> Self {
        Self {
            handle: handle.into(),
            kind,
            parent: None,
            descriptor_version: 0,
            attributes: BTreeMap::new(),
        }
    }

    /// Sets the parent handle.
    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<Handle>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Adds or replaces an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Live value attached to a descriptor.
///
/// For single-state kinds `handle == descriptor_handle`; context states carry
/// their own handle. `state_version` is `None` when the writer makes no
/// version claim and lets the engine assign the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    /// Handle of this state instance.
    pub handle: Handle,
    /// Handle of the owning descriptor.
    pub descriptor_handle: Handle,
    /// Concrete state kind.
    pub kind: StateKind,
    /// Descriptor version this state was written against.
    pub descriptor_version: u64,
    /// State version, monotonic per state handle.
    pub state_version: Option<u64>,
    /// Opaque state attributes (values, activation flags, identifiers, ...).
    pub attributes: BTreeMap<String, String>,
}

impl State {
    /// Creates a single state for the descriptor with the same handle.
    #[must_use]
    pub fn new(descriptor_handle: impl Into<Handle>, kind: StateKind) -> Self {
        let descriptor_handle = descriptor_handle.into();
        Self {
            handle: descriptor_handle.clone(),
            descriptor_handle,
            kind,
            descriptor_version: 0,
            state_version: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Creates a context state instance with its own handle.
    #[must_use]
    pub fn context(
        handle: impl Into<Handle>,
        descriptor_handle: impl Into<Handle>,
        kind: StateKind,
    ) -> Self {
        Self {
            handle: handle.into(),
            descriptor_handle: descriptor_handle.into(),
            kind,
            descriptor_version: 0,
            state_version: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Claims an explicit state version.
    #[must_use]
    pub fn with_version(mut self, version: u64) -> Self {
        self.state_version = Some(version);
        self
    }

    /// Adds or replaces an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Returns the attribute stored under `key`.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Committed unit: one descriptor, its current states and resolved links.
///
/// Invariants (maintained by the storage engine)
/// - every state's `descriptor_handle` equals the descriptor handle and its
///   `descriptor_version` equals the descriptor's current version;
/// - single-state entities hold exactly one state whose handle equals the
///   descriptor handle;
/// - `children` lists child handles in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub(crate) descriptor: Descriptor,
    pub(crate) states: Vec<State>,
    pub(crate) children: Vec<Handle>,
}

impl Entity {
    pub(crate) fn new(descriptor: Descriptor, states: Vec<State>) -> Self {
        Self {
            descriptor,
            states,
            children: Vec::new(),
        }
    }

    /// Descriptor handle.
    #[must_use]
    pub fn handle(&self) -> &Handle {
        &self.descriptor.handle
    }

    /// Descriptor kind.
    #[must_use]
    pub fn kind(&self) -> DescriptorKind {
        self.descriptor.kind
    }

    /// Current descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Current states (one for single-state entities).
    #[must_use]
    pub fn states(&self) -> &[State] {
        &self.states
    }

    /// The state of a single-state entity; `None` for context entities.
    #[must_use]
    pub fn single_state(&self) -> Option<&State> {
        if self.is_context() {
            return None;
        }
        self.states.first()
    }

    /// Returns `true` if this entity owns context state instances.
    #[must_use]
    pub fn is_context(&self) -> bool {
        self.descriptor.kind.is_multi_state()
    }

    /// Parent handle, `None` for roots.
    #[must_use]
    pub fn parent(&self) -> Option<&Handle> {
        self.descriptor.parent.as_ref()
    }

    /// Child handles in insertion order.
    #[must_use]
    pub fn children(&self) -> &[Handle] {
        &self.children
    }

    /// Current descriptor version.
    #[must_use]
    pub fn descriptor_version(&self) -> u64 {
        self.descriptor.descriptor_version
    }
}
