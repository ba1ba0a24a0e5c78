// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Handle identifiers and the per-owner handle generator.

use std::borrow::Borrow;

/// Globally unique string identifier of a descriptor or state instance.
///
/// Handles are compared byte-wise; the store never normalises them. A
/// single-state entity shares one handle between its descriptor and its
/// state, while every context state instance carries its own handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Handle(String);

impl Handle {
    /// Constructs a handle from anything string-like.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the handle as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the handle and returns the owned string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<&str> for Handle {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for Handle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&Handle> for Handle {
    fn from(value: &Handle) -> Self {
        value.clone()
    }
}

impl Borrow<str> for Handle {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Handle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Handle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Issues unique handles of the form `<prefix><n>`.
///
/// Each generator is owned by the component that needs fresh handles (for
/// example a provider allocating patient context instances). There is no
/// process-wide counter: two generators with the same prefix will collide,
/// so callers pick distinct prefixes per owner.
///
/// # Invariants
/// - `n` starts at `0` and increases by one per call.
/// - Wrapping at `u64::MAX` is not expected in practice; the counter
///   saturates instead of reusing earlier handles.
#[derive(Debug, Clone)]
pub struct HandleGenerator {
    prefix: String,
    next: u64,
}

impl HandleGenerator {
    /// Creates a generator issuing handles that start with `prefix`.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 0,
        }
    }

    /// Returns the next unused handle.
    pub fn next_handle(&mut self) -> Handle {
        let handle = Handle(format!("{}{}", self.prefix, self.next));
        self.next = self.next.saturating_add(1);
        handle
    }

    /// Number of handles issued so far.
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.next
    }
}
