// checkgraph-core/src/model/ids.rs
// ============================================================================
// Module: Checkgraph Identifiers
// Description: Canonical opaque identifiers used throughout the engine.
// Purpose: Provide strongly typed, serializable ids with stable string forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Identifiers are opaque and serialize as strings (or, for `SessionId`, an
//! integer). Validation — uniqueness within a config, non-emptiness — is the
//! caller's responsibility; these wrappers exist to keep check ids, scope
//! anchors, and session ids from being interchanged by accident.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

/// Identifier of a [`CheckConfig`](crate::model::CheckConfig) within a config document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckId(String);

impl CheckId {
    /// Creates a new check identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for CheckId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CheckId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl std::borrow::Borrow<str> for CheckId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Monotonic identifier for one top-level engine invocation (a "run").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// Wraps a raw session number.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw session number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Process-wide monotonic counter minting fresh [`SessionId`]s.
///
/// The core keeps no state across runs (spec: "no state persists across
/// runs"), but session identifiers still must not repeat within one process
/// lifetime so logs/telemetry from concurrent runs don't collide.
static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Mints the next [`SessionId`] in process order.
#[must_use]
pub fn next_session_id() -> SessionId {
    SessionId::new(NEXT_SESSION.fetch_add(1, Ordering::Relaxed))
}

/// Opaque snapshot token returned by [`Journal::begin_snapshot`](crate::runtime::Journal::begin_snapshot).
///
/// Wraps the journal's max sequence number at the moment the snapshot was
/// taken; readers never see entries committed after their snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(u64);

impl Snapshot {
    /// Wraps a raw sequence ceiling.
    #[must_use]
    pub const fn new(max_seq: u64) -> Self {
        Self(max_seq)
    }

    /// Returns the raw sequence ceiling.
    #[must_use]
    pub const fn max_seq(self) -> u64 {
        self.0
    }
}
