// checkgraph-core/src/model/scope.rs
// ============================================================================
// Module: Scope Paths
// Description: Nested fan-out addressing for per-item execution.
// Purpose: Identify a location within a forEach tree: empty = root, nested =
//          an ordered list of (parent check, item index) pairs.
// Dependencies: crate::model::ids
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use super::ids::CheckId;

/// One level of fan-out nesting: the `forEach` parent and the item index
/// under it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScopeSegment {
    /// The `forEach` parent check that produced this nesting level.
    pub parent_check_id: CheckId,
    /// The item index within the parent's output array.
    pub item_index: usize,
}

/// Ordered list of [`ScopeSegment`]s identifying a per-item execution under
/// one or more nested `forEach` parents. An empty path is the root scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopePath(Vec<ScopeSegment>);

impl ScopePath {
    /// The root scope (no fan-out nesting).
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Returns `true` when this is the root scope.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a new scope extending `self` with one more nesting level.
    #[must_use]
    pub fn child(&self, parent_check_id: CheckId, item_index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(ScopeSegment {
            parent_check_id,
            item_index,
        });
        Self(segments)
    }

    /// Returns the segments, outermost first.
    #[must_use]
    pub fn segments(&self) -> &[ScopeSegment] {
        &self.0
    }

    /// Returns every strict ancestor scope of `self`, from `self`'s immediate
    /// parent down to the root, used by [`ContextView`](crate::runtime::ContextView)'s
    /// scope-prefix fallback resolution (spec §4.2).
    #[must_use]
    pub fn ancestors(&self) -> Vec<ScopePath> {
        let mut out = Vec::with_capacity(self.0.len());
        for len in (0..self.0.len()).rev() {
            out.push(Self(self.0[..len].to_vec()));
        }
        out
    }
}

impl fmt::Display for ScopePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        let rendered: Vec<String> =
            self.0.iter().map(|seg| format!("{}[{}]", seg.parent_check_id, seg.item_index)).collect();
        write!(f, "{}", rendered.join("/"))
    }
}
