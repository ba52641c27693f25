// checkgraph-core/src/model/run_counters.rs
// ============================================================================
// Module: Run Counters
// Description: Per-run, never-reset `(checkId, scope) -> attempts` map used
//              to enforce `max_runs` (spec §3, §5).
// Purpose: Give the scheduler a single place to check and increment a step's
//          attempt count at a given scope.
// Dependencies: crate::model::{ids, scope}
// ============================================================================

use std::collections::BTreeMap;

use super::ids::CheckId;
use super::scope::ScopePath;

/// Per-run attempt counters, keyed by `(checkId, scope)`.
///
/// Per spec §5: "The `runCounters` are per-run and never reset", unlike the
/// per-wave forward-scheduling guard sets that live in the routing engine.
#[derive(Debug, Default)]
pub struct RunCounters {
    counts: BTreeMap<(CheckId, ScopePath), u32>,
}

impl RunCounters {
    /// Creates an empty counter table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current attempt count for `(check, scope)`.
    #[must_use]
    pub fn count(&self, check: &CheckId, scope: &ScopePath) -> u32 {
        self.counts.get(&(check.clone(), scope.clone())).copied().unwrap_or(0)
    }

    /// Increments and returns the new attempt count for `(check, scope)`.
    pub fn increment(&mut self, check: &CheckId, scope: &ScopePath) -> u32 {
        let entry = self.counts.entry((check.clone(), scope.clone())).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Returns `true` if running `check` at `scope` once more would exceed
    /// `max_runs` (a `None` cap is unbounded).
    #[must_use]
    pub fn would_exceed(&self, check: &CheckId, scope: &ScopePath, max_runs: Option<u32>) -> bool {
        match max_runs {
            Some(cap) => self.count(check, scope) >= cap,
            None => false,
        }
    }

    /// Iterates every `(check, scope, count)` triple recorded so far, used
    /// by the invariant check `runCounters[(id, scope)] <= max_runs(id)`.
    pub fn iter(&self) -> impl Iterator<Item = (&CheckId, &ScopePath, u32)> {
        self.counts.iter().map(|((id, scope), count)| (id, scope, *count))
    }
}
