// checkgraph-core/src/model/outputs_history.rs
// ============================================================================
// Module: Outputs History
// Description: Per-check, append-only log of every output observed during a
//              run, consumed by routing expressions and templates.
// Purpose: Let sandboxed expressions reason over a check's history
//          (`outputs_history.<id>`) without re-reading the Journal.
// Dependencies: crate::model::ids, serde_json
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::ids::CheckId;

/// One entry in a check's outputs history.
///
/// Aggregate arrays from `forEach` parents and per-item outputs from children
/// are both appended in chronological order, annotated per spec §4.5 so
/// downstream expressions can scan a single check's history to reason about
/// waves without cross-referencing the parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// The observed output value.
    pub output: JsonValue,
    /// Wave/loop index this entry was produced in.
    pub loop_idx: u32,
    /// `true` iff this is the most recent entry for the most recent wave.
    pub last_loop: bool,
    /// `forEach` parent id, when this entry came from a per-item child.
    pub parent: Option<CheckId>,
    /// Item identifier, when this entry is a per-item record.
    pub id: Option<JsonValue>,
}

/// Per-checkId ordered list of all outputs observed during a run (spec §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputsHistory {
    entries: BTreeMap<CheckId, Vec<HistoryEntry>>,
}

impl OutputsHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `entry` to `check`'s history, clearing `last_loop` on any
    /// strictly earlier-wave entry for the same check when `entry.last_loop`
    /// is set (spec §4.5: "previous `last_loop` flags ... are cleared to
    /// false"). Entries from the same wave (`loop_idx`) as `entry` are left
    /// alone — a forEach dependent's per-item children are pushed one at a
    /// time within one wave and must all keep `last_loop: true` together,
    /// not just the most recently pushed one.
    pub fn push(&mut self, check: CheckId, entry: HistoryEntry) {
        let clear_previous = entry.last_loop;
        let loop_idx = entry.loop_idx;
        let bucket = self.entries.entry(check).or_default();
        if clear_previous {
            for existing in bucket.iter_mut() {
                if existing.loop_idx != loop_idx {
                    existing.last_loop = false;
                }
            }
        }
        bucket.push(entry);
    }

    /// Returns the full history for `check`, oldest first.
    #[must_use]
    pub fn for_check(&self, check: &CheckId) -> &[HistoryEntry] {
        self.entries.get(check).map_or(&[], Vec::as_slice)
    }

    /// Returns the latest history entry for `check`, if any.
    #[must_use]
    pub fn latest(&self, check: &CheckId) -> Option<&HistoryEntry> {
        self.for_check(check).last()
    }

    /// Renders the full history map as a `checkId -> list<output>` JSON
    /// projection, the shape expected by the `outputs_history` sandbox
    /// namespace and by the `executeGroupedChecks` result (spec §6).
    #[must_use]
    pub fn to_json_map(&self) -> BTreeMap<String, Vec<JsonValue>> {
        self.entries
            .iter()
            .map(|(id, entries)| (id.to_string(), entries.iter().map(|e| e.output.clone()).collect()))
            .collect()
    }
}
