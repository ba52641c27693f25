// checkgraph-core/src/runtime/journal.rs
// ============================================================================
// Module: Journal and ContextView
// Description: Append-only commit log plus a read-only, scope-aware
//              projection over it (spec §4.2).
// Purpose: Single source of truth for step results; all reads go through
//          snapshot-based views (spec §5).
// Dependencies: crate::model, std::sync
// ============================================================================

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;

use crate::model::CheckId;
use crate::model::EventTrigger;
use crate::model::JournalEntry;
use crate::model::ScopePath;
use crate::model::SessionId;
use crate::model::Snapshot;
use crate::model::StepResult;

// ============================================================================
// SECTION: Journal
// ============================================================================

/// Append-only log of committed `(sessionId, scope, checkId, event) -> StepResult`
/// entries (spec §2, §4.2).
///
/// `commit` never fails to the caller: a malformed entry is a programming
/// error in this crate, not a condition callers recover from.
#[derive(Debug, Default)]
pub struct Journal {
    entries: Mutex<Vec<JournalEntry>>,
}

impl Journal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `entry` with a fresh sequence number, returning it.
    pub fn commit(
        &self,
        session_id: SessionId,
        scope: ScopePath,
        check_id: CheckId,
        event: Option<EventTrigger>,
        result: StepResult,
    ) -> u64 {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let seq = entries.len() as u64 + 1;
        entries.push(JournalEntry {
            seq,
            session_id,
            scope,
            check_id,
            event,
            result,
        });
        seq
    }

    /// Returns an opaque snapshot token pinned to the journal's current max seq.
    #[must_use]
    pub fn begin_snapshot(&self) -> Snapshot {
        let entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Snapshot::new(entries.len() as u64)
    }

    /// Returns every entry committed for `session_id` at or before `snapshot`,
    /// filtered to entries matching `event` or carrying no explicit event
    /// (spec §4.2 `readVisible`).
    #[must_use]
    pub fn read_visible(&self, session_id: SessionId, snapshot: Snapshot, event: Option<EventTrigger>) -> Vec<JournalEntry> {
        let entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries
            .iter()
            .filter(|entry| entry.seq <= snapshot.max_seq())
            .filter(|entry| entry.session_id == session_id)
            .filter(|entry| match (event, entry.event) {
                (Some(wanted), Some(got)) => wanted == got,
                (_, None) => true,
                (None, Some(_)) => true,
            })
            .cloned()
            .collect()
    }
}

// ============================================================================
// SECTION: ContextView
// ============================================================================

/// Read-only, scope-aware projection over a [`Journal`] snapshot (spec §4.2).
///
/// Resolution rule: prefer an entry with the exact requested `scope`; if
/// none, fall back to the longest prefix of `scope` with an entry; finally
/// the root scope.
pub struct ContextView<'j> {
    journal: &'j Journal,
    session_id: SessionId,
    snapshot: Snapshot,
    scope: ScopePath,
    event: Option<EventTrigger>,
    visible: Vec<JournalEntry>,
}

impl<'j> ContextView<'j> {
    /// Builds a view over `journal` at `snapshot`, scoped to `scope` and
    /// `event`. Reads the snapshot once, up front, so repeated `get` calls
    /// observe a stable set of entries (spec §8: "repeated reads ... return
    /// the same `StepResult` instance semantics").
    #[must_use]
    pub fn new(journal: &'j Journal, session_id: SessionId, snapshot: Snapshot, scope: ScopePath, event: Option<EventTrigger>) -> Self {
        let visible = journal.read_visible(session_id, snapshot, event);
        Self {
            journal,
            session_id,
            snapshot,
            scope,
            event,
            visible,
        }
    }

    /// Resolves the latest entry for `id` visible at this view's scope,
    /// falling back through ancestor scopes to the root.
    #[must_use]
    pub fn get(&self, id: &CheckId) -> Option<&StepResult> {
        self.resolve_entry(id).map(|entry| &entry.result)
    }

    /// Same as [`ContextView::get`] but returns the untransformed provider
    /// output, the `outputs_raw` namespace value (spec §4.2 `getRaw`).
    #[must_use]
    pub fn get_raw(&self, id: &CheckId) -> Option<&serde_json::Value> {
        self.resolve_entry(id).map(|entry| entry.result.raw_output_or_output())
    }

    fn resolve_entry(&self, id: &CheckId) -> Option<&JournalEntry> {
        let mut candidates: Vec<ScopePath> = vec![self.scope.clone()];
        candidates.extend(self.scope.ancestors());

        for candidate_scope in &candidates {
            if let Some(entry) =
                self.visible.iter().filter(|entry| &entry.check_id == id && &entry.scope == candidate_scope).max_by_key(|entry| entry.seq)
            {
                return Some(entry);
            }
        }
        None
    }

    /// Returns the scope this view was built for.
    #[must_use]
    pub fn scope(&self) -> &ScopePath {
        &self.scope
    }

    /// Returns the event this view was built for, if any.
    #[must_use]
    pub fn event(&self) -> Option<EventTrigger> {
        self.event
    }

    /// Re-derives a new view for a child scope, reusing this view's journal
    /// read (used when descending into a `forEach` item scope).
    #[must_use]
    pub fn with_scope(&self, scope: ScopePath) -> Self {
        Self::new(self.journal, self.session_id, self.snapshot, scope, self.event)
    }
}
