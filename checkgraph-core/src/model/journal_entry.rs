// checkgraph-core/src/model/journal_entry.rs
// ============================================================================
// Module: Journal Entries
// Description: One committed step result, keyed by (session, scope, check,
//              event) and ordered by an append-only sequence number.
// Purpose: The unit of record the Journal stores and ContextView resolves
//          (spec §3, §4.2).
// Dependencies: crate::model::{ids, scope, event, step_result}
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use super::event::EventTrigger;
use super::ids::CheckId;
use super::ids::SessionId;
use super::scope::ScopePath;
use super::step_result::StepResult;

/// One append-only journal record (spec §3).
///
/// Identity is `seq`; a given `(sessionId, scope, checkId, event)` may have
/// many entries over a run's lifetime (retries, routed re-runs), but readers
/// always resolve to the latest one at or before their snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Monotonic sequence number; unique and increasing within a journal.
    pub seq: u64,
    /// The run this entry belongs to.
    pub session_id: SessionId,
    /// The fan-out scope this entry was committed under.
    pub scope: ScopePath,
    /// The check that produced this result.
    pub check_id: CheckId,
    /// The event this entry was committed under, if the producing check
    /// declared an explicit `on` set; `None` entries are visible under any
    /// event filter (spec §4.2).
    pub event: Option<EventTrigger>,
    /// The committed result.
    pub result: StepResult,
}
