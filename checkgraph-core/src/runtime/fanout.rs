// checkgraph-core/src/runtime/fanout.rs
// ============================================================================
// Module: Fan-Out Engine
// Description: Pure helpers for `forEach` per-item scoping, aggregation,
//              fatality masking, and outputs-history annotation (spec §4.5).
// Purpose: Keep the per-item math independent of the async scheduler loop
//          that drives provider calls.
// Dependencies: crate::model, serde_json
// ============================================================================

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value as JsonValue;
use serde_json::json;

use crate::model::CheckId;
use crate::model::HistoryEntry;
use crate::model::ScopePath;
use crate::model::StepResult;

// ============================================================================
// SECTION: Item Scoping
// ============================================================================

/// Builds the per-item scope for index `i` under `parent`, nested under
/// `base` (spec §4.5 step 2: `itemScope = [{check:P, index:i}]`).
#[must_use]
pub fn item_scope(base: &ScopePath, parent: &CheckId, index: usize) -> ScopePath {
    base.child(parent.clone(), index)
}

// ============================================================================
// SECTION: Aggregation
// ============================================================================

/// Aggregates a `forEach` dependent's per-item results into its committed
/// result (spec §4.5 step 3): issues concatenated, per-item outputs
/// collected by index, per-item content joined by newlines.
#[must_use]
pub fn aggregate_dependent(item_results: Vec<StepResult>, fatal_mask: Vec<bool>) -> StepResult {
    let issues = item_results.iter().flat_map(|r| r.issues.iter().cloned()).collect();
    let output = JsonValue::Array(item_results.iter().map(|r| r.output.clone()).collect());
    let content_parts: Vec<&str> = item_results.iter().filter_map(|r| r.content.as_deref()).collect();
    let content = if content_parts.is_empty() {
        None
    } else {
        Some(content_parts.join("\n"))
    };

    StepResult {
        issues,
        output,
        content,
        is_for_each: true,
        for_each_items: Vec::new(),
        for_each_fatal_mask: fatal_mask,
        for_each_item_results: item_results,
        ..StepResult::default()
    }
}

/// Computes `forEachFatalMask[i] = true` iff the i-th item's result carries a
/// gating-fatal issue, or `parent_fail_if_triggered[i]` is set (spec §4.5
/// step 3).
#[must_use]
pub fn compute_fatal_mask(item_results: &[StepResult], parent_fail_if_triggered: &[bool]) -> Vec<bool> {
    item_results
        .iter()
        .enumerate()
        .map(|(i, result)| result.has_gating_fatal_issue() || parent_fail_if_triggered.get(i).copied().unwrap_or(false))
        .collect()
}

// ============================================================================
// SECTION: Descendant Gating
// ============================================================================

/// Resolves which item indices a further descendant of a `forEach` tree may
/// run for, given the fatality masks of every ancestor dependent it sits
/// behind (spec §4.5 step 4).
///
/// Returns `None` when no index is runnable even after the "no explicit
/// fatal markers" fallback — the caller should then mark the descendant
/// skipped with `dependency_failed`.
#[must_use]
pub fn runnable_indices(len: usize, ancestor_masks: &[&[bool]]) -> Option<Vec<usize>> {
    let intersected: Vec<usize> =
        (0..len).filter(|&i| ancestor_masks.iter().all(|mask| !mask.get(i).copied().unwrap_or(false))).collect();
    if !intersected.is_empty() {
        return Some(intersected);
    }
    let any_explicit_fatal = ancestor_masks.iter().any(|mask| mask.iter().any(|&fatal| fatal));
    if any_explicit_fatal {
        None
    } else {
        Some((0..len).collect())
    }
}

// ============================================================================
// SECTION: Outputs History Annotation
// ============================================================================

/// Builds the parent's two per-wave history entries: the raw aggregate array,
/// then the `{loop_idx, last_loop, items}` marker object (spec §4.5
/// "OutputsHistory tracking for forEach").
#[must_use]
pub fn parent_history_entries(aggregate_output: JsonValue, loop_idx: u32, item_ids: Vec<JsonValue>) -> [HistoryEntry; 2] {
    [
        HistoryEntry {
            output: aggregate_output,
            loop_idx,
            last_loop: true,
            parent: None,
            id: None,
        },
        HistoryEntry {
            output: json!({ "loop_idx": loop_idx, "last_loop": true, "items": item_ids }),
            loop_idx,
            last_loop: true,
            parent: None,
            id: None,
        },
    ]
}

/// Builds a per-item child history entry. When the child produced no output
/// for this item, synthesizes the minimal placeholder record from spec
/// §4.5 so downstream expressions can still scan the child's history.
#[must_use]
pub fn child_history_entry(parent: CheckId, loop_idx: u32, last_loop: bool, item_id: JsonValue, output: Option<JsonValue>) -> HistoryEntry {
    let resolved_output = output.unwrap_or_else(|| {
        json!({
            "is_valid": false,
            "confidence": "low",
            "reason": "missing",
            "parent": parent.to_string(),
            "loop_idx": loop_idx,
            "last_loop": last_loop,
            "id": item_id,
        })
    });
    HistoryEntry {
        output: resolved_output,
        loop_idx,
        last_loop,
        parent: Some(parent),
        id: Some(item_id),
    }
}
