// checkgraph-core/src/model/stats.rs
// ============================================================================
// Module: Execution Statistics
// Description: Per-check counters and timings recorded during a run
//              (spec §4.7).
// Purpose: Provide the data backing `ExecutionStatistics` in engine results.
// Dependencies: crate::model::{ids, issue}, serde_json, std::time
// ============================================================================

use std::collections::BTreeMap;
use std::time::Duration;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::ids::CheckId;

/// Why a check's run was skipped (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The `if` gate evaluated false or errored (fail-secure).
    IfCondition,
    /// Fail-fast stopped the scheduler before this step could launch.
    FailFast,
    /// One or more gating dependencies were unsatisfied.
    DependencyFailed,
}

/// Per-check counters and timings (spec §4.7).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckStats {
    /// Total attempts (including retries and routed re-runs).
    pub total_runs: u32,
    /// Attempts that completed without soft failure.
    pub successful_runs: u32,
    /// Attempts that soft-failed or threw.
    pub failed_runs: u32,
    /// `true` if the step was skipped at least once and never actually ran.
    pub skipped: bool,
    /// Reason for the most recent skip, if `skipped` is set.
    pub skip_reason: Option<SkipReason>,
    /// The `if`/gating expression text associated with the skip, for diagnostics.
    pub skip_condition: Option<String>,
    /// Total wall-clock duration across all attempts, in milliseconds.
    pub total_duration_ms: u64,
    /// Provider-only duration across all attempts, in milliseconds.
    pub provider_duration_ms: u64,
    /// Per-iteration durations, in milliseconds, for `forEach` dependents.
    pub per_iteration_duration_ms: Vec<u64>,
    /// Total issues recorded across all attempts.
    pub issues_found: u32,
    /// Issues bucketed by severity name (`info`/`warning`/`error`/`critical`).
    pub issues_by_severity: BTreeMap<String, u32>,
    /// Count of attempts that produced a defined output.
    pub outputs_produced: u32,
    /// The most recent error message, if any attempt threw or soft-failed.
    pub error_message: Option<String>,
    /// Up to the first 3 stringified `forEach` items, plus a `...N more` marker.
    pub for_each_preview: Vec<String>,
}

impl CheckStats {
    /// Records a skip. Idempotent: repeated skips of the same kind just
    /// overwrite the reason/condition.
    pub fn record_skip(&mut self, reason: SkipReason, condition: Option<String>) {
        self.skipped = true;
        self.skip_reason = Some(reason);
        self.skip_condition = condition;
    }

    /// Clears a previously recorded skip because the step went on to
    /// actually execute (spec §4.7: "If an earlier skip was recorded and the
    /// step later actually executes, clear the skip flag").
    pub fn clear_skip(&mut self) {
        self.skipped = false;
        self.skip_reason = None;
        self.skip_condition = None;
    }

    /// Records up to 3 previews plus a `...N more` marker for a `forEach`
    /// parent's produced items (spec §4.7 `recordForEachPreview`).
    pub fn record_for_each_preview(&mut self, items: &[JsonValue]) {
        let mut preview: Vec<String> = items.iter().take(3).map(|v| v.to_string()).collect();
        if items.len() > 3 {
            preview.push(format!("...{} more", items.len() - 3));
        }
        self.for_each_preview = preview;
    }
}

/// Handle returned by [`ExecutionStats::record_iteration_start`], passed back
/// into [`ExecutionStats::record_iteration_complete`].
#[derive(Debug, Clone, Copy)]
pub struct IterationHandle {
    check: CheckIdSlot,
    started_at: Instant,
}

#[derive(Debug, Clone, Copy)]
struct CheckIdSlot(usize);

/// Run-scoped stats recorder: one [`CheckStats`] row per check, created
/// lazily on first consideration (spec §3 lifecycle).
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ExecutionStats {
    rows: BTreeMap<CheckId, CheckStats>,
    order: Vec<CheckId>,
}

impl ExecutionStats {
    /// Creates an empty stats recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns (creating if absent) the stats row for `check`.
    pub fn row_mut(&mut self, check: &CheckId) -> &mut CheckStats {
        if !self.rows.contains_key(check) {
            self.order.push(check.clone());
        }
        self.rows.entry(check.clone()).or_default()
    }

    /// Returns the stats row for `check`, if it has been considered.
    #[must_use]
    pub fn row(&self, check: &CheckId) -> Option<&CheckStats> {
        self.rows.get(check)
    }

    /// Starts timing one provider-call iteration for `check`.
    #[must_use]
    pub fn record_iteration_start(&mut self, check: &CheckId) -> IterationHandle {
        let index = self.order.iter().position(|id| id == check).unwrap_or_else(|| {
            self.order.push(check.clone());
            self.order.len() - 1
        });
        self.rows.entry(check.clone()).or_default();
        IterationHandle {
            check: CheckIdSlot(index),
            started_at: Instant::now(),
        }
    }

    /// Completes an iteration started by `handle`: updates counts, durations,
    /// issue-by-severity buckets, and `outputs_produced` (spec §4.7).
    pub fn record_iteration_complete(
        &mut self,
        handle: IterationHandle,
        success: bool,
        provider_elapsed: Duration,
        issues: &[super::issue::Issue],
        output_defined: bool,
    ) {
        let Some(check) = self.order.get(handle.check.0).cloned() else {
            return;
        };
        let elapsed = handle.started_at.elapsed();
        let row = self.rows.entry(check).or_default();
        row.clear_skip();
        row.total_runs += 1;
        if success {
            row.successful_runs += 1;
        } else {
            row.failed_runs += 1;
        }
        row.total_duration_ms += u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        row.provider_duration_ms += u64::try_from(provider_elapsed.as_millis()).unwrap_or(u64::MAX);
        row.per_iteration_duration_ms.push(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
        row.issues_found += u32::try_from(issues.len()).unwrap_or(u32::MAX);
        for issue in issues {
            *row.issues_by_severity.entry(issue.severity.as_str().to_string()).or_insert(0) += 1;
        }
        if output_defined {
            row.outputs_produced += 1;
        }
        if let Some(issue) = issues.iter().find(|issue| issue.severity.is_soft_failing()) {
            row.error_message = Some(issue.message.clone());
        }
    }

    /// Total executions across every considered check (spec §8:
    /// `statistics.totalExecutions == sum(stats[id].totalRuns)`).
    #[must_use]
    pub fn total_executions(&self) -> u32 {
        self.rows.values().map(|row| row.total_runs).sum()
    }

    /// Iterates `(checkId, stats)` pairs in first-considered order.
    pub fn iter(&self) -> impl Iterator<Item = (&CheckId, &CheckStats)> {
        self.order.iter().filter_map(move |id| self.rows.get(id).map(|row| (id, row)))
    }
}
