// checkgraph-core/src/model/step_result.rs
// ============================================================================
// Module: Step Results
// Description: The normalized outcome of running one check once.
// Purpose: Provide a single tagged result shape regardless of whether the
//          provider returned a bare value or a structured `{issues, output}`.
// Dependencies: crate::model::issue, serde_json
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::issue::Issue;

/// The normalized outcome of one check execution (spec §3, §9).
///
/// Providers may return a bare value or a `{issues, output}` shape; the
/// provider boundary normalizes both into this single tagged type before the
/// core ever sees a result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepResult {
    /// Issues raised while producing this result.
    #[serde(default)]
    pub issues: Vec<Issue>,
    /// Arbitrary structured output (an array, for `forEach` parents).
    #[serde(default)]
    pub output: JsonValue,
    /// Optional pre-rendered text.
    #[serde(default)]
    pub content: Option<String>,
    /// Marks this result as a `forEach` parent's aggregate.
    #[serde(default)]
    pub is_for_each: bool,
    /// The array the `forEach` parent produced, when `is_for_each` is set.
    #[serde(default)]
    pub for_each_items: Vec<JsonValue>,
    /// Per-index child results, when this result is a `forEach` dependent's aggregate.
    #[serde(default)]
    pub for_each_item_results: Vec<StepResult>,
    /// Per-index fatality mask; `true` means that item is fatal for descendants.
    #[serde(default)]
    pub for_each_fatal_mask: Vec<bool>,
    /// Opaque provider debug metadata, surfaced only when debug mode is on.
    #[serde(default)]
    pub debug: Option<JsonValue>,
    /// Untransformed provider output, when a `transform_js` step ran and
    /// diverged from `output`. `None` means `output` already is the raw
    /// value, which is the common case. Exposed to expressions via the
    /// `outputs_raw` namespace (spec §4.2 `getRaw`).
    #[serde(default)]
    pub raw_output: Option<JsonValue>,
}

impl StepResult {
    /// Wraps a bare provider-returned value as `{issues: [], output: value}`
    /// (spec §4.4 "Normalization").
    #[must_use]
    pub fn from_bare_output(output: JsonValue) -> Self {
        Self {
            output,
            ..Self::default()
        }
    }

    /// Returns `true` iff any issue has severity `error` or `critical`
    /// (spec §4.4 "Soft-failure classification").
    #[must_use]
    pub fn is_soft_failed(&self) -> bool {
        self.issues.iter().any(|issue| issue.severity.is_soft_failing())
    }

    /// Returns `true` iff any issue is gating-fatal (spec §4.5).
    #[must_use]
    pub fn has_gating_fatal_issue(&self) -> bool {
        self.issues.iter().any(Issue::is_gating_fatal)
    }

    /// Returns the untransformed provider output, falling back to `output`
    /// when no separate raw value was recorded.
    #[must_use]
    pub fn raw_output_or_output(&self) -> &JsonValue {
        self.raw_output.as_ref().unwrap_or(&self.output)
    }
}
