// checkgraph-core/src/model/issue.rs
// ============================================================================
// Module: Issues
// Description: Structured findings attached to a step's result.
// Purpose: Carry file/line/severity/rule metadata for a single finding,
//          namespaced by the producing check (spec §6).
// Dependencies: crate::model::ids, serde_json
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::ids::CheckId;

/// Severity of a single [`Issue`].
///
/// Ordered `Info < Warning < Error < Critical` so stats aggregation can bucket
/// and compare severities directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational; never gating.
    Info,
    /// Worth surfacing but not failing.
    Warning,
    /// A soft failure (spec §4.4: soft-failed iff any issue is `error` or `critical`).
    Error,
    /// A soft failure promoted for recognized auth/rate-limit patterns (spec §7).
    Critical,
}

impl Severity {
    /// Returns `true` for the two severities that mark a step soft-failed.
    #[must_use]
    pub const fn is_soft_failing(self) -> bool {
        matches!(self, Self::Error | Self::Critical)
    }

    /// Returns the serialized snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

/// A single structured finding produced by a check.
///
/// `rule_id` is always namespaced by the producing check (`<checkId>/<localId>`)
/// per spec §6; callers constructing an issue for check `X` should pass
/// `rule_id` already prefixed, e.g. via [`Issue::namespaced`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// File path the issue refers to, if any.
    pub file: Option<String>,
    /// Line number, if any.
    pub line: Option<u32>,
    /// End line for a multi-line span, if any.
    pub end_line: Option<u32>,
    /// Severity of the finding.
    pub severity: Severity,
    /// Namespaced rule identifier (`<checkId>/<localId>`).
    pub rule_id: String,
    /// Human-readable message.
    pub message: String,
    /// Free-form category tag.
    pub category: Option<String>,
    /// Display name of the producing check.
    pub check_name: String,
    /// Optional output group this issue belongs to.
    pub group: Option<String>,
    /// Optional rendering schema identifier.
    pub schema: Option<String>,
    /// Optional rendering template identifier.
    pub template: Option<String>,
    /// Wall-clock time the issue was recorded, as an opaque caller-supplied value.
    pub timestamp: Option<String>,
    /// Optional human-facing suggestion.
    pub suggestion: Option<String>,
    /// Optional machine-applicable replacement payload.
    pub replacement: Option<JsonValue>,
}

impl Issue {
    /// Builds an issue with a namespaced `rule_id` and the remaining fields
    /// defaulted, for the common case of a synthesized engine-level finding
    /// (`limits/max_runs_exceeded`, `<check>/__skipped`, etc).
    #[must_use]
    pub fn namespaced(check: &CheckId, local_rule_id: &str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            file: None,
            line: None,
            end_line: None,
            severity,
            rule_id: format!("{check}/{local_rule_id}"),
            message: message.into(),
            category: None,
            check_name: check.to_string(),
            group: None,
            schema: None,
            template: None,
            timestamp: None,
            suggestion: None,
            replacement: None,
        }
    }

    /// Returns `true` iff this issue's `rule_id` matches the "gating-fatal"
    /// rule set from spec §4.5: command errors, forEach iteration errors, or
    /// any `fail_if`-triggered rule. Generic severity-only errors are *not*
    /// gating-fatal; they propagate but don't stop dependents.
    #[must_use]
    pub fn is_gating_fatal(&self) -> bool {
        const FATAL_RULE_SUFFIXES: &[&str] = &[
            "command/execution_error",
            "command/timeout",
            "command/transform_js_error",
            "command/transform_error",
            "forEach/undefined_output",
        ];
        if self.rule_id.ends_with("/forEach/iteration_error") {
            return true;
        }
        if self.rule_id.ends_with("_fail_if") || self.rule_id.ends_with("/global_fail_if") {
            return true;
        }
        FATAL_RULE_SUFFIXES.iter().any(|suffix| self.rule_id.ends_with(suffix))
    }
}
