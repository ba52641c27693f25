// checkgraph-core/src/model/check_config.rs
// ============================================================================
// Module: Check Configuration
// Description: Static, per-step configuration as loaded from a config
//              document (spec §3, §6).
// Purpose: Describe one declarative check/step: its dependencies, gating
//          expressions, fan-out mode, and routing hooks.
// Dependencies: crate::model::{ids, event}, serde_json
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map as JsonMap;
use serde_json::Value as JsonValue;

use super::event::EventTrigger;
use super::ids::CheckId;

/// A single `depends_on` entry: either a concrete check id or a pipe-joined
/// OR-group (`"a|b|c"`), satisfied if any branch is satisfiable (spec §4.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyToken(String);

impl DependencyToken {
    /// Wraps a raw dependency token as written in config.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Splits the token on `|` into its OR-group branches, each trimmed.
    #[must_use]
    pub fn branches(&self) -> Vec<CheckId> {
        self.0.split('|').map(str::trim).filter(|s| !s.is_empty()).map(CheckId::new).collect()
    }

    /// Returns the raw token text, for error messages.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Controls how a routed/forward-scheduled target fans over a `forEach`
/// parent's items (spec §3, §4.4 step 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanoutMode {
    /// One instance per parent item (the default for plain dependents).
    #[default]
    Default,
    /// Forces one forward run per item under the parent's item scope.
    Map,
    /// Forces a single forward run over the full aggregate, at root scope.
    Reduce,
}

/// Backoff shape for `on_fail` retries (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffMode {
    /// `delay = base_ms` on every attempt.
    #[default]
    Fixed,
    /// `delay = base_ms * 2^(attempt-1)`.
    Exponential,
}

/// Retry policy attached to a step's `on_fail` hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retry attempts; `0` disables retrying.
    #[serde(default)]
    pub max: u32,
    /// Base delay in milliseconds before jitter/backoff is applied.
    #[serde(default)]
    pub base_ms: u64,
    /// Backoff growth mode.
    #[serde(default)]
    pub mode: BackoffMode,
}

/// One routing hook (`on_success`, `on_fail`, or `on_finish`).
///
/// `retry` is only consulted when this hook is the `on_fail` hook of its
/// owning [`CheckConfig`]; it is accepted on all three for schema uniformity
/// but ignored elsewhere, matching the source's duck-typed hook shape
/// normalized at load time (spec §9).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingHook {
    /// Statically listed check ids to run.
    #[serde(default)]
    pub run: Vec<CheckId>,
    /// Sandboxed expression returning a check id or list of ids to run.
    #[serde(default)]
    pub run_js: Option<String>,
    /// Statically targeted check id to forward-schedule.
    #[serde(default)]
    pub goto: Option<CheckId>,
    /// Sandboxed expression returning a goto target.
    #[serde(default)]
    pub goto_js: Option<String>,
    /// Event to re-target the forward run under, overriding the current event.
    #[serde(default)]
    pub goto_event: Option<EventTrigger>,
    /// Retry policy; meaningful only on an `on_fail` hook.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl RoutingHook {
    /// Returns `true` when this hook declares no work at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.run.is_empty()
            && self.run_js.is_none()
            && self.goto.is_none()
            && self.goto_js.is_none()
    }
}

/// Static, per-step configuration (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Unique id within the config document.
    pub id: CheckId,
    /// Provider kind; opaque to the core.
    #[serde(rename = "type")]
    pub provider_type: String,
    /// Ordered dependency tokens (single ids or OR-groups).
    #[serde(default)]
    pub depends_on: Vec<DependencyToken>,
    /// Event triggers this check runs under. Empty = any event.
    #[serde(default)]
    pub on: BTreeSet<EventTrigger>,
    /// Gating expression; evaluation errors are fail-secure (skip).
    #[serde(default)]
    pub r#if: Option<String>,
    /// Expression evaluated on the result to synthesize a soft failure.
    #[serde(default)]
    pub fail_if: Option<String>,
    /// When true, `output` must be an array; each element gets a per-item scope.
    #[serde(default)]
    pub for_each: bool,
    /// Controls how routed targets fan over a `forEach` parent's items.
    #[serde(default)]
    pub fanout: FanoutMode,
    /// Free-form tags; `one_shot` forbids re-execution within a run.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// When true, dependents are not gated by this step's fatality.
    #[serde(default)]
    pub continue_on_failure: bool,
    /// Maximum executions per `(step, scope)`; `None` = unbounded.
    #[serde(default)]
    pub max_runs: Option<u32>,
    /// Hook evaluated after a non-soft-failed, non-suppressed success.
    #[serde(default)]
    pub on_success: RoutingHook,
    /// Hook evaluated on soft failure or thrown provider error.
    #[serde(default)]
    pub on_fail: RoutingHook,
    /// Hook evaluated once per run, after the wave loop, for `forEach` parents.
    #[serde(default)]
    pub on_finish: RoutingHook,
    /// Provider-specific fields, passed through opaquely (spec §6).
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

impl CheckConfig {
    /// Returns `true` if this check carries the `one_shot` tag.
    #[must_use]
    pub fn is_one_shot(&self) -> bool {
        self.tags.contains("one_shot")
    }

    /// Returns `true` if `event` is eligible to run this check (`on` empty
    /// means "any event").
    #[must_use]
    pub fn eligible_for_event(&self, event: EventTrigger) -> bool {
        self.on.is_empty() || self.on.contains(&event)
    }
}
