// checkgraph-core/src/interfaces/mod.rs
// ============================================================================
// Module: Checkgraph Interfaces
// Description: Backend-agnostic interfaces for providers, memory, templates,
//              analysis, and telemetry (spec §4.6, §9).
// Purpose: Define the contract surfaces the scheduler and routing engine call
//          through; none of these may call back into the scheduler.
// Dependencies: async-trait, crate::model, serde_json
// ============================================================================

//! ## Overview
//! The core never runs a step itself: it calls out to a [`Provider`] through
//! a narrow, async, normalized contract, and to three further narrow
//! interfaces ([`Memory`], [`Templater`], [`Analyzer`]) plus a no-op-safe
//! [`Telemetry`] sink. Implementations must be deterministic from the core's
//! point of view and must never call back into the scheduler.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::model::CheckId;
use crate::model::EventTrigger;
use crate::model::OutputsHistory;
use crate::model::ScopePath;
use crate::model::SessionId;
use crate::model::StepResult;

// ============================================================================
// SECTION: Provider
// ============================================================================

/// Execution context passed to a [`Provider`] call (spec §4.6).
#[derive(Debug, Clone)]
pub struct ExecContext {
    /// The run this execution belongs to.
    pub session_id: SessionId,
    /// Optional parent/reuse session id, for AI-session continuity across
    /// steps that share an upstream conversational session.
    pub reuse_session_id: Option<String>,
    /// `true` when running under the CLI/test harness rather than production.
    pub test_mode: bool,
    /// `true` when provider-level debug metadata should be captured.
    pub provider_debug: bool,
    /// Read-only reference to the run's accumulated outputs history, exposed
    /// so a provider's own template rendering can see prior waves.
    pub outputs_history: std::sync::Arc<OutputsHistory>,
}

/// Snapshot of a step's dependency visibility, handed to a provider call.
///
/// This is a plain, already-resolved projection (spec §4.2's `ContextView`
/// collapsed to owned data) so providers never need to know about the
/// journal or snapshot tokens.
#[derive(Debug, Clone, Default)]
pub struct DependencyView {
    /// Transformed outputs, keyed by check id (`outputs.<id>`).
    pub outputs: BTreeMap<String, JsonValue>,
    /// Untransformed provider outputs, keyed by check id (`outputs_raw.<id>`).
    pub outputs_raw: BTreeMap<String, JsonValue>,
    /// The scope this view was resolved for.
    pub scope: ScopePath,
    /// The event the current run is evaluating against.
    pub event: EventTrigger,
}

/// Errors a [`Provider`] call may surface to the routing engine.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider threw during execution (spec §4.4 "hard failure").
    #[error("provider execution failed: {0}")]
    Execution(String),
    /// The provider call exceeded its own timeout.
    #[error("provider call timed out")]
    Timeout,
    /// No provider is registered for the step's `type`.
    #[error("no provider registered for type: {0}")]
    UnknownType(String),
}

/// Backend-agnostic contract for the thing that actually runs a step: an AI
/// call, a shell command, an HTTP request, a log write, or human input
/// (spec §1 "Deliberately OUT of scope").
#[async_trait]
pub trait Provider: Send + Sync {
    /// Executes one step attempt.
    ///
    /// `check_id` is the id of the check this attempt belongs to, so a
    /// provider can namespace its own issues the way `Issue::namespaced`
    /// does (`<checkId>/<localId>`, spec §6 "Issue record") without having
    /// to know its own config ahead of time.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on hard failure; soft failures are expressed
    /// as `Ok` results carrying `error`/`critical` issues (spec §4.4).
    async fn execute(
        &self,
        check_id: &CheckId,
        step_input: &JsonValue,
        dep_view: &DependencyView,
        exec_ctx: &ExecContext,
    ) -> Result<StepResult, ProviderError>;

    /// Optionally seeds webhook/event context ahead of execution. Most
    /// providers are no-ops here; AI providers may use it to prime a session.
    fn set_webhook_context(&self, _context: &JsonValue) {}
}

/// Registry resolving a [`Provider`] by a step's `type` field.
pub trait ProviderRegistry: Send + Sync {
    /// Returns the provider registered for `provider_type`, if any.
    fn resolve(&self, provider_type: &str) -> Option<std::sync::Arc<dyn Provider>>;
}

// ============================================================================
// SECTION: Memory
// ============================================================================

/// Memory store errors.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The backing store reported an error.
    #[error("memory store error: {0}")]
    Backend(String),
}

/// Narrow interface to the persistent memory store referenced by `memory.*`
/// sandbox calls (spec §1 "Deliberately OUT of scope": "Persistent memory
/// store (accessed only through a narrow interface)").
pub trait Memory: Send + Sync {
    /// Reads `key` from `namespace`, or `Null` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError`] if the backend fails.
    fn get(&self, namespace: &str, key: &str) -> Result<JsonValue, MemoryError>;

    /// Returns `true` if `key` exists in `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError`] if the backend fails.
    fn has(&self, namespace: &str, key: &str) -> Result<bool, MemoryError>;

    /// Lists known keys in `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError`] if the backend fails.
    fn list(&self, namespace: &str) -> Result<Vec<String>, MemoryError>;

    /// Reads the full `namespace` as an object.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError`] if the backend fails.
    fn get_all(&self, namespace: &str) -> Result<JsonValue, MemoryError>;

    /// Writes `key` in `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError`] if the backend fails.
    fn set(&self, namespace: &str, key: &str, value: JsonValue) -> Result<(), MemoryError>;

    /// Increments a numeric `key` in `namespace` by `by`, returning the new value.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError`] if the backend fails.
    fn increment(&self, namespace: &str, key: &str, by: f64) -> Result<f64, MemoryError>;
}

// ============================================================================
// SECTION: Templater
// ============================================================================

/// Template rendering errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Rendering failed; surfaced as a synthetic issue, not a thrown error
    /// (spec §7: "Template/render errors yield a synthetic issue ... without
    /// failing the run").
    #[error("template render error: {0}")]
    Render(String),
}

/// Renders a step's `content` from its issues/output (spec §1, §4.6).
pub trait Templater: Send + Sync {
    /// Renders `result` for `check` into display text.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] when rendering fails.
    fn render(&self, check: &CheckId, result: &StepResult) -> Result<String, TemplateError>;
}

// ============================================================================
// SECTION: Analyzer
// ============================================================================

/// Context elevation errors.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// The analyzer could not elevate the context.
    #[error("context elevation failed: {0}")]
    Elevation(String),
}

/// Elevates issue-thread context to PR-diff context for a given event
/// (spec §4.4 `goto_event` "context elevation").
pub trait Analyzer: Send + Sync {
    /// Elevates `context` (an issue-thread view) into PR-diff context.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyzerError`] if elevation is not possible for this event.
    fn elevate(&self, context: &JsonValue, target_event: EventTrigger) -> Result<JsonValue, AnalyzerError>;
}

// ============================================================================
// SECTION: Telemetry
// ============================================================================

/// Emits spans/events for a run; implementations must be no-op safe, since
/// telemetry failures must never affect scheduling (spec §4.6, §9).
pub trait Telemetry: Send + Sync {
    /// Emits a named span event with structured attributes.
    fn emit_span(&self, name: &str, attributes: &JsonValue);
}

/// A [`Telemetry`] sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetry;

impl Telemetry for NullTelemetry {
    fn emit_span(&self, _name: &str, _attributes: &JsonValue) {}
}
