// checkgraph-providers/src/log.rs
// ============================================================================
// Module: Log Provider
// Description: A `Provider` that renders a message template against the
//              step's dependency view and never fails.
// Purpose: Give the engine a trivially-testable provider with no I/O, used
//          throughout the seed scenarios (spec §8) and as a template for
//          hosts writing their own no-op-safe providers.
// Dependencies: async-trait, checkgraph-core, serde_json
// ============================================================================

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use checkgraph_core::interfaces::DependencyView;
use checkgraph_core::interfaces::ExecContext;
use checkgraph_core::interfaces::Provider;
use checkgraph_core::interfaces::ProviderError;
use checkgraph_core::model::CheckId;
use checkgraph_core::model::StepResult;
use serde_json::Value as JsonValue;

// ============================================================================
// SECTION: Provider
// ============================================================================

/// Renders `step_input.message` against `outputs.<id>`/`outputs_raw.<id>`
/// tokens (`{{outputs.foo}}`) and commits the rendered text as both `content`
/// and `output`.
///
/// Unknown tokens render as an empty string rather than failing the step —
/// `log` is meant to be inert scaffolding for DAG/routing tests, not a
/// templating engine in its own right.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProvider;

impl LogProvider {
    /// Creates a new log provider. There is no configuration to carry.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Provider for LogProvider {
    async fn execute(
        &self,
        _check_id: &CheckId,
        step_input: &JsonValue,
        dep_view: &DependencyView,
        _exec_ctx: &ExecContext,
    ) -> Result<StepResult, ProviderError> {
        let template = step_input.get("message").and_then(JsonValue::as_str).unwrap_or("");
        let rendered = render_tokens(template, dep_view);
        Ok(StepResult {
            content: Some(rendered.clone()),
            output: JsonValue::String(rendered),
            ..StepResult::default()
        })
    }
}

// ============================================================================
// SECTION: Token Rendering
// ============================================================================

/// Replaces every `{{outputs.<id>}}` / `{{outputs_raw.<id>}}` token in
/// `template` with the stringified value from `dep_view`, or an empty
/// string when the referenced id isn't visible at this scope.
fn render_tokens(template: &str, dep_view: &DependencyView) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            out.push_str("{{");
            rest = after_open;
            continue;
        };
        let token = after_open[..end].trim();
        out.push_str(&resolve_token(token, dep_view));
        rest = &after_open[end + 2..];
    }
    out.push_str(rest);
    out
}

/// Resolves one `outputs.<id>`/`outputs_raw.<id>` token path to its
/// stringified value, or `""` if absent.
fn resolve_token(token: &str, dep_view: &DependencyView) -> String {
    let map = if let Some(id) = token.strip_prefix("outputs_raw.") {
        dep_view.outputs_raw.get(id)
    } else if let Some(id) = token.strip_prefix("outputs.") {
        dep_view.outputs.get(id)
    } else {
        None
    };
    map.map(stringify).unwrap_or_default()
}

/// Stringifies a JSON value for template interpolation: strings render
/// unquoted, everything else renders as compact JSON.
fn stringify(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use checkgraph_core::model::EventTrigger;

    use super::*;

    fn exec_ctx() -> ExecContext {
        ExecContext {
            session_id: checkgraph_core::model::next_session_id(),
            reuse_session_id: None,
            test_mode: true,
            provider_debug: false,
            outputs_history: std::sync::Arc::new(checkgraph_core::model::OutputsHistory::new()),
        }
    }

    #[tokio::test]
    async fn renders_known_token() {
        let mut outputs = BTreeMap::new();
        outputs.insert("overview".to_string(), JsonValue::String("looks good".to_string()));
        let dep_view = DependencyView {
            outputs,
            outputs_raw: BTreeMap::new(),
            scope: checkgraph_core::model::ScopePath::root(),
            event: EventTrigger::Manual,
        };
        let provider = LogProvider::new();
        let result = provider
            .execute(&CheckId::new("narrate"), &serde_json::json!({"message": "overview said: {{outputs.overview}}"}), &dep_view, &exec_ctx())
            .await
            .expect("log provider never fails");
        assert_eq!(result.output, JsonValue::String("overview said: looks good".to_string()));
        assert_eq!(result.content.as_deref(), Some("overview said: looks good"));
    }

    #[tokio::test]
    async fn unknown_token_renders_empty() {
        let dep_view = DependencyView::default();
        let provider = LogProvider::new();
        let result = provider
            .execute(&CheckId::new("narrate"), &serde_json::json!({"message": "missing: [{{outputs.nope}}]"}), &dep_view, &exec_ctx())
            .await
            .expect("log provider never fails");
        assert_eq!(result.output, JsonValue::String("missing: []".to_string()));
    }

    #[tokio::test]
    async fn missing_message_renders_empty_string() {
        let dep_view = DependencyView::default();
        let provider = LogProvider::new();
        let result = provider.execute(&CheckId::new("narrate"), &serde_json::json!({}), &dep_view, &exec_ctx()).await.expect("log provider never fails");
        assert_eq!(result.output, JsonValue::String(String::new()));
    }
}
