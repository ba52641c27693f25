// checkgraph-providers/src/command.rs
// ============================================================================
// Module: Command Provider
// Description: A `Provider` that runs a shell command and optionally
//              post-processes stdout through a sandboxed `transform_js`
//              expression (spec §7 taxonomy: `command/execution_error`,
//              `command/timeout`, `command/transform_js_error`).
// Purpose: Give the engine a real I/O-bound provider for end-to-end tests
//          and demo configs, grounded in the sandbox bridge already used by
//          `if`/`fail_if` evaluation.
// Dependencies: async-trait, checkgraph-core, checkgraph-sandbox, serde_json,
//               tokio
// ============================================================================

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use checkgraph_core::interfaces::DependencyView;
use checkgraph_core::interfaces::ExecContext;
use checkgraph_core::interfaces::Provider;
use checkgraph_core::interfaces::ProviderError;
use checkgraph_core::model::CheckId;
use checkgraph_core::model::Issue;
use checkgraph_core::model::Severity;
use checkgraph_core::model::StepResult;
use checkgraph_sandbox::NullHost;
use checkgraph_sandbox::Value as SandboxValue;
use serde_json::Value as JsonValue;
use tokio::process::Command;
use tokio::time::timeout;

/// Default per-invocation timeout when a step doesn't declare its own.
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// Hard ceiling on captured stdout/stderr, to bound memory on a runaway command.
const MAX_CAPTURED_BYTES: usize = 1024 * 1024;

/// Runs `step_input.command` through the host shell (`sh -c`) and normalizes
/// the result, matching the `command/*` rule ids spec §7 enumerates.
///
/// `step_input` shape:
/// - `command` (string, required): the shell command line.
/// - `timeout_ms` (number, optional): overrides [`DEFAULT_TIMEOUT_MS`].
/// - `transform_js` (string, optional): a sandbox expression evaluated with
///   `output` bound to parsed-JSON stdout (falling back to the raw string),
///   whose return value replaces `output`; a thrown/parse failure here
///   raises `command/transform_js_error`, not a hard provider error.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandProvider;

impl CommandProvider {
    /// Creates a new command provider. There is no configuration to carry;
    /// per-step behavior is entirely driven by `step_input`.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Provider for CommandProvider {
    async fn execute(
        &self,
        check_id: &CheckId,
        step_input: &JsonValue,
        _dep_view: &DependencyView,
        exec_ctx: &ExecContext,
    ) -> Result<StepResult, ProviderError> {
        let command_line = step_input
            .get("command")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| ProviderError::Execution("command step requires a `command` string".to_string()))?;
        let timeout_ms = step_input.get("timeout_ms").and_then(JsonValue::as_u64).unwrap_or(DEFAULT_TIMEOUT_MS);

        let child = Command::new("sh").arg("-c").arg(command_line).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped()).spawn();

        let mut child = match child {
            Ok(child) => child,
            Err(err) => return Ok(execution_error_result(check_id, &err.to_string())),
        };

        let wait = timeout(Duration::from_millis(timeout_ms), child.wait_with_output()).await;
        let output = match wait {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => return Ok(execution_error_result(check_id, &err.to_string())),
            Err(_) => return Ok(timeout_result(check_id, timeout_ms)),
        };

        let stdout = truncate_utf8(&output.stdout, MAX_CAPTURED_BYTES);
        let stderr = truncate_utf8(&output.stderr, MAX_CAPTURED_BYTES);

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            return Ok(execution_error_result(check_id, &format!("command exited with status {code}: {stderr}")));
        }

        let raw_output: JsonValue = serde_json::from_str(&stdout).unwrap_or_else(|_| JsonValue::String(stdout.clone()));

        let Some(transform) = step_input.get("transform_js").and_then(JsonValue::as_str) else {
            return Ok(StepResult {
                content: Some(stdout),
                output: raw_output,
                debug: exec_ctx.provider_debug.then(|| JsonValue::String(stderr)),
                ..StepResult::default()
            });
        };

        let mut globals = BTreeMap::new();
        globals.insert("output".to_string(), SandboxValue::from_json(&raw_output));
        let mut host = NullHost;
        match checkgraph_sandbox::eval_expr(transform, globals, &mut host) {
            Ok(transformed) => {
                let transformed_json = transformed.into_json().unwrap_or(JsonValue::Null);
                Ok(StepResult {
                    content: Some(stdout),
                    output: transformed_json,
                    raw_output: Some(raw_output),
                    ..StepResult::default()
                })
            }
            Err(err) => Ok(transform_error_result(check_id, &raw_output, &err.to_string())),
        }
    }
}

// ============================================================================
// SECTION: Error Result Builders
// ============================================================================

fn execution_error_result(check_id: &CheckId, message: &str) -> StepResult {
    StepResult {
        issues: vec![Issue::namespaced(check_id, "command/execution_error", Severity::Error, message)],
        ..StepResult::default()
    }
}

fn timeout_result(check_id: &CheckId, timeout_ms: u64) -> StepResult {
    StepResult {
        issues: vec![Issue::namespaced(
            check_id,
            "command/timeout",
            Severity::Error,
            format!("command timed out after {timeout_ms}ms"),
        )],
        ..StepResult::default()
    }
}

fn transform_error_result(check_id: &CheckId, raw_output: &JsonValue, message: &str) -> StepResult {
    StepResult {
        issues: vec![Issue::namespaced(check_id, "command/transform_js_error", Severity::Error, message)],
        raw_output: Some(raw_output.clone()),
        ..StepResult::default()
    }
}

/// Truncates `bytes` to at most `limit` bytes on a UTF-8 boundary and
/// lossily converts to a string, so a runaway command can't blow memory.
fn truncate_utf8(bytes: &[u8], limit: usize) -> String {
    let slice = if bytes.len() > limit { &bytes[..limit] } else { bytes };
    String::from_utf8_lossy(slice).into_owned()
}

#[cfg(test)]
mod tests {
    use checkgraph_core::model::EventTrigger;
    use checkgraph_core::model::OutputsHistory;
    use checkgraph_core::model::ScopePath;

    use super::*;

    fn exec_ctx() -> ExecContext {
        ExecContext {
            session_id: checkgraph_core::model::next_session_id(),
            reuse_session_id: None,
            test_mode: true,
            provider_debug: false,
            outputs_history: std::sync::Arc::new(OutputsHistory::new()),
        }
    }

    fn dep_view() -> DependencyView {
        DependencyView {
            outputs: BTreeMap::new(),
            outputs_raw: BTreeMap::new(),
            scope: ScopePath::root(),
            event: EventTrigger::Manual,
        }
    }

    #[tokio::test]
    async fn runs_successful_command() {
        let provider = CommandProvider::new();
        let result = provider
            .execute(&CheckId::new("shell"), &serde_json::json!({"command": "echo hello"}), &dep_view(), &exec_ctx())
            .await
            .expect("spawn should succeed");
        assert!(result.issues.is_empty());
        assert_eq!(result.output, JsonValue::String("hello".to_string()));
    }

    #[tokio::test]
    async fn nonzero_exit_is_execution_error() {
        let provider = CommandProvider::new();
        let result = provider
            .execute(&CheckId::new("shell"), &serde_json::json!({"command": "exit 7"}), &dep_view(), &exec_ctx())
            .await
            .expect("spawn should succeed");
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].rule_id, "shell/command/execution_error");
        assert!(result.issues[0].is_gating_fatal());
    }

    #[tokio::test]
    async fn timeout_is_reported_as_gating_fatal() {
        let provider = CommandProvider::new();
        let result = provider
            .execute(&CheckId::new("shell"), &serde_json::json!({"command": "sleep 5", "timeout_ms": 20}), &dep_view(), &exec_ctx())
            .await
            .expect("spawn should succeed");
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].rule_id, "shell/command/timeout");
        assert!(result.issues[0].is_gating_fatal());
    }

    #[tokio::test]
    async fn transform_js_reshapes_output() {
        let provider = CommandProvider::new();
        let result = provider
            .execute(
                &CheckId::new("shell"),
                &serde_json::json!({"command": "echo '{\"n\": 3}'", "transform_js": "output.n * 2"}),
                &dep_view(),
                &exec_ctx(),
            )
            .await
            .expect("spawn should succeed");
        assert!(result.issues.is_empty());
        assert_eq!(result.output, serde_json::json!(6.0));
    }

    #[tokio::test]
    async fn transform_js_syntax_error_is_gating_fatal() {
        let provider = CommandProvider::new();
        let result = provider
            .execute(&CheckId::new("shell"), &serde_json::json!({"command": "echo hi", "transform_js": "((("}), &dep_view(), &exec_ctx())
            .await
            .expect("spawn should succeed");
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].rule_id, "shell/command/transform_js_error");
        assert!(result.issues[0].is_gating_fatal());
    }
}
