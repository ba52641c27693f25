// checkgraph-core/src/runtime/sandbox_bridge.rs
// ============================================================================
// Module: Sandbox Bridge
// Description: Wires checkgraph-sandbox's `Host` trait to the engine's
//              memory interface, and assembles the fixed expression
//              namespace described in spec §4.4.
// Purpose: Keep namespace construction in one place so `if`, `fail_if`,
//          `run_js`, and `goto_js` all see an identical shape.
// Dependencies: checkgraph-sandbox, crate::{interfaces, model}, serde_json
// ============================================================================

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use checkgraph_sandbox::Host;
use checkgraph_sandbox::Value;
use serde_json::Value as JsonValue;

use crate::interfaces::Memory;
use crate::model::CheckId;
use crate::model::EventTrigger;
use crate::model::OutputsHistory;

// ============================================================================
// SECTION: Permission Policy
// ============================================================================

/// Evaluates `permissions.*` helper calls (spec §4.4). The core treats
/// permission names as opaque strings; policy is entirely the host
/// application's concern.
pub trait PermissionPolicy: Send + Sync {
    /// Returns the result of `permissions.<name>(args...)`.
    fn check(&self, name: &str, args: &[JsonValue]) -> bool;
}

/// A [`PermissionPolicy`] that denies every check, matching the fail-secure
/// default when no policy is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAllPermissions;

impl PermissionPolicy for DenyAllPermissions {
    fn check(&self, _name: &str, _args: &[JsonValue]) -> bool {
        false
    }
}

// ============================================================================
// SECTION: Engine Host
// ============================================================================

/// The default memory namespace checks write to when no namespace is given
/// explicitly by the provider/config.
const DEFAULT_MEMORY_NAMESPACE: &str = "default";

/// Bridges `memory.*` and `permissions.*` sandbox calls to the engine's
/// [`Memory`] and [`PermissionPolicy`] collaborators (spec §4.4, §9).
pub struct EngineHost<'a> {
    memory: &'a dyn Memory,
    permissions: &'a dyn PermissionPolicy,
    namespace: String,
}

impl<'a> EngineHost<'a> {
    /// Builds a host bridging `memory`/`permissions` for one evaluation.
    #[must_use]
    pub fn new(memory: &'a dyn Memory, permissions: &'a dyn PermissionPolicy) -> Self {
        Self {
            memory,
            permissions,
            namespace: DEFAULT_MEMORY_NAMESPACE.to_string(),
        }
    }
}

impl Host for EngineHost<'_> {
    fn memory_get(&self, key: &str) -> Value {
        self.memory.get(&self.namespace, key).ok().map_or(Value::Null, |v| Value::from_json(&v))
    }

    fn memory_has(&self, key: &str) -> bool {
        self.memory.has(&self.namespace, key).unwrap_or(false)
    }

    fn memory_list(&self) -> Vec<String> {
        self.memory.list(&self.namespace).unwrap_or_default()
    }

    fn memory_get_all(&self) -> Value {
        self.memory.get_all(&self.namespace).ok().map_or_else(|| Value::Object(BTreeMap::new()), |v| Value::from_json(&v))
    }

    fn memory_set(&mut self, key: &str, value: Value) {
        if let Ok(json) = value.into_json() {
            let _ = self.memory.set(&self.namespace, key, json);
        }
    }

    fn memory_increment(&mut self, key: &str, by: f64) -> f64 {
        self.memory.increment(&self.namespace, key, by).unwrap_or(0.0)
    }

    fn permission_check(&self, name: &str, args: &[Value]) -> Value {
        let json_args: Vec<JsonValue> = args.iter().filter_map(|v| v.clone().into_json().ok()).collect();
        Value::Bool(self.permissions.check(name, &json_args))
    }
}

// ============================================================================
// SECTION: Namespace Construction
// ============================================================================

/// `step{id,tags,group}` plus `attempt`/`loop`/`error` scalars (spec §4.4).
#[derive(Debug, Clone, Default)]
pub struct StepContext {
    /// The check being evaluated.
    pub id: CheckId,
    /// The check's declared tags.
    pub tags: BTreeSet<String>,
    /// The check's output group, if any.
    pub group: Option<String>,
    /// 1-based attempt number within the current routing loop.
    pub attempt: u32,
    /// Run-wide routing loop counter at evaluation time.
    pub loop_count: u32,
    /// The most recent error message for this step, if any.
    pub error: Option<String>,
}

/// `foreach{index,total,parent}` (spec §4.4, §4.5), present only for
/// per-item evaluations.
#[derive(Debug, Clone)]
pub struct ForEachContext {
    /// Index of the current item.
    pub index: usize,
    /// Total item count.
    pub total: usize,
    /// The `forEach` parent's check id.
    pub parent: CheckId,
}

/// Everything needed to assemble the fixed expression namespace for one
/// sandbox evaluation (spec §4.4's enumerated scope object).
#[derive(Debug, Clone, Default)]
pub struct NamespaceContext {
    /// `step{...}`.
    pub step: StepContext,
    /// `foreach{...}`, when evaluating within a fan-out item scope.
    pub foreach: Option<ForEachContext>,
    /// `outputs.<id>`: transformed outputs visible at the current scope.
    pub outputs: BTreeMap<String, JsonValue>,
    /// `outputs_raw.<id>`: untransformed provider outputs at the current scope.
    pub outputs_raw: BTreeMap<String, JsonValue>,
    /// `output`: the current step's own output (only set for `fail_if`).
    pub output: Option<JsonValue>,
    /// `pr`: pull-request context, if the run has one.
    pub pr: Option<JsonValue>,
    /// `files`: changed-file list, if known.
    pub files: Option<JsonValue>,
    /// `env`: filtered safe environment variables.
    pub env: BTreeMap<String, String>,
    /// `event{name}`.
    pub event: Option<EventTrigger>,
}

impl NamespaceContext {
    /// Assembles the sandbox global scope object from this context plus the
    /// run's [`OutputsHistory`] (spec §4.4).
    #[must_use]
    pub fn to_globals(&self, history: &OutputsHistory) -> BTreeMap<String, Value> {
        let mut globals = BTreeMap::new();

        let mut step = BTreeMap::new();
        step.insert("id".to_string(), Value::Str(self.step.id.to_string()));
        step.insert("tags".to_string(), Value::Array(self.step.tags.iter().map(|t| Value::Str(t.clone())).collect()));
        step.insert("group".to_string(), self.step.group.clone().map_or(Value::Null, Value::Str));
        globals.insert("step".to_string(), Value::Object(step));

        globals.insert("attempt".to_string(), Value::Number(f64::from(self.step.attempt)));
        globals.insert("loop".to_string(), Value::Number(f64::from(self.step.loop_count)));
        globals.insert("error".to_string(), self.step.error.clone().map_or(Value::Null, Value::Str));

        if let Some(foreach) = &self.foreach {
            let mut fe = BTreeMap::new();
            #[allow(clippy::cast_precision_loss, reason = "Item counts fit comfortably in f64's exact integer range.")]
            {
                fe.insert("index".to_string(), Value::Number(foreach.index as f64));
                fe.insert("total".to_string(), Value::Number(foreach.total as f64));
            }
            fe.insert("parent".to_string(), Value::Str(foreach.parent.to_string()));
            globals.insert("foreach".to_string(), Value::Object(fe));
        }

        globals.insert("outputs".to_string(), json_map_to_value(&self.outputs));
        globals.insert("outputs_raw".to_string(), json_map_to_value(&self.outputs_raw));
        let history_map = history.to_json_map();
        let history_value: BTreeMap<String, Value> =
            history_map.into_iter().map(|(id, outs)| (id, Value::Array(outs.iter().map(Value::from_json).collect()))).collect();
        globals.insert("outputs_history".to_string(), Value::Object(history_value));

        if let Some(output) = &self.output {
            globals.insert("output".to_string(), Value::from_json(output));
        }
        globals.insert("pr".to_string(), self.pr.as_ref().map_or(Value::Null, Value::from_json));
        globals.insert("files".to_string(), self.files.as_ref().map_or(Value::Null, Value::from_json));

        let env_map: BTreeMap<String, Value> = self.env.iter().map(|(k, v)| (k.clone(), Value::Str(v.clone()))).collect();
        globals.insert("env".to_string(), Value::Object(env_map));

        let mut event_map = BTreeMap::new();
        event_map.insert("name".to_string(), self.event.map_or(Value::Null, |e| Value::Str(e.to_string())));
        globals.insert("event".to_string(), Value::Object(event_map));

        globals
    }
}

fn json_map_to_value(map: &BTreeMap<String, JsonValue>) -> Value {
    Value::Object(map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect())
}
