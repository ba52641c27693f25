// checkgraph-cli/src/collaborators.rs
// ============================================================================
// Module: CLI Collaborators
// Description: Minimal, in-process implementations of the engine's narrow
//              host interfaces (`Memory`, `Templater`, `Analyzer`), trimmed
//              to what a single CLI invocation needs.
// Purpose: Let `checkgraph run` drive `WaveScheduler` without pulling in a
//          database, a PR-diff analyzer, or a real template engine — none
//          of those are specified by the core (spec §1 "Deliberately OUT of
//          scope").
// Dependencies: checkgraph-core, serde_json, std::sync
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;

use checkgraph_core::interfaces::Analyzer;
use checkgraph_core::interfaces::AnalyzerError;
use checkgraph_core::interfaces::Memory;
use checkgraph_core::interfaces::MemoryError;
use checkgraph_core::interfaces::Templater;
use checkgraph_core::model::CheckId;
use checkgraph_core::model::EventTrigger;
use checkgraph_core::model::StepResult;
use serde_json::Value as JsonValue;

/// A process-local, non-persistent `namespace -> key -> value` memory store.
/// Matches spec §1's "Persistent memory store (accessed only through a
/// narrow interface)" contract without actually persisting anything across
/// CLI invocations — durable memory is a host concern beyond this crate.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    namespaces: Mutex<BTreeMap<String, BTreeMap<String, JsonValue>>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Memory for InMemoryStore {
    fn get(&self, namespace: &str, key: &str) -> Result<JsonValue, MemoryError> {
        let namespaces = self.namespaces.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(namespaces.get(namespace).and_then(|ns| ns.get(key)).cloned().unwrap_or(JsonValue::Null))
    }

    fn has(&self, namespace: &str, key: &str) -> Result<bool, MemoryError> {
        let namespaces = self.namespaces.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(namespaces.get(namespace).is_some_and(|ns| ns.contains_key(key)))
    }

    fn list(&self, namespace: &str) -> Result<Vec<String>, MemoryError> {
        let namespaces = self.namespaces.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(namespaces.get(namespace).map(|ns| ns.keys().cloned().collect()).unwrap_or_default())
    }

    fn get_all(&self, namespace: &str) -> Result<JsonValue, MemoryError> {
        let namespaces = self.namespaces.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let map = namespaces.get(namespace).cloned().unwrap_or_default();
        Ok(JsonValue::Object(map.into_iter().collect()))
    }

    fn set(&self, namespace: &str, key: &str, value: JsonValue) -> Result<(), MemoryError> {
        let mut namespaces = self.namespaces.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        namespaces.entry(namespace.to_string()).or_default().insert(key.to_string(), value);
        Ok(())
    }

    fn increment(&self, namespace: &str, key: &str, by: f64) -> Result<f64, MemoryError> {
        let mut namespaces = self.namespaces.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let entry = namespaces.entry(namespace.to_string()).or_default().entry(key.to_string()).or_insert(JsonValue::from(0.0));
        let current = entry.as_f64().unwrap_or(0.0);
        let updated = current + by;
        *entry = JsonValue::from(updated);
        Ok(updated)
    }
}

/// Renders a step's `content` if the provider already set one, falling back
/// to compact JSON of `output`. A real templating engine (handlebars, Jinja)
/// is a host concern; this is enough to make `checkgraph run` produce
/// readable output without one.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughTemplater;

impl Templater for PassthroughTemplater {
    fn render(&self, _check: &CheckId, result: &StepResult) -> Result<String, checkgraph_core::interfaces::TemplateError> {
        if let Some(content) = &result.content {
            return Ok(content.clone());
        }
        Ok(result.output.to_string())
    }
}

/// An [`Analyzer`] that never elevates context, since issue-to-PR diff
/// elevation requires a real git/PR data source (spec §1 "input acquisition"
/// is an explicit non-goal of the core and this CLI alike).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpAnalyzer;

impl Analyzer for NoOpAnalyzer {
    fn elevate(&self, _context: &JsonValue, target_event: EventTrigger) -> Result<JsonValue, AnalyzerError> {
        Err(AnalyzerError::Elevation(format!("no analyzer configured to elevate context into {target_event}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_store_round_trips_and_increments() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("ns", "k").unwrap(), JsonValue::Null);
        store.set("ns", "k", JsonValue::from(1)).unwrap();
        assert!(store.has("ns", "k").unwrap());
        assert_eq!(store.increment("ns", "counter", 2.0).unwrap(), 2.0);
        assert_eq!(store.increment("ns", "counter", 3.0).unwrap(), 5.0);
        assert_eq!(store.list("ns").unwrap().len(), 2);
    }

    #[test]
    fn templater_prefers_content_over_output() {
        let templater = PassthroughTemplater;
        let result = StepResult {
            content: Some("rendered".to_string()),
            output: JsonValue::from("raw"),
            ..StepResult::default()
        };
        assert_eq!(templater.render(&CheckId::new("x"), &result).unwrap(), "rendered");
    }

    #[test]
    fn analyzer_always_declines() {
        let analyzer = NoOpAnalyzer;
        assert!(analyzer.elevate(&JsonValue::Null, EventTrigger::PrOpened).is_err());
    }
}
