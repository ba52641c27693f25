// checkgraph-core/tests/scenarios.rs
// ============================================================================
// Module: Seed Scenario Tests
// Description: End-to-end `WaveScheduler::execute_grouped_checks` runs over a
//              small, deterministic `Provider` stub — one test per seed
//              scenario: event-gated forward run, on_fail with no cascade,
//              forEach map vs reduce, max_runs cap, OR-group dependency, and
//              cycle detection surfaced through the engine facade.
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use checkgraph_core::errors::EngineError;
use checkgraph_core::interfaces::Analyzer;
use checkgraph_core::interfaces::AnalyzerError;
use checkgraph_core::interfaces::DependencyView;
use checkgraph_core::interfaces::ExecContext;
use checkgraph_core::interfaces::Memory;
use checkgraph_core::interfaces::MemoryError;
use checkgraph_core::interfaces::NullTelemetry;
use checkgraph_core::interfaces::Provider;
use checkgraph_core::interfaces::ProviderError;
use checkgraph_core::interfaces::ProviderRegistry;
use checkgraph_core::interfaces::TemplateError;
use checkgraph_core::interfaces::Templater;
use checkgraph_core::model::CheckConfig;
use checkgraph_core::model::CheckId;
use checkgraph_core::model::DependencyToken;
use checkgraph_core::model::EventTrigger;
use checkgraph_core::model::FanoutMode;
use checkgraph_core::model::Issue;
use checkgraph_core::model::Limits;
use checkgraph_core::model::RoutingConfig;
use checkgraph_core::model::RoutingHook;
use checkgraph_core::model::RunConfig;
use checkgraph_core::model::Severity;
use checkgraph_core::model::StepResult;
use checkgraph_core::model::TagFilter;
use checkgraph_core::runtime::DenyAllPermissions;
use checkgraph_core::runtime::WaveScheduler;
use checkgraph_core::runtime::scheduler::RunInputs;
use serde_json::Value as JsonValue;
use serde_json::json;

// ============================================================================
// SECTION: Test Collaborators
// ============================================================================

/// A provider that returns whatever its `step_input["output"]` field says,
/// or an empty object. Lets each scenario drive outcomes purely through
/// config rather than a bespoke provider per test.
#[derive(Default)]
struct StubProvider {
    calls: Mutex<Vec<CheckId>>,
}

#[async_trait]
impl Provider for StubProvider {
    async fn execute(&self, check_id: &CheckId, step_input: &JsonValue, _dep_view: &DependencyView, _exec_ctx: &ExecContext) -> Result<StepResult, ProviderError> {
        self.calls.lock().unwrap().push(check_id.clone());
        if let Some(err) = step_input.get("error").and_then(JsonValue::as_str) {
            return Err(ProviderError::Execution(err.to_string()));
        }
        let mut result = StepResult::from_bare_output(step_input.get("output").cloned().unwrap_or(JsonValue::Null));
        if step_input.get("soft_fail").and_then(JsonValue::as_bool).unwrap_or(false) {
            result.issues.push(Issue::namespaced(&CheckId::new("stub"), "stub/soft_error", Severity::Error, "soft failure"));
        }
        Ok(result)
    }
}

struct NullMemory;

impl Memory for NullMemory {
    fn get(&self, _namespace: &str, _key: &str) -> Result<JsonValue, MemoryError> {
        Ok(JsonValue::Null)
    }
    fn has(&self, _namespace: &str, _key: &str) -> Result<bool, MemoryError> {
        Ok(false)
    }
    fn list(&self, _namespace: &str) -> Result<Vec<String>, MemoryError> {
        Ok(Vec::new())
    }
    fn get_all(&self, _namespace: &str) -> Result<JsonValue, MemoryError> {
        Ok(json!({}))
    }
    fn set(&self, _namespace: &str, _key: &str, _value: JsonValue) -> Result<(), MemoryError> {
        Ok(())
    }
    fn increment(&self, _namespace: &str, _key: &str, by: f64) -> Result<f64, MemoryError> {
        Ok(by)
    }
}

struct PassthroughTemplater;

impl Templater for PassthroughTemplater {
    fn render(&self, _check: &CheckId, result: &StepResult) -> Result<String, TemplateError> {
        Ok(result.output.to_string())
    }
}

struct NoOpAnalyzer;

impl Analyzer for NoOpAnalyzer {
    fn elevate(&self, _context: &JsonValue, target_event: EventTrigger) -> Result<JsonValue, AnalyzerError> {
        Err(AnalyzerError::Elevation(format!("no analyzer configured for {target_event}")))
    }
}

struct SingleProviderRegistry(Arc<StubProvider>);

impl ProviderRegistry for SingleProviderRegistry {
    fn resolve(&self, provider_type: &str) -> Option<Arc<dyn Provider>> {
        if provider_type == "stub" {
            Some(self.0.clone())
        } else {
            None
        }
    }
}

fn scheduler(provider: Arc<StubProvider>) -> WaveScheduler {
    WaveScheduler::new(
        Arc::new(SingleProviderRegistry(provider)),
        Arc::new(NullMemory),
        Arc::new(PassthroughTemplater),
        Arc::new(NoOpAnalyzer),
        Arc::new(NullTelemetry),
        Arc::new(DenyAllPermissions),
    )
}

/// A provider whose output's `is_valid` flag depends on the forEach item
/// index it was called for (item 0 invalid, every other item valid), used to
/// exercise `dependents_all_valid`'s per-item verdict across a single wave.
struct IndexedValidityProvider;

#[async_trait]
impl Provider for IndexedValidityProvider {
    async fn execute(&self, _check_id: &CheckId, _step_input: &JsonValue, dep_view: &DependencyView, _exec_ctx: &ExecContext) -> Result<StepResult, ProviderError> {
        let index = dep_view.scope.segments().last().map_or(0, |segment| segment.item_index);
        Ok(StepResult::from_bare_output(json!({"is_valid": index != 0})))
    }
}

struct ListAndValidatorRegistry {
    list: Arc<StubProvider>,
    validator: Arc<IndexedValidityProvider>,
}

impl ProviderRegistry for ListAndValidatorRegistry {
    fn resolve(&self, provider_type: &str) -> Option<Arc<dyn Provider>> {
        match provider_type {
            "stub" => Some(self.list.clone()),
            "indexed" => Some(self.validator.clone()),
            _ => None,
        }
    }
}

fn inputs() -> RunInputs {
    RunInputs {
        pr: None,
        files: None,
        env: BTreeMap::new(),
        webhook_context: None,
        test_mode: true,
        provider_debug: false,
        strict_mode: false,
    }
}

fn base_check(id: &str) -> CheckConfig {
    CheckConfig {
        id: CheckId::new(id),
        provider_type: "stub".to_string(),
        depends_on: Vec::new(),
        on: BTreeSet::new(),
        r#if: None,
        fail_if: None,
        for_each: false,
        fanout: FanoutMode::default(),
        tags: BTreeSet::new(),
        continue_on_failure: false,
        max_runs: None,
        on_success: RoutingHook::default(),
        on_fail: RoutingHook::default(),
        on_finish: RoutingHook::default(),
        extra: serde_json::Map::new(),
    }
}

fn extra(value: JsonValue) -> serde_json::Map<String, JsonValue> {
    match value {
        JsonValue::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

fn config(checks: Vec<CheckConfig>) -> RunConfig {
    RunConfig {
        version: "1".to_string(),
        checks: checks.into_iter().map(|c| (c.id.clone(), c)).collect(),
        routing: RoutingConfig::default(),
        max_parallelism: None,
        fail_fast: false,
        fail_if: None,
        tag_filter: TagFilter::default(),
        memory: JsonValue::Null,
        output: JsonValue::Null,
        limits: Limits::default(),
    }
}

fn selected(ids: &[&str]) -> BTreeSet<CheckId> {
    ids.iter().map(|s| CheckId::new(*s)).collect()
}

// ============================================================================
// SECTION: Scenarios
// ============================================================================

#[tokio::test]
async fn event_gated_forward_run_only_executes_eligible_checks() {
    let mut gated = base_check("gated");
    gated.on = [EventTrigger::PrOpened].into_iter().collect();
    let config = config(vec![gated]);
    let provider = Arc::new(StubProvider::default());
    let scheduler = scheduler(provider.clone());

    let outcome = scheduler
        .execute_grouped_checks(&config, selected(&["gated"]), EventTrigger::Manual, inputs())
        .await
        .expect("run succeeds");

    assert!(outcome.results.0.is_empty(), "check ineligible for the event should not produce a result");
    assert!(provider.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn on_fail_hook_routes_to_its_target_without_cascading_past_it() {
    let mut failing = base_check("failing");
    failing.extra = extra(json!({"error": "boom"}));
    failing.on_fail = RoutingHook {
        run: vec![CheckId::new("remediate")],
        ..RoutingHook::default()
    };
    let remediate = base_check("remediate");
    let mut downstream = base_check("downstream");
    downstream.depends_on = vec![DependencyToken::new("remediate")];

    let config = config(vec![failing, remediate, downstream]);
    let provider = Arc::new(StubProvider::default());
    let scheduler = scheduler(provider.clone());

    let outcome = scheduler
        .execute_grouped_checks(&config, selected(&["failing", "downstream"]), EventTrigger::Manual, inputs())
        .await
        .expect("run succeeds");

    let calls = provider.calls.lock().unwrap().clone();
    assert!(calls.contains(&CheckId::new("remediate")), "on_fail target must run");
    // `downstream` depends on `remediate`, which ran this wave, so it should
    // still be reachable — confirming on_fail doesn't poison the whole graph.
    assert!(outcome.results.0.values().flatten().any(|e| e.check_name == CheckId::new("remediate")));
}

#[tokio::test]
async fn foreach_map_runs_one_instance_per_item() {
    let mut parent = base_check("parent");
    parent.for_each = true;
    parent.extra = extra(json!({"output": ["a", "b", "c"]}));

    let mut child = base_check("child");
    child.depends_on = vec![DependencyToken::new("parent")];
    child.fanout = FanoutMode::Map;

    let config = config(vec![parent, child]);
    let provider = Arc::new(StubProvider::default());
    let scheduler = scheduler(provider.clone());

    let outcome = scheduler
        .execute_grouped_checks(&config, selected(&["child"]), EventTrigger::Manual, inputs())
        .await
        .expect("run succeeds");

    let child_entry = outcome.results.0.values().flatten().find(|e| e.check_name == CheckId::new("child")).expect("child result");
    assert!(child_entry.output.is_array());
    assert_eq!(child_entry.output.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn foreach_reduce_runs_once_over_the_aggregate() {
    let mut parent = base_check("parent");
    parent.for_each = true;
    parent.extra = extra(json!({"output": ["a", "b"]}));

    let mut child = base_check("child");
    child.depends_on = vec![DependencyToken::new("parent")];
    child.fanout = FanoutMode::Reduce;

    let config = config(vec![parent, child]);
    let provider = Arc::new(StubProvider::default());
    let scheduler = scheduler(provider.clone());

    scheduler
        .execute_grouped_checks(&config, selected(&["child"]), EventTrigger::Manual, inputs())
        .await
        .expect("run succeeds");

    // A reduce dependent runs once at root scope regardless of item count.
    let calls = provider.calls.lock().unwrap().clone();
    assert_eq!(calls.iter().filter(|id| *id == &CheckId::new("child")).count(), 1);
}

#[tokio::test]
async fn max_runs_caps_repeated_executions() {
    let mut looping = base_check("looping");
    looping.max_runs = Some(1);
    looping.on_fail = RoutingHook {
        goto: Some(CheckId::new("looping")),
        ..RoutingHook::default()
    };
    looping.extra = extra(json!({"error": "always fails"}));

    let config = config(vec![looping]);
    let provider = Arc::new(StubProvider::default());
    let scheduler = scheduler(provider.clone());

    scheduler
        .execute_grouped_checks(&config, selected(&["looping"]), EventTrigger::Manual, inputs())
        .await
        .expect("run succeeds");

    let calls = provider.calls.lock().unwrap().clone();
    let looping_runs = calls.iter().filter(|id| *id == &CheckId::new("looping")).count();
    assert_eq!(looping_runs, 1, "max_runs: 1 must stop a self-looping goto from re-running the check");
}

#[tokio::test]
async fn or_group_dependency_runs_once_either_branch_is_satisfied() {
    let left = base_check("left");
    let right = base_check("right");
    let mut joined = base_check("joined");
    joined.depends_on = vec![DependencyToken::new("left|right")];

    let config = config(vec![left, right, joined]);
    let provider = Arc::new(StubProvider::default());
    let scheduler = scheduler(provider.clone());

    let outcome = scheduler
        .execute_grouped_checks(&config, selected(&["joined"]), EventTrigger::Manual, inputs())
        .await
        .expect("run succeeds");

    assert!(outcome.results.0.values().flatten().any(|e| e.check_name == CheckId::new("joined")));
}

#[tokio::test]
async fn cyclic_config_surfaces_as_a_circular_dependency_error() {
    let mut a = base_check("a");
    a.depends_on = vec![DependencyToken::new("b")];
    let mut b = base_check("b");
    b.depends_on = vec![DependencyToken::new("a")];

    let config = config(vec![a, b]);
    let provider = Arc::new(StubProvider::default());
    let scheduler = scheduler(provider.clone());

    // Spec §7 "User-visible failure behavior": a cyclic config never throws —
    // it returns a normal `Ok` outcome carrying exactly one synthesized
    // `circular-dependency-error` issue and zero executed checks (spec §8
    // seed scenario 6).
    let outcome = scheduler
        .execute_grouped_checks(&config, selected(&["a"]), EventTrigger::Manual, inputs())
        .await
        .expect("cyclic config must not fail the run");

    let issues: Vec<_> = outcome.results.0.values().flatten().flat_map(|entry| entry.issues.iter()).collect();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].rule_id, "circular-dependency-error");
    assert!(provider.calls.lock().unwrap().is_empty(), "a cyclic plan must execute zero checks");
}

#[tokio::test]
async fn empty_selection_returns_empty_outcome_without_error() {
    let config = config(vec![base_check("unused")]);
    let provider = Arc::new(StubProvider::default());
    let scheduler = scheduler(provider.clone());

    let outcome = scheduler
        .execute_grouped_checks(&config, BTreeSet::new(), EventTrigger::Manual, inputs())
        .await
        .expect("run succeeds");

    assert!(outcome.results.0.is_empty());
    assert!(provider.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn zero_loop_budget_attaches_to_the_routing_check_not_its_wave_triggered_dependency() {
    // spec §8 seed scenario 2: `ask -> refine (fail_if, on_fail.goto: ask,
    // on_success.goto: finish) -> finish`, with `routing.max_loops: 0`.
    let ask = base_check("ask");

    let mut refine = base_check("refine");
    refine.depends_on = vec![DependencyToken::new("ask")];
    refine.fail_if = Some("output.refined !== true".to_string());
    refine.on_fail = RoutingHook {
        goto: Some(CheckId::new("ask")),
        ..RoutingHook::default()
    };
    refine.on_success = RoutingHook {
        goto: Some(CheckId::new("finish")),
        ..RoutingHook::default()
    };

    let finish = base_check("finish");

    let mut config = config(vec![ask, refine, finish]);
    config.routing.max_loops = 0;

    let provider = Arc::new(StubProvider::default());
    let scheduler = scheduler(provider.clone());

    let outcome = scheduler
        .execute_grouped_checks(&config, selected(&["refine"]), EventTrigger::Manual, inputs())
        .await
        .expect("run succeeds");

    let calls = provider.calls.lock().unwrap().clone();
    assert!(calls.contains(&CheckId::new("ask")), "ask's own wave-triggered attempt must still run under a zero loop budget");
    assert!(!calls.contains(&CheckId::new("finish")), "finish is only reachable through refine's on_success.goto, which never fires");
    assert!(outcome.history.get("finish").is_none_or(Vec::is_empty), "finish must never produce a history entry");

    let entries: Vec<_> = outcome.results.0.values().flatten().collect();
    let ask_entry = entries.iter().find(|e| e.check_name == CheckId::new("ask")).expect("ask result");
    assert!(ask_entry.issues.is_empty(), "ask's own first attempt must not consume the loop budget");
    let refine_entry = entries.iter().find(|e| e.check_name == CheckId::new("refine")).expect("refine result");
    assert!(
        refine_entry.issues.iter().any(|issue| issue.rule_id == "refine/routing/loop_budget_exceeded"),
        "refine's on_fail.goto must be the one blocked by the exhausted loop budget"
    );
}

#[tokio::test]
async fn dependents_all_valid_checks_every_item_not_just_the_last_pushed_one() {
    // `validator` runs once per item of `list`'s 3-item fan-out within a
    // single wave; item 0 is invalid, items 1-2 are valid. `list.on_finish`
    // self-loops but only when every item is valid, so the invalid item 0
    // must force a second wave even though item 2 — the last one pushed to
    // history — is valid.
    let mut list = base_check("list");
    list.for_each = true;
    list.extra = extra(json!({"output": [0, 1, 2]}));
    list.max_runs = Some(1);
    list.on_finish = RoutingHook {
        goto: Some(CheckId::new("list")),
        ..RoutingHook::default()
    };

    let mut validator = base_check("validator");
    validator.provider_type = "indexed".to_string();
    validator.depends_on = vec![DependencyToken::new("list")];
    validator.fanout = FanoutMode::Map;

    let config = config(vec![list, validator]);
    let registry = ListAndValidatorRegistry {
        list: Arc::new(StubProvider::default()),
        validator: Arc::new(IndexedValidityProvider),
    };
    let scheduler = WaveScheduler::new(
        Arc::new(registry),
        Arc::new(NullMemory),
        Arc::new(PassthroughTemplater),
        Arc::new(NoOpAnalyzer),
        Arc::new(NullTelemetry),
        Arc::new(DenyAllPermissions),
    );

    let outcome = scheduler
        .execute_grouped_checks(&config, selected(&["validator"]), EventTrigger::Manual, inputs())
        .await
        .expect("run succeeds");

    let list_entry = outcome.results.0.values().flatten().find(|e| e.check_name == CheckId::new("list")).expect("list result");
    assert!(
        list_entry.issues.iter().any(|issue| issue.rule_id == "list/limits/max_runs_exceeded"),
        "an invalid item must stop on_finish.goto from self-suppressing, forcing a second, max_runs-capped wave over `list`"
    );
}

#[tokio::test]
async fn strict_mode_fails_the_run_when_a_qualifying_error_issue_is_produced() {
    let mut failing = base_check("failing");
    failing.extra = extra(json!({"error": "boom"}));

    let config = config(vec![failing]);
    let provider = Arc::new(StubProvider::default());
    let scheduler = scheduler(provider);

    let mut strict_inputs = inputs();
    strict_inputs.strict_mode = true;

    let err = scheduler
        .execute_grouped_checks(&config, selected(&["failing"]), EventTrigger::Manual, strict_inputs)
        .await
        .expect_err("strict mode must fail on a qualifying error issue");

    assert!(matches!(err, EngineError::StrictModeFailure { .. }));
}
