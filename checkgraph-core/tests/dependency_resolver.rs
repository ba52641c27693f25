// checkgraph-core/tests/dependency_resolver.rs
// ============================================================================
// Module: Dependency Resolver Tests
// Description: End-to-end coverage of `runtime::planner::resolve` — OR-group
//              expansion, event pruning, transitive closure, cycle detection,
//              and level ordering.
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use checkgraph_core::errors::EngineError;
use checkgraph_core::model::CheckConfig;
use checkgraph_core::model::CheckId;
use checkgraph_core::model::DependencyToken;
use checkgraph_core::model::EventTrigger;
use checkgraph_core::runtime::planner;

fn check(id: &str, depends_on: &[&str]) -> CheckConfig {
    CheckConfig {
        id: CheckId::new(id),
        provider_type: "log".to_string(),
        depends_on: depends_on.iter().map(|t| DependencyToken::new(*t)).collect(),
        on: BTreeSet::new(),
        r#if: None,
        fail_if: None,
        for_each: false,
        fanout: checkgraph_core::model::FanoutMode::default(),
        tags: BTreeSet::new(),
        continue_on_failure: false,
        max_runs: None,
        on_success: checkgraph_core::model::RoutingHook::default(),
        on_fail: checkgraph_core::model::RoutingHook::default(),
        on_finish: checkgraph_core::model::RoutingHook::default(),
        extra: serde_json::Map::new(),
    }
}

fn check_on(id: &str, depends_on: &[&str], on: &[EventTrigger]) -> CheckConfig {
    let mut c = check(id, depends_on);
    c.on = on.iter().copied().collect();
    c
}

fn configs(checks: Vec<CheckConfig>) -> BTreeMap<CheckId, CheckConfig> {
    checks.into_iter().map(|c| (c.id.clone(), c)).collect()
}

fn ids(raw: &[&str]) -> BTreeSet<CheckId> {
    raw.iter().map(|s| CheckId::new(*s)).collect()
}

#[test]
fn linear_chain_resolves_into_ordered_levels() {
    let configs = configs(vec![check("a", &[]), check("b", &["a"]), check("c", &["b"])]);
    let plan = planner::resolve(&ids(&["c"]), &configs, EventTrigger::Manual).expect("resolves");

    assert_eq!(plan.order.levels.len(), 3);
    assert_eq!(plan.order.levels[0].parallel, vec![CheckId::new("a")]);
    assert_eq!(plan.order.levels[1].parallel, vec![CheckId::new("b")]);
    assert_eq!(plan.order.levels[2].parallel, vec![CheckId::new("c")]);
    assert_eq!(plan.stats.total_checks, 3);
    assert_eq!(plan.stats.checks_with_dependencies, 2);
}

#[test]
fn transitive_closure_pulls_in_unselected_ancestors() {
    let configs = configs(vec![check("a", &[]), check("b", &["a"])]);
    // Only "b" is selected; "a" must be pulled in transitively.
    let plan = planner::resolve(&ids(&["b"]), &configs, EventTrigger::Manual).expect("resolves");
    assert_eq!(plan.order.all_ids(), vec![CheckId::new("a"), CheckId::new("b")]);
}

#[test]
fn or_group_dependency_satisfied_by_any_known_branch() {
    let configs = configs(vec![check("a", &[]), check("b", &[]), check("c", &["a|b"])]);
    let plan = planner::resolve(&ids(&["c"]), &configs, EventTrigger::Manual).expect("resolves");

    // Both branches are known and eligible, so both become active deps.
    assert_eq!(plan.order.active_deps.get(&CheckId::new("c")).unwrap().len(), 2);
}

#[test]
fn event_pruning_drops_ineligible_edges() {
    let configs = configs(vec![
        check_on("a", &[], &[EventTrigger::PrOpened]),
        check("b", &["a"]),
    ]);
    let plan = planner::resolve(&ids(&["b"]), &configs, EventTrigger::Manual).expect("resolves");

    // "a" only runs on pr_opened, so under a manual run the edge is pruned
    // and "a" never enters the plan at all.
    assert_eq!(plan.order.all_ids(), vec![CheckId::new("b")]);
    assert!(plan.order.active_deps.get(&CheckId::new("b")).unwrap().is_empty());
}

#[test]
fn unknown_dependency_token_is_a_validation_error() {
    let configs = configs(vec![check("a", &["missing"])]);
    let err = planner::resolve(&ids(&["a"]), &configs, EventTrigger::Manual).expect_err("should fail");
    assert!(matches!(err, EngineError::DependencyValidation(_)));
}

#[test]
fn cycle_is_detected_and_reported() {
    let configs = configs(vec![check("a", &["b"]), check("b", &["a"])]);
    let err = planner::resolve(&ids(&["a"]), &configs, EventTrigger::Manual).expect_err("should fail");
    match err {
        EngineError::CircularDependency(path) => assert!(path.contains("a") && path.contains("b")),
        other => panic!("expected circular dependency, got {other:?}"),
    }
}

#[test]
fn diamond_dependency_collapses_into_one_plan_entry() {
    let configs = configs(vec![
        check("root", &[]),
        check("left", &["root"]),
        check("right", &["root"]),
        check("join", &["left", "right"]),
    ]);
    let plan = planner::resolve(&ids(&["join"]), &configs, EventTrigger::Manual).expect("resolves");

    assert_eq!(plan.order.levels.len(), 3);
    assert_eq!(plan.order.levels[0].parallel, vec![CheckId::new("root")]);
    assert_eq!(plan.order.levels[1].parallel, vec![CheckId::new("left"), CheckId::new("right")]);
    assert_eq!(plan.order.levels[2].parallel, vec![CheckId::new("join")]);
}
