// checkgraph-core/tests/routing.rs
// ============================================================================
// Module: Routing Engine Tests
// Description: Loop budget exhaustion, one-bounce/forward-set collapsing,
//              deterministic retry backoff, and context-elevation triggers.
// ============================================================================

use std::collections::BTreeMap;

use checkgraph_core::model::BackoffMode;
use checkgraph_core::model::CheckId;
use checkgraph_core::model::EventTrigger;
use checkgraph_core::model::RetryConfig;
use checkgraph_core::runtime::ExecutionOrder;
use checkgraph_core::runtime::Level;
use checkgraph_core::runtime::LoopBudget;
use checkgraph_core::runtime::RoutingOrigin;
use checkgraph_core::runtime::routing;

#[test]
fn loop_budget_allows_exactly_max_loops_consumptions() {
    let budget = LoopBudget::new(2);
    assert!(budget.try_consume());
    assert!(budget.try_consume());
    assert!(!budget.try_consume());
    assert_eq!(budget.used(), 3);
}

#[test]
fn on_finish_route_budget_is_one_less_than_run_wide_budget() {
    assert_eq!(routing::on_finish_route_budget(5), 4);
    assert_eq!(routing::on_finish_route_budget(0), 0);
}

#[test]
fn origin_on_fail_and_foreach_suppress_their_own_goto() {
    assert!(RoutingOrigin::OnFail.suppresses_own_goto());
    assert!(RoutingOrigin::Foreach.suppresses_own_goto());
    assert!(!RoutingOrigin::Wave.suppresses_own_goto());
    assert!(!RoutingOrigin::OnSuccess.suppresses_own_goto());
}

#[test]
fn origin_on_fail_and_on_finish_collapse_the_forward_set() {
    assert!(RoutingOrigin::OnFail.collapses_forward_set());
    assert!(RoutingOrigin::OnFinish.collapses_forward_set());
    assert!(!RoutingOrigin::Wave.collapses_forward_set());
}

fn order_with(levels: Vec<(&str, &[&str])>) -> ExecutionOrder {
    let mut active_deps = BTreeMap::new();
    let mut level_list = Vec::new();
    for (id, deps) in levels {
        active_deps.insert(CheckId::new(id), deps.iter().map(|d| CheckId::new(*d)).collect());
        level_list.push(CheckId::new(id));
    }
    ExecutionOrder {
        levels: vec![Level { parallel: level_list }],
        active_deps,
    }
}

#[test]
fn schedule_forward_run_collapses_for_on_fail_origin() {
    let order = order_with(vec![("a", &[]), ("b", &["a"])]);
    let result = routing::schedule_forward_run(&CheckId::new("a"), RoutingOrigin::OnFail, &order, |_| true);
    assert_eq!(result, vec![CheckId::new("a")]);
}

#[test]
fn schedule_forward_run_expands_transitive_dependents_for_wave_origin() {
    let order = order_with(vec![("a", &[]), ("b", &["a"]), ("c", &["b"])]);
    let result = routing::schedule_forward_run(&CheckId::new("a"), RoutingOrigin::Wave, &order, |_| true);
    assert_eq!(result, vec![CheckId::new("a"), CheckId::new("b"), CheckId::new("c")]);
}

#[test]
fn schedule_forward_run_honors_eligibility_predicate() {
    let order = order_with(vec![("a", &[]), ("b", &["a"]), ("c", &["b"])]);
    let result = routing::schedule_forward_run(&CheckId::new("a"), RoutingOrigin::Wave, &order, |id| id.as_str() != "c");
    assert_eq!(result, vec![CheckId::new("a"), CheckId::new("b")]);
}

#[test]
fn retry_delay_is_deterministic_for_the_same_seed() {
    let retry = RetryConfig {
        max: 3,
        base_ms: 100,
        mode: BackoffMode::Fixed,
    };
    let first = routing::compute_retry_delay(&retry, 1, "step-a");
    let second = routing::compute_retry_delay(&retry, 1, "step-a");
    assert_eq!(first, second);
}

#[test]
fn retry_delay_grows_exponentially_when_configured() {
    let retry = RetryConfig {
        max: 3,
        base_ms: 100,
        mode: BackoffMode::Exponential,
    };
    let attempt_one = routing::compute_retry_delay(&retry, 1, "seed");
    let attempt_three = routing::compute_retry_delay(&retry, 3, "seed");
    // Same seed means identical jitter on both sides, so the gap is exactly
    // the backoff difference: base * (2^2 - 2^0) = 100 * 3 = 300ms.
    assert_eq!(attempt_three - attempt_one, std::time::Duration::from_millis(300));
}

#[test]
fn needs_context_elevation_only_when_moving_from_issue_to_pr_class() {
    assert!(routing::needs_context_elevation(EventTrigger::IssueOpened, EventTrigger::PrOpened));
    assert!(!routing::needs_context_elevation(EventTrigger::PrOpened, EventTrigger::PrUpdated));
    assert!(!routing::needs_context_elevation(EventTrigger::IssueOpened, EventTrigger::IssueComment));
}
