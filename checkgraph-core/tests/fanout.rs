// checkgraph-core/tests/fanout.rs
// ============================================================================
// Module: Fan-Out Engine Tests
// Description: Coverage of per-item scoping, aggregation, fatality masking,
//              and descendant-gating math.
// ============================================================================

use checkgraph_core::model::CheckId;
use checkgraph_core::model::Issue;
use checkgraph_core::model::ScopePath;
use checkgraph_core::model::Severity;
use checkgraph_core::model::StepResult;
use checkgraph_core::runtime::fanout;
use serde_json::json;

fn ok_result(output: serde_json::Value) -> StepResult {
    StepResult::from_bare_output(output)
}

fn fatal_result() -> StepResult {
    StepResult {
        issues: vec![Issue::namespaced(&CheckId::new("command"), "command/execution_error", Severity::Error, "boom")],
        ..StepResult::default()
    }
}

#[test]
fn item_scope_nests_under_base() {
    let base = ScopePath::root();
    let scope = fanout::item_scope(&base, &CheckId::new("parent"), 2);
    assert_eq!(scope.segments().len(), 1);
    assert_eq!(scope.segments()[0].item_index, 2);
}

#[test]
fn aggregate_dependent_concatenates_issues_and_outputs() {
    let items = vec![ok_result(json!(1)), ok_result(json!(2))];
    let mask = fanout::compute_fatal_mask(&items, &[false, false]);
    let aggregate = fanout::aggregate_dependent(items, mask);

    assert!(aggregate.is_for_each);
    assert_eq!(aggregate.output, json!([1, 2]));
    assert!(aggregate.issues.is_empty());
}

#[test]
fn compute_fatal_mask_flags_items_with_gating_fatal_issues() {
    let items = vec![ok_result(json!(1)), fatal_result()];
    let mask = fanout::compute_fatal_mask(&items, &[false, false]);
    assert_eq!(mask, vec![false, true]);
}

#[test]
fn compute_fatal_mask_honors_parent_fail_if_trigger() {
    let items = vec![ok_result(json!(1)), ok_result(json!(2))];
    let mask = fanout::compute_fatal_mask(&items, &[true, false]);
    assert_eq!(mask, vec![true, false]);
}

#[test]
fn runnable_indices_excludes_fatal_items_from_every_ancestor_mask() {
    let mask_one = vec![false, true, false];
    let mask_two = vec![false, false, true];
    let result = fanout::runnable_indices(3, &[&mask_one, &mask_two]);
    assert_eq!(result, Some(vec![0]));
}

#[test]
fn runnable_indices_falls_back_to_all_when_no_explicit_fatal_marker() {
    let mask = vec![false, false, false];
    let result = fanout::runnable_indices(3, &[&mask]);
    assert_eq!(result, Some(vec![0, 1, 2]));
}

#[test]
fn runnable_indices_returns_none_when_every_item_is_fatal() {
    let mask = vec![true, true];
    let result = fanout::runnable_indices(2, &[&mask]);
    assert_eq!(result, None);
}

#[test]
fn child_history_entry_synthesizes_placeholder_when_output_missing() {
    let entry = fanout::child_history_entry(CheckId::new("parent"), 0, true, json!(3), None);
    assert_eq!(entry.output["is_valid"], json!(false));
    assert_eq!(entry.parent, Some(CheckId::new("parent")));
    assert_eq!(entry.id, Some(json!(3)));
}

#[test]
fn child_history_entry_carries_through_a_real_output() {
    let entry = fanout::child_history_entry(CheckId::new("parent"), 1, false, json!(0), Some(json!({"ok": true})));
    assert_eq!(entry.output, json!({"ok": true}));
    assert!(!entry.last_loop);
}
