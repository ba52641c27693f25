// checkgraph-core/tests/journal.rs
// ============================================================================
// Module: Journal and ContextView Tests
// Description: Coverage of append-only commit ordering, snapshot isolation,
//              event filtering, and scope-prefix fallback resolution.
// ============================================================================

use checkgraph_core::model::CheckId;
use checkgraph_core::model::EventTrigger;
use checkgraph_core::model::ScopePath;
use checkgraph_core::model::StepResult;
use checkgraph_core::model::next_session_id;
use checkgraph_core::runtime::ContextView;
use checkgraph_core::runtime::Journal;
use serde_json::json;

fn result(output: serde_json::Value) -> StepResult {
    StepResult::from_bare_output(output)
}

#[test]
fn reads_only_see_entries_up_to_the_snapshot() {
    let journal = Journal::new();
    let session = next_session_id();

    journal.commit(session, ScopePath::root(), CheckId::new("a"), None, result(json!(1)));
    let snapshot = journal.begin_snapshot();
    journal.commit(session, ScopePath::root(), CheckId::new("a"), None, result(json!(2)));

    let view = ContextView::new(&journal, session, snapshot, ScopePath::root(), None);
    assert_eq!(view.get(&CheckId::new("a")).unwrap().output, json!(1));
}

#[test]
fn later_commit_within_snapshot_wins() {
    let journal = Journal::new();
    let session = next_session_id();

    journal.commit(session, ScopePath::root(), CheckId::new("a"), None, result(json!("first")));
    journal.commit(session, ScopePath::root(), CheckId::new("a"), None, result(json!("second")));
    let snapshot = journal.begin_snapshot();

    let view = ContextView::new(&journal, session, snapshot, ScopePath::root(), None);
    assert_eq!(view.get(&CheckId::new("a")).unwrap().output, json!("second"));
}

#[test]
fn event_filter_excludes_entries_tagged_for_another_event() {
    let journal = Journal::new();
    let session = next_session_id();

    journal.commit(session, ScopePath::root(), CheckId::new("a"), Some(EventTrigger::PrOpened), result(json!("pr")));
    let snapshot = journal.begin_snapshot();

    let view = ContextView::new(&journal, session, snapshot, ScopePath::root(), Some(EventTrigger::IssueOpened));
    assert!(view.get(&CheckId::new("a")).is_none());
}

#[test]
fn entries_with_no_explicit_event_are_always_visible() {
    let journal = Journal::new();
    let session = next_session_id();

    journal.commit(session, ScopePath::root(), CheckId::new("a"), None, result(json!("any")));
    let snapshot = journal.begin_snapshot();

    let view = ContextView::new(&journal, session, snapshot, ScopePath::root(), Some(EventTrigger::IssueOpened));
    assert_eq!(view.get(&CheckId::new("a")).unwrap().output, json!("any"));
}

#[test]
fn scope_resolution_falls_back_through_ancestors() {
    let journal = Journal::new();
    let session = next_session_id();

    // Only the root scope has an entry for "a".
    journal.commit(session, ScopePath::root(), CheckId::new("a"), None, result(json!("root-value")));
    let snapshot = journal.begin_snapshot();

    let item_scope = ScopePath::root().child(CheckId::new("parent"), 0);
    let view = ContextView::new(&journal, session, snapshot, item_scope, None);
    assert_eq!(view.get(&CheckId::new("a")).unwrap().output, json!("root-value"));
}

#[test]
fn exact_scope_entry_takes_precedence_over_ancestor() {
    let journal = Journal::new();
    let session = next_session_id();
    let item_scope = ScopePath::root().child(CheckId::new("parent"), 0);

    journal.commit(session, ScopePath::root(), CheckId::new("a"), None, result(json!("root-value")));
    journal.commit(session, item_scope.clone(), CheckId::new("a"), None, result(json!("item-value")));
    let snapshot = journal.begin_snapshot();

    let view = ContextView::new(&journal, session, snapshot, item_scope, None);
    assert_eq!(view.get(&CheckId::new("a")).unwrap().output, json!("item-value"));
}

#[test]
fn get_raw_falls_back_to_output_when_no_raw_value_recorded() {
    let journal = Journal::new();
    let session = next_session_id();

    journal.commit(session, ScopePath::root(), CheckId::new("a"), None, result(json!("value")));
    let snapshot = journal.begin_snapshot();

    let view = ContextView::new(&journal, session, snapshot, ScopePath::root(), None);
    assert_eq!(view.get_raw(&CheckId::new("a")).unwrap(), &json!("value"));
}

#[test]
fn different_sessions_never_see_each_others_entries() {
    let journal = Journal::new();
    let session_a = next_session_id();
    let session_b = next_session_id();

    journal.commit(session_a, ScopePath::root(), CheckId::new("a"), None, result(json!("a-value")));
    let snapshot = journal.begin_snapshot();

    let view = ContextView::new(&journal, session_b, snapshot, ScopePath::root(), None);
    assert!(view.get(&CheckId::new("a")).is_none());
}
