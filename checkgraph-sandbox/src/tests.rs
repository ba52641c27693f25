// checkgraph-sandbox/src/tests.rs
// ============================================================================
// Module: Sandbox Unit Tests
// Description: Lex/parse/eval coverage for the restricted expression grammar.
// Purpose: Verify namespace resolution, operator semantics, and fail-secure
//          error behavior.
// Dependencies: checkgraph-sandbox
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions are permitted."
)]

use std::collections::BTreeMap;

use crate::Host;
use crate::NullHost;
use crate::Value;
use crate::eval_bool_fail_secure;
use crate::eval_expr;
use crate::eval_id_list;

fn globals_with(output: Value) -> BTreeMap<String, Value> {
    let mut map = BTreeMap::new();
    map.insert("output".to_string(), output);
    map
}

#[test]
fn evaluates_arithmetic_and_precedence() {
    let mut host = NullHost;
    let value = eval_expr("1 + 2 * 3", BTreeMap::new(), &mut host).unwrap();
    assert!(matches!(value, Value::Number(n) if n == 7.0));
}

#[test]
fn strict_inequality_matches_fail_if_example() {
    // spec §8 scenario 2: `fail_if: output.refined !== true`
    let mut output = BTreeMap::new();
    output.insert("refined".to_string(), Value::Bool(false));
    let mut host = NullHost;
    let triggered = eval_bool_fail_secure(
        "output.refined !== true",
        globals_with(Value::Object(output)),
        &mut host,
    );
    assert!(triggered);
}

#[test]
fn ternary_and_comparison() {
    let mut globals = BTreeMap::new();
    let mut foreach = BTreeMap::new();
    foreach.insert("index".to_string(), Value::Number(0.0));
    globals.insert("foreach".to_string(), Value::Object(foreach));
    let mut host = NullHost;
    let value = eval_expr("foreach.index < 2 ? 'a' : 'b'", globals, &mut host).unwrap();
    assert_eq!(value.as_str(), Some("a"));
}

#[test]
fn array_length_access() {
    let mut globals = BTreeMap::new();
    let mut outputs_raw = BTreeMap::new();
    outputs_raw.insert(
        "list".to_string(),
        Value::Array(vec![Value::Str("a".into()), Value::Str("b".into()), Value::Str("c".into())]),
    );
    globals.insert("outputs_raw".to_string(), Value::Object(outputs_raw));
    let mut host = NullHost;
    let value = eval_expr("outputs_raw.list.length", globals, &mut host).unwrap();
    assert!(matches!(value, Value::Number(n) if n == 3.0));
}

#[test]
fn array_every_with_arrow_function() {
    let mut globals = BTreeMap::new();
    let items = vec![
        Value::Object(BTreeMap::from([("is_valid".to_string(), Value::Bool(true))])),
        Value::Object(BTreeMap::from([("is_valid".to_string(), Value::Bool(true))])),
    ];
    globals.insert("history".to_string(), Value::Array(items));
    let mut host = NullHost;
    let value = eval_expr("history.every(h => h.is_valid)", globals, &mut host).unwrap();
    assert!(value.is_truthy());
}

#[test]
fn run_js_returns_id_list() {
    let mut host = NullHost;
    let ids = eval_id_list("['per-item', 'aggregate']", BTreeMap::new(), &mut host).unwrap();
    assert_eq!(ids, vec!["per-item".to_string(), "aggregate".to_string()]);
}

#[test]
fn run_js_single_id() {
    let mut host = NullHost;
    let ids = eval_id_list("'finish'", BTreeMap::new(), &mut host).unwrap();
    assert_eq!(ids, vec!["finish".to_string()]);
}

#[test]
fn unknown_identifier_is_an_error_not_a_panic() {
    let mut host = NullHost;
    let result = eval_expr("not_a_real_binding", BTreeMap::new(), &mut host);
    assert!(result.is_err());
}

#[test]
fn if_gating_fails_secure_on_syntax_error() {
    let mut host = NullHost;
    assert!(!eval_bool_fail_secure("((( broken", BTreeMap::new(), &mut host));
}

#[test]
fn disallowed_member_is_rejected() {
    let mut host = NullHost;
    // Arrays don't expose a `constructor` escape hatch.
    let globals = globals_with(Value::Array(vec![]));
    let result = eval_expr("output.constructor()", globals, &mut host);
    assert!(result.is_err());
}

#[test]
fn memory_roundtrips_through_host_bridge() {
    struct Recording {
        store: BTreeMap<String, Value>,
    }
    impl Host for Recording {
        fn memory_get(&self, key: &str) -> Value {
            self.store.get(key).cloned().unwrap_or(Value::Null)
        }
        fn memory_has(&self, key: &str) -> bool {
            self.store.contains_key(key)
        }
        fn memory_list(&self) -> Vec<String> {
            self.store.keys().cloned().collect()
        }
        fn memory_get_all(&self) -> Value {
            Value::Object(self.store.clone())
        }
        fn memory_set(&mut self, key: &str, value: Value) {
            self.store.insert(key.to_string(), value);
        }
        fn memory_increment(&mut self, key: &str, by: f64) -> f64 {
            let current = self.memory_get(key).coerce_to_number();
            let next = current + by;
            self.store.insert(key.to_string(), Value::Number(next));
            next
        }
    }
    let mut host = Recording { store: BTreeMap::new() };
    eval_expr("memory.set('runs', 1)", BTreeMap::new(), &mut host).unwrap();
    let value = eval_expr("memory.get('runs')", BTreeMap::new(), &mut host).unwrap();
    assert!(matches!(value, Value::Number(n) if n == 1.0));
}

#[test]
fn nesting_limit_is_enforced() {
    let mut host = NullHost;
    let deeply_nested = "(".repeat(200) + "1" + &")".repeat(200);
    let result = eval_expr(&deeply_nested, BTreeMap::new(), &mut host);
    assert!(result.is_err());
}

#[test]
fn map_basic_ops_and_chained_set() {
    let mut host = NullHost;
    let value = eval_expr("Map([['a', 1]]).set('b', 2).get('a')", BTreeMap::new(), &mut host).unwrap();
    assert!(matches!(value, Value::Number(n) if n == 1.0));
    let size = eval_expr("Map([['a', 1]]).set('b', 2).size", BTreeMap::new(), &mut host).unwrap();
    assert!(matches!(size, Value::Number(n) if n == 2.0));
    let has = eval_expr("Map([]).has('missing')", BTreeMap::new(), &mut host).unwrap();
    assert!(!has.is_truthy());
}

#[test]
fn set_deduplicates_and_supports_add_has_delete() {
    let mut host = NullHost;
    let size = eval_expr("Set([1, 1, 2]).size", BTreeMap::new(), &mut host).unwrap();
    assert!(matches!(size, Value::Number(n) if n == 2.0));
    let has_after_add = eval_expr("Set([1]).add(2).has(2)", BTreeMap::new(), &mut host).unwrap();
    assert!(has_after_add.is_truthy());
    let has_after_delete = eval_expr("Set([1, 2]).delete(2).has(2)", BTreeMap::new(), &mut host).unwrap();
    assert!(!has_after_delete.is_truthy());
}

#[test]
fn date_round_trips_through_iso_string() {
    let mut host = NullHost;
    let iso = eval_expr("Date(0).toISOString()", BTreeMap::new(), &mut host).unwrap();
    let iso = iso.as_str().unwrap();
    assert!(iso.starts_with("1970-01-01T00:00:00"), "unexpected ISO string: {iso}");
    let millis = eval_expr("Date('1970-01-01T00:00:00Z').getTime()", BTreeMap::new(), &mut host).unwrap();
    assert!(matches!(millis, Value::Number(n) if n == 0.0));
}

#[test]
fn regexp_test_and_exec() {
    let mut host = NullHost;
    let matched = eval_expr("RegExp('^v[0-9]+$').test('v12')", BTreeMap::new(), &mut host).unwrap();
    assert!(matched.is_truthy());
    let not_matched = eval_expr("RegExp('^v[0-9]+$').test('nope')", BTreeMap::new(), &mut host).unwrap();
    assert!(!not_matched.is_truthy());
    let captured = eval_expr("RegExp('v(\\\\d+)').exec('v12')", BTreeMap::new(), &mut host).unwrap();
    match captured {
        Value::Array(groups) => {
            assert_eq!(groups.len(), 2);
            assert_eq!(groups[0].as_str(), Some("v12"));
            assert_eq!(groups[1].as_str(), Some("12"));
        }
        other => panic!("expected exec() to return a match array, got {other:?}"),
    }
}

#[test]
fn regexp_rejects_unsupported_flags() {
    let mut host = NullHost;
    let result = eval_expr("RegExp('a', 'm')", BTreeMap::new(), &mut host);
    assert!(result.is_err());
}
