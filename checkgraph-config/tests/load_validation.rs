// checkgraph-config/tests/load_validation.rs
// ============================================================================
// Module: Config Load Validation Tests
// Description: End-to-end checks that `checkgraph_config::load` rejects
//              malformed documents fail-closed and accepts well-formed ones.
// Purpose: Exercise the loader the way a host binary calls it, as opposed
//          to the in-process unit tests beside the implementation.
// ============================================================================

use std::io::Write;

use checkgraph_config::ConfigError;
use tempfile::NamedTempFile;

#[test]
fn accepts_a_config_with_routing_and_limits() {
    let yaml = r#"
version: "1"
max_parallelism: 2
fail_fast: true
routing:
  max_loops: 5
limits:
  max_runs_per_check: 3
checks:
  overview:
    id: overview
    type: log
    on: [pr_opened, pr_updated]
  quality:
    id: quality
    type: log
    depends_on: [overview]
    on: [pr_updated]
"#;
    let mut file = NamedTempFile::with_suffix(".yaml").expect("tempfile");
    file.write_all(yaml.as_bytes()).expect("write");
    let config = checkgraph_config::load(file.path()).expect("well-formed config loads");
    assert_eq!(config.routing.max_loops, 5);
    assert_eq!(config.limits.max_runs_per_check, Some(3));
    assert_eq!(config.checks.len(), 2);
}

#[test]
fn rejects_cyclic_depends_on_is_not_a_config_load_concern() {
    // Cycle detection is the planner's job (spec §4.1), not the loader's —
    // a config with a cycle still loads successfully here.
    let yaml = r#"
version: "1"
checks:
  a:
    id: a
    type: log
    depends_on: [b]
  b:
    id: b
    type: log
    depends_on: [a]
"#;
    let mut file = NamedTempFile::with_suffix(".yaml").expect("tempfile");
    file.write_all(yaml.as_bytes()).expect("write");
    let config = checkgraph_config::load(file.path()).expect("config load doesn't validate the DAG");
    assert_eq!(config.checks.len(), 2);
}

#[test]
fn rejects_non_object_document() {
    let mut file = NamedTempFile::with_suffix(".yaml").expect("tempfile");
    file.write_all(b"- just\n- a\n- list\n").expect("write");
    let err = checkgraph_config::load(file.path()).expect_err("should reject");
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn missing_file_is_io_error() {
    let err = checkgraph_config::load(std::path::Path::new("/nonexistent/checkgraph.yaml")).expect_err("should reject");
    assert!(matches!(err, ConfigError::Io(_)));
}
