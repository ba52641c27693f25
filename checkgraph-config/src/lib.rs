// checkgraph-config/src/lib.rs
// ============================================================================
// Crate: checkgraph-config
// Description: Loads the external config document (spec §6) from a single
//              YAML or JSON file into `checkgraph_core::model::RunConfig`,
//              with fail-closed validation and hard size limits.
// Purpose: Keep config ingestion — an ambient, host-facing concern — out of
//          the core, which only ever consumes an already-parsed `RunConfig`.
// Dependencies: checkgraph-core, serde_json, serde_yaml, thiserror
// ============================================================================

//! # checkgraph-config
//!
//! Grounded in the teacher's `decision-gate-config`: a single-file loader
//! enforcing a path-length ceiling, a component-length ceiling, a hard
//! byte-size ceiling on the file itself, and UTF-8 validity, before a single
//! byte reaches a deserializer. Any structurally invalid document is
//! rejected here — fail-closed, matching spec §7 ("validation errors ... are
//! fatal to the whole run").
//!
//! Format: YAML via `serde_yaml` (a strict superset of JSON, so a `.json`
//! document parses identically) is the default; a `.json` extension instead
//! routes through `serde_json` for JSON-specific error messages.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;

use checkgraph_core::model::RunConfig;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum total byte length of a config path.
pub const MAX_CONFIG_PATH_BYTES: usize = 4096;
/// Maximum byte length of a single path component.
pub const MAX_CONFIG_PATH_COMPONENT_BYTES: usize = 255;
/// Maximum byte size of a config file, mirroring the teacher's `MAX_CONFIG_FILE_SIZE`.
pub const MAX_CONFIG_FILE_BYTES: u64 = 1024 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Fail-closed config loading/validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The path itself exceeds [`MAX_CONFIG_PATH_BYTES`].
    #[error("config path exceeds max length")]
    PathTooLong,
    /// One path component exceeds [`MAX_CONFIG_PATH_COMPONENT_BYTES`].
    #[error("config path component too long")]
    PathComponentTooLong,
    /// The file on disk exceeds [`MAX_CONFIG_FILE_BYTES`].
    #[error("config file exceeds size limit")]
    FileTooLarge,
    /// The file could not be read (missing, permission denied, ...).
    #[error("failed to read config file: {0}")]
    Io(String),
    /// The file's bytes are not valid UTF-8.
    #[error("config file is not valid UTF-8")]
    NotUtf8,
    /// The document failed to parse as YAML/JSON, or didn't match the
    /// `RunConfig` schema.
    #[error("config parse error: {0}")]
    Parse(String),
    /// The document parsed but failed a structural invariant (spec §4.1
    /// "Validation", §3 invariants).
    #[error("config validation error: {0}")]
    Validation(String),
}

// ============================================================================
// SECTION: Loader
// ============================================================================

/// Loads and validates a config document from `path`.
///
/// # Errors
///
/// Returns [`ConfigError`] on any path/size/encoding/parse/validation
/// failure; no partial or best-effort `RunConfig` is ever returned.
pub fn load(path: &Path) -> Result<RunConfig, ConfigError> {
    validate_path(path)?;

    let metadata = fs::metadata(path).map_err(|err| ConfigError::Io(err.to_string()))?;
    if metadata.len() > MAX_CONFIG_FILE_BYTES {
        return Err(ConfigError::FileTooLarge);
    }

    let bytes = fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
    let text = String::from_utf8(bytes).map_err(|_| ConfigError::NotUtf8)?;

    let is_json = path.extension().and_then(std::ffi::OsStr::to_str).is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let config: RunConfig = if is_json {
        serde_json::from_str(&text).map_err(|err| ConfigError::Parse(err.to_string()))?
    } else {
        serde_yaml::from_str(&text).map_err(|err| ConfigError::Parse(err.to_string()))?
    };

    validate_document(&config)?;
    Ok(config)
}

/// Parses an in-memory document, skipping the path/size gate. Used by hosts
/// that already hold config text (tests, embedded configs).
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] or [`ConfigError::Validation`].
pub fn parse_str(text: &str, json: bool) -> Result<RunConfig, ConfigError> {
    let config: RunConfig = if json {
        serde_json::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?
    } else {
        serde_yaml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?
    };
    validate_document(&config)?;
    Ok(config)
}

// ============================================================================
// SECTION: Validation
// ============================================================================

fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let path_str = path.to_string_lossy();
    if path_str.len() > MAX_CONFIG_PATH_BYTES {
        return Err(ConfigError::PathTooLong);
    }
    for component in path.components() {
        let rendered = component.as_os_str().to_string_lossy();
        if rendered.len() > MAX_CONFIG_PATH_COMPONENT_BYTES {
            return Err(ConfigError::PathComponentTooLong);
        }
    }
    Ok(())
}

/// Structural invariants beyond what `serde` already enforces by rejecting
/// unknown enum variants / type mismatches: every check's declared `id`
/// must match the map key it's stored under (spec §3 "unique within the
/// config"), and every `depends_on` token's branches must be syntactically
/// non-empty (full resolution against `selected` happens in the planner,
/// spec §4.1 — this is the config-load-time subset of that check).
fn validate_document(config: &RunConfig) -> Result<(), ConfigError> {
    for (key, check) in &config.checks {
        if check.id.as_str() != key.as_str() {
            return Err(ConfigError::Validation(format!("check `{key}` declares mismatched id `{}`", check.id)));
        }
        for token in &check.depends_on {
            if token.branches().is_empty() {
                return Err(ConfigError::Validation(format!("check `{key}` has an empty depends_on token")));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    const MINIMAL_YAML: &str = r#"
version: "1"
checks:
  overview:
    id: overview
    type: log
"#;

    #[test]
    fn loads_minimal_yaml_document() {
        let mut file = NamedTempFile::with_suffix(".yaml").expect("tempfile");
        file.write_all(MINIMAL_YAML.as_bytes()).expect("write");
        let config = load(file.path()).expect("valid config loads");
        assert_eq!(config.checks.len(), 1);
        assert!(config.checks.contains_key("overview"));
    }

    #[test]
    fn loads_minimal_json_document() {
        let json = r#"{"version":"1","checks":{"overview":{"id":"overview","type":"log"}}}"#;
        let mut file = NamedTempFile::with_suffix(".json").expect("tempfile");
        file.write_all(json.as_bytes()).expect("write");
        let config = load(file.path()).expect("valid config loads");
        assert_eq!(config.checks.len(), 1);
    }

    #[test]
    fn rejects_path_too_long() {
        let long_path = "a".repeat(MAX_CONFIG_PATH_BYTES + 1);
        let err = load(Path::new(&long_path)).expect_err("should reject");
        assert!(matches!(err, ConfigError::PathTooLong));
    }

    #[test]
    fn rejects_oversized_file() {
        let mut file = NamedTempFile::new().expect("tempfile");
        let payload = vec![b'a'; (MAX_CONFIG_FILE_BYTES + 1) as usize];
        file.write_all(&payload).expect("write");
        let err = load(file.path()).expect_err("should reject");
        assert!(matches!(err, ConfigError::FileTooLarge));
    }

    #[test]
    fn rejects_non_utf8_file() {
        let mut file = NamedTempFile::new().expect("tempfile");
        file.write_all(&[0xFF, 0xFE, 0xFF]).expect("write");
        let err = load(file.path()).expect_err("should reject");
        assert!(matches!(err, ConfigError::NotUtf8) || matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_mismatched_check_id() {
        let yaml = r#"
version: "1"
checks:
  overview:
    id: not-overview
    type: log
"#;
        let err = parse_str(yaml, false).expect_err("should reject");
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn rejects_unknown_event_name() {
        let yaml = r#"
version: "1"
checks:
  overview:
    id: overview
    type: log
    on: ["not_a_real_event"]
"#;
        let err = parse_str(yaml, false).expect_err("should reject");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_empty_depends_on_token() {
        let yaml = r#"
version: "1"
checks:
  overview:
    id: overview
    type: log
    depends_on: ["   "]
"#;
        let err = parse_str(yaml, false).expect_err("should reject");
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
