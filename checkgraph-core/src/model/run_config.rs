// checkgraph-core/src/model/run_config.rs
// ============================================================================
// Module: Run Configuration
// Description: The parsed top-level config document the engine facade
//              consumes (spec §6).
// Purpose: Hold run-wide knobs (routing budget, parallelism cap, fail-fast,
//          global fail_if, tag filter, limits) alongside the check map.
// Dependencies: crate::model::{check_config, ids}, serde_json
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::check_config::CheckConfig;
use super::check_config::RoutingHook;
use super::ids::CheckId;

/// Default routing loop budget when a config document omits `routing.max_loops`.
pub const DEFAULT_MAX_LOOPS: u32 = 10;

/// `routing.*` section of the config document (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Run-wide routing loop budget (spec §4.4 "Loop budget").
    #[serde(default = "default_max_loops")]
    pub max_loops: u32,
    /// Default hooks applied to any check that doesn't declare its own.
    #[serde(default)]
    pub defaults: RoutingDefaults,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            max_loops: DEFAULT_MAX_LOOPS,
            defaults: RoutingDefaults::default(),
        }
    }
}

const fn default_max_loops() -> u32 {
    DEFAULT_MAX_LOOPS
}

/// Config-wide default hooks (spec §6 `routing.defaults`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingDefaults {
    /// Default `on_fail` hook applied when a check declares none of its own.
    #[serde(default)]
    pub on_fail: Option<RoutingHook>,
}

/// `tag_filter` section (spec §6); policy enforcement itself is out of scope
/// for the core (spec §1: "tag filtering policy" is a collaborator concern),
/// but the filter is carried here so a CLI/collaborator can apply it before
/// calling into the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagFilter {
    /// Only checks carrying at least one of these tags are eligible.
    #[serde(default)]
    pub include: BTreeSet<String>,
    /// Checks carrying any of these tags are excluded, even if `include` matches.
    #[serde(default)]
    pub exclude: BTreeSet<String>,
}

impl TagFilter {
    /// Returns `true` if no include/exclude constraint is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Applies the filter to `tags`.
    #[must_use]
    pub fn allows(&self, tags: &BTreeSet<String>) -> bool {
        if tags.iter().any(|t| self.exclude.contains(t)) {
            return false;
        }
        self.include.is_empty() || tags.iter().any(|t| self.include.contains(t))
    }
}

/// `limits` section (spec §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Limits {
    /// Default `max_runs` applied to a check that doesn't declare its own.
    #[serde(default)]
    pub max_runs_per_check: Option<u32>,
}

/// Top-level config document (spec §6).
///
/// `memory` and `output` are carried opaquely: the memory backend's own
/// configuration shape and the output/render configuration are collaborator
/// concerns the core never interprets (spec §1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Config document schema version.
    pub version: String,
    /// Check definitions, keyed by id.
    pub checks: BTreeMap<CheckId, CheckConfig>,
    /// Routing loop budget and default hooks.
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Run-wide parallelism cap; `None` means "level size is the only cap".
    #[serde(default)]
    pub max_parallelism: Option<usize>,
    /// When true, a gating-fatal issue stops the scheduler from launching
    /// further work (spec §4.3 step 4).
    #[serde(default)]
    pub fail_fast: bool,
    /// Global `fail_if` expression, evaluated alongside each check's own
    /// (spec §4.4 "fail_if").
    #[serde(default)]
    pub fail_if: Option<String>,
    /// Tag inclusion/exclusion policy (spec §6); applied by the caller
    /// before building `selected`, not by the core itself.
    #[serde(default)]
    pub tag_filter: TagFilter,
    /// Opaque memory-backend configuration.
    #[serde(default)]
    pub memory: JsonValue,
    /// Opaque output/render configuration.
    #[serde(default)]
    pub output: JsonValue,
    /// Run-wide limits.
    #[serde(default)]
    pub limits: Limits,
}

impl RunConfig {
    /// Returns the effective `max_runs` for `check`: its own declared cap,
    /// falling back to `limits.max_runs_per_check`.
    #[must_use]
    pub fn effective_max_runs(&self, check: &CheckConfig) -> Option<u32> {
        check.max_runs.or(self.limits.max_runs_per_check)
    }

    /// Returns the effective `on_fail` hook for `check`: its own declared
    /// hook if non-empty, falling back to `routing.defaults.on_fail`.
    #[must_use]
    pub fn effective_on_fail<'a>(&'a self, check: &'a CheckConfig) -> Option<&'a RoutingHook> {
        if !check.on_fail.is_empty() {
            Some(&check.on_fail)
        } else {
            self.routing.defaults.on_fail.as_ref()
        }
    }
}
