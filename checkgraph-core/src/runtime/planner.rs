// checkgraph-core/src/runtime/planner.rs
// ============================================================================
// Module: Dependency Resolver
// Description: Validates dependencies, detects cycles, expands OR-groups,
//              prunes by event, and emits a level-ordered execution plan
//              (spec §4.1).
// Purpose: Turn a set of selected checks plus their declared `depends_on`
//          into a validated DAG and a level-ordered execution plan.
// Dependencies: crate::{errors, model}, std::collections
// ============================================================================

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::VecDeque;

use crate::errors::EngineError;
use crate::model::CheckConfig;
use crate::model::CheckId;
use crate::model::EventTrigger;

// ============================================================================
// SECTION: Execution Order
// ============================================================================

/// One wave-eligible level of the plan: every id in `parallel` has no
/// unresolved edge to another id in this or a later level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Level {
    /// Check ids runnable in parallel at this level.
    pub parallel: Vec<CheckId>,
}

/// Level-ordered execution plan produced by [`resolve`] (spec §4.1).
#[derive(Debug, Clone, Default)]
pub struct ExecutionOrder {
    /// Levels in execution order, root level first.
    pub levels: Vec<Level>,
    /// Pruned, validated adjacency: `checkId -> active dependency ids`.
    pub active_deps: BTreeMap<CheckId, Vec<CheckId>>,
}

impl ExecutionOrder {
    /// Returns every check id across all levels, in level then id order.
    #[must_use]
    pub fn all_ids(&self) -> Vec<CheckId> {
        self.levels.iter().flat_map(|level| level.parallel.iter().cloned()).collect()
    }
}

/// Summary counters for a resolved plan (spec §4.1 "Stats").
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanStats {
    /// Total checks in the resolved closure.
    pub total_checks: usize,
    /// Number of distinct levels.
    pub parallel_levels: usize,
    /// Size of the largest level.
    pub max_parallelism: usize,
    /// `total_checks / parallel_levels`, or `0.0` for an empty plan.
    pub average_parallelism: f64,
    /// Number of checks with at least one active (unpruned, resolved) dependency.
    pub checks_with_dependencies: usize,
}

/// A fully resolved plan: execution order plus its stats.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// The level-ordered execution order.
    pub order: ExecutionOrder,
    /// Summary counters.
    pub stats: PlanStats,
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Resolves `selected` against `configs` for `event` into a validated,
/// level-ordered [`Plan`] (spec §4.1).
///
/// # Errors
///
/// Returns [`EngineError::DependencyValidation`] if any `depends_on` token
/// fails to resolve to at least one known id, or
/// [`EngineError::CircularDependency`] if the resulting graph has a cycle.
/// Both are fatal to the whole run (spec §4.1 "Failure semantics").
pub fn resolve(
    selected: &BTreeSet<CheckId>,
    configs: &BTreeMap<CheckId, CheckConfig>,
    event: EventTrigger,
) -> Result<Plan, EngineError> {
    let active_deps = expand_and_prune(selected, configs, event)?;
    check_for_cycles(&active_deps)?;
    let levels = compute_levels(&active_deps);
    let stats = compute_stats(&active_deps, &levels);
    Ok(Plan {
        order: ExecutionOrder {
            levels,
            active_deps,
        },
        stats,
    })
}

/// Expands OR-groups, prunes event-ineligible edges, and extends `selected`
/// with the transitive closure of the surviving edges (spec §4.1 "Expansion",
/// "Transitive closure", "Event pruning").
fn expand_and_prune(
    selected: &BTreeSet<CheckId>,
    configs: &BTreeMap<CheckId, CheckConfig>,
    event: EventTrigger,
) -> Result<BTreeMap<CheckId, Vec<CheckId>>, EngineError> {
    let mut active_deps: BTreeMap<CheckId, Vec<CheckId>> = BTreeMap::new();
    let mut queue: VecDeque<CheckId> = selected.iter().cloned().collect();
    let mut queued: BTreeSet<CheckId> = selected.clone();

    while let Some(id) = queue.pop_front() {
        if active_deps.contains_key(&id) {
            continue;
        }
        let Some(config) = configs.get(&id) else {
            return Err(EngineError::DependencyValidation(format!("unknown check id: {id}")));
        };

        let mut edges = Vec::new();
        for token in &config.depends_on {
            let branches = token.branches();
            let known: Vec<CheckId> = branches.iter().filter(|b| configs.contains_key(*b)).cloned().collect();
            if known.is_empty() {
                return Err(EngineError::DependencyValidation(format!(
                    "{id}: dependency token `{}` resolves to no known check",
                    token.as_str()
                )));
            }
            for candidate in known {
                let Some(candidate_config) = configs.get(&candidate) else {
                    continue;
                };
                if !candidate_config.eligible_for_event(event) {
                    continue;
                }
                if !edges.contains(&candidate) {
                    edges.push(candidate.clone());
                }
                if queued.insert(candidate.clone()) {
                    queue.push_back(candidate);
                }
            }
        }
        active_deps.insert(id, edges);
    }

    Ok(active_deps)
}

/// Standard DFS cycle detection with temp/perm marks (spec §4.1).
fn check_for_cycles(active_deps: &BTreeMap<CheckId, Vec<CheckId>>) -> Result<(), EngineError> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Temp,
        Perm,
    }

    let mut marks: BTreeMap<CheckId, Mark> = BTreeMap::new();
    let mut path: Vec<CheckId> = Vec::new();

    fn visit(
        id: &CheckId,
        active_deps: &BTreeMap<CheckId, Vec<CheckId>>,
        marks: &mut BTreeMap<CheckId, Mark>,
        path: &mut Vec<CheckId>,
    ) -> Result<(), EngineError> {
        match marks.get(id) {
            Some(Mark::Perm) => return Ok(()),
            Some(Mark::Temp) => {
                let mut cycle: Vec<String> = path.iter().map(ToString::to_string).collect();
                cycle.push(id.to_string());
                let start = cycle.iter().position(|node| node == id.as_str()).unwrap_or(0);
                return Err(EngineError::CircularDependency(cycle[start..].join(" -> ")));
            }
            None => {}
        }
        marks.insert(id.clone(), Mark::Temp);
        path.push(id.clone());
        if let Some(deps) = active_deps.get(id) {
            for dep in deps {
                visit(dep, active_deps, marks, path)?;
            }
        }
        path.pop();
        marks.insert(id.clone(), Mark::Perm);
        Ok(())
    }

    for id in active_deps.keys() {
        visit(id, active_deps, &mut marks, &mut path)?;
    }
    Ok(())
}

/// Computes each node's level as `1 + max(level of its deps)`, with
/// dependency-free roots at level `0` (spec §4.1 "Levels").
fn compute_levels(active_deps: &BTreeMap<CheckId, Vec<CheckId>>) -> Vec<Level> {
    if active_deps.is_empty() {
        return Vec::new();
    }
    let mut level_of: BTreeMap<CheckId, usize> = BTreeMap::new();

    fn level_for(
        id: &CheckId,
        active_deps: &BTreeMap<CheckId, Vec<CheckId>>,
        level_of: &mut BTreeMap<CheckId, usize>,
    ) -> usize {
        if let Some(level) = level_of.get(id) {
            return *level;
        }
        let deps = active_deps.get(id).map(Vec::as_slice).unwrap_or(&[]);
        let level = deps.iter().map(|dep| level_for(dep, active_deps, level_of) + 1).max().unwrap_or(0);
        level_of.insert(id.clone(), level);
        level
    }

    for id in active_deps.keys() {
        level_for(id, active_deps, &mut level_of);
    }

    let max_level = level_of.values().copied().max().unwrap_or(0);
    let mut levels = vec![Level::default(); max_level + 1];
    for (id, level) in level_of {
        levels[level].parallel.push(id);
    }
    for level in &mut levels {
        level.parallel.sort();
    }
    levels
}

/// Computes summary counters for a resolved plan (spec §4.1 "Stats").
fn compute_stats(active_deps: &BTreeMap<CheckId, Vec<CheckId>>, levels: &[Level]) -> PlanStats {
    let total_checks = active_deps.len();
    let parallel_levels = levels.len();
    let max_parallelism = levels.iter().map(|level| level.parallel.len()).max().unwrap_or(0);
    let average_parallelism = if parallel_levels == 0 {
        0.0
    } else {
        total_checks as f64 / parallel_levels as f64
    };
    let checks_with_dependencies = active_deps.values().filter(|deps| !deps.is_empty()).count();
    PlanStats {
        total_checks,
        parallel_levels,
        max_parallelism,
        average_parallelism,
        checks_with_dependencies,
    }
}
