// checkgraph-core/src/runtime/routing.rs
// ============================================================================
// Module: Routing Engine
// Description: Loop budget, per-wave forward-scheduling guards, retry
//              backoff, and forward-set expansion for `goto`/`goto_event`
//              (spec §4.4).
// Purpose: Give the wave scheduler the bookkeeping `executeWithRouting`
//          needs without embedding it directly in the scheduler loop.
// Dependencies: crate::{model, runtime::planner}, std::sync, std::time
// ============================================================================

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::model::BackoffMode;
use crate::model::CheckId;
use crate::model::EventTrigger;
use crate::model::RetryConfig;
use crate::model::ScopePath;
use crate::runtime::planner::ExecutionOrder;

// ============================================================================
// SECTION: Loop Budget
// ============================================================================

/// Run-wide routing counter bounded by `routing.max_loops` (spec §4.4, §5).
///
/// Incremented on every retry, `run`, and `goto` event. Exceeding the budget
/// does not panic; callers check [`LoopBudget::try_consume`] and emit
/// `routing/loop_budget_exceeded` themselves, since the issue is attached to
/// a specific step (spec §7).
#[derive(Debug)]
pub struct LoopBudget {
    max_loops: u32,
    used: AtomicU32,
}

impl LoopBudget {
    /// Creates a budget allowing up to `max_loops` routing events.
    #[must_use]
    pub fn new(max_loops: u32) -> Self {
        Self {
            max_loops,
            used: AtomicU32::new(0),
        }
    }

    /// Attempts to consume one unit of budget, returning `true` if the run
    /// may proceed and `false` once the budget is exhausted.
    pub fn try_consume(&self) -> bool {
        let previous = self.used.fetch_add(1, Ordering::SeqCst);
        previous < self.max_loops
    }

    /// Returns the number of routing events consumed so far.
    #[must_use]
    pub fn used(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }

    /// Returns the configured ceiling.
    #[must_use]
    pub fn max_loops(&self) -> u32 {
        self.max_loops
    }
}

/// A per-`forEach`-parent `on_finish` route budget, sized
/// `routing.max_loops - 1` (spec §4.4 step 5).
#[must_use]
pub fn on_finish_route_budget(run_wide_max_loops: u32) -> u32 {
    run_wide_max_loops.saturating_sub(1)
}

// ============================================================================
// SECTION: Per-Wave Guards
// ============================================================================

/// Forward-scheduling guard state, cleared between waves (spec §3, §5:
/// "The `forwardRunGuards` and `forwardDependentsScheduled` sets are per-wave
/// and cleared between waves").
#[derive(Debug, Default)]
pub struct PerWaveGuards {
    /// Targets forward-scheduled this wave (bypasses gating per spec §4.3 step 2).
    pub forward_scheduled: BTreeSet<CheckId>,
    /// `(check, scope)` pairs already forward-run this wave, deduping repeat schedules.
    pub forward_run_dedupe: BTreeSet<(CheckId, ScopePath)>,
    /// One-shot targets already scheduled this wave.
    pub one_shot_scheduled: BTreeSet<CheckId>,
    /// Checks whose `on_fail` hook already fired this wave.
    pub on_fail_fired: BTreeSet<CheckId>,
    /// Checks whose `on_finish` hook already fired this wave.
    pub on_finish_fired: BTreeSet<CheckId>,
}

impl PerWaveGuards {
    /// Clears all per-wave guard sets ahead of the next wave.
    pub fn clear(&mut self) {
        self.forward_scheduled.clear();
        self.forward_run_dedupe.clear();
        self.one_shot_scheduled.clear();
        self.on_fail_fired.clear();
        self.on_finish_fired.clear();
    }

    /// Records a forward run, returning `false` if `(check, scope)` was
    /// already scheduled this wave (the per-wave dedupe guard).
    pub fn mark_forward_run(&mut self, check: &CheckId, scope: &ScopePath) -> bool {
        self.forward_run_dedupe.insert((check.clone(), scope.clone()))
    }
}

// ============================================================================
// SECTION: Origin and One-Bounce Guard
// ============================================================================

/// Where an inline step execution was launched from, used for the
/// one-bounce guard (spec §4.4 "One-bounce guard").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingOrigin {
    /// Normal wave-level scheduling.
    Wave,
    /// Routed here by a hook evaluated after another step succeeded.
    OnSuccess,
    /// Routed here by a hook evaluated after another step soft-failed.
    OnFail,
    /// Executed inline as a `forEach` dependent.
    Foreach,
    /// Routed here by a `forEach` parent's `on_finish` hook.
    OnFinish,
}

impl RoutingOrigin {
    /// Returns `true` when a step executed from this origin must suppress
    /// its own `on_fail.goto`/`on_success.goto` (spec §4.4: "when a step is
    /// executed inline from origin `on_fail` or `foreach`").
    #[must_use]
    pub const fn suppresses_own_goto(self) -> bool {
        matches!(self, Self::OnFail | Self::Foreach)
    }

    /// Returns `true` when `scheduleForwardRun` should collapse the forward
    /// set to just `{target}` rather than including transitive dependents
    /// (spec §4.4: "for origin ∈ {on_fail, on_finish} the set is collapsed").
    #[must_use]
    pub const fn collapses_forward_set(self) -> bool {
        matches!(self, Self::OnFail | Self::OnFinish)
    }
}

// ============================================================================
// SECTION: Forward-Set Expansion
// ============================================================================

/// Expands a `goto` target into the forward-scheduled set for the wave
/// (spec §4.4 `scheduleForwardRun`).
///
/// For `origin` that collapses the set, returns `[target]`. Otherwise returns
/// `{target} ∪ transitive dependents of target eligible for `event``,
/// topologically ordered by plan level.
#[must_use]
pub fn schedule_forward_run(
    target: &CheckId,
    origin: RoutingOrigin,
    order: &ExecutionOrder,
    eligible: impl Fn(&CheckId) -> bool,
) -> Vec<CheckId> {
    if origin.collapses_forward_set() {
        return vec![target.clone()];
    }

    let mut reverse: BTreeMap<CheckId, Vec<CheckId>> = BTreeMap::new();
    for (id, deps) in &order.active_deps {
        for dep in deps {
            reverse.entry(dep.clone()).or_default().push(id.clone());
        }
    }

    let mut set: BTreeSet<CheckId> = BTreeSet::new();
    set.insert(target.clone());
    let mut queue: VecDeque<CheckId> = VecDeque::from([target.clone()]);
    while let Some(current) = queue.pop_front() {
        for dependent in reverse.get(&current).map(Vec::as_slice).unwrap_or(&[]) {
            if !eligible(dependent) {
                continue;
            }
            if set.insert(dependent.clone()) {
                queue.push_back(dependent.clone());
            }
        }
    }

    let level_of: BTreeMap<&CheckId, usize> =
        order.levels.iter().enumerate().flat_map(|(level, l)| l.parallel.iter().map(move |id| (id, level))).collect();
    let mut ordered: Vec<CheckId> = set.into_iter().collect();
    ordered.sort_by_key(|id| (level_of.get(id).copied().unwrap_or(usize::MAX), id.clone()));
    ordered
}

// ============================================================================
// SECTION: Retry Backoff
// ============================================================================

/// Computes the retry delay for `attempt` (1-based) under `retry`, with a
/// deterministic jitter derived from `seed` (spec §4.4: `delay = base_ms *
/// (exponential ? 2^(attempt-1) : 1) + deterministic_jitter(seed)`).
///
/// The jitter is derived from a stable string hash rather than randomness so
/// the same `(step, pr)` pair always backs off by the same amount, keeping
/// runs reproducible for tests and replay.
#[must_use]
pub fn compute_retry_delay(retry: &RetryConfig, attempt: u32, seed: &str) -> Duration {
    let multiplier = match retry.mode {
        BackoffMode::Fixed => 1,
        BackoffMode::Exponential => 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX),
    };
    let base = retry.base_ms.saturating_mul(multiplier);
    let jitter = deterministic_jitter(seed);
    Duration::from_millis(base.saturating_add(jitter))
}

/// Derives a stable 0..250ms jitter value from `seed`.
fn deterministic_jitter(seed: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    seed.hash(&mut hasher);
    hasher.finish() % 250
}

/// Returns `true` when a PR-class event elevation should be attempted for a
/// `goto_event` override (spec §4.4: "when routing to a PR-class event from
/// an issue thread, attempt a context elevation").
#[must_use]
pub fn needs_context_elevation(current_event: EventTrigger, override_event: EventTrigger) -> bool {
    !current_event.is_pr_class() && override_event.is_pr_class()
}
