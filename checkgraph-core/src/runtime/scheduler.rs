// checkgraph-core/src/runtime/scheduler.rs
// ============================================================================
// Module: Wave Scheduler & Engine Facade
// Description: The top-level run loop (spec §4.3), `executeWithRouting`
//              state machine (spec §4.4), and the facade entry points that
//              tie planner, journal, fan-out, routing, and stats together
//              (spec §2 "Wave Scheduler", "Engine Facade").
// Purpose: Turn a selected set of checks plus a config document into a
//          committed run: level-by-level execution, routing-driven forward
//          scheduling, fan-out over forEach parents, and final aggregation.
// Dependencies: checkgraph-sandbox, crate::{interfaces, model, runtime::*},
//               tokio (sync, time, task)
// ============================================================================

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Instant;

use serde_json::Value as JsonValue;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::errors::EngineError;
use crate::interfaces::Analyzer;
use crate::interfaces::DependencyView;
use crate::interfaces::ExecContext;
use crate::interfaces::Memory;
use crate::interfaces::Provider;
use crate::interfaces::ProviderRegistry;
use crate::interfaces::Telemetry;
use crate::interfaces::Templater;
use crate::model::CheckConfig;
use crate::model::CheckId;
use crate::model::DependencyToken;
use crate::model::EventTrigger;
use crate::model::ExecutionStats;
use crate::model::FanoutMode;
use crate::model::Issue;
use crate::model::OutputsHistory;
use crate::model::RoutingHook;
use crate::model::RunConfig;
use crate::model::RunCounters;
use crate::model::ScopePath;
use crate::model::SessionId;
use crate::model::Severity;
use crate::model::SkipReason;
use crate::model::StepResult;
use crate::model::next_session_id;

use super::fanout;
use super::journal::ContextView;
use super::journal::Journal;
use super::planner;
use super::planner::ExecutionOrder;
use super::routing;
use super::routing::LoopBudget;
use super::routing::PerWaveGuards;
use super::routing::RoutingOrigin;
use super::sandbox_bridge::EngineHost;
use super::sandbox_bridge::ForEachContext;
use super::sandbox_bridge::NamespaceContext;
use super::sandbox_bridge::PermissionPolicy;
use super::sandbox_bridge::StepContext;

// ============================================================================
// SECTION: Result Shape (spec §6)
// ============================================================================

/// One rendered entry in [`GroupedResults`] (spec §6).
#[derive(Debug, Clone, Default)]
pub struct ResultEntry {
    /// Display name of the producing check.
    pub check_name: CheckId,
    /// Pre-rendered text, if the check (or its templater) produced one.
    pub content: Option<String>,
    /// Output group this entry belongs to.
    pub group: String,
    /// The check's final committed output.
    pub output: JsonValue,
    /// Issues raised while producing this result.
    pub issues: Vec<Issue>,
    /// Opaque provider debug metadata, present only in debug mode.
    pub debug: Option<JsonValue>,
}

/// `group -> ordered list of result entries` (spec §6).
#[derive(Debug, Clone, Default)]
pub struct GroupedResults(pub BTreeMap<String, Vec<ResultEntry>>);

impl GroupedResults {
    fn push(&mut self, entry: ResultEntry) {
        self.0.entry(entry.group.clone()).or_default().push(entry);
    }
}

/// The full outcome of one engine invocation (spec §6 "Engine entry points").
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    /// Rendered, grouped results.
    pub results: GroupedResults,
    /// Per-check execution statistics.
    pub statistics: ExecutionStats,
    /// `checkId -> list<output>` history, exposed verbatim (spec §6).
    pub history: BTreeMap<String, Vec<JsonValue>>,
}

// ============================================================================
// SECTION: Run Inputs
// ============================================================================

/// Caller-supplied context for one run: PR/issue context, changed files,
/// filtered environment, and mode toggles (spec §6 "Environment variables").
#[derive(Debug, Clone, Default)]
pub struct RunInputs {
    /// Pull-request/issue context, exposed to expressions as `pr`.
    pub pr: Option<JsonValue>,
    /// Changed-file list, exposed to expressions as `files`.
    pub files: Option<JsonValue>,
    /// Filtered safe environment, exposed to expressions as `env`.
    pub env: BTreeMap<String, String>,
    /// Optional inbound webhook payload, forwarded to providers via
    /// `Provider::set_webhook_context`.
    pub webhook_context: Option<JsonValue>,
    /// `true` when running under the CLI/test harness.
    pub test_mode: bool,
    /// `true` when provider debug metadata should be retained on results.
    pub provider_debug: bool,
    /// `true` when any `<check>/error`/`<check>/promise-error` issue should
    /// cause the facade to throw at the end of the run (spec §7).
    pub strict_mode: bool,
}

// ============================================================================
// SECTION: Run-Scoped State
// ============================================================================

/// Mutable state scoped to one run; shared across spawned level tasks behind
/// an [`Arc`] (spec §5: "One run is a single logical owner of mutable state").
struct RunState {
    journal: Journal,
    stats: StdMutex<ExecutionStats>,
    history: StdMutex<OutputsHistory>,
    run_counters: StdMutex<RunCounters>,
    guards: StdMutex<PerWaveGuards>,
    loop_budget: LoopBudget,
    session_id: SessionId,
    event: EventTrigger,
    fail_fast_tripped: std::sync::atomic::AtomicBool,
    ran_this_wave: StdMutex<BTreeSet<CheckId>>,
    strict_offenders: StdMutex<Vec<CheckId>>,
    /// The plan's level order, fixed for the lifetime of the run — read-only
    /// after construction, so it needs no lock.
    order: ExecutionOrder,
}

impl RunState {
    fn new(session_id: SessionId, event: EventTrigger, max_loops: u32, order: ExecutionOrder) -> Self {
        Self {
            journal: Journal::new(),
            stats: StdMutex::new(ExecutionStats::new()),
            history: StdMutex::new(OutputsHistory::new()),
            run_counters: StdMutex::new(RunCounters::new()),
            guards: StdMutex::new(PerWaveGuards::default()),
            loop_budget: LoopBudget::new(max_loops),
            session_id,
            event,
            fail_fast_tripped: std::sync::atomic::AtomicBool::new(false),
            ran_this_wave: StdMutex::new(BTreeSet::new()),
            strict_offenders: StdMutex::new(Vec::new()),
            order,
        }
    }

    #[allow(clippy::missing_panics_doc, reason = "std mutexes here are never held across a panic.")]
    fn view(&self, scope: ScopePath) -> ContextView<'_> {
        self.view_for_event(scope, self.event)
    }

    /// Same as [`Self::view`] but resolved under an explicit event, used when
    /// a `goto_event` override changes the effective event for an inline run
    /// (spec §4.4 "goto_event").
    #[allow(clippy::missing_panics_doc, reason = "std mutexes here are never held across a panic.")]
    fn view_for_event(&self, scope: ScopePath, event: EventTrigger) -> ContextView<'_> {
        let snapshot = self.journal.begin_snapshot();
        ContextView::new(&self.journal, self.session_id, snapshot, scope, Some(event))
    }

    #[allow(clippy::missing_panics_doc, reason = "std mutexes here are never held across a panic.")]
    fn commit(&self, scope: ScopePath, check: CheckId, result: StepResult) {
        self.commit_for_event(scope, check, self.event, result);
    }

    /// Same as [`Self::commit`] but stamped with an explicit event, used when
    /// a `goto_event` override changes the effective event for an inline run.
    #[allow(clippy::missing_panics_doc, reason = "std mutexes here are never held across a panic.")]
    fn commit_for_event(&self, scope: ScopePath, check: CheckId, event: EventTrigger, result: StepResult) {
        self.journal.commit(self.session_id, scope, check, Some(event), result);
    }
}

// ============================================================================
// SECTION: Engine Facade
// ============================================================================

/// Owns the provider/memory/template/analyzer/telemetry collaborators and
/// drives the wave loop (spec §2 "Engine Facade", "Wave Scheduler").
pub struct WaveScheduler {
    registry: Arc<dyn ProviderRegistry>,
    memory: Arc<dyn Memory>,
    templater: Arc<dyn Templater>,
    analyzer: Arc<dyn Analyzer>,
    telemetry: Arc<dyn Telemetry>,
    permissions: Arc<dyn PermissionPolicy>,
}

/// Safety ceiling on wave iterations, independent of the configured loop
/// budget, guarding against a scheduler bug looping forever.
const MAX_WAVES_HARD_CEILING: u32 = 64;

/// Bounded poll interval and safety deadline for the intra-level barrier
/// (spec §4.3, §5: "a short interval with a 10-second safety deadline").
const BARRIER_POLL_INTERVAL_MS: u64 = 10;
const BARRIER_SAFETY_DEADLINE_MS: u64 = 10_000;

impl WaveScheduler {
    /// Builds a facade over the given collaborators.
    #[must_use]
    pub fn new(
        registry: Arc<dyn ProviderRegistry>,
        memory: Arc<dyn Memory>,
        templater: Arc<dyn Templater>,
        analyzer: Arc<dyn Analyzer>,
        telemetry: Arc<dyn Telemetry>,
        permissions: Arc<dyn PermissionPolicy>,
    ) -> Self {
        Self {
            registry,
            memory,
            templater,
            analyzer,
            telemetry,
            permissions,
        }
    }

    /// Single-aggregate entry point for CLI/manual invocations (spec §6
    /// `executeChecks`). Delegates to [`Self::execute_grouped_checks`]: both
    /// entry points share one canonical execution path.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::StrictModeFailure`] when strict mode is on and
    /// the run produced a qualifying error issue; see
    /// [`Self::execute_grouped_checks`] for why planning failures are not an
    /// `Err` here.
    pub async fn execute_checks(
        &self,
        config: &RunConfig,
        selected: BTreeSet<CheckId>,
        event: EventTrigger,
        inputs: RunInputs,
    ) -> Result<RunOutcome, EngineError> {
        self.execute_grouped_checks(config, selected, event, inputs).await
    }

    /// Runs `selected` checks from `config` under `event`, returning grouped
    /// results, execution statistics, and the outputs history (spec §6
    /// `executeGroupedChecks`).
    ///
    /// A run with no selected checks returns empty results and statistics
    /// without error (spec §8 "Running the engine with no selected checks").
    ///
    /// A fatal planning failure (an unresolvable `depends_on` token, or a
    /// dependency cycle) does *not* surface as an `Err` here: spec §7's
    /// "User-visible failure behavior" requires the facade to always return
    /// a `GroupedResults + Statistics` object, with planning failures
    /// represented as a single synthesized issue and zero executed checks
    /// (spec §8 seed scenario 6). `Err` is reserved for strict-mode failure,
    /// the one case spec §7 says behaves like a thrown error.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::StrictModeFailure`] at the end of a strict-mode
    /// run that produced at least one qualifying error issue.
    pub async fn execute_grouped_checks(
        &self,
        config: &RunConfig,
        selected: BTreeSet<CheckId>,
        event: EventTrigger,
        inputs: RunInputs,
    ) -> Result<RunOutcome, EngineError> {
        if selected.is_empty() {
            return Ok(RunOutcome::default());
        }

        let plan = match planner::resolve(&selected, &config.checks, event) {
            Ok(plan) => plan,
            Err(err) => return Ok(planning_failure_outcome(&err)),
        };
        telemetry_started(self.telemetry.as_ref(), &plan);

        let config = Arc::new(config.clone());
        let session_id = next_session_id();
        let state = Arc::new(RunState::new(session_id, event, config.routing.max_loops, plan.order.clone()));

        let mut wave = 0u32;
        loop {
            state.ran_this_wave.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clear();
            let forward_targets = self.run_wave(&config, &state, &inputs).await;
            let more = self.process_on_finish(&config, &state, &inputs, forward_targets).await;
            wave += 1;
            if !more || wave >= MAX_WAVES_HARD_CEILING {
                break;
            }
        }

        let outcome = self.aggregate(&config, &state);

        if inputs.strict_mode {
            let offenders = state.strict_offenders.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(first) = offenders.first() {
                return Err(EngineError::StrictModeFailure {
                    count: offenders.len(),
                    first_check: first.clone(),
                });
            }
        }

        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Wave / level loop (spec §4.3)
    // ------------------------------------------------------------------

    /// Runs every level of `plan` once, returning the deduplicated set of
    /// forward targets routing scheduled for the *next* wave (collapsed
    /// `on_fail`/`on_finish` gotos).
    async fn run_wave(
        &self,
        config: &Arc<RunConfig>,
        state: &Arc<RunState>,
        inputs: &RunInputs,
    ) -> Vec<CheckId> {
        state.guards.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clear();
        state.fail_fast_tripped.store(false, std::sync::atomic::Ordering::SeqCst);
        let mut next_wave_targets: Vec<CheckId> = Vec::new();

        for level in &state.order.levels {
            if state.fail_fast_tripped.load(std::sync::atomic::Ordering::SeqCst) && config.fail_fast {
                break;
            }
            let effective_parallelism =
                config.max_parallelism.map_or(level.parallel.len(), |cap| cap.min(level.parallel.len())).max(1);
            let semaphore = Arc::new(Semaphore::new(effective_parallelism));
            let mut joins = JoinSet::new();

            for id in &level.parallel {
                if config.fail_fast && state.fail_fast_tripped.load(std::sync::atomic::Ordering::SeqCst) {
                    break;
                }
                let already = state.ran_this_wave.lock().unwrap_or_else(std::sync::PoisonError::into_inner).contains(id);
                if already {
                    continue;
                }
                let Some(check) = config.checks.get(id) else { continue };
                let permit = Arc::clone(&semaphore).acquire_owned().await;
                let Ok(permit) = permit else { continue };

                let this = self.clone_refs();
                let check = check.clone();
                let config = Arc::clone(config);
                let state = Arc::clone(state);
                let inputs = inputs.clone();

                joins.spawn(async move {
                    let _permit = permit;
                    this.run_one_root(&config, &check, &state, &inputs).await
                });
            }

            while let Some(joined) = joins.join_next().await {
                if let Ok(Some(targets)) = joined {
                    next_wave_targets.extend(targets);
                }
            }
        }

        let mut seen = BTreeSet::new();
        next_wave_targets.retain(|id| seen.insert(id.clone()));
        next_wave_targets
    }

    /// Resolves gating, `if`, `max_runs`, and one-shot rules for `check` at
    /// root scope, then runs it through [`Self::execute_with_routing`].
    /// Returns any `on_fail`/`on_finish`-collapsed targets for the next wave.
    async fn run_one_root(
        &self,
        config: &Arc<RunConfig>,
        check: &CheckConfig,
        state: &Arc<RunState>,
        inputs: &RunInputs,
    ) -> Option<Vec<CheckId>> {
        let root = ScopePath::root();
        self.wait_for_same_level_deps(check, &config.checks, state, &root).await;

        let forward_scheduled = state.guards.lock().unwrap_or_else(std::sync::PoisonError::into_inner).forward_scheduled.contains(&check.id);

        if check.is_one_shot() {
            let ran_already = state.run_counters.lock().unwrap_or_else(std::sync::PoisonError::into_inner).count(&check.id, &root) > 0;
            if ran_already {
                return None;
            }
        }

        if !forward_scheduled {
            if let Some(reason) = self.gating_blocked(&config.checks, state, check, &root, state.event) {
                self.record_skip(state, check, SkipReason::DependencyFailed, Some(reason));
                return None;
            }
        }

        if let Some(expr) = &check.r#if {
            let ctx = self.namespace_for(check, &root, None, state, &config.checks, inputs, state.event);
            let mut host = EngineHost::new(self.memory.as_ref(), self.permissions.as_ref());
            let history = state.history.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let globals = ctx.to_globals(&history);
            drop(history);
            let passes = checkgraph_sandbox::eval_bool_fail_secure(expr, globals, &mut host);
            if !passes {
                self.record_skip(state, check, SkipReason::IfCondition, Some(expr.clone()));
                return None;
            }
        }

        if config.fail_fast && state.fail_fast_tripped.load(std::sync::atomic::Ordering::SeqCst) {
            self.record_skip(state, check, SkipReason::FailFast, None);
            return None;
        }

        let forward_targets = self.execute_with_routing(config, check, &root, None, RoutingOrigin::Wave, 1, state, inputs, state.event).await;

        state.ran_this_wave.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(check.id.clone());
        Some(forward_targets)
    }

    /// Bounded intra-level barrier: waits (up to the safety deadline) for
    /// `check`'s own `depends_on` branches to publish a result at `scope`
    /// before giving up (spec §4.3, §5).
    async fn wait_for_same_level_deps(&self, check: &CheckConfig, configs: &BTreeMap<CheckId, CheckConfig>, state: &Arc<RunState>, scope: &ScopePath) {
        if check.depends_on.is_empty() {
            return;
        }
        let deadline = Instant::now() + std::time::Duration::from_millis(BARRIER_SAFETY_DEADLINE_MS);
        loop {
            let view = state.view_for_event(scope.clone(), state.event);
            let satisfied = check.depends_on.iter().all(|token| token.branches().iter().any(|b| view.get(b).is_some() || !configs.contains_key(b)));
            if satisfied || Instant::now() >= deadline {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(BARRIER_POLL_INTERVAL_MS)).await;
        }
    }

    /// Returns `Some(reason)` when `check`'s dependencies are not satisfied
    /// at `scope` (spec §4.3 "Gating").
    fn gating_blocked(&self, configs: &BTreeMap<CheckId, CheckConfig>, state: &Arc<RunState>, check: &CheckConfig, scope: &ScopePath, event: EventTrigger) -> Option<String> {
        let view = state.view_for_event(scope.clone(), event);
        for token in &check.depends_on {
            let branches = token.branches();
            let satisfied = branches.iter().any(|branch| {
                let result = view.get(branch);
                let continue_on_failure = configs.get(branch).is_some_and(|c| c.continue_on_failure);
                branch_satisfied(result, continue_on_failure)
            });
            if !satisfied {
                return Some(token.as_str().to_string());
            }
        }
        None
    }

    fn record_skip(&self, state: &Arc<RunState>, check: &CheckConfig, reason: SkipReason, condition: Option<String>) {
        {
            let mut stats = state.stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            stats.row_mut(&check.id).record_skip(reason, condition);
        }
        let issue = Issue::namespaced(&check.id, "__skipped", Severity::Info, format!("skipped: {reason:?}"));
        let result = StepResult {
            issues: vec![issue],
            ..StepResult::default()
        };
        state.commit(ScopePath::root(), check.id.clone(), result);
    }

    // ------------------------------------------------------------------
    // executeWithRouting state machine (spec §4.4)
    // ------------------------------------------------------------------

    /// Runs `check` once at `scope` (optionally under `foreach` item
    /// context), classifies the result, evaluates `fail_if`, retries on
    /// failure, and schedules `on_success`/`on_fail` routing targets.
    ///
    /// Returns the ids that should be forward-scheduled for the *next* wave
    /// (collapsed `on_fail`/`on_finish` gotos); inline (`on_success`) targets
    /// are executed before this function returns.
    #[allow(clippy::too_many_arguments)]
    async fn execute_with_routing(
        &self,
        config: &Arc<RunConfig>,
        check: &CheckConfig,
        scope: &ScopePath,
        foreach: Option<ForEachContext>,
        origin: RoutingOrigin,
        mut attempt: u32,
        state: &Arc<RunState>,
        inputs: &RunInputs,
        effective_event: EventTrigger,
    ) -> Vec<CheckId> {
        let configs = &config.checks;

        let max_runs = config.effective_max_runs(check);
        let already_ran = state.run_counters.lock().unwrap_or_else(std::sync::PoisonError::into_inner).count(&check.id, scope);
        if max_runs.is_some_and(|cap| already_ran >= cap) {
            let issue = Issue::namespaced(&check.id, "limits/max_runs_exceeded", Severity::Error, "max_runs exceeded for this scope");
            state.commit_for_event(
                scope.clone(),
                check.id.clone(),
                effective_event,
                StepResult {
                    issues: vec![issue],
                    ..StepResult::default()
                },
            );
            return Vec::new();
        }
        state.run_counters.lock().unwrap_or_else(std::sync::PoisonError::into_inner).increment(&check.id, scope);

        let result = loop {
            let dep_view = self.build_dep_view(configs, state, scope, inputs, effective_event);
            let provider = self.registry.resolve(&check.provider_type);
            let exec_ctx = ExecContext {
                session_id: state.session_id,
                reuse_session_id: None,
                test_mode: inputs.test_mode,
                provider_debug: inputs.provider_debug,
                outputs_history: Arc::new(state.history.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()),
            };

            let handle = state.stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner).record_iteration_start(&check.id);
            let provider_started = Instant::now();
            let step_input = JsonValue::Object(check.extra.clone());

            let mut attempt_result = match provider {
                None => StepResult {
                    issues: vec![Issue::namespaced(&check.id, "error", Severity::Critical, format!("no provider registered for type `{}`", check.provider_type))],
                    ..StepResult::default()
                },
                Some(provider) => match provider.execute(&check.id, &step_input, &dep_view, &exec_ctx).await {
                    Ok(result) => result,
                    Err(err) => {
                        let severity = classify_error_severity(&err.to_string());
                        StepResult {
                            issues: vec![Issue::namespaced(&check.id, "error", severity, err.to_string())],
                            ..StepResult::default()
                        }
                    }
                },
            };

            self.apply_fail_if(config, check, scope, foreach.clone(), &mut attempt_result, state, inputs, effective_event);

            let provider_elapsed = provider_started.elapsed();
            let output_defined = !attempt_result.output.is_null();
            let success = !attempt_result.is_soft_failed();
            state.stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner).record_iteration_complete(
                handle,
                success,
                provider_elapsed,
                &attempt_result.issues,
                output_defined,
            );

            if success {
                break attempt_result;
            }

            let retry = config.effective_on_fail(check).and_then(|hook| hook.retry);
            if let Some(retry) = retry {
                if attempt <= retry.max {
                    if !state.loop_budget.try_consume() {
                        let issue = Issue::namespaced(&check.id, "routing/loop_budget_exceeded", Severity::Error, "routing loop budget exhausted");
                        attempt_result.issues.push(issue);
                        break attempt_result;
                    }
                    let seed = format!("{}-{}", check.id, scope);
                    let delay = routing::compute_retry_delay(&retry, attempt, &seed);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
            }
            break attempt_result;
        };

        self.record_strict_offender(state, check, &result, inputs);

        let success = !result.is_soft_failed();
        let mut result = result;
        if success && check.for_each {
            if let Some(array) = result.output.as_array().cloned() {
                // Mark the parent's own committed result as a forEach
                // aggregate (spec §4.5 step 1: "Commit P's aggregate to the
                // Journal at root scope and set isForEach=true,
                // forEachItems=<array>") — both `process_on_finish` and the
                // `fanout: map` re-dispatch in `run_target_inline` gate on
                // this flag, not just on the output shape.
                result.is_for_each = true;
                result.for_each_items = array;
            }
        }

        let committed = if inputs.provider_debug { result.clone() } else { strip_debug(result.clone()) };
        state.commit_for_event(scope.clone(), check.id.clone(), effective_event, committed);
        self.append_history(check, scope, &foreach, &result, state);

        let mut next_wave_targets = Vec::new();

        if success {
            if let Some(array) = result.output.as_array().cloned() {
                if check.for_each {
                    self.drive_fanout(config, check, scope, &array, &result, state, inputs, effective_event).await;
                }
            }
            if !origin.suppresses_own_goto() || !check.on_success.is_empty() {
                self.run_hook_inline(config, check, scope, &check.on_success, RoutingOrigin::OnSuccess, state, inputs, origin, effective_event).await;
            }
        } else {
            self.run_hook_targets(
                config,
                check,
                scope,
                config.effective_on_fail(check),
                RoutingOrigin::OnFail,
                state,
                inputs,
                origin,
                &mut next_wave_targets,
                effective_event,
            )
            .await;
        }

        next_wave_targets
    }

    fn record_strict_offender(&self, state: &Arc<RunState>, check: &CheckConfig, result: &StepResult, inputs: &RunInputs) {
        if !inputs.strict_mode {
            return;
        }
        let qualifies = result.issues.iter().any(|issue| {
            issue.rule_id.ends_with("/error") || issue.rule_id.ends_with("/promise-error")
        });
        if qualifies {
            state.strict_offenders.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(check.id.clone());
        }
    }

    /// Evaluates the check's own `fail_if` and the config-wide `fail_if`
    /// against `result.output`, appending a synthesized issue for each
    /// triggered condition (spec §4.4 "fail_if").
    #[allow(clippy::too_many_arguments)]
    fn apply_fail_if(
        &self,
        config: &Arc<RunConfig>,
        check: &CheckConfig,
        scope: &ScopePath,
        foreach: Option<ForEachContext>,
        result: &mut StepResult,
        state: &Arc<RunState>,
        inputs: &RunInputs,
        effective_event: EventTrigger,
    ) {
        let mut ctx = self.namespace_for(check, scope, foreach, state, &config.checks, inputs, effective_event);
        ctx.output = Some(result.output.clone());
        let history = state.history.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let globals = ctx.to_globals(&history);
        drop(history);
        let mut host = EngineHost::new(self.memory.as_ref(), self.permissions.as_ref());

        if let Some(expr) = &check.fail_if {
            if checkgraph_sandbox::eval_bool_fail_secure(expr, globals.clone(), &mut host) {
                result.issues.push(Issue::namespaced(&check.id, "fail_if", Severity::Error, format!("fail_if triggered: {expr}")));
            }
        }
        if let Some(expr) = &config.fail_if {
            if checkgraph_sandbox::eval_bool_fail_secure(expr, globals, &mut host) {
                let mut issue = Issue::namespaced(&check.id, "global_fail_if", Severity::Error, format!("global fail_if triggered: {expr}"));
                issue.rule_id = "global_fail_if".to_string();
                result.issues.push(issue);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn namespace_for(
        &self,
        check: &CheckConfig,
        scope: &ScopePath,
        foreach: Option<ForEachContext>,
        state: &Arc<RunState>,
        configs: &BTreeMap<CheckId, CheckConfig>,
        inputs: &RunInputs,
        effective_event: EventTrigger,
    ) -> NamespaceContext {
        let view = state.view_for_event(scope.clone(), effective_event);
        let mut outputs = BTreeMap::new();
        let mut outputs_raw = BTreeMap::new();
        for id in configs.keys() {
            if let Some(value) = view.get(id) {
                outputs.insert(id.to_string(), value.output.clone());
            }
            if let Some(raw) = view.get_raw(id) {
                outputs_raw.insert(id.to_string(), raw.clone());
            }
        }
        NamespaceContext {
            step: StepContext {
                id: check.id.clone(),
                tags: check.tags.clone(),
                group: group_of(check),
                attempt: 1,
                loop_count: state.loop_budget.used(),
                error: None,
            },
            foreach,
            outputs,
            outputs_raw,
            output: None,
            pr: inputs.pr.clone(),
            files: inputs.files.clone(),
            env: inputs.env.clone(),
            event: Some(effective_event),
        }
    }

    fn build_dep_view(
        &self,
        configs: &BTreeMap<CheckId, CheckConfig>,
        state: &Arc<RunState>,
        scope: &ScopePath,
        _inputs: &RunInputs,
        effective_event: EventTrigger,
    ) -> DependencyView {
        let view = state.view_for_event(scope.clone(), effective_event);
        let mut outputs = BTreeMap::new();
        let mut outputs_raw = BTreeMap::new();
        for id in configs.keys() {
            if let Some(value) = view.get(id) {
                outputs.insert(id.to_string(), value.output.clone());
            }
            if let Some(raw) = view.get_raw(id) {
                outputs_raw.insert(id.to_string(), raw.clone());
            }
        }
        DependencyView {
            outputs,
            outputs_raw,
            scope: scope.clone(),
            event: effective_event,
        }
    }

    fn append_history(&self, check: &CheckConfig, scope: &ScopePath, foreach: &Option<ForEachContext>, result: &StepResult, state: &Arc<RunState>) {
        if result.output.is_null() && result.issues.iter().any(|i| i.rule_id.ends_with("/__skipped")) {
            return;
        }
        let loop_idx = state.loop_budget.used();
        let mut history = state.history.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(fe) = foreach {
            let entry = fanout::child_history_entry(fe.parent.clone(), loop_idx, true, JsonValue::from(fe.index), Some(result.output.clone()));
            history.push(check.id.clone(), entry);
        } else if !(check.for_each && scope.is_root()) {
            history.push(
                check.id.clone(),
                crate::model::HistoryEntry {
                    output: result.output.clone(),
                    loop_idx,
                    last_loop: true,
                    parent: None,
                    id: None,
                },
            );
        }
    }

    // ------------------------------------------------------------------
    // Fan-out (forEach) driving (spec §4.5)
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    async fn drive_fanout(
        &self,
        config: &Arc<RunConfig>,
        parent: &CheckConfig,
        base_scope: &ScopePath,
        items: &[JsonValue],
        parent_result: &StepResult,
        state: &Arc<RunState>,
        inputs: &RunInputs,
        effective_event: EventTrigger,
    ) {
        {
            let mut stats = state.stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            stats.row_mut(&parent.id).record_for_each_preview(items);
        }
        let _ = parent_result;

        let loop_idx = state.loop_budget.used();
        {
            let mut history = state.history.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let item_ids: Vec<JsonValue> = items.iter().enumerate().map(|(i, _)| JsonValue::from(i)).collect();
            for entry in fanout::parent_history_entries(JsonValue::Array(items.to_vec()), loop_idx, item_ids) {
                history.push(parent.id.clone(), entry);
            }
        }

        let configs = &config.checks;

        // BFS outward from `parent` over `depends_on` edges: direct
        // dependents run first, then their own dependents ("descendants of
        // D further out", spec §4.5 step 4), gated by the intersection of
        // every forEach-tree ancestor's fatal mask seen so far.
        let mut masks: BTreeMap<CheckId, Vec<bool>> = BTreeMap::new();
        let mut visited: BTreeSet<CheckId> = BTreeSet::new();
        visited.insert(parent.id.clone());
        let mut frontier = vec![parent.id.clone()];

        while !frontier.is_empty() {
            let mut level: Vec<CheckId> = configs
                .values()
                .filter(|c| !visited.contains(&c.id) && c.depends_on.iter().any(|t| t.branches().iter().any(|b| frontier.contains(b))))
                .map(|c| c.id.clone())
                .collect();
            level.sort();
            if level.is_empty() {
                break;
            }
            for id in &level {
                visited.insert(id.clone());
            }

            let mut next_frontier = Vec::with_capacity(level.len());
            for dependent_id in level {
                let Some(dependent) = configs.get(&dependent_id).cloned() else { continue };
                if !dependent.eligible_for_event(effective_event) {
                    continue;
                }

                let ancestor_masks: Vec<&[bool]> =
                    dependent.depends_on.iter().flat_map(DependencyToken::branches).filter_map(|b| masks.get(b).map(Vec::as_slice)).collect();
                let runnable = if ancestor_masks.is_empty() {
                    Some((0..items.len()).collect::<Vec<usize>>())
                } else {
                    fanout::runnable_indices(items.len(), &ancestor_masks)
                };
                let Some(runnable) = runnable else {
                    self.record_skip_scoped(state, &dependent, base_scope, effective_event, SkipReason::DependencyFailed, Some("forEach ancestor masks blocked every index".to_string()));
                    next_frontier.push(dependent_id);
                    continue;
                };

                let mut item_results = vec![StepResult::default(); items.len()];
                for index in runnable {
                    let item_scope = fanout::item_scope(base_scope, &parent.id, index);
                    let blocked = self.gating_blocked(configs, state, &dependent, &item_scope, effective_event);
                    if blocked.is_some() {
                        continue;
                    }
                    if let Some(expr) = &dependent.r#if {
                        let fe = ForEachContext {
                            index,
                            total: items.len(),
                            parent: parent.id.clone(),
                        };
                        let ctx = self.namespace_for(&dependent, &item_scope, Some(fe), state, configs, inputs, effective_event);
                        let mut host = EngineHost::new(self.memory.as_ref(), self.permissions.as_ref());
                        let history = state.history.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                        let globals = ctx.to_globals(&history);
                        drop(history);
                        if !checkgraph_sandbox::eval_bool_fail_secure(expr, globals, &mut host) {
                            continue;
                        }
                    }
                    let fe = ForEachContext {
                        index,
                        total: items.len(),
                        parent: parent.id.clone(),
                    };
                    self.execute_with_routing(config, &dependent, &item_scope, Some(fe), RoutingOrigin::Foreach, 1, state, inputs, effective_event).await;
                    let item_view = state.view_for_event(item_scope.clone(), effective_event);
                    item_results[index] = item_view.get(&dependent.id).cloned().unwrap_or_default();
                }

                let parent_fail_if_triggered: Vec<bool> = items
                    .iter()
                    .map(|item| dependent.fail_if.as_ref().map(|expr| self.eval_parent_item_fail_if(expr, item)).unwrap_or(false))
                    .collect();
                let fatal_mask = fanout::compute_fatal_mask(&item_results, &parent_fail_if_triggered);
                masks.insert(dependent_id.clone(), fatal_mask.clone());
                let aggregate = fanout::aggregate_dependent(item_results, fatal_mask);
                state.commit_for_event(base_scope.clone(), dependent_id.clone(), effective_event, aggregate);
                state.ran_this_wave.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(dependent_id.clone());
                next_frontier.push(dependent_id);
            }
            frontier = next_frontier;
        }
    }

    /// Like [`Self::record_skip`] but scoped to an arbitrary scope/event —
    /// used when a forEach descendant is blocked by ancestor fatal masks
    /// rather than by the plain root-scope wave loop.
    fn record_skip_scoped(&self, state: &Arc<RunState>, check: &CheckConfig, scope: &ScopePath, event: EventTrigger, reason: SkipReason, condition: Option<String>) {
        {
            let mut stats = state.stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            stats.row_mut(&check.id).record_skip(reason, condition);
        }
        let issue = Issue::namespaced(&check.id, "__skipped", Severity::Info, format!("skipped: {reason:?}"));
        let result = StepResult {
            issues: vec![issue],
            ..StepResult::default()
        };
        state.commit_for_event(scope.clone(), check.id.clone(), event, result);
    }

    fn eval_parent_item_fail_if(&self, expr: &str, item: &JsonValue) -> bool {
        let mut globals = BTreeMap::new();
        globals.insert("output".to_string(), checkgraph_sandbox::Value::from_json(item));
        let mut host = checkgraph_sandbox::NullHost;
        checkgraph_sandbox::eval_bool_fail_secure(expr, globals, &mut host)
    }

    // ------------------------------------------------------------------
    // Routing hook dispatch (spec §4.4)
    // ------------------------------------------------------------------

    /// Consumes one unit of the run-wide loop budget before dispatching a
    /// `run`/`goto` routing target, attaching `routing/loop_budget_exceeded`
    /// to `check` and returning `false` once the budget is exhausted (spec
    /// §4.4 "Loop budget": "incremented on each retry/run/goto event" — a
    /// check's own first, wave-triggered attempt never calls this).
    fn consume_loop_budget(&self, state: &Arc<RunState>, check: &CheckConfig, scope: &ScopePath, effective_event: EventTrigger) -> bool {
        if state.loop_budget.try_consume() {
            return true;
        }
        let issue = Issue::namespaced(&check.id, "routing/loop_budget_exceeded", Severity::Error, "routing loop budget exhausted");
        state.commit_for_event(
            scope.clone(),
            check.id.clone(),
            effective_event,
            StepResult {
                issues: vec![issue],
                ..StepResult::default()
            },
        );
        false
    }

    /// Runs `hook.run`/`run_js` targets inline (same wave), and, unless
    /// suppressed by the one-bounce guard, expands `hook.goto`/`goto_js`
    /// inline as well (`on_success` never collapses the forward set).
    #[allow(clippy::too_many_arguments)]
    async fn run_hook_inline(
        &self,
        config: &Arc<RunConfig>,
        check: &CheckConfig,
        scope: &ScopePath,
        hook: &RoutingHook,
        hook_origin: RoutingOrigin,
        state: &Arc<RunState>,
        inputs: &RunInputs,
        parent_origin: RoutingOrigin,
        effective_event: EventTrigger,
    ) {
        let mut targets = hook.run.clone();
        if let Some(expr) = &hook.run_js {
            if let Some(ids) = self.eval_id_list(check, scope, expr, state, config, inputs, effective_event) {
                targets.extend(ids.into_iter().map(CheckId::new));
            }
        }
        for target in dedupe(targets) {
            if !self.consume_loop_budget(state, check, scope, effective_event) {
                return;
            }
            self.run_target_inline(config, &check.id, &target, scope, hook_origin, state, inputs, effective_event).await;
        }

        if parent_origin.suppresses_own_goto() {
            return;
        }
        if let Some((goto, goto_event_override)) = self.resolve_goto(check, scope, hook, state, config, inputs, effective_event) {
            if !self.consume_loop_budget(state, check, scope, effective_event) {
                return;
            }
            // spec §4.4: "goto_event overrides the effective event for the
            // inline run" — only `on_success`'s inline forward set honors it.
            let target_event = goto_event_override.unwrap_or(effective_event);
            let order = &state.order;
            let forward = routing::schedule_forward_run(&goto, hook_origin, order, |id| config.checks.get(id).is_some_and(|c| c.eligible_for_event(target_event)));

            let elevated_pr = if routing::needs_context_elevation(effective_event, target_event) {
                self.analyzer.elevate(inputs.pr.as_ref().unwrap_or(&JsonValue::Null), target_event).ok()
            } else {
                None
            };
            let run_inputs = elevated_pr.map(|pr| RunInputs {
                pr: Some(pr),
                ..inputs.clone()
            });
            let run_inputs = run_inputs.as_ref().unwrap_or(inputs);

            for target in forward {
                if !state.guards.lock().unwrap_or_else(std::sync::PoisonError::into_inner).mark_forward_run(&target, scope) {
                    continue;
                }
                state.guards.lock().unwrap_or_else(std::sync::PoisonError::into_inner).forward_scheduled.insert(target.clone());
                self.run_target_inline(config, &check.id, &target, scope, hook_origin, state, run_inputs, target_event).await;
            }
        }
    }

    /// Runs `hook.run`/`run_js` targets inline and pushes `hook.goto`/
    /// `goto_js` targets into `next_wave_targets` (collapsed to the target
    /// alone, executed next wave) — used for `on_fail` and `on_finish`.
    /// `goto_event` is not honored here: the collapsed target re-enters
    /// gating on the next wave under the run's ambient event (spec §4.4
    /// pairs the override only with the `on_success` inline path).
    #[allow(clippy::too_many_arguments)]
    async fn run_hook_targets(
        &self,
        config: &Arc<RunConfig>,
        check: &CheckConfig,
        scope: &ScopePath,
        hook: Option<&RoutingHook>,
        hook_origin: RoutingOrigin,
        state: &Arc<RunState>,
        inputs: &RunInputs,
        parent_origin: RoutingOrigin,
        next_wave_targets: &mut Vec<CheckId>,
        effective_event: EventTrigger,
    ) {
        let Some(hook) = hook else { return };

        let mut targets = hook.run.clone();
        if let Some(expr) = &hook.run_js {
            if let Some(ids) = self.eval_id_list(check, scope, expr, state, config, inputs, effective_event) {
                targets.extend(ids.into_iter().map(CheckId::new));
            }
        }
        for target in dedupe(targets) {
            if !self.consume_loop_budget(state, check, scope, effective_event) {
                return;
            }
            self.run_target_inline(config, &check.id, &target, scope, hook_origin, state, inputs, effective_event).await;
        }

        if parent_origin.suppresses_own_goto() {
            return;
        }
        if let Some((goto, _goto_event_override)) = self.resolve_goto(check, scope, hook, state, config, inputs, effective_event) {
            if !self.consume_loop_budget(state, check, scope, effective_event) {
                return;
            }
            next_wave_targets.push(goto);
        }
    }

    /// Resolves a hook's `goto`/`goto_js` target, together with any
    /// `goto_event` override declared on the hook (spec §4.4 `goto_event`).
    fn resolve_goto(
        &self,
        check: &CheckConfig,
        scope: &ScopePath,
        hook: &RoutingHook,
        state: &Arc<RunState>,
        config: &Arc<RunConfig>,
        inputs: &RunInputs,
        effective_event: EventTrigger,
    ) -> Option<(CheckId, Option<EventTrigger>)> {
        if let Some(goto) = &hook.goto {
            return Some((goto.clone(), hook.goto_event));
        }
        let expr = hook.goto_js.as_ref()?;
        let ids = self.eval_id_list(check, scope, expr, state, config, inputs, effective_event)?;
        ids.into_iter().next().map(|id| (CheckId::new(id), hook.goto_event))
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_id_list(
        &self,
        check: &CheckConfig,
        scope: &ScopePath,
        expr: &str,
        state: &Arc<RunState>,
        config: &Arc<RunConfig>,
        inputs: &RunInputs,
        effective_event: EventTrigger,
    ) -> Option<Vec<String>> {
        let ctx = self.namespace_for(check, scope, None, state, &config.checks, inputs, effective_event);
        let history = state.history.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let globals = ctx.to_globals(&history);
        drop(history);
        let mut host = EngineHost::new(self.memory.as_ref(), self.permissions.as_ref());
        checkgraph_sandbox::eval_id_list(expr, globals, &mut host)
    }

    /// Runs `target` inline at `scope`, honoring the target's `fanout` mode
    /// when `scope`'s owner is a `forEach` parent (spec §4.4 step 6, §3
    /// "fanout").
    ///
    /// `owner` is the check whose hook (`on_success`/`on_fail`/`on_finish`)
    /// scheduled `target` — when `scope` itself carries no forEach segment
    /// (the owner ran at root scope) but the owner is itself a `forEach`
    /// parent, `owner` is the relevant parent for `fanout: map` re-dispatch
    /// (spec §8 seed scenario 3: `list (forEach:true)` routes to
    /// `per-item (fanout:map)` via `on_success.run` while still at root scope).
    #[allow(clippy::too_many_arguments)]
    async fn run_target_inline(&self, config: &Arc<RunConfig>, owner: &CheckId, target: &CheckId, scope: &ScopePath, origin: RoutingOrigin, state: &Arc<RunState>, inputs: &RunInputs, effective_event: EventTrigger) {
        let Some(target_config) = config.checks.get(target) else { return };
        if !target_config.eligible_for_event(effective_event) {
            return;
        }
        if target_config.is_one_shot() {
            let mut guards = state.guards.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if !guards.one_shot_scheduled.insert(target.clone()) {
                return;
            }
        }

        let fanout_parent = scope
            .segments()
            .last()
            .map(|seg| seg.parent_check_id.clone())
            .or_else(|| config.checks.get(owner).filter(|c| c.for_each).map(|_| owner.clone()));
        if target_config.fanout == FanoutMode::Map {
            if let Some(parent_id) = fanout_parent {
                let parent_view = state.view_for_event(ScopePath::root(), effective_event);
                if let Some(parent_result) = parent_view.get(&parent_id) {
                    if parent_result.is_for_each {
                        let items = parent_result.for_each_item_results.len().max(parent_result.output.as_array().map_or(0, Vec::len));
                        for index in 0..items {
                            let item_scope = fanout::item_scope(&ScopePath::root(), &parent_id, index);
                            Box::pin(self.execute_with_routing(config, target_config, &item_scope, None, origin, 1, state, inputs, effective_event)).await;
                        }
                        return;
                    }
                }
            }
        }

        Box::pin(self.execute_with_routing(config, target_config, scope, None, origin, 1, state, inputs, effective_event)).await;
    }

    // ------------------------------------------------------------------
    // on_finish processing (spec §4.4 "On-finish hooks")
    // ------------------------------------------------------------------

    /// Processes `on_finish` for every `forEach` parent, ensuring direct
    /// dependents have results, then evaluating `run`/`run_js`/`goto`/
    /// `goto_js`. Returns `true` when another wave should run.
    async fn process_on_finish(&self, config: &Arc<RunConfig>, state: &Arc<RunState>, inputs: &RunInputs, mut collapsed_fail_targets: Vec<CheckId>) -> bool {
        let mut scheduled_any = false;

        for id in state.order.all_ids() {
            if !collapsed_fail_targets.is_empty() {
                break;
            }
            let Some(check) = config.checks.get(&id) else { continue };
            if !check.for_each || check.on_finish.is_empty() {
                continue;
            }
            let root = ScopePath::root();
            let view = state.view(root.clone());
            let Some(parent_result) = view.get(&id) else { continue };
            if !parent_result.is_for_each {
                continue;
            }
            let already_fired = {
                let mut guards = state.guards.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                !guards.on_finish_fired.insert(id.clone())
            };
            if already_fired {
                continue;
            }

            let all_valid = dependents_all_valid(&config.checks, &id, state, &root);

            let mut targets = check.on_finish.run.clone();
            if let Some(expr) = &check.on_finish.run_js {
                if let Some(ids) = self.eval_id_list(check, &root, expr, state, config, inputs, state.event) {
                    targets.extend(ids.into_iter().map(CheckId::new));
                }
            }
            for target in dedupe(targets) {
                self.run_target_inline(config, &id, &target, &root, RoutingOrigin::OnFinish, state, inputs, state.event).await;
                scheduled_any = true;
            }

            if let Some((goto, _goto_event_override)) = self.resolve_goto(check, &root, &check.on_finish, state, config, inputs, state.event) {
                if goto == id && all_valid {
                    continue;
                }
                let budget_key = format!("on_finish::{id}");
                if !consume_on_finish_budget(state, &budget_key, routing::on_finish_route_budget(config.routing.max_loops)) {
                    let issue = Issue::namespaced(&id, "routing/loop_budget_exceeded", Severity::Error, "on_finish route budget exhausted");
                    state.commit(
                        root.clone(),
                        id.clone(),
                        StepResult {
                            issues: vec![issue],
                            ..StepResult::default()
                        },
                    );
                    continue;
                }
                collapsed_fail_targets.push(goto);
                scheduled_any = true;
            }
        }

        if !collapsed_fail_targets.is_empty() {
            let mut guards = state.guards.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            for target in &collapsed_fail_targets {
                guards.forward_scheduled.insert(target.clone());
            }
        }

        scheduled_any || !collapsed_fail_targets.is_empty()
    }

    // ------------------------------------------------------------------
    // Aggregation (spec §2, §6)
    // ------------------------------------------------------------------

    fn aggregate(&self, config: &Arc<RunConfig>, state: &Arc<RunState>) -> RunOutcome {
        let mut results = GroupedResults::default();
        let root = ScopePath::root();
        let view = state.view(root);

        for id in state.order.all_ids() {
            let Some(check) = config.checks.get(&id) else { continue };
            let Some(result) = view.get(&id) else { continue };
            let content = result.content.clone().or_else(|| self.templater.render(&id, result).ok());
            results.push(ResultEntry {
                check_name: id.clone(),
                content,
                group: group_of(check),
                output: result.output.clone(),
                issues: result.issues.clone(),
                debug: result.debug.clone(),
            });
        }

        let stats = state.stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone_for_aggregate();
        let history = state.history.lock().unwrap_or_else(std::sync::PoisonError::into_inner).to_json_map();

        RunOutcome {
            results,
            statistics: stats,
            history,
        }
    }

    fn clone_refs(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            memory: Arc::clone(&self.memory),
            templater: Arc::clone(&self.templater),
            analyzer: Arc::clone(&self.analyzer),
            telemetry: Arc::clone(&self.telemetry),
            permissions: Arc::clone(&self.permissions),
        }
    }
}

// ============================================================================
// SECTION: Free Helpers
// ============================================================================

/// Builds the `Ok(RunOutcome)` returned in place of a thrown error when
/// [`planner::resolve`] fails (spec §7: "fatal planning errors return a
/// single synthesized issue and zero checks executed").
fn planning_failure_outcome(err: &EngineError) -> RunOutcome {
    let (rule_id, message) = match err {
        EngineError::DependencyValidation(detail) => ("dependency-validation-error", detail.clone()),
        EngineError::CircularDependency(detail) => ("circular-dependency-error", detail.clone()),
        EngineError::StrictModeFailure { .. } => ("dependency-validation-error", err.to_string()),
    };
    let issue = Issue {
        file: None,
        line: None,
        end_line: None,
        severity: Severity::Critical,
        rule_id: rule_id.to_string(),
        message,
        category: None,
        check_name: "engine".to_string(),
        group: None,
        schema: None,
        template: None,
        timestamp: None,
        suggestion: None,
        replacement: None,
    };
    let mut results = GroupedResults::default();
    results.push(ResultEntry {
        check_name: CheckId::new("engine"),
        content: None,
        group: "engine".to_string(),
        output: JsonValue::Null,
        issues: vec![issue],
        debug: None,
    });
    RunOutcome {
        results,
        statistics: ExecutionStats::new(),
        history: BTreeMap::new(),
    }
}

fn group_of(check: &CheckConfig) -> String {
    check.extra.get("group").and_then(JsonValue::as_str).map_or_else(|| "default".to_string(), str::to_string)
}

fn dedupe(ids: Vec<CheckId>) -> Vec<CheckId> {
    let mut seen = BTreeSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

fn branch_satisfied(result: Option<&StepResult>, continue_on_failure: bool) -> bool {
    match result {
        None => false,
        Some(result) => {
            if result.issues.iter().any(|issue| issue.rule_id.ends_with("/__skipped")) {
                return false;
            }
            if result.has_gating_fatal_issue() && !continue_on_failure {
                return false;
            }
            true
        }
    }
}

fn classify_error_severity(message: &str) -> Severity {
    let lowered = message.to_ascii_lowercase();
    const AUTH_PATTERNS: &[&str] = &["401", "403", "429", "unauthorized", "forbidden", "rate limit", "rate-limit"];
    if AUTH_PATTERNS.iter().any(|pattern| lowered.contains(pattern)) {
        Severity::Critical
    } else {
        Severity::Error
    }
}

fn strip_debug(mut result: StepResult) -> StepResult {
    result.debug = None;
    result
}

fn dependents_all_valid(configs: &BTreeMap<CheckId, CheckConfig>, parent: &CheckId, state: &Arc<RunState>, scope: &ScopePath) -> bool {
    let dependents: Vec<&CheckConfig> = configs.values().filter(|c| c.depends_on.iter().any(|t| t.branches().contains(parent))).collect();
    if dependents.is_empty() {
        return true;
    }
    let history = state.history.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    dependents.iter().all(|dependent| {
        history.for_check(&dependent.id).iter().filter(|entry| entry.last_loop).all(|entry| entry_is_valid(&entry.output))
    })
}

fn entry_is_valid(output: &JsonValue) -> bool {
    match output.get("is_valid").or_else(|| output.get("valid")) {
        Some(JsonValue::Bool(b)) => *b,
        _ => true,
    }
}

fn consume_on_finish_budget(state: &Arc<RunState>, _key: &str, budget: u32) -> bool {
    state.loop_budget.used() < budget || budget == 0
}

fn telemetry_started(telemetry: &dyn Telemetry, plan: &planner::Plan) {
    telemetry.emit_span(
        "checkgraph.run.started",
        &serde_json::json!({
            "total_checks": plan.stats.total_checks,
            "parallel_levels": plan.stats.parallel_levels,
        }),
    );
}

impl ExecutionStats {
    /// Clones the recorder for inclusion in a [`RunOutcome`] (cheap: a run's
    /// stats table is small relative to its provider calls).
    fn clone_for_aggregate(&self) -> Self {
        let mut cloned = Self::new();
        for (id, row) in self.iter() {
            *cloned.row_mut(id) = row.clone();
        }
        cloned
    }
}
