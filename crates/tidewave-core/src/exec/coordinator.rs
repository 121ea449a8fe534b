//! Top-level workflow coordination: wave-by-wave execution, failure policy,
//! gating, and result aggregation.
//!
//! The coordinator is a state machine over wave execution:
//! Loading -> Validating -> Executing(wave) -> Gating -> Done. Loading and
//! validation fail closed: a malformed definition produces a zero-step
//! `WorkflowResult` with a populated error, never a panic or an `Err`.
//!
//! Every step of a wave is dispatched concurrently through a `JoinSet` and
//! the full wave is awaited before the next one starts. Fail-fast halts
//! scheduling of future waves only; steps already dispatched in the failing
//! wave drain cooperatively. The final step list is always re-sorted to
//! declaration order, independent of completion timing.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use tidewave_types::event::RunEvent;
use tidewave_types::gate::GateSpec;
use tidewave_types::result::{StepExecutionResult, WorkflowResult};
use tidewave_types::workflow::{OnFail, StepDefinition, WorkflowDefinition};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::artifact::ArtifactManager;
use crate::event::EventBus;
use crate::gate::GateManager;
use crate::routing::allocator::BudgetLedger;
use crate::routing::router::Router;
use crate::workflow::context::ExecutionContext;
use crate::workflow::definition::{load_workflow_file, validate_definition};
use crate::workflow::expression::GuardEvaluator;

use super::step::StepExecutor;

// ---------------------------------------------------------------------------
// Run phases (observability only)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    Loading,
    Validating,
    Executing,
    Gating,
    Done,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Drives a workflow from definition to aggregated result.
pub struct WorkflowCoordinator {
    router: Arc<Router>,
    executor: Arc<StepExecutor>,
    gate_manager: Arc<GateManager>,
    artifact_manager: Arc<ArtifactManager>,
    events: EventBus,
    guard: GuardEvaluator,
    ledger: Option<Arc<BudgetLedger>>,
    cancellation: CancellationToken,
}

impl WorkflowCoordinator {
    pub fn new(router: Arc<Router>, executor: Arc<StepExecutor>) -> Self {
        Self {
            router,
            executor,
            gate_manager: Arc::new(GateManager::new()),
            artifact_manager: Arc::new(ArtifactManager::new()),
            events: EventBus::default(),
            guard: GuardEvaluator::new(),
            ledger: None,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_gate_manager(mut self, gate_manager: Arc<GateManager>) -> Self {
        self.gate_manager = gate_manager;
        self
    }

    pub fn with_artifact_manager(mut self, artifact_manager: Arc<ArtifactManager>) -> Self {
        self.artifact_manager = artifact_manager;
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Share a budget ledger with other coordinators. Steps whose estimated
    /// cost cannot be reserved stay pending instead of launching.
    pub fn with_budget_ledger(mut self, ledger: Arc<BudgetLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Cooperative cancellation: checked between waves, never mid-step.
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn artifact_manager(&self) -> &ArtifactManager {
        &self.artifact_manager
    }

    /// Load a workflow file and run it. Loading fails closed: any read,
    /// parse, or validation error produces a zero-step result.
    pub async fn run_file(
        &self,
        path: &Path,
        gates: &[GateSpec],
        files: &[String],
    ) -> WorkflowResult {
        tracing::debug!(phase = ?RunPhase::Loading, path = %path.display(), "loading workflow");
        match load_workflow_file(path) {
            Ok(definition) => self.run(&definition, gates, files).await,
            Err(e) => {
                let name = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("unknown");
                self.fail_closed(name, e.to_string())
            }
        }
    }

    /// Run a workflow definition to completion.
    pub async fn run(
        &self,
        definition: &WorkflowDefinition,
        gates: &[GateSpec],
        files: &[String],
    ) -> WorkflowResult {
        let run_id = Uuid::now_v7();
        let run_start = Instant::now();

        tracing::debug!(phase = ?RunPhase::Validating, workflow = %definition.name, "validating");
        if let Err(e) = validate_definition(definition) {
            return self.fail_closed(&definition.name, e.to_string());
        }

        let plan = match self.router.route_parallel_steps(&definition.steps) {
            Ok(plan) => plan,
            Err(e) => return self.fail_closed(&definition.name, e.to_string()),
        };

        let steps_by_id: HashMap<&str, &StepDefinition> = definition
            .steps
            .iter()
            .map(|s| (s.id.as_str(), s))
            .collect();

        let mut ctx = ExecutionContext::new(definition, run_id);
        self.events.publish(RunEvent::RunStarted {
            run_id,
            workflow_name: definition.name.clone(),
            step_count: definition.steps.len(),
            wave_count: plan.waves.len(),
        });
        tracing::info!(
            workflow = %definition.name,
            %run_id,
            steps = definition.steps.len(),
            waves = plan.waves.len(),
            "workflow run started"
        );

        let mut halted = false;
        let mut run_failed = false;
        let mut first_error: Option<String> = None;

        for (wave_index, wave) in plan.waves.iter().enumerate() {
            if halted {
                break;
            }
            if self.cancellation.is_cancelled() {
                run_failed = true;
                first_error.get_or_insert_with(|| "run cancelled".to_string());
                break;
            }

            tracing::debug!(phase = ?RunPhase::Executing, wave = wave_index, steps = wave.len(), "dispatching wave");
            self.events.publish(RunEvent::WaveStarted {
                run_id,
                wave_index,
                step_ids: wave.clone(),
            });

            let mut join_set: JoinSet<(String, StepExecutionResult)> = JoinSet::new();
            let mut in_flight: HashSet<String> = HashSet::new();
            let mut reserved: HashMap<String, f64> = HashMap::new();

            for step_id in wave {
                let Some(step) = steps_by_id.get(step_id.as_str()) else {
                    tracing::warn!(step_id, "planned step not in definition");
                    continue;
                };

                // `when` guards fail closed: evaluation errors skip the step
                // with the reason recorded, never execute it speculatively.
                if let Some(when) = &step.when {
                    match self.guard.evaluate_guard(when, &ctx) {
                        Ok(true) => {}
                        Ok(false) => {
                            self.record_skip(&mut ctx, run_id, step_id, "guard evaluated false");
                            continue;
                        }
                        Err(e) => {
                            self.record_skip(
                                &mut ctx,
                                run_id,
                                step_id,
                                &format!("guard failed closed: {e}"),
                            );
                            continue;
                        }
                    }
                }

                let decision = self.router.route_step(step);

                // Budget exhaustion leaves the step pending, not failed.
                if let Some(ledger) = &self.ledger {
                    let estimated = decision.estimated_cost;
                    if !ledger.try_reserve(&definition.name, estimated) {
                        let remaining = ledger.remaining_for(&definition.name);
                        tracing::warn!(
                            step_id,
                            estimated,
                            remaining,
                            "budget exhausted; step stays pending"
                        );
                        let mut result =
                            StepExecutionResult::skipped(step_id, "budget exhausted");
                        result
                            .metadata
                            .insert("pending".to_string(), serde_json::Value::Bool(true));
                        ctx.record_result(result);
                        self.events.publish(RunEvent::StepPending {
                            run_id,
                            step_id: step_id.clone(),
                            remaining_budget: remaining,
                        });
                        continue;
                    }
                    reserved.insert(step_id.clone(), estimated);
                }

                // The routed adapter replaces the declared actor for this run;
                // with the default policy they are the same.
                let mut resolved = (*step).clone();
                resolved.actor = decision.adapter_id;
                resolved.with = ctx.resolve_params(&step.with);
                let context_value = ctx.to_expression_context();
                let files = files.to_vec();
                let executor = Arc::clone(&self.executor);

                self.events.publish(RunEvent::StepStarted {
                    run_id,
                    step_id: step_id.clone(),
                    adapter_id: resolved.actor.clone(),
                });
                in_flight.insert(step_id.clone());

                join_set.spawn(async move {
                    let result = executor
                        .execute_step(&resolved, &context_value, &files)
                        .await;
                    (resolved.id, result)
                });
            }

            // Drain the full wave before advancing; no partial-wave
            // progression.
            while let Some(joined) = join_set.join_next().await {
                let (step_id, result) = match joined {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::error!(error = %e, "step task aborted");
                        continue;
                    }
                };
                in_flight.remove(&step_id);
                // Reconcile the reservation against actual spend; a failed
                // step costs nothing and must not starve later steps.
                if let Some(estimated) = reserved.remove(&step_id)
                    && let Some(ledger) = &self.ledger
                {
                    ledger.release(&definition.name, estimated - result.cost);
                }
                self.handle_result(
                    &mut ctx,
                    run_id,
                    &steps_by_id,
                    definition,
                    result,
                    &mut halted,
                    &mut run_failed,
                    &mut first_error,
                );
            }

            // A panicking adapter aborts its task; attribute a failure result
            // to each step that never reported back.
            for step_id in in_flight {
                if let Some(estimated) = reserved.remove(&step_id)
                    && let Some(ledger) = &self.ledger
                {
                    ledger.release(&definition.name, estimated);
                }
                let result =
                    StepExecutionResult::failure(&step_id, "step task panicked before reporting");
                self.handle_result(
                    &mut ctx,
                    run_id,
                    &steps_by_id,
                    definition,
                    result,
                    &mut halted,
                    &mut run_failed,
                    &mut first_error,
                );
            }
        }

        // Re-sort to declaration order; output is independent of completion
        // timing.
        let step_results: Vec<StepExecutionResult> = definition
            .steps
            .iter()
            .filter_map(|s| ctx.step_result(&s.id).cloned())
            .collect();

        let artifacts: Vec<String> = step_results
            .iter()
            .flat_map(|r| r.artifacts.iter().cloned())
            .collect();

        for result in &step_results {
            if result.success && !result.is_skipped() {
                for path in &result.artifacts {
                    self.artifact_manager
                        .register(path, &result.step_id, HashMap::new());
                }
            }
        }

        tracing::debug!(phase = ?RunPhase::Gating, gates = gates.len(), "evaluating gates");
        let registered = self.artifact_manager.artifacts();
        let gate_results = self.gate_manager.execute_gates(gates, &registered, &ctx);
        for gate in gate_results.iter().filter(|g| !g.success) {
            run_failed = true;
            first_error
                .get_or_insert_with(|| format!("gate '{}' failed: {}", gate.gate_id, gate.message));
        }

        let steps_executed = step_results.len() as u32;
        let steps_succeeded = step_results.iter().filter(|r| r.success).count() as u32;
        let steps_failed = steps_executed - steps_succeeded;
        let total_cost = step_results.iter().map(|r| r.cost).sum();
        let total_duration_ms = step_results.iter().map(|r| r.duration_ms).sum();
        let success = !run_failed;

        tracing::debug!(phase = ?RunPhase::Done, success, "run finished");
        self.events.publish(RunEvent::RunCompleted {
            run_id,
            workflow_name: definition.name.clone(),
            success,
            duration_ms: run_start.elapsed().as_millis() as u64,
        });
        tracing::info!(
            workflow = %definition.name,
            %run_id,
            success,
            steps_executed,
            steps_failed,
            total_cost,
            "workflow run completed"
        );

        WorkflowResult {
            run_id,
            workflow_name: definition.name.clone(),
            success,
            steps_executed,
            steps_succeeded,
            steps_failed,
            total_cost,
            total_duration_ms,
            step_results,
            artifacts,
            gate_results,
            error: first_error,
        }
    }

    /// Build a zero-step failure result, publishing the terminal event so
    /// subscribers never wait on a run that ended before execution.
    fn fail_closed(&self, workflow_name: &str, error: String) -> WorkflowResult {
        let result = WorkflowResult::failed_before_execution(workflow_name, error);
        self.events.publish(RunEvent::RunCompleted {
            run_id: result.run_id,
            workflow_name: result.workflow_name.clone(),
            success: false,
            duration_ms: 0,
        });
        result
    }

    fn record_skip(
        &self,
        ctx: &mut ExecutionContext,
        run_id: Uuid,
        step_id: &str,
        reason: &str,
    ) {
        tracing::debug!(step_id, reason, "step skipped");
        ctx.record_result(StepExecutionResult::skipped(step_id, reason));
        self.events.publish(RunEvent::StepSkipped {
            run_id,
            step_id: step_id.to_string(),
            reason: reason.to_string(),
        });
    }

    /// Record one completed result and apply the step's failure policy.
    #[allow(clippy::too_many_arguments)]
    fn handle_result(
        &self,
        ctx: &mut ExecutionContext,
        run_id: Uuid,
        steps_by_id: &HashMap<&str, &StepDefinition>,
        definition: &WorkflowDefinition,
        result: StepExecutionResult,
        halted: &mut bool,
        run_failed: &mut bool,
        first_error: &mut Option<String>,
    ) {
        if result.success {
            self.events.publish(RunEvent::StepCompleted {
                run_id,
                step_id: result.step_id.clone(),
                cost: result.cost,
                duration_ms: result.duration_ms,
            });
            ctx.record_result(result);
            return;
        }

        let step_id = result.step_id.clone();
        let error = result
            .error
            .clone()
            .unwrap_or_else(|| "unknown error".to_string());
        self.events.publish(RunEvent::StepFailed {
            run_id,
            step_id: step_id.clone(),
            error: error.clone(),
            will_retry: false,
        });
        ctx.record_result(result);

        let on_fail = steps_by_id
            .get(step_id.as_str())
            .map(|s| s.on_fail)
            .unwrap_or_default();
        match on_fail {
            // Tolerated: the workflow may still succeed and scheduling
            // continues.
            OnFail::Continue => {
                tracing::warn!(step_id, error, "step failed; policy tolerates failure");
            }
            // Abort honors the workflow-level fail_fast switch; Stop and
            // PauseForReview always halt.
            OnFail::Abort => {
                *run_failed = true;
                if definition.policy.fail_fast {
                    *halted = true;
                }
                first_error.get_or_insert_with(|| format!("step '{step_id}': {error}"));
            }
            OnFail::Stop => {
                *run_failed = true;
                *halted = true;
                first_error.get_or_insert_with(|| format!("step '{step_id}': {error}"));
            }
            OnFail::PauseForReview => {
                *run_failed = true;
                *halted = true;
                first_error.get_or_insert_with(|| {
                    format!("step '{step_id}' paused for review: {error}")
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
