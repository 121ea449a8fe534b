//! Single-step execution with failure isolation.
//!
//! `execute_step` never returns an error and never panics on an adapter's
//! behalf: validation failures, missing adapters, timeouts, and adapter
//! errors all become failure results. Retries follow the step's declared
//! backoff strategy and accrue into the step's total cost and duration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tidewave_types::result::StepExecutionResult;
use tidewave_types::workflow::{Backoff, StepDefinition};
use tokio::time::Instant;

use crate::adapter::cost::CostTracker;
use crate::adapter::registry::AdapterRegistry;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Executor behavior knobs.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    /// Stop after validation/resolution and report simulated success.
    pub dry_run: bool,
    /// Optional per-attempt deadline; expiry becomes a timeout failure.
    pub step_deadline: Option<Duration>,
    /// Base delay between retry attempts.
    pub backoff_base: Duration,
    /// Ceiling on any single backoff delay.
    pub backoff_cap: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            step_deadline: None,
            backoff_base: Duration::from_millis(250),
            backoff_cap: Duration::from_secs(30),
        }
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Invokes one step through its adapter, isolating every failure mode.
pub struct StepExecutor {
    registry: Arc<AdapterRegistry>,
    cost_tracker: Arc<dyn CostTracker>,
    config: ExecutorConfig,
}

impl StepExecutor {
    pub fn new(registry: Arc<AdapterRegistry>, cost_tracker: Arc<dyn CostTracker>) -> Self {
        Self {
            registry,
            cost_tracker,
            config: ExecutorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.config.dry_run
    }

    /// Execute one step. Always returns a result, never an error.
    ///
    /// `step.with` is expected to arrive with templates already resolved;
    /// `context` is the accumulated run context as a JSON object.
    pub async fn execute_step(
        &self,
        step: &StepDefinition,
        context: &Value,
        files: &[String],
    ) -> StepExecutionResult {
        let start = Instant::now();

        // Required-field validation short-circuits with zero cost and no
        // adapter invocation.
        for (field, value) in [("id", &step.id), ("name", &step.name), ("actor", &step.actor)] {
            if value.trim().is_empty() {
                return StepExecutionResult::failure(&step.id, format!("missing field: {field}"));
            }
        }

        let Some(adapter) = self.registry.get(&step.actor) else {
            return StepExecutionResult::failure(
                &step.id,
                format!("unknown adapter '{}'", step.actor),
            );
        };
        if !adapter.is_available() {
            return StepExecutionResult::failure(
                &step.id,
                format!("adapter '{}' unavailable", step.actor),
            );
        }

        if self.config.dry_run {
            // Real elapsed time, zero cost, declared artifacts echoed
            // unverified. The adapter's side-effecting path is never entered.
            let mut metadata = HashMap::new();
            metadata.insert("dry_run".to_string(), Value::Bool(true));
            metadata.insert("artifacts_unverified".to_string(), Value::Bool(true));
            return StepExecutionResult {
                step_id: step.id.clone(),
                success: true,
                output: format!("[dry-run] simulated '{}' via adapter '{}'", step.id, step.actor),
                artifacts: step.emits.clone(),
                cost: 0.0,
                duration_ms: start.elapsed().as_millis() as u64,
                error: None,
                metadata,
            };
        }

        let max_attempts = step
            .retry
            .as_ref()
            .map(|retry| retry.max_attempts.max(1))
            .unwrap_or(1);
        let backoff = step.retry.as_ref().map(|retry| retry.backoff).unwrap_or_default();

        let mut total_cost = 0.0;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let invocation = adapter.execute(step, context, files);
            let outcome = match self.config.step_deadline {
                Some(deadline) => match tokio::time::timeout(deadline, invocation).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(crate::adapter::AdapterError::Failed(format!(
                        "timed out after {} ms",
                        deadline.as_millis()
                    ))),
                },
                None => invocation.await,
            };

            match outcome {
                Ok(output) => {
                    total_cost += output.cost;
                    self.record_cost(&step.actor, total_cost);

                    let mut artifacts = output.artifacts;
                    for declared in &step.emits {
                        if !artifacts.contains(declared) {
                            artifacts.push(declared.clone());
                        }
                    }

                    let mut metadata = output.metadata;
                    metadata.insert("attempts".to_string(), Value::from(attempt));

                    return StepExecutionResult {
                        step_id: step.id.clone(),
                        success: true,
                        output: output.output,
                        artifacts,
                        cost: total_cost,
                        duration_ms: start.elapsed().as_millis() as u64,
                        error: None,
                        metadata,
                    };
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(
                        step_id = %step.id,
                        actor = %step.actor,
                        attempt,
                        max_attempts,
                        error = %last_error,
                        "step attempt failed"
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(self.backoff_delay(backoff, attempt)).await;
                    }
                }
            }
        }

        let mut metadata = HashMap::new();
        metadata.insert("attempts".to_string(), Value::from(max_attempts));
        StepExecutionResult {
            step_id: step.id.clone(),
            success: false,
            output: String::new(),
            artifacts: Vec::new(),
            cost: total_cost,
            duration_ms: start.elapsed().as_millis() as u64,
            error: Some(last_error),
            metadata,
        }
    }

    /// Fire-and-forget cost recording. A ledger failure is logged, never
    /// propagated into the step result.
    fn record_cost(&self, actor: &str, cost: f64) {
        if cost <= 0.0 {
            return;
        }
        if let Err(e) = self.cost_tracker.add_tokens(actor, cost) {
            tracing::warn!(actor, cost, error = %e, "cost ledger record failed");
        }
    }

    fn backoff_delay(&self, backoff: Backoff, attempt: u32) -> Duration {
        let delay = match backoff {
            Backoff::Linear => self.config.backoff_base.saturating_mul(attempt),
            Backoff::Exponential => self
                .config
                .backoff_base
                .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1))),
        };
        delay.min(self.config.backoff_cap)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::adapter::boxed::BoxAdapter;
    use crate::adapter::cost::{InMemoryCostTracker, NullCostTracker};
    use crate::adapter::{Adapter, AdapterError, AdapterKind, AdapterOutput};

    fn step(id: &str, actor: &str) -> StepDefinition {
        StepDefinition {
            id: id.to_string(),
            name: format!("step {id}"),
            actor: actor.to_string(),
            with: HashMap::new(),
            when: None,
            retry: None,
            emits: vec![],
            on_fail: Default::default(),
        }
    }

    fn executor_with(registry: AdapterRegistry) -> StepExecutor {
        StepExecutor::new(Arc::new(registry), Arc::new(NullCostTracker))
    }

    /// Adapter that fails a fixed number of times, then succeeds, counting
    /// every invocation.
    struct FlakyAdapter {
        failures_before_success: u32,
        invocations: Arc<AtomicU32>,
        cost_per_call: f64,
    }

    impl Adapter for FlakyAdapter {
        fn id(&self) -> &str {
            "flaky"
        }

        fn kind(&self) -> AdapterKind {
            AdapterKind::Deterministic
        }

        fn is_available(&self) -> bool {
            true
        }

        fn estimate_cost(&self, _step: &StepDefinition) -> f64 {
            self.cost_per_call
        }

        async fn execute(
            &self,
            _step: &StepDefinition,
            _context: &Value,
            _files: &[String],
        ) -> Result<AdapterOutput, AdapterError> {
            let n = self.invocations.fetch_add(1, Ordering::SeqCst);
            if n < self.failures_before_success {
                Err(AdapterError::Failed(format!("transient failure {n}")))
            } else {
                Ok(AdapterOutput {
                    output: "done".to_string(),
                    cost: self.cost_per_call,
                    ..AdapterOutput::default()
                })
            }
        }
    }

    /// Adapter whose invocation hangs long past any test deadline.
    struct HangingAdapter;

    impl Adapter for HangingAdapter {
        fn id(&self) -> &str {
            "hang"
        }

        fn kind(&self) -> AdapterKind {
            AdapterKind::Deterministic
        }

        fn is_available(&self) -> bool {
            true
        }

        fn estimate_cost(&self, _step: &StepDefinition) -> f64 {
            0.0
        }

        async fn execute(
            &self,
            _step: &StepDefinition,
            _context: &Value,
            _files: &[String],
        ) -> Result<AdapterOutput, AdapterError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(AdapterOutput::default())
        }
    }

    /// Adapter that is registered but reports itself unavailable.
    struct OfflineAdapter;

    impl Adapter for OfflineAdapter {
        fn id(&self) -> &str {
            "offline"
        }

        fn kind(&self) -> AdapterKind {
            AdapterKind::Deterministic
        }

        fn is_available(&self) -> bool {
            false
        }

        fn estimate_cost(&self, _step: &StepDefinition) -> f64 {
            0.0
        }

        async fn execute(
            &self,
            _step: &StepDefinition,
            _context: &Value,
            _files: &[String],
        ) -> Result<AdapterOutput, AdapterError> {
            Ok(AdapterOutput::default())
        }
    }

    fn flaky_registry(failures: u32, cost: f64) -> (AdapterRegistry, Arc<AtomicU32>) {
        let invocations = Arc::new(AtomicU32::new(0));
        let mut registry = AdapterRegistry::with_builtins();
        registry.register(BoxAdapter::new(FlakyAdapter {
            failures_before_success: failures,
            invocations: Arc::clone(&invocations),
            cost_per_call: cost,
        }));
        (registry, invocations)
    }

    // -----------------------------------------------------------------------
    // Validation short-circuit
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_missing_actor_names_the_field() {
        let executor = executor_with(AdapterRegistry::with_builtins());
        let result = executor
            .execute_step(&step("b", ""), &json!({}), &[])
            .await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("actor"));
        assert_eq!(result.cost, 0.0);
    }

    #[tokio::test]
    async fn test_missing_name_names_the_field() {
        let executor = executor_with(AdapterRegistry::with_builtins());
        let mut s = step("b", "echo");
        s.name = "  ".to_string();
        let result = executor.execute_step(&s, &json!({}), &[]).await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("name"));
    }

    #[tokio::test]
    async fn test_validation_never_invokes_adapter() {
        let (registry, invocations) = flaky_registry(0, 0.0);
        let executor = executor_with(registry);
        let mut s = step("b", "flaky");
        s.actor = String::new();
        let _ = executor.execute_step(&s, &json!({}), &[]).await;
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
    }

    // -----------------------------------------------------------------------
    // Adapter resolution
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_unknown_adapter_is_failure_result() {
        let executor = executor_with(AdapterRegistry::with_builtins());
        let result = executor
            .execute_step(&step("a", "nonexistent"), &json!({}), &[])
            .await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("unknown adapter 'nonexistent'"));
    }

    #[tokio::test]
    async fn test_unavailable_adapter_is_failure_result() {
        let mut registry = AdapterRegistry::new();
        registry.register(BoxAdapter::new(OfflineAdapter));
        let executor = executor_with(registry);
        let result = executor
            .execute_step(&step("a", "offline"), &json!({}), &[])
            .await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("unavailable"));
    }

    // -----------------------------------------------------------------------
    // Dry run
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_dry_run_simulates_without_invoking_adapter() {
        let (registry, invocations) = flaky_registry(0, 5.0);
        let executor = executor_with(registry).with_config(ExecutorConfig {
            dry_run: true,
            ..ExecutorConfig::default()
        });
        let mut s = step("a", "flaky");
        s.emits = vec!["reports/out.json".to_string()];

        let result = executor.execute_step(&s, &json!({}), &[]).await;
        assert!(result.success);
        assert_eq!(result.cost, 0.0, "dry run always reports zero cost");
        assert_eq!(result.artifacts, vec!["reports/out.json".to_string()]);
        assert_eq!(result.metadata["dry_run"], json!(true));
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
    }

    // -----------------------------------------------------------------------
    // Failure isolation and retries
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_failing_adapter_never_raises() {
        let (registry, _) = flaky_registry(u32::MAX, 0.0);
        let executor = executor_with(registry);
        let result = executor
            .execute_step(&step("a", "flaky"), &json!({}), &[])
            .await;
        assert!(!result.success);
        assert!(!result.error.as_deref().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        use tidewave_types::workflow::RetryConfig;
        let (registry, invocations) = flaky_registry(2, 1.0);
        let executor = executor_with(registry).with_config(ExecutorConfig {
            backoff_base: Duration::from_millis(1),
            ..ExecutorConfig::default()
        });
        let mut s = step("a", "flaky");
        s.retry = Some(RetryConfig {
            max_attempts: 3,
            backoff: Backoff::Linear,
        });

        let result = executor.execute_step(&s, &json!({}), &[]).await;
        assert!(result.success);
        assert_eq!(invocations.load(Ordering::SeqCst), 3);
        assert_eq!(result.metadata["attempts"], json!(3));
    }

    #[tokio::test]
    async fn test_retries_exhausted_reports_last_error() {
        use tidewave_types::workflow::RetryConfig;
        let (registry, invocations) = flaky_registry(u32::MAX, 0.0);
        let executor = executor_with(registry).with_config(ExecutorConfig {
            backoff_base: Duration::from_millis(1),
            ..ExecutorConfig::default()
        });
        let mut s = step("a", "flaky");
        s.retry = Some(RetryConfig {
            max_attempts: 2,
            backoff: Backoff::Exponential,
        });

        let result = executor.execute_step(&s, &json!({}), &[]).await;
        assert!(!result.success);
        assert_eq!(invocations.load(Ordering::SeqCst), 2);
        assert!(result.error.as_deref().unwrap().contains("transient failure"));
    }

    // -----------------------------------------------------------------------
    // Deadlines
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_deadline_converts_hang_to_timeout_failure() {
        let mut registry = AdapterRegistry::new();
        registry.register(BoxAdapter::new(HangingAdapter));
        let executor = executor_with(registry).with_config(ExecutorConfig {
            step_deadline: Some(Duration::from_millis(20)),
            ..ExecutorConfig::default()
        });

        let result = executor
            .execute_step(&step("a", "hang"), &json!({}), &[])
            .await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("timed out"));
    }

    // -----------------------------------------------------------------------
    // Cost recording
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_success_records_cost_against_actor() {
        let (registry, _) = flaky_registry(0, 2.5);
        let tracker = Arc::new(InMemoryCostTracker::new());
        let executor = StepExecutor::new(
            Arc::new(registry),
            Arc::clone(&tracker) as Arc<dyn CostTracker>,
        );

        let result = executor
            .execute_step(&step("a", "flaky"), &json!({}), &[])
            .await;
        assert!(result.success);
        assert!((result.cost - 2.5).abs() < f64::EPSILON);
        assert!((tracker.total_for("flaky") - 2.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_declared_emits_merged_into_artifacts() {
        let (registry, _) = flaky_registry(0, 0.0);
        let executor = executor_with(registry);
        let mut s = step("a", "flaky");
        s.emits = vec!["out/report.json".to_string()];

        let result = executor.execute_step(&s, &json!({}), &[]).await;
        assert!(result.success);
        assert!(result.artifacts.contains(&"out/report.json".to_string()));
    }
}
