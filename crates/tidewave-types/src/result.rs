//! Execution result types: per-step results and the aggregated workflow
//! result returned by the coordinator.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Step execution result
// ---------------------------------------------------------------------------

/// The outcome of executing (or skipping) a single step.
///
/// Append-only once created: the coordinator never mutates a result after
/// the executor returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecutionResult {
    /// Step ID matching `StepDefinition.id`.
    pub step_id: String,
    /// Whether the step succeeded.
    pub success: bool,
    /// Adapter output text (or a skip/simulation marker).
    pub output: String,
    /// Artifact paths the step reported producing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
    /// Cost consumed across all attempts.
    pub cost: f64,
    /// Wall-clock duration across all attempts, in milliseconds.
    pub duration_ms: u64,
    /// Error message if the step failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Adapter- or executor-provided metadata (attempt count, skip reason, ...).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl StepExecutionResult {
    /// Build a failure result with zero cost and the given error message.
    pub fn failure(step_id: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            step_id: step_id.into(),
            success: false,
            output: String::new(),
            artifacts: Vec::new(),
            cost: 0.0,
            duration_ms: 0,
            error: Some(error),
            metadata: HashMap::new(),
        }
    }

    /// Build a skipped-step result (counted as executed, not failed).
    pub fn skipped(step_id: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("skipped".to_string(), serde_json::Value::Bool(true));
        metadata.insert(
            "skip_reason".to_string(),
            serde_json::Value::String(reason.into()),
        );
        Self {
            step_id: step_id.into(),
            success: true,
            output: "[skipped]".to_string(),
            artifacts: Vec::new(),
            cost: 0.0,
            duration_ms: 0,
            error: None,
            metadata,
        }
    }

    /// Whether this result records a guard skip rather than a real run.
    pub fn is_skipped(&self) -> bool {
        matches!(
            self.metadata.get("skipped"),
            Some(serde_json::Value::Bool(true))
        )
    }
}

// ---------------------------------------------------------------------------
// Workflow result
// ---------------------------------------------------------------------------

/// The aggregated outcome of a workflow run.
///
/// `step_results` is always re-sorted to declaration order before the
/// coordinator returns, independent of actual completion timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    /// UUIDv7 run ID.
    pub run_id: Uuid,
    /// Name of the workflow that ran.
    pub workflow_name: String,
    /// True only if no step failed (or the policy tolerated the failures).
    pub success: bool,
    /// Number of steps that executed (including skips).
    pub steps_executed: u32,
    /// Number of steps that succeeded.
    pub steps_succeeded: u32,
    /// Number of steps that failed.
    pub steps_failed: u32,
    /// Total cost across all executed steps.
    pub total_cost: f64,
    /// Total duration across all executed steps, in milliseconds.
    pub total_duration_ms: u64,
    /// Per-step results in declaration order.
    pub step_results: Vec<StepExecutionResult>,
    /// Emitted artifact paths, concatenated in step-declaration order.
    /// Duplicates are retained; de-duplication is the artifact manager's job.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
    /// Gate results, if gates were evaluated.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gate_results: Vec<crate::gate::GateResult>,
    /// First blocking error, if the run failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowResult {
    /// Build a zero-step failure result, used when loading/validation fails
    /// closed before any step executes.
    pub fn failed_before_execution(workflow_name: impl Into<String>, error: String) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            workflow_name: workflow_name.into(),
            success: false,
            steps_executed: 0,
            steps_succeeded: 0,
            steps_failed: 0,
            total_cost: 0.0,
            total_duration_ms: 0,
            step_results: Vec::new(),
            artifacts: Vec::new(),
            gate_results: Vec::new(),
            error: Some(error),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
