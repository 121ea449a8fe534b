//! Accumulated execution context for a single workflow run.
//!
//! Holds the workflow's declared inputs, policy, and an append-only map of
//! step results keyed by step id. Later steps see earlier results through
//! `{{ steps.<id>.output }}` parameter templates and through the JSON object
//! handed to `when` guard evaluation.
//!
//! Step outputs are size-capped: a single output is truncated at 1 MB and the
//! run's total stored output at 10 MB, with a warning logged on truncation.

use std::collections::HashMap;

use serde_json::{Value, json};
use tidewave_types::result::StepExecutionResult;
use tidewave_types::workflow::{WorkflowDefinition, WorkflowPolicy};
use uuid::Uuid;

/// Cap on a single step's stored output.
pub const MAX_STEP_OUTPUT_BYTES: usize = 1024 * 1024;

/// Cap on the total stored output across a run.
pub const MAX_TOTAL_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Run metrics
// ---------------------------------------------------------------------------

/// Change deltas reported by steps, consumed by the `diff_limits` gate.
///
/// Accumulated from `files_changed` / `lines_changed` entries in step result
/// metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunMetrics {
    pub files_changed: u64,
    pub lines_changed: u64,
}

// ---------------------------------------------------------------------------
// Execution context
// ---------------------------------------------------------------------------

/// Per-run execution context. The `step_results` map is append-only: a
/// result, once recorded, is never replaced.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    workflow_name: String,
    run_id: Uuid,
    inputs: HashMap<String, Value>,
    policy: WorkflowPolicy,
    step_results: HashMap<String, StepExecutionResult>,
    metrics: RunMetrics,
    total_output_bytes: usize,
}

impl ExecutionContext {
    /// Build the initial context for a run of `definition`.
    pub fn new(definition: &WorkflowDefinition, run_id: Uuid) -> Self {
        Self {
            workflow_name: definition.name.clone(),
            run_id,
            inputs: definition.inputs.clone(),
            policy: definition.policy,
            step_results: HashMap::new(),
            metrics: RunMetrics::default(),
            total_output_bytes: 0,
        }
    }

    pub fn workflow_name(&self) -> &str {
        &self.workflow_name
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn policy(&self) -> WorkflowPolicy {
        self.policy
    }

    pub fn metrics(&self) -> RunMetrics {
        self.metrics
    }

    /// The recorded result for a step, if it has executed.
    pub fn step_result(&self, step_id: &str) -> Option<&StepExecutionResult> {
        self.step_results.get(step_id)
    }

    /// Record a step result. Append-only: a second result for the same step
    /// id is dropped with a warning.
    pub fn record_result(&mut self, mut result: StepExecutionResult) {
        if self.step_results.contains_key(&result.step_id) {
            tracing::warn!(step_id = %result.step_id, "duplicate step result dropped");
            return;
        }

        let budget = MAX_STEP_OUTPUT_BYTES
            .min(MAX_TOTAL_OUTPUT_BYTES.saturating_sub(self.total_output_bytes));
        if result.output.len() > budget {
            tracing::warn!(
                step_id = %result.step_id,
                original_len = result.output.len(),
                stored_len = budget,
                "step output truncated"
            );
            result.output = truncate_at_char_boundary(&result.output, budget).to_string();
        }
        self.total_output_bytes += result.output.len();

        if let Some(n) = result.metadata.get("files_changed").and_then(|v| v.as_u64()) {
            self.metrics.files_changed += n;
        }
        if let Some(n) = result.metadata.get("lines_changed").and_then(|v| v.as_u64()) {
            self.metrics.lines_changed += n;
        }

        self.step_results.insert(result.step_id.clone(), result);
    }

    // -----------------------------------------------------------------------
    // Template resolution
    // -----------------------------------------------------------------------

    /// Resolve `{{ steps.<id>.output }}` and `{{ inputs.<name> }}` references
    /// in a template string. Unknown references are left as-is.
    pub fn resolve_template(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find("{{") {
            let Some(close) = rest[open..].find("}}") else {
                break;
            };
            let close = open + close;
            out.push_str(&rest[..open]);

            let placeholder = &rest[open..close + 2];
            let key = rest[open + 2..close].trim();
            match self.lookup(key) {
                Some(value) => out.push_str(&value),
                None => out.push_str(placeholder),
            }
            rest = &rest[close + 2..];
        }
        out.push_str(rest);
        out
    }

    /// Resolve templates in every string value of a `with` parameter map,
    /// recursing into arrays and objects.
    pub fn resolve_params(&self, params: &HashMap<String, Value>) -> HashMap<String, Value> {
        params
            .iter()
            .map(|(k, v)| (k.clone(), self.resolve_value(v)))
            .collect()
    }

    fn resolve_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.resolve_template(s)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.resolve_value(v)).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn lookup(&self, key: &str) -> Option<String> {
        if let Some(rest) = key.strip_prefix("steps.") {
            let step_id = rest.strip_suffix(".output")?;
            return self
                .step_result(step_id)
                .map(|result| result.output.clone());
        }
        if let Some(name) = key.strip_prefix("inputs.") {
            return self.inputs.get(name).map(|value| match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        }
        None
    }

    // -----------------------------------------------------------------------
    // Expression context
    // -----------------------------------------------------------------------

    /// Build the JSON object that `when` guard expressions evaluate against.
    ///
    /// Shape:
    /// ```json
    /// {
    ///   "steps": { "<step_id>": { "output": "...", "success": true }, ... },
    ///   "inputs": { ... },
    ///   "workflow": { "name": "...", "run_id": "..." }
    /// }
    /// ```
    pub fn to_expression_context(&self) -> Value {
        let mut steps = serde_json::Map::new();
        for (id, result) in &self.step_results {
            steps.insert(
                id.clone(),
                json!({ "output": result.output, "success": result.success }),
            );
        }

        json!({
            "steps": steps,
            "inputs": self.inputs,
            "workflow": {
                "name": self.workflow_name,
                "run_id": self.run_id.to_string(),
            }
        })
    }
}

fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
