//! Post-execution quality gates.
//!
//! Gates run after all waves complete and can fail a workflow even when every
//! step individually succeeded. Evaluation is isolated per gate: one gate's
//! failure (or a custom handler's panic) never prevents evaluation of the
//! remaining gates.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

use serde_json::{Value, json};
use tidewave_types::artifact::Artifact;
use tidewave_types::gate::{GateResult, GateSpec, GateType};

use crate::workflow::context::ExecutionContext;

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// External schema-validation collaborator for `schema_valid` gates.
pub trait SchemaValidator: Send + Sync {
    /// Validate the artifact at `path` against `schema`. `Err` carries the
    /// human-readable validation failure.
    fn validate(&self, path: &str, schema: &str) -> Result<(), String>;
}

/// Caller-registered handler for `custom` gates, keyed by gate id.
pub type CustomGateHandler =
    Box<dyn Fn(&GateSpec, &[Artifact], &ExecutionContext) -> GateResult + Send + Sync>;

// ---------------------------------------------------------------------------
// GateManager
// ---------------------------------------------------------------------------

/// Runs post-execution verification checks.
#[derive(Default)]
pub struct GateManager {
    custom_handlers: HashMap<String, CustomGateHandler>,
    schema_validator: Option<Box<dyn SchemaValidator>>,
}

impl GateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a `custom` gate id.
    pub fn register_custom_handler(&mut self, gate_id: impl Into<String>, handler: CustomGateHandler) {
        self.custom_handlers.insert(gate_id.into(), handler);
    }

    /// Install the schema-validation collaborator.
    pub fn set_schema_validator(&mut self, validator: Box<dyn SchemaValidator>) {
        self.schema_validator = Some(validator);
    }

    /// Evaluate every declared gate. One result per gate, in declaration
    /// order; failures are data, never raised.
    pub fn execute_gates(
        &self,
        gates: &[GateSpec],
        artifacts: &[Artifact],
        context: &ExecutionContext,
    ) -> Vec<GateResult> {
        gates
            .iter()
            .map(|gate| {
                let result = self.execute_gate(gate, artifacts, context);
                if !result.success {
                    tracing::warn!(gate_id = %gate.id, message = %result.message, "gate failed");
                }
                result
            })
            .collect()
    }

    fn execute_gate(
        &self,
        gate: &GateSpec,
        artifacts: &[Artifact],
        context: &ExecutionContext,
    ) -> GateResult {
        match gate.gate_type {
            GateType::TestsPass => self.tests_pass(gate),
            GateType::DiffLimits => self.diff_limits(gate, context),
            GateType::SchemaValid => self.schema_valid(gate),
            GateType::Custom => self.custom(gate, artifacts, context),
        }
    }

    // -----------------------------------------------------------------------
    // Built-in gate types
    // -----------------------------------------------------------------------

    /// The declared test-report artifact must exist and report zero failed
    /// tests. A missing artifact is a failure, not an error.
    fn tests_pass(&self, gate: &GateSpec) -> GateResult {
        let Some(path) = gate.artifact.as_deref() else {
            return GateResult::fail(
                &gate.id,
                gate.gate_type,
                "tests_pass gate requires an 'artifact' path",
            );
        };

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(_) => {
                return GateResult::fail(
                    &gate.id,
                    gate.gate_type,
                    format!("test report artifact missing: {path}"),
                );
            }
        };

        let report: Value = match serde_json::from_str(&text) {
            Ok(report) => report,
            Err(e) => {
                return GateResult::fail(
                    &gate.id,
                    gate.gate_type,
                    format!("test report is not valid JSON: {e}"),
                );
            }
        };

        let failed = report.get("failed").and_then(|v| v.as_u64()).unwrap_or(0);
        let passed = report.get("passed").and_then(|v| v.as_u64());
        let details = json!({ "failed": failed, "passed": passed });

        if failed == 0 {
            GateResult::pass(&gate.id, gate.gate_type, "all tests passed").with_details(details)
        } else {
            GateResult::fail(&gate.id, gate.gate_type, format!("{failed} tests failed"))
                .with_details(details)
        }
    }

    /// The run's reported files/lines deltas must be within the configured
    /// bounds. An unconfigured bound is unlimited.
    fn diff_limits(&self, gate: &GateSpec, context: &ExecutionContext) -> GateResult {
        let metrics = context.metrics();
        let details = json!({
            "files_changed": metrics.files_changed,
            "lines_changed": metrics.lines_changed,
            "max_files": gate.max_files,
            "max_lines": gate.max_lines,
        });

        if let Some(max_files) = gate.max_files
            && metrics.files_changed > max_files
        {
            return GateResult::fail(
                &gate.id,
                gate.gate_type,
                format!("{} files changed, limit {max_files}", metrics.files_changed),
            )
            .with_details(details);
        }
        if let Some(max_lines) = gate.max_lines
            && metrics.lines_changed > max_lines
        {
            return GateResult::fail(
                &gate.id,
                gate.gate_type,
                format!("{} lines changed, limit {max_lines}", metrics.lines_changed),
            )
            .with_details(details);
        }

        GateResult::pass(&gate.id, gate.gate_type, "diff within limits").with_details(details)
    }

    /// Mirrors the external schema validator's verdict.
    fn schema_valid(&self, gate: &GateSpec) -> GateResult {
        let Some(validator) = self.schema_validator.as_deref() else {
            return GateResult::fail(&gate.id, gate.gate_type, "no schema validator registered");
        };
        let (Some(path), Some(schema)) = (gate.artifact.as_deref(), gate.schema.as_deref()) else {
            return GateResult::fail(
                &gate.id,
                gate.gate_type,
                "schema_valid gate requires 'artifact' and 'schema'",
            );
        };

        match validator.validate(path, schema) {
            Ok(()) => GateResult::pass(
                &gate.id,
                gate.gate_type,
                format!("'{path}' conforms to schema '{schema}'"),
            ),
            Err(reason) => GateResult::fail(&gate.id, gate.gate_type, reason),
        }
    }

    /// Dispatches to the caller-registered handler for this gate id. The
    /// handler runs under `catch_unwind` so a panicking handler produces a
    /// failure result instead of tearing down gate evaluation.
    fn custom(
        &self,
        gate: &GateSpec,
        artifacts: &[Artifact],
        context: &ExecutionContext,
    ) -> GateResult {
        let Some(handler) = self.custom_handlers.get(&gate.id) else {
            return GateResult::fail(
                &gate.id,
                gate.gate_type,
                format!("no handler for gate type 'custom' (gate '{}')", gate.id),
            );
        };

        match catch_unwind(AssertUnwindSafe(|| handler(gate, artifacts, context))) {
            Ok(result) => result,
            Err(_) => GateResult::fail(&gate.id, gate.gate_type, "gate handler panicked"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use tidewave_types::result::StepExecutionResult;
    use tidewave_types::workflow::{WorkflowDefinition, WorkflowPolicy};
    use uuid::Uuid;

    fn empty_context() -> ExecutionContext {
        let definition = WorkflowDefinition {
            name: "wf".to_string(),
            description: None,
            inputs: StdHashMap::new(),
            policy: WorkflowPolicy::default(),
            steps: vec![],
        };
        ExecutionContext::new(&definition, Uuid::now_v7())
    }

    fn context_with_deltas(files: u64, lines: u64) -> ExecutionContext {
        let mut ctx = empty_context();
        let mut result = StepExecutionResult {
            step_id: "patch".to_string(),
            success: true,
            output: "done".to_string(),
            artifacts: vec![],
            cost: 0.0,
            duration_ms: 1,
            error: None,
            metadata: StdHashMap::new(),
        };
        result.metadata.insert("files_changed".to_string(), json!(files));
        result.metadata.insert("lines_changed".to_string(), json!(lines));
        ctx.record_result(result);
        ctx
    }

    fn gate(id: &str, gate_type: GateType) -> GateSpec {
        GateSpec {
            id: id.to_string(),
            gate_type,
            artifact: None,
            schema: None,
            max_files: None,
            max_lines: None,
        }
    }

    // -----------------------------------------------------------------------
    // tests_pass
    // -----------------------------------------------------------------------

    #[test]
    fn test_tests_pass_with_zero_failures() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{"passed": 12, "failed": 0}"#).unwrap();

        let mut spec = gate("unit-tests", GateType::TestsPass);
        spec.artifact = Some(file.path().to_str().unwrap().to_string());

        let results = GateManager::new().execute_gates(&[spec], &[], &empty_context());
        assert!(results[0].success);
        assert_eq!(results[0].details["failed"], json!(0));
    }

    #[test]
    fn test_tests_pass_with_failures() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{"passed": 10, "failed": 2}"#).unwrap();

        let mut spec = gate("unit-tests", GateType::TestsPass);
        spec.artifact = Some(file.path().to_str().unwrap().to_string());

        let results = GateManager::new().execute_gates(&[spec], &[], &empty_context());
        assert!(!results[0].success);
        assert!(results[0].message.contains("2 tests failed"));
    }

    #[test]
    fn test_tests_pass_missing_artifact_is_failure() {
        let mut spec = gate("unit-tests", GateType::TestsPass);
        spec.artifact = Some("/nonexistent/report.json".to_string());

        let results = GateManager::new().execute_gates(&[spec], &[], &empty_context());
        assert!(!results[0].success);
        assert!(results[0].message.contains("missing"));
    }

    // -----------------------------------------------------------------------
    // diff_limits
    // -----------------------------------------------------------------------

    #[test]
    fn test_diff_limits_within_bounds() {
        let mut spec = gate("small-diff", GateType::DiffLimits);
        spec.max_files = Some(10);
        spec.max_lines = Some(500);

        let ctx = context_with_deltas(4, 120);
        let results = GateManager::new().execute_gates(&[spec], &[], &ctx);
        assert!(results[0].success);
    }

    #[test]
    fn test_diff_limits_exceeded() {
        let mut spec = gate("small-diff", GateType::DiffLimits);
        spec.max_files = Some(3);

        let ctx = context_with_deltas(4, 120);
        let results = GateManager::new().execute_gates(&[spec], &[], &ctx);
        assert!(!results[0].success);
        assert!(results[0].message.contains("4 files changed"));
    }

    // -----------------------------------------------------------------------
    // schema_valid
    // -----------------------------------------------------------------------

    struct AlwaysValid;
    impl SchemaValidator for AlwaysValid {
        fn validate(&self, _path: &str, _schema: &str) -> Result<(), String> {
            Ok(())
        }
    }

    struct AlwaysInvalid;
    impl SchemaValidator for AlwaysInvalid {
        fn validate(&self, path: &str, _schema: &str) -> Result<(), String> {
            Err(format!("'{path}' violates schema"))
        }
    }

    #[test]
    fn test_schema_valid_mirrors_validator_verdict() {
        let mut spec = gate("schema", GateType::SchemaValid);
        spec.artifact = Some("out.json".to_string());
        spec.schema = Some("report-v1".to_string());

        let mut manager = GateManager::new();
        manager.set_schema_validator(Box::new(AlwaysValid));
        assert!(manager.execute_gates(std::slice::from_ref(&spec), &[], &empty_context())[0].success);

        let mut manager = GateManager::new();
        manager.set_schema_validator(Box::new(AlwaysInvalid));
        let results = manager.execute_gates(&[spec], &[], &empty_context());
        assert!(!results[0].success);
        assert!(results[0].message.contains("violates schema"));
    }

    #[test]
    fn test_schema_valid_without_validator_fails() {
        let mut spec = gate("schema", GateType::SchemaValid);
        spec.artifact = Some("out.json".to_string());
        spec.schema = Some("report-v1".to_string());
        let results = GateManager::new().execute_gates(&[spec], &[], &empty_context());
        assert!(!results[0].success);
    }

    // -----------------------------------------------------------------------
    // custom gates and isolation
    // -----------------------------------------------------------------------

    #[test]
    fn test_custom_gate_dispatch() {
        let mut manager = GateManager::new();
        manager.register_custom_handler(
            "size-check",
            Box::new(|spec, artifacts, _ctx| {
                if artifacts.is_empty() {
                    GateResult::fail(&spec.id, spec.gate_type, "no artifacts")
                } else {
                    GateResult::pass(&spec.id, spec.gate_type, "ok")
                }
            }),
        );

        let results =
            manager.execute_gates(&[gate("size-check", GateType::Custom)], &[], &empty_context());
        assert!(!results[0].success);
        assert_eq!(results[0].message, "no artifacts");
    }

    #[test]
    fn test_unregistered_custom_gate_fails_with_no_handler() {
        let results = GateManager::new().execute_gates(
            &[gate("mystery", GateType::Custom)],
            &[],
            &empty_context(),
        );
        assert!(!results[0].success);
        assert!(results[0].message.contains("no handler for gate type"));
    }

    #[test]
    fn test_panicking_handler_does_not_stop_other_gates() {
        let mut manager = GateManager::new();
        manager.register_custom_handler(
            "explodes",
            Box::new(|_, _, _| panic!("handler bug")),
        );
        manager.register_custom_handler(
            "fine",
            Box::new(|spec, _, _| GateResult::pass(&spec.id, spec.gate_type, "ok")),
        );

        let results = manager.execute_gates(
            &[
                gate("explodes", GateType::Custom),
                gate("fine", GateType::Custom),
            ],
            &[],
            &empty_context(),
        );
        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert!(results[0].message.contains("panicked"));
        assert!(results[1].success);
    }
}
