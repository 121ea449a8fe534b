//! JEXL guard evaluation for step `when` clauses.
//!
//! Wraps `jexl_eval::Evaluator` with a small set of pre-registered transforms
//! and coerces results to boolean using JavaScript-like truthiness.
//!
//! **Security note:** Payloads are always passed as context objects, NEVER
//! interpolated into expression strings. The evaluator reads only the context
//! map; there is no arbitrary code execution surface.
//!
//! The coordinator treats every error here as fail-closed: the guarded step
//! is skipped with the reason recorded, never executed speculatively.

use serde_json::{Value, json};

use super::context::ExecutionContext;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from guard evaluation.
#[derive(Debug, thiserror::Error)]
pub enum ExpressionError {
    #[error("guard evaluation failed: {0}")]
    EvalFailed(String),

    #[error("invalid context: {0}")]
    InvalidContext(String),
}

// ---------------------------------------------------------------------------
// GuardEvaluator
// ---------------------------------------------------------------------------

/// JEXL evaluator with standard transforms pre-registered.
pub struct GuardEvaluator {
    evaluator: jexl_eval::Evaluator<'static>,
}

impl GuardEvaluator {
    pub fn new() -> Self {
        let evaluator = jexl_eval::Evaluator::new()
            .with_transform("lower", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.to_lowercase()))
            })
            .with_transform("trim", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.trim()))
            })
            .with_transform("contains", |args: &[Value]| {
                let subject = args.first().and_then(|v| v.as_str()).unwrap_or("");
                let search = args.get(1).and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(subject.contains(search)))
            })
            .with_transform("length", |args: &[Value]| {
                let val = args.first().cloned().unwrap_or(Value::Null);
                let len = match &val {
                    Value::String(s) => s.len(),
                    Value::Array(a) => a.len(),
                    Value::Object(o) => o.len(),
                    _ => 0,
                };
                Ok(json!(len as f64))
            })
            .with_transform("not", |args: &[Value]| {
                let val = args.first().cloned().unwrap_or(Value::Null);
                Ok(json!(!value_to_bool(&val)))
            });

        Self { evaluator }
    }

    /// Evaluate a guard expression to a boolean against a JSON object context.
    pub fn evaluate_bool(&self, expression: &str, context: &Value) -> Result<bool, ExpressionError> {
        if !context.is_object() {
            return Err(ExpressionError::InvalidContext(
                "context must be a JSON object".to_string(),
            ));
        }

        let result = self
            .evaluator
            .eval_in_context(expression, context)
            .map_err(|e| ExpressionError::EvalFailed(e.to_string()))?;

        Ok(value_to_bool(&result))
    }

    /// Evaluate a step's `when` guard against the run's execution context.
    pub fn evaluate_guard(
        &self,
        expression: &str,
        context: &ExecutionContext,
    ) -> Result<bool, ExpressionError> {
        self.evaluate_bool(expression, &context.to_expression_context())
    }
}

impl Default for GuardEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// JavaScript-like truthiness coercion.
fn value_to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tidewave_types::result::StepExecutionResult;
    use tidewave_types::workflow::{WorkflowDefinition, WorkflowPolicy};
    use uuid::Uuid;

    fn evaluator() -> GuardEvaluator {
        GuardEvaluator::new()
    }

    fn context_with_result(step_id: &str, output: &str, success: bool) -> ExecutionContext {
        let definition = WorkflowDefinition {
            name: "wf".to_string(),
            description: None,
            inputs: HashMap::from([("env".to_string(), json!("prod"))]),
            policy: WorkflowPolicy::default(),
            steps: vec![],
        };
        let mut ctx = ExecutionContext::new(&definition, Uuid::now_v7());
        ctx.record_result(StepExecutionResult {
            step_id: step_id.to_string(),
            success,
            output: output.to_string(),
            artifacts: vec![],
            cost: 0.0,
            duration_ms: 1,
            error: None,
            metadata: HashMap::new(),
        });
        ctx
    }

    #[test]
    fn test_guard_on_step_success() {
        let ctx = context_with_result("lint", "clean", true);
        assert!(evaluator().evaluate_guard("steps.lint.success", &ctx).unwrap());
    }

    #[test]
    fn test_guard_on_step_output() {
        let ctx = context_with_result("lint", "3 findings", true);
        assert!(evaluator()
            .evaluate_guard("steps.lint.output|contains('findings')", &ctx)
            .unwrap());
        assert!(!evaluator()
            .evaluate_guard("steps.lint.output|contains('clean')", &ctx)
            .unwrap());
    }

    #[test]
    fn test_guard_on_inputs() {
        let ctx = context_with_result("a", "x", true);
        assert!(evaluator()
            .evaluate_guard("inputs.env == 'prod'", &ctx)
            .unwrap());
    }

    #[test]
    fn test_invalid_expression_is_error() {
        let ctx = context_with_result("a", "x", true);
        assert!(evaluator().evaluate_guard("steps.a.output ==", &ctx).is_err());
    }

    #[test]
    fn test_truthiness_coercion() {
        let eval = evaluator();
        let ctx = json!({ "n": 0.0, "s": "", "v": "text" });
        assert!(!eval.evaluate_bool("n", &ctx).unwrap());
        assert!(!eval.evaluate_bool("s", &ctx).unwrap());
        assert!(eval.evaluate_bool("v", &ctx).unwrap());
        assert!(!eval.evaluate_bool("missing", &ctx).unwrap());
    }

    #[test]
    fn test_non_object_context_rejected() {
        let eval = evaluator();
        assert!(eval.evaluate_bool("true", &json!("nope")).is_err());
    }

    #[test]
    fn test_transform_chain() {
        let eval = evaluator();
        let ctx = json!({ "name": "  HELLO  " });
        assert!(eval
            .evaluate_bool("name|trim|lower == 'hello'", &ctx)
            .unwrap());
    }
}
