//! Workflow domain types for Tidewave.
//!
//! Defines the canonical representation of a declarative workflow: an ordered
//! list of steps, each naming the adapter (`actor`) that performs it, plus the
//! execution policy. YAML files and programmatic construction both converge on
//! `WorkflowDefinition`; it is immutable once parsed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Workflow Definition
// ---------------------------------------------------------------------------

/// A declarative workflow: name, ordered steps, policy, and declared inputs.
///
/// The step order in `steps` is the declaration order; result lists are always
/// re-sorted back to it regardless of actual completion timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Human-readable workflow name.
    pub name: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared inputs, available to step templates as `{{ inputs.<name> }}`.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub inputs: HashMap<String, serde_json::Value>,
    /// Execution policy.
    #[serde(default)]
    pub policy: WorkflowPolicy,
    /// Ordered list of step definitions.
    pub steps: Vec<StepDefinition>,
}

/// Execution policy block.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorkflowPolicy {
    /// Halt scheduling of further waves after the first step failure.
    /// In-flight steps of the failing wave are still drained.
    #[serde(default = "default_fail_fast")]
    pub fail_fast: bool,
}

fn default_fail_fast() -> bool {
    true
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self { fail_fast: true }
    }
}

// ---------------------------------------------------------------------------
// Step Definition
// ---------------------------------------------------------------------------

/// A single step in a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    /// User-defined step ID (e.g. "apply-patch"). Unique within a workflow.
    pub id: String,
    /// Human-readable step name.
    pub name: String,
    /// Adapter identifier that performs this step (e.g. "claude", "pytest").
    pub actor: String,
    /// Parameter map passed to the adapter. String values support
    /// `{{ steps.<id>.output }}` and `{{ inputs.<name> }}` templates.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub with: HashMap<String, serde_json::Value>,
    /// Optional JEXL guard expression; the step runs only if it evaluates
    /// truthy against the accumulated context. Invalid expressions fail
    /// closed (step skipped).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    /// Retry configuration for this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
    /// Artifact paths this step declares it will produce.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emits: Vec<String>,
    /// What to do when this step fails (after retries are exhausted).
    #[serde(default)]
    pub on_fail: OnFail,
}

/// Behavior when a step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFail {
    /// Halt scheduling and record a review request.
    PauseForReview,
    /// Halt scheduling and mark the workflow failed.
    #[default]
    Abort,
    /// Tolerate the failure; the workflow may still succeed.
    Continue,
    /// Halt scheduling; overall success reflects executed steps only.
    Stop,
}

// ---------------------------------------------------------------------------
// Retry Configuration
// ---------------------------------------------------------------------------

/// Retry configuration for a workflow step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts (default 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff strategy between attempts.
    #[serde(default)]
    pub backoff: Backoff,
}

fn default_max_attempts() -> u32 {
    3
}

/// Backoff strategy between retry attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Delay grows linearly with the attempt number.
    #[default]
    Linear,
    /// Delay doubles with each attempt.
    Exponential,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_workflow() -> WorkflowDefinition {
        WorkflowDefinition {
            name: "fix-lints".to_string(),
            description: Some("Run the linter, patch findings, verify".to_string()),
            inputs: HashMap::from([("branch".to_string(), json!("main"))]),
            policy: WorkflowPolicy { fail_fast: true },
            steps: vec![
                StepDefinition {
                    id: "lint".to_string(),
                    name: "Run linter".to_string(),
                    actor: "clippy".to_string(),
                    with: HashMap::from([("files".to_string(), json!(["src/**"]))]),
                    when: None,
                    retry: None,
                    emits: vec!["reports/lint.json".to_string()],
                    on_fail: OnFail::Abort,
                },
                StepDefinition {
                    id: "patch".to_string(),
                    name: "Patch findings".to_string(),
                    actor: "claude".to_string(),
                    with: HashMap::from([
                        ("files".to_string(), json!(["src/**"])),
                        ("prompt".to_string(), json!("Fix: {{ steps.lint.output }}")),
                    ]),
                    when: Some("steps.lint.success".to_string()),
                    retry: Some(RetryConfig {
                        max_attempts: 2,
                        backoff: Backoff::Exponential,
                    }),
                    emits: vec![],
                    on_fail: OnFail::PauseForReview,
                },
            ],
        }
    }

    // -----------------------------------------------------------------------
    // YAML roundtrip
    // -----------------------------------------------------------------------

    #[test]
    fn test_workflow_definition_yaml_roundtrip() {
        let original = sample_workflow();
        let yaml = serde_yaml_ng::to_string(&original).expect("serialize to YAML");

        assert!(yaml.contains("fix-lints"));
        assert!(yaml.contains("actor: clippy"));
        assert!(yaml.contains("on_fail: pause_for_review"));

        let parsed: WorkflowDefinition =
            serde_yaml_ng::from_str(&yaml).expect("deserialize from YAML");
        assert_eq!(parsed.name, "fix-lints");
        assert_eq!(parsed.steps.len(), 2);
        assert_eq!(parsed.steps[1].retry.as_ref().unwrap().max_attempts, 2);
        assert_eq!(
            parsed.steps[1].retry.as_ref().unwrap().backoff,
            Backoff::Exponential
        );
    }

    #[test]
    fn test_parse_minimal_yaml() {
        let yaml = r#"
name: two-echoes
steps:
  - id: "1"
    name: A
    actor: echo
  - id: "2"
    name: B
    actor: echo
"#;
        let wf: WorkflowDefinition = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(wf.name, "two-echoes");
        assert_eq!(wf.steps.len(), 2);
        assert!(wf.policy.fail_fast, "fail_fast defaults to true");
        assert_eq!(wf.steps[0].on_fail, OnFail::Abort);
        assert!(wf.steps[0].with.is_empty());
        assert!(wf.steps[0].emits.is_empty());
    }

    #[test]
    fn test_policy_fail_fast_override() {
        let yaml = r#"
name: tolerant
policy:
  fail_fast: false
steps:
  - id: a
    name: A
    actor: echo
"#;
        let wf: WorkflowDefinition = serde_yaml_ng::from_str(yaml).unwrap();
        assert!(!wf.policy.fail_fast);
    }

    // -----------------------------------------------------------------------
    // Enum serde forms
    // -----------------------------------------------------------------------

    #[test]
    fn test_on_fail_serde_forms() {
        for (variant, text) in [
            (OnFail::PauseForReview, "\"pause_for_review\""),
            (OnFail::Abort, "\"abort\""),
            (OnFail::Continue, "\"continue\""),
            (OnFail::Stop, "\"stop\""),
        ] {
            let json = serde_json::to_string(&variant).unwrap();
            assert_eq!(json, text);
            let parsed: OnFail = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, variant);
        }
    }

    #[test]
    fn test_retry_config_default_max_attempts() {
        let yaml = "backoff: linear";
        let config: RetryConfig = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.backoff, Backoff::Linear);
    }

    #[test]
    fn test_json_workflow_parses() {
        // YAML is a JSON superset, so .json workflow files parse the same way.
        let json_text = r#"{
            "name": "from-json",
            "steps": [{"id": "a", "name": "A", "actor": "echo"}]
        }"#;
        let wf: WorkflowDefinition = serde_yaml_ng::from_str(json_text).unwrap();
        assert_eq!(wf.name, "from-json");
    }
}
