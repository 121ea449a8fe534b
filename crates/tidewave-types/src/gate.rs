//! Quality gate types: declarations and per-gate verdicts.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Gate declaration
// ---------------------------------------------------------------------------

/// The kind of post-execution check a gate performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateType {
    /// A declared test-report artifact must exist and report zero failures.
    TestsPass,
    /// The run's reported files/lines delta must be within bounds.
    DiffLimits,
    /// An artifact must validate against a schema (external collaborator).
    SchemaValid,
    /// A caller-registered handler decides.
    Custom,
}

/// A declared quality gate, evaluated after all waves complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateSpec {
    /// Gate identifier, unique within the declaration list.
    pub id: String,
    /// Dispatch type.
    #[serde(rename = "type")]
    pub gate_type: GateType,
    /// Artifact path (tests_pass, schema_valid).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    /// Schema identifier (schema_valid).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Maximum changed files (diff_limits).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_files: Option<u64>,
    /// Maximum changed lines (diff_limits).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_lines: Option<u64>,
}

// ---------------------------------------------------------------------------
// Gate result
// ---------------------------------------------------------------------------

/// The verdict of one gate. One gate's failure never prevents evaluation of
/// the remaining gates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResult {
    /// The gate that produced this verdict.
    pub gate_id: String,
    /// Dispatch type of the gate.
    pub gate_type: GateType,
    /// Whether the gate passed.
    pub success: bool,
    /// Human-readable verdict message.
    pub message: String,
    /// Structured detail (counts, bounds, handler payloads).
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl GateResult {
    /// Build a failing verdict.
    pub fn fail(gate_id: impl Into<String>, gate_type: GateType, message: impl Into<String>) -> Self {
        Self {
            gate_id: gate_id.into(),
            gate_type,
            success: false,
            message: message.into(),
            details: serde_json::Value::Null,
        }
    }

    /// Build a passing verdict.
    pub fn pass(gate_id: impl Into<String>, gate_type: GateType, message: impl Into<String>) -> Self {
        Self {
            gate_id: gate_id.into(),
            gate_type,
            success: true,
            message: message.into(),
            details: serde_json::Value::Null,
        }
    }

    /// Attach structured detail to the verdict.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
