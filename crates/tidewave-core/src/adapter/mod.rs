//! Adapter contract and supporting infrastructure.
//!
//! An adapter is the external collaborator that performs the actual work
//! behind a step (AI tool call, deterministic script, git operation). The
//! orchestration engine only ever sees the `Adapter` trait: `execute`,
//! `is_available`, and `estimate_cost`.

pub mod boxed;
pub mod cost;
pub mod registry;

use std::collections::HashMap;
use std::future::Future;

use serde_json::Value;
use tidewave_types::workflow::StepDefinition;

// ---------------------------------------------------------------------------
// Adapter kind
// ---------------------------------------------------------------------------

/// Whether an adapter drives an external AI backend or a deterministic tool.
///
/// AI adapters are subject to the planner's per-wave concurrency cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    /// Calls out to an AI backend; capped per wave.
    Ai,
    /// Deterministic tool (test runner, linter, script); uncapped.
    Deterministic,
}

// ---------------------------------------------------------------------------
// Adapter output and errors
// ---------------------------------------------------------------------------

/// What an adapter reports back after executing a step.
#[derive(Debug, Clone, Default)]
pub struct AdapterOutput {
    /// Output text.
    pub output: String,
    /// Artifact paths the adapter reports having produced.
    pub artifacts: Vec<String>,
    /// Cost consumed by this invocation.
    pub cost: f64,
    /// Adapter-specific metadata.
    pub metadata: HashMap<String, Value>,
}

/// Errors an adapter invocation can report.
///
/// These never cross the executor boundary; the executor converts them into
/// failure results.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("adapter unavailable: {0}")]
    Unavailable(String),

    #[error("adapter execution failed: {0}")]
    Failed(String),
}

// ---------------------------------------------------------------------------
// Adapter trait
// ---------------------------------------------------------------------------

/// Trait for step executors (AI tools, test runners, linters, scripts).
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition) for `execute`.
/// Implementations that need dynamic dispatch go through
/// [`boxed::BoxAdapter`].
pub trait Adapter: Send + Sync {
    /// Stable adapter identifier, matched against `StepDefinition.actor`.
    fn id(&self) -> &str;

    /// Whether this adapter drives an AI backend.
    fn kind(&self) -> AdapterKind;

    /// Whether the adapter can currently take work.
    fn is_available(&self) -> bool;

    /// Estimated cost of executing the given step, in budget units.
    fn estimate_cost(&self, step: &StepDefinition) -> f64;

    /// Execute one step. `step.with` arrives with templates already resolved;
    /// `context` is the accumulated run context as a JSON object.
    fn execute(
        &self,
        step: &StepDefinition,
        context: &Value,
        files: &[String],
    ) -> impl Future<Output = Result<AdapterOutput, AdapterError>> + Send;
}
