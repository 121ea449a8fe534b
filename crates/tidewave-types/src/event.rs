//! Event types for the Tidewave run event bus.
//!
//! `RunEvent` is the unified event type broadcast during workflow execution.
//! All variants are Clone + Send + Sync for use with tokio broadcast channels.
//! Events are observability only; nothing in the engine's control flow
//! depends on them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events emitted during a workflow run.
///
/// Used by the event bus to communicate run lifecycle, step progress, and
/// budget events to subscribers (CLI, logging).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// A workflow run has started.
    RunStarted {
        run_id: Uuid,
        workflow_name: String,
        step_count: usize,
        wave_count: usize,
    },

    /// A wave of steps is being dispatched.
    WaveStarted {
        run_id: Uuid,
        wave_index: usize,
        step_ids: Vec<String>,
    },

    /// A step has started executing.
    StepStarted {
        run_id: Uuid,
        step_id: String,
        adapter_id: String,
    },

    /// A step has completed successfully.
    StepCompleted {
        run_id: Uuid,
        step_id: String,
        cost: f64,
        duration_ms: u64,
    },

    /// A step has failed.
    StepFailed {
        run_id: Uuid,
        step_id: String,
        error: String,
        will_retry: bool,
    },

    /// A step was skipped because its guard evaluated false (or failed closed).
    StepSkipped {
        run_id: Uuid,
        step_id: String,
        reason: String,
    },

    /// A step is blocked on budget and will stay pending.
    StepPending {
        run_id: Uuid,
        step_id: String,
        remaining_budget: f64,
    },

    /// The workflow run has completed.
    RunCompleted {
        run_id: Uuid,
        workflow_name: String,
        success: bool,
        duration_ms: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_event_serde_tagging() {
        let event = RunEvent::StepFailed {
            run_id: Uuid::now_v7(),
            step_id: "patch".to_string(),
            error: "adapter unavailable".to_string(),
            will_retry: false,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"step_failed\""));
        let parsed: RunEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, RunEvent::StepFailed { .. }));
    }
}
