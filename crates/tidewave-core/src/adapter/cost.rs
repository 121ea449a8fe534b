//! Per-actor cost ledger.
//!
//! The executor records consumption against the acting adapter's ledger after
//! a successful step. Recording is fire-and-forget: a ledger failure is
//! logged and never fails the step.

use dashmap::DashMap;

/// Errors a cost tracker may report. The executor logs these and moves on.
#[derive(Debug, thiserror::Error)]
pub enum CostError {
    #[error("cost ledger rejected record for '{actor}': {reason}")]
    RecordFailed { actor: String, reason: String },
}

/// Collaborator that accumulates per-actor cost consumption.
pub trait CostTracker: Send + Sync {
    /// Record `amount` consumed by `actor_id`.
    fn add_tokens(&self, actor_id: &str, amount: f64) -> Result<(), CostError>;

    /// Total recorded so far for `actor_id` (0 if never seen).
    fn total_for(&self, actor_id: &str) -> f64;
}

// ---------------------------------------------------------------------------
// In-memory tracker
// ---------------------------------------------------------------------------

/// Concurrent in-memory cost tracker keyed by actor id.
#[derive(Debug, Default)]
pub struct InMemoryCostTracker {
    totals: DashMap<String, f64>,
}

impl InMemoryCostTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CostTracker for InMemoryCostTracker {
    fn add_tokens(&self, actor_id: &str, amount: f64) -> Result<(), CostError> {
        *self.totals.entry(actor_id.to_string()).or_insert(0.0) += amount;
        Ok(())
    }

    fn total_for(&self, actor_id: &str) -> f64 {
        self.totals.get(actor_id).map(|v| *v).unwrap_or(0.0)
    }
}

/// Tracker that discards everything. Used for dry runs.
#[derive(Debug, Default)]
pub struct NullCostTracker;

impl CostTracker for NullCostTracker {
    fn add_tokens(&self, _actor_id: &str, _amount: f64) -> Result<(), CostError> {
        Ok(())
    }

    fn total_for(&self, _actor_id: &str) -> f64 {
        0.0
    }
}
