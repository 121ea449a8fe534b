//! Global budget division across concurrent workflows, plus the runtime
//! ledger that tracks per-workflow step reservations.
//!
//! Allocation is proportional to demand weight (the sum of a workflow's step
//! complexity scores), clamped to configured per-workflow bounds, and scaled
//! down deterministically when total demand exceeds the global budget. The
//! `BudgetLedger` holds the live remaining balances; all decrements are
//! atomic so parallel steps can never over-allocate.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tidewave_types::routing::AllocationPlan;
use tidewave_types::workflow::WorkflowDefinition;

use super::complexity::ComplexityAnalyzer;

// ---------------------------------------------------------------------------
// Allocator
// ---------------------------------------------------------------------------

/// Per-workflow allocation bounds.
#[derive(Debug, Clone, Copy)]
pub struct AllocatorConfig {
    /// Floor for any workflow that gets a non-zero allocation.
    pub min_allocation: f64,
    /// Ceiling for any single workflow (`None` = unbounded).
    pub max_allocation: Option<f64>,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            min_allocation: 0.0,
            max_allocation: None,
        }
    }
}

/// Divides a global execution budget across concurrently requested workflows.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceAllocator {
    config: AllocatorConfig,
    analyzer: ComplexityAnalyzer,
}

impl ResourceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AllocatorConfig) -> Self {
        Self {
            config,
            analyzer: ComplexityAnalyzer::new(),
        }
    }

    /// Compute an allocation plan for the given workflows.
    ///
    /// A non-positive `global_budget` yields an all-zero plan rather than an
    /// error (used for dry-run execution). The sum of allocations never
    /// exceeds `global_budget`.
    pub fn create_allocation_plan(
        &self,
        workflows: &[&WorkflowDefinition],
        global_budget: f64,
    ) -> AllocationPlan {
        if global_budget <= 0.0 || workflows.is_empty() {
            return AllocationPlan {
                allocations: workflows
                    .iter()
                    .map(|wf| (wf.name.clone(), 0.0))
                    .collect(),
                global_budget,
                remaining_pool: global_budget.max(0.0),
            };
        }

        let weights: Vec<f64> = workflows.iter().map(|wf| self.demand_weight(wf)).collect();
        let total_weight: f64 = weights.iter().sum();

        // Zero total demand (all-trivial steps) splits the budget evenly.
        let shares: Vec<f64> = if total_weight <= 0.0 {
            let even = global_budget / workflows.len() as f64;
            vec![even; workflows.len()]
        } else {
            weights
                .iter()
                .map(|w| global_budget * w / total_weight)
                .collect()
        };

        let mut clamped: Vec<f64> = shares.iter().map(|s| self.clamp(*s)).collect();

        // Clamping can push the total over budget; scale everything down
        // proportionally so the invariant holds.
        let total: f64 = clamped.iter().sum();
        if total > global_budget {
            let scale = global_budget / total;
            for share in &mut clamped {
                *share *= scale;
            }
        }

        let allocated: f64 = clamped.iter().sum();
        let allocations = workflows
            .iter()
            .zip(clamped)
            .map(|(wf, share)| (wf.name.clone(), share))
            .collect();

        tracing::debug!(
            workflows = workflows.len(),
            global_budget,
            allocated,
            "allocation plan computed"
        );

        AllocationPlan {
            allocations,
            global_budget,
            remaining_pool: (global_budget - allocated).max(0.0),
        }
    }

    /// A workflow's demand weight: the sum of its steps' complexity scores.
    fn demand_weight(&self, workflow: &WorkflowDefinition) -> f64 {
        workflow
            .steps
            .iter()
            .map(|step| self.analyzer.analyze(step).score)
            .sum()
    }

    fn clamp(&self, share: f64) -> f64 {
        let floored = share.max(self.config.min_allocation);
        match self.config.max_allocation {
            Some(max) => floored.min(max),
            None => floored,
        }
    }
}

// ---------------------------------------------------------------------------
// Budget ledger
// ---------------------------------------------------------------------------

/// Scale factor: balances are stored as integer milli-units so decrements can
/// be atomic.
const MILLI: f64 = 1000.0;

/// Live per-workflow budget balances, decremented as steps reserve cost.
///
/// All mutations go through `compare_exchange` loops on `AtomicU64`, so
/// concurrent reservations from parallel steps can never over-allocate. A
/// failed reservation means the step stays pending; it is never an error.
#[derive(Debug, Default)]
pub struct BudgetLedger {
    remaining_milli: DashMap<String, AtomicU64>,
}

impl BudgetLedger {
    /// Seed a ledger from an allocation plan's per-workflow ceilings.
    pub fn from_plan(plan: &AllocationPlan) -> Self {
        let ledger = Self::default();
        for (workflow, allocation) in &plan.allocations {
            ledger
                .remaining_milli
                .insert(workflow.clone(), AtomicU64::new(to_milli(*allocation)));
        }
        ledger
    }

    /// Try to reserve `amount` against a workflow's remaining allocation.
    ///
    /// Returns false if the workflow is unknown or has insufficient budget;
    /// the balance is left untouched in that case.
    pub fn try_reserve(&self, workflow: &str, amount: f64) -> bool {
        if amount <= 0.0 {
            return true;
        }
        let Some(balance) = self.remaining_milli.get(workflow) else {
            return false;
        };
        let needed = to_milli(amount);
        let mut current = balance.load(Ordering::SeqCst);
        loop {
            if current < needed {
                return false;
            }
            match balance.compare_exchange(
                current,
                current - needed,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Return an unused reservation to the workflow's balance (saturating).
    pub fn release(&self, workflow: &str, amount: f64) {
        if amount <= 0.0 {
            return;
        }
        if let Some(balance) = self.remaining_milli.get(workflow) {
            balance.fetch_add(to_milli(amount), Ordering::SeqCst);
        }
    }

    /// The workflow's remaining allocation (0 if unknown).
    pub fn remaining_for(&self, workflow: &str) -> f64 {
        self.remaining_milli
            .get(workflow)
            .map(|b| b.load(Ordering::SeqCst) as f64 / MILLI)
            .unwrap_or(0.0)
    }
}

fn to_milli(amount: f64) -> u64 {
    (amount * MILLI).round() as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
