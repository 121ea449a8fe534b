//! Routing and planning types: complexity analysis, routing decisions,
//! parallel wave plans, and budget allocation plans.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Complexity analysis
// ---------------------------------------------------------------------------

/// The inferred kind of work a step performs.
///
/// Declaration order doubles as the deterministic tie-break order when a
/// step matches multiple categories with equal weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationCategory {
    /// Modifying existing files (refactor, patch, fix).
    Edit,
    /// Producing new content (code, docs, scaffolding).
    Generate,
    /// Running or writing tests.
    Test,
    /// Build, deploy, or environment work.
    Infra,
    /// Nothing matched; the conservative default.
    Unknown,
}

/// Heuristic estimate of a step's size and risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityAnalysis {
    /// Normalized complexity score in `[0, 1]`.
    pub score: f64,
    /// Inferred operation category.
    pub category: OperationCategory,
    /// Bounded estimate of touched files, from declared `with.files`
    /// pattern cardinality (never a filesystem scan).
    pub estimated_files: u32,
}

impl ComplexityAnalysis {
    /// The all-defaults analysis used when a step declares nothing useful.
    pub fn unknown() -> Self {
        Self {
            score: 0.0,
            category: OperationCategory::Unknown,
            estimated_files: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Routing decision
// ---------------------------------------------------------------------------

/// The outcome of routing a single step to an adapter.
///
/// Deterministic: the same step and policy table always produce an
/// identical decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// The chosen adapter id.
    pub adapter_id: String,
    /// The complexity analysis the decision was based on.
    pub analysis: ComplexityAnalysis,
    /// Human-readable rationale naming the matched policy rule.
    pub rationale: String,
    /// Estimated cost of executing the step through this adapter.
    pub estimated_cost: f64,
}

// ---------------------------------------------------------------------------
// Parallel routing plan
// ---------------------------------------------------------------------------

/// A wave-ordered execution plan for one workflow.
///
/// Invariants: every wave is a disjoint set of step ids; the union of all
/// waves equals the workflow's step set; a step appears only in a wave after
/// all of its blocking steps' waves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParallelRoutingPlan {
    /// Ordered list of waves; each wave's members may run concurrently.
    pub waves: Vec<Vec<String>>,
    /// Sequential constraints: step id -> ids that must complete first.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub blocking: HashMap<String, Vec<String>>,
}

impl ParallelRoutingPlan {
    /// Total number of planned steps across all waves.
    pub fn step_count(&self) -> usize {
        self.waves.iter().map(|w| w.len()).sum()
    }

    /// The zero-based wave index a step is scheduled in, if any.
    pub fn wave_of(&self, step_id: &str) -> Option<usize> {
        self.waves
            .iter()
            .position(|wave| wave.iter().any(|id| id == step_id))
    }
}

// ---------------------------------------------------------------------------
// Allocation plan
// ---------------------------------------------------------------------------

/// Division of a global execution budget across concurrently requested
/// workflows. The sum of `allocations` never exceeds `global_budget`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationPlan {
    /// Per-workflow budget ceiling, keyed by workflow name.
    pub allocations: HashMap<String, f64>,
    /// The global budget the plan was computed against.
    pub global_budget: f64,
    /// Budget left in the global pool after all allocations.
    pub remaining_pool: f64,
}

impl AllocationPlan {
    /// The budget ceiling allocated to a workflow (0 if absent).
    pub fn allocation_for(&self, workflow: &str) -> f64 {
        self.allocations.get(workflow).copied().unwrap_or(0.0)
    }

    /// Sum of all per-workflow allocations.
    pub fn total_allocated(&self) -> f64 {
        self.allocations.values().sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_step_count_and_wave_of() {
        let plan = ParallelRoutingPlan {
            waves: vec![
                vec!["a".to_string(), "b".to_string()],
                vec!["c".to_string()],
            ],
            blocking: HashMap::from([("c".to_string(), vec!["a".to_string()])]),
        };
        assert_eq!(plan.step_count(), 3);
        assert_eq!(plan.wave_of("a"), Some(0));
        assert_eq!(plan.wave_of("c"), Some(1));
        assert_eq!(plan.wave_of("missing"), None);
    }

    #[test]
    fn test_allocation_plan_accessors() {
        let plan = AllocationPlan {
            allocations: HashMap::from([
                ("wf-a".to_string(), 50.0),
                ("wf-b".to_string(), 30.0),
            ]),
            global_budget: 100.0,
            remaining_pool: 20.0,
        };
        assert_eq!(plan.allocation_for("wf-a"), 50.0);
        assert_eq!(plan.allocation_for("absent"), 0.0);
        assert!((plan.total_allocated() - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_complexity_analysis_unknown() {
        let a = ComplexityAnalysis::unknown();
        assert_eq!(a.score, 0.0);
        assert_eq!(a.category, OperationCategory::Unknown);
        assert_eq!(a.estimated_files, 0);
    }

    #[test]
    fn test_routing_decision_json_roundtrip() {
        let decision = RoutingDecision {
            adapter_id: "claude".to_string(),
            analysis: ComplexityAnalysis {
                score: 0.7,
                category: OperationCategory::Edit,
                estimated_files: 4,
            },
            rationale: "matched rule 'heavy-edit' (score 0.70 >= 0.60)".to_string(),
            estimated_cost: 12.5,
        };
        let json = serde_json::to_string(&decision).unwrap();
        let parsed: RoutingDecision = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, decision);
    }
}
