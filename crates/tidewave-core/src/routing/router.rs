//! Per-step adapter selection and plan assembly.
//!
//! The router applies a policy table of score-threshold rules to pick an
//! adapter for each step. Routing is deterministic: an identical step and
//! policy table always produce an identical decision, and the rationale
//! string names the matched rule.

use std::collections::HashSet;
use std::sync::Arc;

use tidewave_types::routing::{AllocationPlan, ParallelRoutingPlan, RoutingDecision};
use tidewave_types::workflow::{StepDefinition, WorkflowDefinition};

use crate::adapter::AdapterKind;
use crate::adapter::registry::AdapterRegistry;

use super::allocator::ResourceAllocator;
use super::complexity::ComplexityAnalyzer;
use super::planner::{ParallelPlanner, PlanningError};

// ---------------------------------------------------------------------------
// Policy table
// ---------------------------------------------------------------------------

/// One routing rule: steps scoring at or above `min_score` go to `adapter_id`
/// (`None` = the step's declared actor).
#[derive(Debug, Clone)]
pub struct RoutingRule {
    /// Rule name, cited in the decision rationale.
    pub name: String,
    /// Minimum complexity score this rule applies to.
    pub min_score: f64,
    /// Target adapter; `None` routes to the step's declared actor.
    pub adapter_id: Option<String>,
}

/// Ordered rule table. Rules are scanned top to bottom; the first rule whose
/// threshold the step's score meets wins.
#[derive(Debug, Clone)]
pub struct RoutingPolicy {
    pub rules: Vec<RoutingRule>,
}

impl Default for RoutingPolicy {
    /// The default policy routes every step to its declared actor.
    fn default() -> Self {
        Self {
            rules: vec![RoutingRule {
                name: "declared-actor".to_string(),
                min_score: 0.0,
                adapter_id: None,
            }],
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Composes the complexity analyzer, wave planner, and budget allocator.
pub struct Router {
    registry: Arc<AdapterRegistry>,
    policy: RoutingPolicy,
    analyzer: ComplexityAnalyzer,
    planner: ParallelPlanner,
    allocator: ResourceAllocator,
}

impl Router {
    /// Router with the default policy (declared actor) and default planner
    /// and allocator settings.
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self {
            registry,
            policy: RoutingPolicy::default(),
            analyzer: ComplexityAnalyzer::new(),
            planner: ParallelPlanner::new(),
            allocator: ResourceAllocator::new(),
        }
    }

    pub fn with_policy(mut self, policy: RoutingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_planner(mut self, planner: ParallelPlanner) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_allocator(mut self, allocator: ResourceAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    /// Route one step to an adapter. Deterministic for a given policy table.
    pub fn route_step(&self, step: &StepDefinition) -> RoutingDecision {
        let analysis = self.analyzer.analyze(step);

        let matched = self
            .policy
            .rules
            .iter()
            .find(|rule| analysis.score >= rule.min_score);

        let (adapter_id, rationale) = match matched {
            Some(rule) => {
                let adapter_id = rule
                    .adapter_id
                    .clone()
                    .unwrap_or_else(|| step.actor.clone());
                let rationale = format!(
                    "matched rule '{}' (score {:.2} >= {:.2})",
                    rule.name, analysis.score, rule.min_score
                );
                (adapter_id, rationale)
            }
            None => (
                step.actor.clone(),
                "no rule matched; falling back to declared actor".to_string(),
            ),
        };

        let estimated_cost = self
            .registry
            .get(&adapter_id)
            .map(|adapter| adapter.estimate_cost(step))
            .unwrap_or(0.0);

        RoutingDecision {
            adapter_id,
            analysis,
            rationale,
            estimated_cost,
        }
    }

    /// Route every step, then delegate wave construction to the planner.
    ///
    /// Routing first is what tells the planner which steps are AI-driven and
    /// therefore subject to the per-wave concurrency cap.
    pub fn route_parallel_steps(
        &self,
        steps: &[StepDefinition],
    ) -> Result<ParallelRoutingPlan, PlanningError> {
        let ai_step_ids: HashSet<String> = steps
            .iter()
            .filter(|step| {
                let decision = self.route_step(step);
                self.registry.kind_of(&decision.adapter_id) == Some(AdapterKind::Ai)
            })
            .map(|step| step.id.clone())
            .collect();

        self.planner.create_parallel_plan(steps, &ai_step_ids)
    }

    /// Divide `global_budget` across `workflows`. Delegates to the allocator.
    pub fn create_allocation_plan(
        &self,
        workflows: &[&WorkflowDefinition],
        global_budget: f64,
    ) -> AllocationPlan {
        self.allocator.create_allocation_plan(workflows, global_budget)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::collections::HashMap;

    use crate::adapter::boxed::BoxAdapter;
    use crate::adapter::{Adapter, AdapterError, AdapterOutput};

    /// Stand-in AI adapter with a fixed per-step cost estimate.
    struct FakeAiAdapter {
        id: &'static str,
        cost: f64,
    }

    impl Adapter for FakeAiAdapter {
        fn id(&self) -> &str {
            self.id
        }

        fn kind(&self) -> AdapterKind {
            AdapterKind::Ai
        }

        fn is_available(&self) -> bool {
            true
        }

        fn estimate_cost(&self, _step: &StepDefinition) -> f64 {
            self.cost
        }

        async fn execute(
            &self,
            _step: &StepDefinition,
            _context: &Value,
            _files: &[String],
        ) -> Result<AdapterOutput, AdapterError> {
            Ok(AdapterOutput::default())
        }
    }

    fn registry() -> Arc<AdapterRegistry> {
        let mut registry = AdapterRegistry::with_builtins();
        registry.register(BoxAdapter::new(FakeAiAdapter {
            id: "claude",
            cost: 12.5,
        }));
        Arc::new(registry)
    }

    fn step(id: &str, actor: &str, name: &str) -> StepDefinition {
        StepDefinition {
            id: id.to_string(),
            name: name.to_string(),
            actor: actor.to_string(),
            with: HashMap::new(),
            when: None,
            retry: None,
            emits: vec![],
            on_fail: Default::default(),
        }
    }

    // -----------------------------------------------------------------------
    // route_step
    // -----------------------------------------------------------------------

    #[test]
    fn test_default_policy_routes_to_declared_actor() {
        let router = Router::new(registry());
        let decision = router.route_step(&step("a", "echo", "A"));
        assert_eq!(decision.adapter_id, "echo");
        assert!(decision.rationale.contains("declared-actor"));
        assert_eq!(decision.estimated_cost, 0.0);
    }

    #[test]
    fn test_threshold_rule_overrides_actor() {
        let policy = RoutingPolicy {
            rules: vec![
                RoutingRule {
                    name: "heavy-work".to_string(),
                    min_score: 0.6,
                    adapter_id: Some("claude".to_string()),
                },
                RoutingRule {
                    name: "declared-actor".to_string(),
                    min_score: 0.0,
                    adapter_id: None,
                },
            ],
        };
        let router = Router::new(registry()).with_policy(policy);

        let heavy = router.route_step(&step("g", "generate", "Generate module"));
        assert_eq!(heavy.adapter_id, "claude");
        assert!(heavy.rationale.contains("heavy-work"));
        assert!((heavy.estimated_cost - 12.5).abs() < f64::EPSILON);

        let light = router.route_step(&step("t", "pytest", "Run tests"));
        assert_eq!(light.adapter_id, "pytest");
        assert!(light.rationale.contains("declared-actor"));
    }

    #[test]
    fn test_route_step_is_idempotent() {
        let router = Router::new(registry());
        let s = step("a", "claude", "Generate docs");
        let first = router.route_step(&s);
        for _ in 0..5 {
            assert_eq!(router.route_step(&s), first);
        }
    }

    #[test]
    fn test_unregistered_adapter_estimates_zero_cost() {
        let router = Router::new(registry());
        let decision = router.route_step(&step("a", "nonexistent", "A"));
        assert_eq!(decision.adapter_id, "nonexistent");
        assert_eq!(decision.estimated_cost, 0.0);
    }

    // -----------------------------------------------------------------------
    // route_parallel_steps
    // -----------------------------------------------------------------------

    #[test]
    fn test_parallel_routing_applies_ai_cap() {
        let router = Router::new(registry());
        let steps: Vec<StepDefinition> = (0..5)
            .map(|i| {
                let mut s = step(&format!("ai{i}"), "claude", "Generate part");
                s.with
                    .insert("files".to_string(), json!([format!("mod{i}/**")]));
                s
            })
            .collect();
        let plan = router.route_parallel_steps(&steps).unwrap();
        assert_eq!(plan.waves.len(), 2, "5 AI steps at default cap 3");
        assert_eq!(plan.waves[0].len(), 3);
    }

    #[test]
    fn test_parallel_routing_deterministic_steps_uncapped() {
        let router = Router::new(registry());
        let steps: Vec<StepDefinition> = (0..5)
            .map(|i| {
                let mut s = step(&format!("e{i}"), "echo", "E");
                s.with
                    .insert("files".to_string(), json!([format!("mod{i}/**")]));
                s
            })
            .collect();
        let plan = router.route_parallel_steps(&steps).unwrap();
        assert_eq!(plan.waves.len(), 1);
        assert_eq!(plan.waves[0].len(), 5);
    }

    // -----------------------------------------------------------------------
    // create_allocation_plan
    // -----------------------------------------------------------------------

    #[test]
    fn test_allocation_delegation() {
        use tidewave_types::workflow::WorkflowPolicy;
        let router = Router::new(registry());
        let wf = WorkflowDefinition {
            name: "wf".to_string(),
            description: None,
            inputs: HashMap::new(),
            policy: WorkflowPolicy::default(),
            steps: vec![step("a", "echo", "A")],
        };
        let plan = router.create_allocation_plan(&[&wf], 10.0);
        assert!((plan.allocation_for("wf") - 10.0).abs() < 1e-9);
    }
}
