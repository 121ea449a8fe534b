//! Conflict-graph wave planning.
//!
//! Groups a workflow's steps into conflict-free concurrent waves. Two steps
//! conflict if their declared file scopes overlap; a step with no declared
//! scope conservatively conflicts with every other step, forcing
//! serialization rather than guessing safety. Conflicts between an earlier-
//! and a later-declared step become sequential constraints (the earlier step
//! blocks the later one).
//!
//! Uses `petgraph` to model the constraints as a directed graph; topological
//! sort detects cycles before any wave is produced.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use tidewave_types::routing::ParallelRoutingPlan;
use tidewave_types::workflow::StepDefinition;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Planning failures. No partial plan is ever returned alongside these.
#[derive(Debug, thiserror::Error)]
pub enum PlanningError {
    #[error("cycle detected involving step '{0}'")]
    Cycle(String),

    #[error("duplicate step id '{0}'")]
    DuplicateStepId(String),
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Default cap on concurrently scheduled AI-driven steps per wave, protecting
/// external AI backends from overload.
pub const DEFAULT_MAX_AI_PER_WAVE: usize = 3;

/// Groups steps into conflict-free concurrent waves.
#[derive(Debug, Clone, Copy)]
pub struct ParallelPlanner {
    max_ai_per_wave: usize,
}

impl Default for ParallelPlanner {
    fn default() -> Self {
        Self {
            max_ai_per_wave: DEFAULT_MAX_AI_PER_WAVE,
        }
    }
}

impl ParallelPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the per-wave AI concurrency cap (floored at 1).
    pub fn with_max_ai_per_wave(max_ai_per_wave: usize) -> Self {
        Self {
            max_ai_per_wave: max_ai_per_wave.max(1),
        }
    }

    /// Build a wave plan for `steps`. `ai_step_ids` names the steps routed to
    /// AI adapters, which are subject to the per-wave cap.
    ///
    /// The produced waves partition the step set; a step appears only in a
    /// wave after all of its blocking steps' waves.
    pub fn create_parallel_plan(
        &self,
        steps: &[StepDefinition],
        ai_step_ids: &HashSet<String>,
    ) -> Result<ParallelRoutingPlan, PlanningError> {
        if steps.is_empty() {
            return Ok(ParallelRoutingPlan::default());
        }

        let mut seen = HashSet::new();
        for step in steps {
            if !seen.insert(step.id.as_str()) {
                return Err(PlanningError::DuplicateStepId(step.id.clone()));
            }
        }

        // Conflict edges always point from the earlier-declared step to the
        // later one: the earlier step blocks the later.
        let mut blocking: HashMap<String, Vec<String>> = HashMap::new();
        let mut graph = DiGraph::<&str, ()>::new();
        let node_indices: Vec<_> = steps.iter().map(|s| graph.add_node(s.id.as_str())).collect();

        for (i, a) in steps.iter().enumerate() {
            for (j, b) in steps.iter().enumerate().skip(i + 1) {
                if steps_conflict(a, b) {
                    graph.add_edge(node_indices[i], node_indices[j], ());
                    blocking
                        .entry(b.id.clone())
                        .or_default()
                        .push(a.id.clone());
                }
            }
        }

        toposort(&graph, None).map_err(|cycle| {
            let node_id = graph[cycle.node_id()];
            PlanningError::Cycle(node_id.to_string())
        })?;

        // Extract waves: repeatedly take the steps whose blockers are already
        // scheduled, deferring AI steps past the per-wave cap.
        let mut scheduled: HashSet<String> = HashSet::new();
        let mut remaining: Vec<&StepDefinition> = steps.iter().collect();
        let mut waves: Vec<Vec<String>> = Vec::new();

        while !remaining.is_empty() {
            let mut wave: Vec<String> = Vec::new();
            let mut deferred: Vec<&StepDefinition> = Vec::new();
            let mut ai_in_wave = 0usize;

            for step in &remaining {
                let unblocked = blocking
                    .get(&step.id)
                    .is_none_or(|preds| preds.iter().all(|p| scheduled.contains(p)));
                if !unblocked {
                    deferred.push(*step);
                    continue;
                }
                if ai_step_ids.contains(&step.id) {
                    if ai_in_wave >= self.max_ai_per_wave {
                        deferred.push(*step);
                        continue;
                    }
                    ai_in_wave += 1;
                }
                wave.push(step.id.clone());
            }

            if wave.is_empty() {
                // Every remaining step is blocked; the constraints are
                // unsatisfiable.
                return Err(PlanningError::Cycle(deferred[0].id.clone()));
            }

            scheduled.extend(wave.iter().cloned());
            tracing::debug!(wave = waves.len(), steps = wave.len(), ai = ai_in_wave, "planned wave");
            waves.push(wave);
            remaining = deferred;
        }

        Ok(ParallelRoutingPlan { waves, blocking })
    }
}

// ---------------------------------------------------------------------------
// Scope overlap test
// ---------------------------------------------------------------------------

/// Whether two steps may not run concurrently.
///
/// A step with no declared scope conflicts with everything (safety-first
/// default). Otherwise, two steps conflict iff any pair of their declared
/// patterns overlaps.
fn steps_conflict(a: &StepDefinition, b: &StepDefinition) -> bool {
    match (declared_scopes(a), declared_scopes(b)) {
        (Some(scopes_a), Some(scopes_b)) => scopes_a
            .iter()
            .any(|pa| scopes_b.iter().any(|pb| scopes_overlap(pa, pb))),
        _ => true,
    }
}

/// The file patterns a step declares via `with.files`, if any.
fn declared_scopes(step: &StepDefinition) -> Option<Vec<&str>> {
    match step.with.get("files")? {
        serde_json::Value::String(s) => Some(vec![s.as_str()]),
        serde_json::Value::Array(items) => {
            let scopes: Vec<&str> = items.iter().filter_map(|v| v.as_str()).collect();
            if scopes.is_empty() { None } else { Some(scopes) }
        }
        _ => None,
    }
}

/// Conservative overlap test on the literal prefixes of two patterns: the
/// prefix before the first glob metacharacter. Overlap iff one prefix starts
/// with the other.
fn scopes_overlap(a: &str, b: &str) -> bool {
    let pa = literal_prefix(a);
    let pb = literal_prefix(b);
    pa.starts_with(pb) || pb.starts_with(pa)
}

fn literal_prefix(pattern: &str) -> &str {
    match pattern.find(['*', '?', '[', '{']) {
        Some(idx) => &pattern[..idx],
        None => pattern,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
