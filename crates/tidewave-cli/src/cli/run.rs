//! `tidewave run` and `tidewave validate` handlers.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use tidewave_core::adapter::cost::InMemoryCostTracker;
use tidewave_core::exec::step::ExecutorConfig;
use tidewave_core::routing::allocator::{BudgetLedger, ResourceAllocator};
use tidewave_core::workflow::definition::load_workflow_file;
use tidewave_core::{EventBus, Router, StepExecutor, WorkflowCoordinator};
use tidewave_types::event::RunEvent;
use tidewave_types::gate::GateSpec;
use tidewave_types::result::{StepExecutionResult, WorkflowResult};
use tidewave_types::workflow::WorkflowDefinition;

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

pub async fn handle_run(
    file: &Path,
    files: &[String],
    gates_file: Option<&Path>,
    dry_run: bool,
    budget: Option<f64>,
    json: bool,
) -> Result<i32> {
    let definition = load_workflow_file(file)
        .with_context(|| format!("failed to load workflow '{}'", file.display()))?;

    let gates = match gates_file {
        Some(path) => load_gates_file(path)?,
        None => Vec::new(),
    };

    tracing::info!(
        workflow = %definition.name,
        steps = definition.steps.len(),
        gates = gates.len(),
        dry_run,
        "starting workflow run"
    );

    let registry = Arc::new(tidewave_core::AdapterRegistry::with_builtins());
    let router = Arc::new(Router::new(Arc::clone(&registry)));
    let executor = Arc::new(
        StepExecutor::new(registry, Arc::new(InMemoryCostTracker::new())).with_config(
            ExecutorConfig {
                dry_run,
                ..ExecutorConfig::default()
            },
        ),
    );

    let events = EventBus::default();
    let mut coordinator =
        WorkflowCoordinator::new(router, executor).with_event_bus(events.clone());

    if let Some(ledger) = budget_ledger(&definition, budget, dry_run) {
        coordinator = coordinator.with_budget_ledger(ledger);
    }

    // Progress lines from the event stream while the run is in flight.
    let progress = if json {
        None
    } else {
        let mut rx = events.subscribe();
        Some(tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                match event {
                    RunEvent::StepStarted {
                        step_id,
                        adapter_id,
                        ..
                    } => {
                        println!(
                            "  {} {} ({})",
                            style("->").dim(),
                            step_id,
                            style(adapter_id).dim()
                        );
                    }
                    RunEvent::StepFailed { step_id, error, .. } => {
                        println!("  {} {} {}", style("!!").red(), step_id, style(error).red());
                    }
                    RunEvent::RunCompleted { .. } => break,
                    _ => {}
                }
            }
        }))
    };

    let result = coordinator.run(&definition, &gates, files).await;

    if let Some(task) = progress {
        let _ = task.await;
    }

    tracing::info!(
        run_id = %result.run_id,
        success = result.success,
        total_cost = result.total_cost,
        "workflow run finished"
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_run_summary(&result, dry_run);
    }

    Ok(if result.success { 0 } else { 1 })
}

/// Seed a budget ledger for live runs. Dry runs simulate execution at zero
/// cost, so no ledger is built for them; reserving real estimates would push
/// simulated steps into pending.
fn budget_ledger(
    definition: &WorkflowDefinition,
    budget: Option<f64>,
    dry_run: bool,
) -> Option<Arc<BudgetLedger>> {
    if dry_run {
        return None;
    }
    let amount = budget?;
    let plan = ResourceAllocator::new().create_allocation_plan(&[definition], amount);
    Some(Arc::new(BudgetLedger::from_plan(&plan)))
}

fn load_gates_file(path: &Path) -> Result<Vec<GateSpec>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read gates file '{}'", path.display()))?;
    serde_yaml_ng::from_str(&text)
        .with_context(|| format!("failed to parse gates file '{}'", path.display()))
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

pub fn handle_validate(file: &Path, json: bool) -> Result<i32> {
    match load_workflow_file(file) {
        Ok(definition) => {
            if json {
                let out = serde_json::json!({
                    "valid": true,
                    "name": definition.name,
                    "steps": definition.steps.len(),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!();
                println!(
                    "  {} Workflow '{}' is valid ({} steps)",
                    style("*").green().bold(),
                    style(&definition.name).cyan(),
                    definition.steps.len()
                );
                println!();
            }
            Ok(0)
        }
        Err(e) => {
            if json {
                let out = serde_json::json!({ "valid": false, "error": e.to_string() });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!();
                println!("  {} {}", style("!!").red().bold(), style(&e).red());
                println!();
            }
            Ok(1)
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn print_run_summary(result: &WorkflowResult, dry_run: bool) {
    println!();
    if result.success {
        println!(
            "  {} Workflow '{}' completed{}",
            style("*").green().bold(),
            style(&result.workflow_name).cyan(),
            if dry_run { " (dry run)" } else { "" }
        );
    } else {
        println!(
            "  {} Workflow '{}' failed",
            style("!!").red().bold(),
            style(&result.workflow_name).cyan()
        );
    }
    println!("  Run ID: {}", result.run_id);
    println!(
        "  Steps: {} executed, {} succeeded, {} failed",
        result.steps_executed, result.steps_succeeded, result.steps_failed
    );
    println!(
        "  Cost: {:.2}  Duration: {} ms",
        result.total_cost, result.total_duration_ms
    );

    if !result.step_results.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Step").fg(Color::Cyan),
                Cell::new("Status"),
                Cell::new("Cost"),
                Cell::new("Duration"),
                Cell::new("Detail"),
            ]);

        for step in &result.step_results {
            let detail = step
                .error
                .as_deref()
                .or_else(|| step.metadata.get("skip_reason").and_then(|v| v.as_str()))
                .unwrap_or("-");
            table.add_row(vec![
                Cell::new(&step.step_id),
                step_status_cell(step),
                Cell::new(format!("{:.2}", step.cost)),
                Cell::new(format!("{} ms", step.duration_ms)),
                Cell::new(detail.chars().take(60).collect::<String>()),
            ]);
        }

        println!();
        println!("{table}");
    }

    if !result.gate_results.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Gate").fg(Color::Cyan),
                Cell::new("Status"),
                Cell::new("Message"),
            ]);

        for gate in &result.gate_results {
            let status = if gate.success {
                Cell::new("pass").fg(Color::Green)
            } else {
                Cell::new("fail").fg(Color::Red)
            };
            table.add_row(vec![
                Cell::new(&gate.gate_id),
                status,
                Cell::new(gate.message.chars().take(60).collect::<String>()),
            ]);
        }

        println!();
        println!("{table}");
    }

    if let Some(error) = &result.error {
        println!();
        println!("  {} {}", style("Error:").red().bold(), style(error).red());
    }
    println!();
}

fn step_status_cell(step: &StepExecutionResult) -> Cell {
    if step.is_skipped() {
        let pending = step
            .metadata
            .get("pending")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if pending {
            Cell::new("pending").fg(Color::Yellow)
        } else {
            Cell::new("skipped").fg(Color::DarkYellow)
        }
    } else if step.success {
        Cell::new("ok").fg(Color::Green)
    } else {
        Cell::new("failed").fg(Color::Red)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
