//! Workflow file parsing and structural validation.
//!
//! YAML is a JSON superset, so `.json` workflow files parse through the same
//! path. Validation here is structural only (name, step list, unique ids);
//! per-step field checks are the executor's job so that a bad step yields a
//! step-level failure result rather than aborting the whole run.

use std::path::Path;

use tidewave_types::workflow::WorkflowDefinition;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from loading or validating a workflow definition.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("failed to read workflow file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse workflow: {0}")]
    Parse(String),

    #[error("workflow name must not be empty")]
    EmptyName,

    #[error("workflow must declare at least one step")]
    NoSteps,

    #[error("duplicate step id '{0}'")]
    DuplicateStepId(String),
}

// ---------------------------------------------------------------------------
// Parsing and validation
// ---------------------------------------------------------------------------

/// Parse a workflow definition from YAML (or JSON) text.
pub fn parse_workflow_yaml(text: &str) -> Result<WorkflowDefinition, WorkflowError> {
    serde_yaml_ng::from_str(text).map_err(|e| WorkflowError::Parse(e.to_string()))
}

/// Read and parse a workflow file, then validate its structure.
pub fn load_workflow_file(path: &Path) -> Result<WorkflowDefinition, WorkflowError> {
    let text = std::fs::read_to_string(path).map_err(|source| WorkflowError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let definition = parse_workflow_yaml(&text)?;
    validate_definition(&definition)?;
    Ok(definition)
}

/// Structural validation: non-empty name, at least one step, unique step ids.
pub fn validate_definition(definition: &WorkflowDefinition) -> Result<(), WorkflowError> {
    if definition.name.trim().is_empty() {
        return Err(WorkflowError::EmptyName);
    }
    if definition.steps.is_empty() {
        return Err(WorkflowError::NoSteps);
    }
    let mut seen = std::collections::HashSet::new();
    for step in &definition.steps {
        if !seen.insert(step.id.as_str()) {
            return Err(WorkflowError::DuplicateStepId(step.id.clone()));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
