//! Adapter registry for runtime lookup by actor name, plus the built-in
//! `echo` adapter.
//!
//! Registration happens at startup; lookup is a map access with an explicit
//! not-found path (the executor converts it into a failure result).

use std::collections::HashMap;

use serde_json::Value;
use tidewave_types::workflow::StepDefinition;

use super::boxed::BoxAdapter;
use super::{Adapter, AdapterError, AdapterKind, AdapterOutput};

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Registry of available adapters, indexed by adapter id.
///
/// The id used for lookup is the adapter's own `id()`, matched against
/// `StepDefinition.actor`.
pub struct AdapterRegistry {
    adapters: HashMap<String, BoxAdapter>,
}

impl AdapterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Create a registry with the built-in adapters registered (`echo`).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(BoxAdapter::new(EchoAdapter));
        registry
    }

    /// Register an adapter under its own id.
    ///
    /// If an adapter with this id already exists, it is replaced.
    pub fn register(&mut self, adapter: BoxAdapter) {
        self.adapters.insert(adapter.id().to_string(), adapter);
    }

    /// Look up an adapter by id.
    pub fn get(&self, id: &str) -> Option<&BoxAdapter> {
        self.adapters.get(id)
    }

    /// The kind of a registered adapter, if present.
    pub fn kind_of(&self, id: &str) -> Option<AdapterKind> {
        self.adapters.get(id).map(|a| a.kind())
    }

    /// List all registered adapter ids.
    pub fn list_ids(&self) -> Vec<&str> {
        self.adapters.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Built-in echo adapter
// ---------------------------------------------------------------------------

/// Deterministic adapter that echoes its resolved parameters.
///
/// Always available, zero cost. Used by the CLI for smoke-testing workflow
/// files and by tests that need a real adapter without side effects.
pub struct EchoAdapter;

impl Adapter for EchoAdapter {
    fn id(&self) -> &str {
        "echo"
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Deterministic
    }

    fn is_available(&self) -> bool {
        true
    }

    fn estimate_cost(&self, _step: &StepDefinition) -> f64 {
        0.0
    }

    async fn execute(
        &self,
        step: &StepDefinition,
        _context: &Value,
        _files: &[String],
    ) -> Result<AdapterOutput, AdapterError> {
        let output = match step.with.get("message").and_then(|v| v.as_str()) {
            Some(message) => message.to_string(),
            None if step.with.is_empty() => step.name.clone(),
            None => serde_json::to_string(&step.with)
                .map_err(|e| AdapterError::Failed(e.to_string()))?,
        };
        Ok(AdapterOutput {
            output,
            ..AdapterOutput::default()
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
