//! BoxAdapter -- object-safe dynamic dispatch wrapper for Adapter.
//!
//! 1. Define an object-safe `AdapterDyn` trait with a boxed future
//! 2. Blanket-impl `AdapterDyn` for all `T: Adapter`
//! 3. `BoxAdapter` wraps `Box<dyn AdapterDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tidewave_types::workflow::StepDefinition;

use super::{Adapter, AdapterError, AdapterKind, AdapterOutput};

/// Object-safe version of [`Adapter`] with a boxed future.
///
/// This trait exists solely to enable dynamic dispatch (`dyn AdapterDyn`).
/// A blanket implementation is provided for all types implementing `Adapter`.
pub trait AdapterDyn: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> AdapterKind;

    fn is_available(&self) -> bool;

    fn estimate_cost(&self, step: &StepDefinition) -> f64;

    fn execute_boxed<'a>(
        &'a self,
        step: &'a StepDefinition,
        context: &'a Value,
        files: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<AdapterOutput, AdapterError>> + Send + 'a>>;
}

/// Blanket implementation: any `Adapter` automatically implements `AdapterDyn`.
impl<T: Adapter> AdapterDyn for T {
    fn id(&self) -> &str {
        Adapter::id(self)
    }

    fn kind(&self) -> AdapterKind {
        Adapter::kind(self)
    }

    fn is_available(&self) -> bool {
        Adapter::is_available(self)
    }

    fn estimate_cost(&self, step: &StepDefinition) -> f64 {
        Adapter::estimate_cost(self, step)
    }

    fn execute_boxed<'a>(
        &'a self,
        step: &'a StepDefinition,
        context: &'a Value,
        files: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<AdapterOutput, AdapterError>> + Send + 'a>> {
        Box::pin(self.execute(step, context, files))
    }
}

/// Type-erased adapter for runtime lookup by actor name.
///
/// Since `Adapter` uses RPITIT, it cannot be used as a trait object directly.
/// `BoxAdapter` provides equivalent methods that delegate to the inner
/// `AdapterDyn` trait object.
pub struct BoxAdapter {
    inner: Box<dyn AdapterDyn + Send + Sync>,
}

impl BoxAdapter {
    /// Wrap a concrete `Adapter` in a type-erased box.
    pub fn new<T: Adapter + 'static>(adapter: T) -> Self {
        Self {
            inner: Box::new(adapter),
        }
    }

    /// Stable adapter identifier.
    pub fn id(&self) -> &str {
        self.inner.id()
    }

    /// Whether this adapter drives an AI backend.
    pub fn kind(&self) -> AdapterKind {
        self.inner.kind()
    }

    /// Whether the adapter can currently take work.
    pub fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    /// Estimated cost of executing the given step.
    pub fn estimate_cost(&self, step: &StepDefinition) -> f64 {
        self.inner.estimate_cost(step)
    }

    /// Execute one step through the wrapped adapter.
    pub async fn execute(
        &self,
        step: &StepDefinition,
        context: &Value,
        files: &[String],
    ) -> Result<AdapterOutput, AdapterError> {
        self.inner.execute_boxed(step, context, files).await
    }
}
