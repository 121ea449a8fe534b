//! Step execution and the top-level workflow coordinator.

pub mod coordinator;
pub mod step;

pub use coordinator::WorkflowCoordinator;
pub use step::{ExecutorConfig, StepExecutor};
