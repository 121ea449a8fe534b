//! Tidewave orchestration engine.
//!
//! Coordinates heterogeneous AI and deterministic tools through declaratively
//! defined workflows:
//!
//! - `adapter` -- the pluggable executor contract, registry, and cost ledger
//! - `routing` -- complexity analysis, adapter selection, wave planning, and
//!   budget allocation
//! - `workflow` -- definition loading/validation, execution context, and
//!   guard expression evaluation
//! - `exec` -- per-step execution with failure isolation, and the top-level
//!   wave-by-wave coordinator
//! - `gate` -- post-execution quality gates
//! - `artifact` -- produced-file tracking, validation, and cleanup
//! - `event` -- broadcast run events for UI/log consumers

pub mod adapter;
pub mod artifact;
pub mod event;
pub mod exec;
pub mod gate;
pub mod routing;
pub mod workflow;

pub use adapter::registry::AdapterRegistry;
pub use artifact::ArtifactManager;
pub use event::EventBus;
pub use exec::coordinator::WorkflowCoordinator;
pub use exec::step::StepExecutor;
pub use gate::GateManager;
pub use routing::router::Router;
