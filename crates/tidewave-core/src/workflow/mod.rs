//! Workflow definition loading, execution context, and guard expressions.

pub mod context;
pub mod definition;
pub mod expression;

pub use context::ExecutionContext;
pub use definition::{WorkflowError, load_workflow_file, parse_workflow_yaml, validate_definition};
pub use expression::{ExpressionError, GuardEvaluator};
