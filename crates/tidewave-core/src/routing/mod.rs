//! Step routing: complexity scoring, adapter selection, wave planning, and
//! budget allocation.
//!
//! The `Router` is the composition root: it scores steps with the
//! `ComplexityAnalyzer`, selects adapters from its policy table, delegates
//! wave construction to the `ParallelPlanner`, and budget division to the
//! `ResourceAllocator`.

pub mod allocator;
pub mod complexity;
pub mod planner;
pub mod router;

pub use allocator::{AllocatorConfig, BudgetLedger, ResourceAllocator};
pub use complexity::ComplexityAnalyzer;
pub use planner::{ParallelPlanner, PlanningError};
pub use router::{Router, RoutingPolicy, RoutingRule};
