//! Shared domain types for the Tidewave orchestration engine.
//!
//! This crate contains the serializable types exchanged between the engine,
//! its adapters, and the CLI: workflow definitions, routing plans, execution
//! results, gates, artifacts, and run events.
//!
//! Zero infrastructure dependencies -- only serde, serde_json, uuid, and
//! chrono.

pub mod artifact;
pub mod event;
pub mod gate;
pub mod result;
pub mod routing;
pub mod workflow;
