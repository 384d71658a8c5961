// src/dag/mod.rs

//! Task graph, up-to-date filter and execution planning.
//!
//! - [`graph`] owns the tasks of one job, derives dependencies from
//!   consumed/produced files and computes a stable topological order.
//! - [`filter`] decides whether a single task's outputs are current.
//! - [`plan`] combines both into the ordered list of tasks a worker runs.

pub mod filter;
pub mod graph;
pub mod plan;

pub use filter::{Freshness, freshness, needs_run};
pub use graph::{GraphError, Target, TaskGraph};
pub use plan::{Decision, ExecutionPlan, PlanStep, plan};
