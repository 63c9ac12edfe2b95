//! Flow execution: context, engine, rollback and the control handle.
//!
//! - `context` -- read-only `FlowContext` passed to every task
//! - `builder` -- `TaskFlowBuilder`, the construction surface
//! - `engine` -- `TaskFlow::run`, forward pass and pause handling
//! - `rollback` -- LIFO compensation stack and rollback pass
//! - `handle` -- `FlowHandle` for cancel/pause/observe from other tasks
//! - `report` -- `FlowReport` returned by a run

pub mod builder;
pub mod context;
pub mod engine;
pub mod error;
pub mod handle;
pub mod report;
mod rollback;

#[cfg(test)]
mod test_support;

pub use builder::TaskFlowBuilder;
pub use context::FlowContext;
pub use engine::TaskFlow;
pub use error::{FlowError, RollbackFailure};
pub use handle::FlowHandle;
pub use report::FlowReport;
