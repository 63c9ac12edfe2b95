//! The task contract consumed by the flow engine.
//!
//! - `contract` -- the `Task` trait concrete work items implement
//! - `box_task` -- object-safe `TaskDyn` and the type-erased `BoxTask`

pub mod box_task;
pub mod contract;

pub use box_task::{BoxTask, TaskDyn};
pub use contract::{Task, TaskResult};
