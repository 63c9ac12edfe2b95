//! Sequential task flow engine with compensating rollback.
//!
//! A [`TaskFlow`] runs an ordered list of tasks against shared
//! [`TaskParams`](taskflow_types::TaskParams). When a task fails, the tasks
//! that already committed are rolled back in reverse order. A cloneable
//! [`FlowHandle`] cancels, pauses and observes a run from elsewhere.
//!
//! ```no_run
//! # async fn demo(tasks: Vec<taskflow_core::BoxTask>) {
//! use taskflow_core::{FlowEvent, TaskFlow};
//!
//! let flow = TaskFlow::builder(tasks).build();
//! let handle = flow.handle();
//! let mut events = handle.subscribe();
//! let run = tokio::spawn(flow.run());
//!
//! // Requests are only recorded once the run is active.
//! while let Ok(event) = events.recv().await {
//!     if matches!(event, FlowEvent::TaskCompleted { index: 0, .. }) {
//!         if !handle.cancel() {
//!             println!("flow already finished");
//!         }
//!         break;
//!     }
//! }
//!
//! let report = run.await.unwrap();
//! println!("flow finished as {}", report.state);
//! # }
//! ```

pub mod event;
pub mod flow;
pub mod task;

pub use event::EventBus;
pub use flow::{
    FlowContext, FlowError, FlowHandle, FlowReport, RollbackFailure, TaskFlow, TaskFlowBuilder,
};
pub use task::{BoxTask, Task, TaskDyn};

pub use taskflow_types::{FlowConfig, FlowEvent, FlowProgress, FlowState, PauseRequest, TaskParams};
