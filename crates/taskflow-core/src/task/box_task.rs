//! BoxTask -- object-safe dynamic dispatch wrapper for Task.
//!
//! 1. Define an object-safe `TaskDyn` trait with boxed futures
//! 2. Blanket-impl `TaskDyn` for all `T: Task`
//! 3. `BoxTask` wraps `Box<dyn TaskDyn>` and delegates

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use taskflow_types::TaskParams;

use super::contract::{Task, TaskResult};
use crate::flow::FlowContext;

/// Object-safe version of [`Task`] with boxed futures.
///
/// This trait exists solely to enable dynamic dispatch (`dyn TaskDyn`).
/// A blanket implementation is provided for all types implementing `Task`.
pub trait TaskDyn: Send + Sync {
    fn name(&self) -> &str;

    fn execute_boxed<'a>(
        &'a self,
        ctx: &'a FlowContext,
        params: &'a mut TaskParams,
    ) -> Pin<Box<dyn Future<Output = TaskResult> + Send + 'a>>;

    fn rollback_boxed<'a>(
        &'a self,
        ctx: &'a FlowContext,
        params: &'a mut TaskParams,
    ) -> Pin<Box<dyn Future<Output = TaskResult> + Send + 'a>>;

    fn need_rollback(&self) -> bool;
}

/// Blanket implementation: any `Task` automatically implements `TaskDyn`.
impl<T: Task> TaskDyn for T {
    fn name(&self) -> &str {
        Task::name(self)
    }

    fn execute_boxed<'a>(
        &'a self,
        ctx: &'a FlowContext,
        params: &'a mut TaskParams,
    ) -> Pin<Box<dyn Future<Output = TaskResult> + Send + 'a>> {
        Box::pin(self.execute(ctx, params))
    }

    fn rollback_boxed<'a>(
        &'a self,
        ctx: &'a FlowContext,
        params: &'a mut TaskParams,
    ) -> Pin<Box<dyn Future<Output = TaskResult> + Send + 'a>> {
        Box::pin(self.rollback(ctx, params))
    }

    fn need_rollback(&self) -> bool {
        Task::need_rollback(self)
    }
}

/// Type-erased task so a flow can hold a heterogeneous task list.
///
/// Since `Task` uses RPITIT, it cannot be used as a trait object directly.
/// `BoxTask` provides equivalent methods that delegate to the inner
/// `TaskDyn` trait object.
pub struct BoxTask {
    inner: Box<dyn TaskDyn + Send + Sync>,
}

impl BoxTask {
    /// Wrap a concrete `Task` in a type-erased box.
    pub fn new<T: Task + 'static>(task: T) -> Self {
        Self {
            inner: Box::new(task),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn execute(&self, ctx: &FlowContext, params: &mut TaskParams) -> TaskResult {
        self.inner.execute_boxed(ctx, params).await
    }

    pub async fn rollback(&self, ctx: &FlowContext, params: &mut TaskParams) -> TaskResult {
        self.inner.rollback_boxed(ctx, params).await
    }

    pub fn need_rollback(&self) -> bool {
        self.inner.need_rollback()
    }
}

impl fmt::Debug for BoxTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxTask").field("name", &self.name()).finish()
    }
}
