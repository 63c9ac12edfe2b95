//! Task trait definition.
//!
//! This is the capability contract every unit of work in a flow implements.
//! Uses RPITIT for `execute` and `rollback`; see `BoxTask` for the
//! type-erased wrapper a flow stores.

use taskflow_types::TaskParams;

use crate::flow::FlowContext;

/// Result of a task's `execute` or `rollback`.
///
/// The error is opaque to the engine: it is recorded as the flow's terminal
/// error (forward failures) or collected as a rollback failure.
pub type TaskResult = anyhow::Result<()>;

/// A unit of forward work with a paired compensating action.
///
/// Uses native async fn in traits (RPITIT). The engine invokes tasks strictly
/// one at a time, so `params` is handed over by `&mut` without a lock. Tasks
/// must not keep the store alive in background work they spawn.
///
/// `execute` is never interrupted by the engine. A task that wants to react
/// to caller cancellation or a deadline can consult `ctx` itself.
pub trait Task: Send + Sync {
    /// Diagnostic identifier used in logs, events and errors.
    fn name(&self) -> &str;

    /// Perform the forward work. May mutate `params`.
    fn execute(
        &self,
        ctx: &FlowContext,
        params: &mut TaskParams,
    ) -> impl std::future::Future<Output = TaskResult> + Send;

    /// Undo the effect of a prior successful `execute`.
    ///
    /// Only called during a rollback pass, and only if this task's `execute`
    /// returned `Ok` and `need_rollback` returns true.
    fn rollback(
        &self,
        ctx: &FlowContext,
        params: &mut TaskParams,
    ) -> impl std::future::Future<Output = TaskResult> + Send;

    /// Whether this task's effect should be compensated. Asked at rollback time.
    fn need_rollback(&self) -> bool;
}
