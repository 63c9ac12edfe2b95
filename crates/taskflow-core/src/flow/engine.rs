//! The flow engine: sequential forward execution with compensating rollback.
//!
//! `run` walks the task list one task at a time. Every step reports a
//! [`Step`]: keep going, stop and roll back (task failure or cancellation),
//! or a genuine fault (a panic caught around `execute`). The engine only
//! interprets its own `Stop`; a `Fault` is compensated and then re-raised
//! with the original payload.
//!
//! Cancellation and pause requests arrive through [`FlowHandle`] and are
//! observed only at task boundaries. While paused, cancellation is observed
//! immediately.

use std::any::Any;
use std::future::{Future, IntoFuture};
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::FutureExt;
use taskflow_types::{FlowEvent, FlowState, PauseRequest, TaskParams};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::builder::TaskFlowBuilder;
use super::context::FlowContext;
use super::error::{panic_message, FlowError};
use super::handle::{FlowHandle, FlowShared};
use super::report::FlowReport;
use super::rollback::{compensate, Compensation, RollbackStack};
use crate::task::BoxTask;

/// Outcome of one step of the forward pass.
enum Step {
    Continue,
    Stop(FlowError),
    Fault(Box<dyn Any + Send>),
}

/// An ordered, immutable list of tasks run against one parameter store.
///
/// Build with [`TaskFlow::builder`], take a [`FlowHandle`] if the run needs
/// to be controlled from elsewhere, then drive it with [`TaskFlow::run`] (or
/// `.await` the flow directly). `run` consumes the flow, so a flow runs at
/// most once.
pub struct TaskFlow {
    tasks: Vec<BoxTask>,
    params: TaskParams,
    ctx: FlowContext,
    preset_error: Option<anyhow::Error>,
    name: Option<String>,
    shared: Arc<FlowShared>,
}

impl TaskFlow {
    pub fn builder(tasks: impl IntoIterator<Item = BoxTask>) -> TaskFlowBuilder {
        TaskFlowBuilder::new(tasks)
    }

    /// A flow with default options.
    pub fn new(tasks: impl IntoIterator<Item = BoxTask>) -> Self {
        Self::builder(tasks).build()
    }

    pub(crate) fn from_parts(
        tasks: Vec<BoxTask>,
        params: TaskParams,
        ctx: FlowContext,
        preset_error: Option<anyhow::Error>,
        name: Option<String>,
        shared: Arc<FlowShared>,
    ) -> Self {
        Self {
            tasks,
            params,
            ctx,
            preset_error,
            name,
            shared,
        }
    }

    pub fn handle(&self) -> FlowHandle {
        FlowHandle::new(Arc::clone(&self.shared))
    }

    pub fn flow_id(&self) -> Uuid {
        self.shared.flow_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(BoxTask::name).collect()
    }

    pub fn params(&self) -> &TaskParams {
        &self.params
    }

    pub fn context(&self) -> &FlowContext {
        &self.ctx
    }

    /// Run every task in order and return once the flow has finished.
    ///
    /// On task failure or cancellation the committed tasks are rolled back
    /// in reverse order before this returns. If a task panics, committed
    /// tasks are rolled back and the panic is then resumed; the handle still
    /// reports `done` and `Failed`. A panic inside `rollback` does not stop
    /// the pass: the remaining tasks are still rolled back, the terminal state
    /// is recorded, and then the first such panic is resumed (a task's own
    /// panic takes precedence).
    pub async fn run(self) -> FlowReport {
        let TaskFlow {
            tasks,
            mut params,
            ctx,
            preset_error,
            name,
            shared,
        } = self;

        let flow_id = shared.flow_id;
        let label = name.as_deref().unwrap_or("taskflow");
        let _done = DoneGuard(Arc::clone(&shared));
        let started_at = Utc::now();
        let clock = Instant::now();

        shared.set_state(FlowState::Running);
        shared.publish(FlowEvent::FlowStarted {
            flow_id,
            total_tasks: tasks.len(),
        });
        info!(flow_id = %flow_id, flow = label, tasks = tasks.len(), "flow started");

        let mut stack = RollbackStack::with_capacity(tasks.len());
        let mut completed_tasks = Vec::with_capacity(tasks.len());

        let outcome = match preset_error {
            Some(error) => {
                warn!(flow_id = %flow_id, error = %error, "flow has a recorded error, skipping all tasks");
                Step::Stop(FlowError::Preset(error))
            }
            None => {
                forward(
                    &shared,
                    &tasks,
                    &ctx,
                    &mut params,
                    &mut stack,
                    &mut completed_tasks,
                )
                .await
            }
        };

        let (state, error, compensation) = match outcome {
            Step::Continue => (FlowState::Completed, None, Compensation::default()),
            Step::Stop(FlowError::Preset(error)) => (
                FlowState::Failed,
                Some(FlowError::Preset(error)),
                Compensation::default(),
            ),
            Step::Stop(cause) => {
                let mut compensation =
                    compensate(flow_id, stack, &tasks, &ctx, &mut params, &shared.events).await;
                let state = if cause.is_cancelled() {
                    FlowState::Cancelled
                } else {
                    FlowState::Failed
                };
                if let Some(payload) = compensation.panic.take() {
                    finish_with_panic(&shared, state, &clock, label);
                    error!(flow_id = %flow_id, flow = label, error = %cause, "rollback panicked, resuming panic after rollback pass");
                    std::panic::resume_unwind(payload);
                }
                (state, Some(cause), compensation)
            }
            Step::Fault(payload) => {
                // The task's own panic wins over any panic raised while compensating.
                compensate(flow_id, stack, &tasks, &ctx, &mut params, &shared.events).await;
                finish_with_panic(&shared, FlowState::Failed, &clock, label);
                error!(flow_id = %flow_id, flow = label, "task panicked, resuming panic after rollback");
                std::panic::resume_unwind(payload);
            }
        };

        let duration_ms = clock.elapsed().as_millis() as u64;
        shared.set_state(state);
        shared.publish(FlowEvent::FlowFinished {
            flow_id,
            state,
            duration_ms,
        });
        match &error {
            None => info!(flow_id = %flow_id, flow = label, duration_ms, "flow completed"),
            Some(err) => info!(
                flow_id = %flow_id,
                flow = label,
                state = %state,
                duration_ms,
                error = %err,
                rollback_failures = compensation.failures.len(),
                "flow finished"
            ),
        }

        FlowReport {
            flow_id,
            state,
            error,
            params,
            completed_tasks,
            rolled_back: compensation.rolled_back,
            rollback_failures: compensation.failures,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

impl IntoFuture for TaskFlow {
    type Output = FlowReport;
    type IntoFuture = Pin<Box<dyn Future<Output = FlowReport> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.run())
    }
}

impl std::fmt::Debug for TaskFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskFlow")
            .field("flow_id", &self.shared.flow_id)
            .field("name", &self.name)
            .field("tasks", &self.tasks)
            .field("state", &self.shared.state())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Forward pass
// ---------------------------------------------------------------------------

async fn forward(
    shared: &FlowShared,
    tasks: &[BoxTask],
    ctx: &FlowContext,
    params: &mut TaskParams,
    stack: &mut RollbackStack,
    completed_tasks: &mut Vec<String>,
) -> Step {
    let mut pause_rx = shared.pause.subscribe();

    for (index, task) in tasks.iter().enumerate() {
        match execute_task(shared, index, task, ctx, params, stack).await {
            Step::Continue => completed_tasks.push(task.name().to_string()),
            other => return other,
        }

        let remaining = index + 1 < tasks.len();
        match boundary(shared, &mut pause_rx, remaining).await {
            Step::Continue => {}
            other => return other,
        }
    }

    Step::Continue
}

async fn execute_task(
    shared: &FlowShared,
    index: usize,
    task: &BoxTask,
    ctx: &FlowContext,
    params: &mut TaskParams,
    stack: &mut RollbackStack,
) -> Step {
    let flow_id = shared.flow_id;
    let name = task.name();

    stack.register(index);
    shared.task_started(name);
    shared.publish(FlowEvent::TaskStarted {
        flow_id,
        index,
        task: name.to_string(),
    });
    debug!(flow_id = %flow_id, task = name, index, "executing task");

    let clock = Instant::now();
    let result = AssertUnwindSafe(task.execute(ctx, params))
        .catch_unwind()
        .await;
    let duration_ms = clock.elapsed().as_millis() as u64;

    match result {
        Ok(Ok(())) => {
            stack.commit(index);
            shared.task_finished(true);
            shared.publish(FlowEvent::TaskCompleted {
                flow_id,
                index,
                task: name.to_string(),
                duration_ms,
            });
            debug!(flow_id = %flow_id, task = name, index, duration_ms, "task completed");
            Step::Continue
        }
        Ok(Err(source)) => {
            shared.task_finished(false);
            shared.publish(FlowEvent::TaskFailed {
                flow_id,
                index,
                task: name.to_string(),
                error: format!("{source:#}"),
            });
            warn!(flow_id = %flow_id, task = name, index, error = %source, "task failed");
            Step::Stop(FlowError::TaskFailed {
                task: name.to_string(),
                source,
            })
        }
        Err(payload) => {
            shared.task_finished(false);
            let message = panic_message(payload.as_ref());
            shared.publish(FlowEvent::TaskFailed {
                flow_id,
                index,
                task: name.to_string(),
                error: message.clone(),
            });
            error!(flow_id = %flow_id, task = name, index, panic = %message, "task panicked");
            Step::Fault(payload)
        }
    }
}

/// Observe cancellation, then a pending pause if tasks remain.
async fn boundary(
    shared: &FlowShared,
    pause_rx: &mut watch::Receiver<Option<PauseRequest>>,
    remaining: bool,
) -> Step {
    if shared.cancel.is_cancelled() {
        info!(flow_id = %shared.flow_id, "cancellation observed at task boundary");
        return Step::Stop(FlowError::Cancelled);
    }
    if !remaining {
        return Step::Continue;
    }

    match shared.take_pause() {
        Some(request) => hold(shared, pause_rx, request).await,
        None => Step::Continue,
    }
}

/// Stay paused until the resume instant, a `resume` request or cancellation.
async fn hold(
    shared: &FlowShared,
    pause_rx: &mut watch::Receiver<Option<PauseRequest>>,
    request: PauseRequest,
) -> Step {
    let flow_id = shared.flow_id;
    let Some(mut resume_at) = request.resume_at(Utc::now()) else {
        return Step::Continue;
    };

    shared.set_state(FlowState::Paused);
    shared.publish(FlowEvent::FlowPaused { flow_id, resume_at });
    info!(flow_id = %flow_id, resume_at = %resume_at, "flow paused");

    let step = loop {
        pause_rx.borrow_and_update();

        if let Some(next) = shared.take_pause() {
            match next.resume_at(Utc::now()) {
                Some(at) => {
                    resume_at = at;
                    shared.publish(FlowEvent::FlowPaused { flow_id, resume_at });
                    debug!(flow_id = %flow_id, resume_at = %resume_at, "pause rescheduled");
                    continue;
                }
                None => break Step::Continue,
            }
        }

        let wait = (resume_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => {
                info!(flow_id = %flow_id, "cancellation observed while paused");
                break Step::Stop(FlowError::Cancelled);
            }
            _ = tokio::time::sleep(wait) => break Step::Continue,
            changed = pause_rx.changed() => {
                // Mailbox closed; nobody can send another request.
                if changed.is_err() {
                    break Step::Continue;
                }
            }
        }
    };

    if matches!(step, Step::Continue) {
        shared.set_state(FlowState::Running);
        shared.publish(FlowEvent::FlowResumed { flow_id });
        info!(flow_id = %flow_id, "flow resumed");
    }
    step
}

/// Record the terminal state before a panic is resumed out of `run`.
fn finish_with_panic(shared: &FlowShared, state: FlowState, clock: &Instant, label: &str) {
    shared.set_state(state);
    shared.publish(FlowEvent::FlowFinished {
        flow_id: shared.flow_id,
        state,
        duration_ms: clock.elapsed().as_millis() as u64,
    });
    debug!(flow_id = %shared.flow_id, flow = label, state = %state, "flow finished by panic");
}

/// Sets the done flag when `run` returns, unwinds or is dropped.
struct DoneGuard(Arc<FlowShared>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        if self.0.state().is_active() {
            warn!(flow_id = %self.0.flow_id, "flow dropped before finishing");
            self.0.set_state(FlowState::Failed);
        }
        self.0.mark_done();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::broadcast;

    use super::*;
    use crate::flow::test_support::{CallLog, Gate, MockTask};

    fn init_tracing() {
        taskflow_observe::init_test_tracing();
    }

    async fn next_matching(
        rx: &mut broadcast::Receiver<FlowEvent>,
        pred: impl Fn(&FlowEvent) -> bool,
    ) -> FlowEvent {
        loop {
            let event = rx.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    }

    fn drain(rx: &mut broadcast::Receiver<FlowEvent>) -> Vec<FlowEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn all_tasks_succeed_without_rollback() {
        init_tracing();
        let log = CallLog::default();
        let flow = TaskFlow::new(vec![
            MockTask::new("a", &log).boxed(),
            MockTask::new("b", &log).boxed(),
            MockTask::new("c", &log).boxed(),
        ]);
        let handle = flow.handle();

        let report = flow.run().await;

        assert_eq!(report.state, FlowState::Completed);
        assert!(report.error.is_none());
        assert!(handle.done());
        assert_eq!(handle.state(), FlowState::Completed);
        assert_eq!(log.executions(), vec!["a", "b", "c"]);
        assert!(log.rollbacks().is_empty());
        assert_eq!(report.completed_tasks, vec!["a", "b", "c"]);
        assert_eq!(report.params.len(), 3);
        assert_eq!(handle.progress().completed, 3);
    }

    #[tokio::test]
    async fn empty_flow_completes() {
        let report = TaskFlow::new(Vec::new()).run().await;
        assert!(report.is_completed());
        assert!(report.into_result().unwrap().is_empty());
    }

    #[tokio::test]
    async fn first_task_failure_rolls_back_nothing() {
        let log = CallLog::default();
        let report = TaskFlow::new(vec![
            MockTask::new("a", &log).failing("boom").boxed(),
            MockTask::new("b", &log).boxed(),
            MockTask::new("c", &log).boxed(),
        ])
        .run()
        .await;

        assert_eq!(report.state, FlowState::Failed);
        let error = report.error.as_ref().unwrap();
        assert_eq!(error.task(), Some("a"));
        assert!(error.to_string().contains("boom"));
        assert_eq!(log.executions(), vec!["a"]);
        assert!(log.rollbacks().is_empty());
    }

    #[tokio::test]
    async fn later_failure_rolls_back_eligible_tasks_in_reverse() {
        init_tracing();
        let log = CallLog::default();
        let report = TaskFlow::new(vec![
            MockTask::new("a", &log).boxed(),
            MockTask::new("b", &log).without_rollback().boxed(),
            MockTask::new("c", &log).boxed(),
            MockTask::new("d", &log).failing("payment declined").boxed(),
            MockTask::new("e", &log).boxed(),
        ])
        .run()
        .await;

        assert_eq!(report.state, FlowState::Failed);
        assert_eq!(report.error.as_ref().unwrap().task(), Some("d"));
        assert_eq!(log.executions(), vec!["a", "b", "c", "d"]);
        assert_eq!(log.rollbacks(), vec!["c", "a"]);
        assert_eq!(report.rolled_back, vec!["c", "a"]);
        assert_eq!(report.completed_tasks, vec!["a", "b", "c"]);
        // b opted out of rollback, so its mark stays.
        assert!(report.params.contains_key("b"));
        assert!(!report.params.contains_key("a"));
    }

    #[tokio::test]
    async fn rollback_failure_keeps_primary_error() {
        let log = CallLog::default();
        let report = TaskFlow::new(vec![
            MockTask::new("a", &log).failing_rollback("cannot release").boxed(),
            MockTask::new("b", &log).boxed(),
            MockTask::new("c", &log).failing("out of stock").boxed(),
        ])
        .run()
        .await;

        assert_eq!(report.state, FlowState::Failed);
        let error = report.error.as_ref().unwrap();
        assert_eq!(error.task(), Some("c"));
        assert!(error.to_string().contains("out of stock"));
        assert_eq!(log.rollbacks(), vec!["b", "a"]);
        assert_eq!(report.rolled_back, vec!["b"]);
        assert_eq!(report.rollback_failures.len(), 1);
        assert_eq!(report.rollback_failures[0].task, "a");
    }

    #[tokio::test]
    async fn cancel_between_tasks_rolls_back_committed_tasks() {
        init_tracing();
        let log = CallLog::default();
        let gate = Gate::default();
        let flow = TaskFlow::new(vec![
            MockTask::new("a", &log).boxed(),
            MockTask::new("b", &log).gated(&gate).boxed(),
            MockTask::new("c", &log).boxed(),
        ]);
        let handle = flow.handle();
        let run = tokio::spawn(flow.run());

        gate.entered().await;
        assert!(handle.cancel());
        gate.open();

        let report = run.await.unwrap();
        assert_eq!(report.state, FlowState::Cancelled);
        assert!(report.error.as_ref().unwrap().is_cancelled());
        assert_eq!(log.executions(), vec!["a", "b"]);
        assert_eq!(log.rollbacks(), vec!["b", "a"]);
        assert!(handle.done());
    }

    #[tokio::test]
    async fn cancel_after_last_task_still_rolls_back() {
        let log = CallLog::default();
        let gate = Gate::default();
        let flow = TaskFlow::new(vec![
            MockTask::new("a", &log).boxed(),
            MockTask::new("b", &log).gated(&gate).boxed(),
        ]);
        let handle = flow.handle();
        let run = tokio::spawn(flow.run());

        gate.entered().await;
        handle.cancel();
        gate.open();

        let report = run.await.unwrap();
        assert_eq!(report.state, FlowState::Cancelled);
        assert_eq!(log.rollbacks(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn cancel_before_run_and_after_completion_is_ignored() {
        let log = CallLog::default();
        let flow = TaskFlow::new(vec![MockTask::new("a", &log).boxed()]);
        let handle = flow.handle();

        assert!(!handle.cancel());
        assert!(!handle.pause(Duration::from_secs(5)));

        let report = flow.run().await;
        assert_eq!(report.state, FlowState::Completed);

        assert!(!handle.cancel());
        assert!(!handle.resume());
        assert_eq!(handle.state(), FlowState::Completed);
        assert!(log.rollbacks().is_empty());
    }

    #[tokio::test]
    async fn done_is_false_until_run_returns() {
        let log = CallLog::default();
        let gate = Gate::default();
        let flow = TaskFlow::new(vec![MockTask::new("a", &log).gated(&gate).boxed()]);
        let handle = flow.handle();
        assert!(!handle.done());

        let run = tokio::spawn(flow.run());
        gate.entered().await;
        assert!(!handle.done());
        assert_eq!(handle.state(), FlowState::Running);
        assert_eq!(handle.progress().current_task.as_deref(), Some("a"));

        gate.open();
        assert_eq!(handle.wait().await, FlowState::Completed);
        run.await.unwrap();
        assert!(handle.done());
    }

    #[tokio::test]
    async fn pause_delays_next_task() {
        let log = CallLog::default();
        let gate = Gate::default();
        let flow = TaskFlow::new(vec![
            MockTask::new("a", &log).gated(&gate).boxed(),
            MockTask::new("b", &log).boxed(),
        ]);
        let handle = flow.handle();
        let mut events = handle.subscribe();
        let run = tokio::spawn(flow.run());

        gate.entered().await;
        assert!(handle.pause(Duration::from_millis(150)));
        let opened = Instant::now();
        gate.open();

        let report = run.await.unwrap();
        assert!(opened.elapsed() >= Duration::from_millis(150));
        assert!(report.is_completed());
        assert_eq!(log.executions(), vec!["a", "b"]);

        let events = drain(&mut events);
        assert!(events.iter().any(|e| matches!(e, FlowEvent::FlowPaused { .. })));
        assert!(events.iter().any(|e| matches!(e, FlowEvent::FlowResumed { .. })));
    }

    #[tokio::test]
    async fn pause_after_last_task_is_not_applied() {
        let log = CallLog::default();
        let gate = Gate::default();
        let flow = TaskFlow::new(vec![MockTask::new("a", &log).gated(&gate).boxed()]);
        let handle = flow.handle();
        let run = tokio::spawn(flow.run());

        gate.entered().await;
        handle.pause(Duration::from_secs(3600));
        gate.open();

        let report = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap();
        assert!(report.is_completed());
    }

    #[tokio::test]
    async fn cancel_while_paused_does_not_wait_out_the_pause() {
        let log = CallLog::default();
        let gate = Gate::default();
        let flow = TaskFlow::new(vec![
            MockTask::new("a", &log).gated(&gate).boxed(),
            MockTask::new("b", &log).boxed(),
        ]);
        let handle = flow.handle();
        let mut events = handle.subscribe();
        let run = tokio::spawn(flow.run());

        gate.entered().await;
        handle.pause(Duration::from_secs(3600));
        gate.open();

        next_matching(&mut events, |e| matches!(e, FlowEvent::FlowPaused { .. })).await;
        assert_eq!(handle.state(), FlowState::Paused);
        assert!(handle.cancel());

        let report = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.state, FlowState::Cancelled);
        assert_eq!(log.executions(), vec!["a"]);
        assert_eq!(log.rollbacks(), vec!["a"]);
    }

    #[tokio::test]
    async fn resume_ends_pause_early() {
        let log = CallLog::default();
        let gate = Gate::default();
        let flow = TaskFlow::new(vec![
            MockTask::new("a", &log).gated(&gate).boxed(),
            MockTask::new("b", &log).boxed(),
        ]);
        let handle = flow.handle();
        let mut events = handle.subscribe();
        let run = tokio::spawn(flow.run());

        gate.entered().await;
        handle.pause_until(Utc::now() + chrono::Duration::hours(1));
        gate.open();

        next_matching(&mut events, |e| matches!(e, FlowEvent::FlowPaused { .. })).await;
        assert!(handle.resume());

        let report = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap();
        assert!(report.is_completed());
        assert_eq!(log.executions(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn later_pause_request_supersedes_active_pause() {
        let log = CallLog::default();
        let gate = Gate::default();
        let flow = TaskFlow::new(vec![
            MockTask::new("a", &log).gated(&gate).boxed(),
            MockTask::new("b", &log).boxed(),
        ]);
        let handle = flow.handle();
        let mut events = handle.subscribe();
        let run = tokio::spawn(flow.run());

        gate.entered().await;
        handle.pause(Duration::from_secs(3600));
        gate.open();

        next_matching(&mut events, |e| matches!(e, FlowEvent::FlowPaused { .. })).await;
        assert!(handle.pause(Duration::from_millis(20)));

        let report = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap();
        assert!(report.is_completed());
    }

    #[tokio::test]
    async fn pause_until_past_instant_resumes_immediately() {
        let log = CallLog::default();
        let gate = Gate::default();
        let flow = TaskFlow::new(vec![
            MockTask::new("a", &log).gated(&gate).boxed(),
            MockTask::new("b", &log).boxed(),
        ]);
        let handle = flow.handle();
        let run = tokio::spawn(flow.run());

        gate.entered().await;
        handle.pause_until(Utc::now() - chrono::Duration::seconds(10));
        gate.open();

        let report = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap();
        assert!(report.is_completed());
    }

    #[tokio::test]
    async fn panic_rolls_back_then_propagates() {
        init_tracing();
        let log = CallLog::default();
        let flow = TaskFlow::new(vec![
            MockTask::new("a", &log).boxed(),
            MockTask::new("b", &log).panicking().boxed(),
            MockTask::new("c", &log).boxed(),
        ]);
        let handle = flow.handle();

        let err = tokio::spawn(flow.run()).await.unwrap_err();

        assert!(err.is_panic());
        assert_eq!(log.executions(), vec!["a", "b"]);
        assert_eq!(log.rollbacks(), vec!["a"]);
        assert!(handle.done());
        assert_eq!(handle.state(), FlowState::Failed);

        let payload = err.into_panic();
        assert!(panic_message(payload.as_ref()).contains("task b blew up"));
    }

    #[tokio::test]
    async fn rollback_panic_still_compensates_earlier_tasks() {
        let log = CallLog::default();
        let flow = TaskFlow::new(vec![
            MockTask::new("a", &log).boxed(),
            MockTask::new("b", &log).panicking_rollback().boxed(),
            MockTask::new("c", &log).failing("boom").boxed(),
        ]);
        let handle = flow.handle();

        let err = tokio::spawn(flow.run()).await.unwrap_err();

        assert!(err.is_panic());
        assert_eq!(log.rollbacks(), vec!["b", "a"]);
        assert_eq!(handle.state(), FlowState::Failed);
        assert!(handle.done());
        let payload = err.into_panic();
        assert_eq!(panic_message(payload.as_ref()), "rollback of b blew up");
    }

    #[tokio::test]
    async fn rollback_panic_on_cancelled_run_keeps_cancelled_state() {
        let log = CallLog::default();
        let gate = Gate::default();
        let flow = TaskFlow::new(vec![
            MockTask::new("a", &log).panicking_rollback().boxed(),
            MockTask::new("b", &log).gated(&gate).boxed(),
            MockTask::new("c", &log).boxed(),
        ]);
        let handle = flow.handle();
        let run = tokio::spawn(flow.run());

        gate.entered().await;
        assert!(handle.cancel());
        gate.open();

        assert!(run.await.unwrap_err().is_panic());
        assert_eq!(log.rollbacks(), vec!["b", "a"]);
        assert_eq!(handle.state(), FlowState::Cancelled);
        assert!(handle.done());
    }

    #[tokio::test]
    async fn task_panic_wins_over_rollback_panic() {
        let log = CallLog::default();
        let flow = TaskFlow::new(vec![
            MockTask::new("a", &log).panicking_rollback().boxed(),
            MockTask::new("z", &log).boxed(),
            MockTask::new("b", &log).panicking().boxed(),
        ]);
        let handle = flow.handle();

        let err = tokio::spawn(flow.run()).await.unwrap_err();

        assert_eq!(log.rollbacks(), vec!["z", "a"]);
        assert_eq!(handle.state(), FlowState::Failed);
        let payload = err.into_panic();
        assert_eq!(panic_message(payload.as_ref()), "task b blew up");
    }

    #[tokio::test]
    async fn preset_error_fails_without_running_tasks() {
        let log = CallLog::default();
        let report = TaskFlow::builder(vec![MockTask::new("a", &log).boxed()])
            .error(anyhow::anyhow!("quota exhausted"))
            .build()
            .run()
            .await;

        assert_eq!(report.state, FlowState::Failed);
        assert!(matches!(report.error, Some(FlowError::Preset(_))));
        assert!(log.entries().is_empty());
    }

    #[tokio::test]
    async fn events_follow_lifecycle_order() {
        let log = CallLog::default();
        let flow = TaskFlow::new(vec![
            MockTask::new("a", &log).boxed(),
            MockTask::new("b", &log).failing("nope").boxed(),
        ]);
        let flow_id = flow.flow_id();
        let mut rx = flow.handle().subscribe();

        flow.run().await;
        let events = drain(&mut rx);

        assert!(events.iter().all(|e| e.flow_id() == flow_id));
        let kinds: Vec<&str> = events
            .iter()
            .map(|e| match e {
                FlowEvent::FlowStarted { .. } => "flow_started",
                FlowEvent::TaskStarted { .. } => "task_started",
                FlowEvent::TaskCompleted { .. } => "task_completed",
                FlowEvent::TaskFailed { .. } => "task_failed",
                FlowEvent::RollbackStarted { .. } => "rollback_started",
                FlowEvent::TaskRolledBack { .. } => "task_rolled_back",
                FlowEvent::FlowFinished { .. } => "flow_finished",
                _ => "other",
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "flow_started",
                "task_started",
                "task_completed",
                "task_started",
                "task_failed",
                "rollback_started",
                "task_rolled_back",
                "flow_finished",
            ]
        );
        assert!(matches!(
            events.last(),
            Some(FlowEvent::FlowFinished { state: FlowState::Failed, .. })
        ));
    }

    #[tokio::test]
    async fn flow_can_be_awaited_directly() {
        let log = CallLog::default();
        let report = TaskFlow::new(vec![MockTask::new("a", &log).boxed()]).await;
        assert!(report.is_completed());
    }

    #[tokio::test]
    async fn dropping_the_run_marks_flow_failed_and_done() {
        let log = CallLog::default();
        let gate = Gate::default();
        let flow = TaskFlow::new(vec![MockTask::new("a", &log).gated(&gate).boxed()]);
        let handle = flow.handle();
        let run = tokio::spawn(flow.run());

        gate.entered().await;
        run.abort();
        assert!(run.await.unwrap_err().is_cancelled());

        assert_eq!(handle.wait().await, FlowState::Failed);
        assert!(handle.done());
    }

    #[tokio::test]
    async fn tasks_see_bound_context() {
        struct Probe;

        impl crate::task::Task for Probe {
            fn name(&self) -> &str {
                "probe"
            }

            async fn execute(
                &self,
                ctx: &FlowContext,
                params: &mut TaskParams,
            ) -> crate::task::TaskResult {
                params.insert("flow_id", ctx.flow_id().to_string());
                params.set("tenant", &ctx.value("tenant"))?;
                Ok(())
            }

            async fn rollback(
                &self,
                _ctx: &FlowContext,
                _params: &mut TaskParams,
            ) -> crate::task::TaskResult {
                Ok(())
            }

            fn need_rollback(&self) -> bool {
                false
            }
        }

        let flow = TaskFlow::builder(Vec::new())
            .task(Probe)
            .context(FlowContext::background().with_value("tenant", "acme"))
            .build();
        let flow_id = flow.flow_id();

        let params = flow.run().await.into_result().unwrap();
        assert_eq!(
            params.get_as::<String>("flow_id").unwrap(),
            Some(flow_id.to_string())
        );
        assert_eq!(
            params.get_as::<String>("tenant").unwrap().as_deref(),
            Some("acme")
        );
    }
}
