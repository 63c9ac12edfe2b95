//! Compensating rollback: the LIFO stack of executed tasks and the pass that
//! walks it.
//!
//! An entry is pushed *before* its task's `execute` runs and only marked
//! committed once `execute` returns `Ok`. The pass skips uncommitted entries,
//! so a task that failed (or panicked) is never asked to undo itself, while
//! every task before it is.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use taskflow_types::{FlowEvent, TaskParams};
use uuid::Uuid;

use super::context::FlowContext;
use super::error::{panic_message, RollbackFailure};
use crate::event::EventBus;
use crate::task::BoxTask;

// ---------------------------------------------------------------------------
// RollbackStack
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RollbackEntry {
    index: usize,
    committed: bool,
}

/// Ordered record of the tasks a run has touched.
#[derive(Debug, Default)]
pub(crate) struct RollbackStack {
    entries: Vec<RollbackEntry>,
}

impl RollbackStack {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Register task `index` as a pending compensator, before it executes.
    pub(crate) fn register(&mut self, index: usize) {
        self.entries.push(RollbackEntry {
            index,
            committed: false,
        });
    }

    /// Mark the most recently registered task as committed.
    pub(crate) fn commit(&mut self, index: usize) {
        if let Some(entry) = self.entries.last_mut() {
            debug_assert_eq!(entry.index, index, "commit out of order");
            entry.committed = true;
        }
    }

    /// Indices of committed tasks in execution order.
    #[cfg(test)]
    pub(crate) fn committed(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().filter(|e| e.committed).map(|e| e.index)
    }

    /// Consume the stack, yielding committed indices most recent first.
    pub(crate) fn unwind(self) -> impl Iterator<Item = usize> {
        self.entries
            .into_iter()
            .rev()
            .filter(|e| e.committed)
            .map(|e| e.index)
    }
}

// ---------------------------------------------------------------------------
// Compensation pass
// ---------------------------------------------------------------------------

/// What the rollback pass did.
#[derive(Debug, Default)]
pub(crate) struct Compensation {
    pub(crate) rolled_back: Vec<String>,
    pub(crate) failures: Vec<RollbackFailure>,
    /// Payload of the first `rollback` or `need_rollback` panic, if any. The
    /// pass keeps going; the caller decides which panic to resume.
    pub(crate) panic: Option<Box<dyn Any + Send>>,
}

/// Walk `stack` in LIFO order and roll back every committed task that asks
/// for it.
///
/// Best effort: a failing or panicking `rollback` is logged and collected,
/// and the pass moves on to the next task.
pub(crate) async fn compensate(
    flow_id: Uuid,
    stack: RollbackStack,
    tasks: &[BoxTask],
    ctx: &FlowContext,
    params: &mut TaskParams,
    events: &EventBus,
) -> Compensation {
    let order: Vec<usize> = stack.unwind().collect();
    let mut outcome = Compensation::default();

    events.publish(FlowEvent::RollbackStarted {
        flow_id,
        committed: order.len(),
    });
    tracing::info!(flow_id = %flow_id, committed = order.len(), "rolling back committed tasks");

    for index in order {
        let task = &tasks[index];
        let name = task.name().to_string();

        let result = match std::panic::catch_unwind(AssertUnwindSafe(|| task.need_rollback())) {
            Ok(false) => {
                tracing::debug!(flow_id = %flow_id, task = name.as_str(), index, "task opted out of rollback");
                continue;
            }
            Ok(true) => AssertUnwindSafe(task.rollback(ctx, params))
                .catch_unwind()
                .await
                .map_err(|payload| (payload, "rollback")),
            Err(payload) => Err((payload, "need_rollback")),
        };

        let error = match result {
            Ok(Ok(())) => {
                tracing::debug!(flow_id = %flow_id, task = name.as_str(), index, "task rolled back");
                events.publish(FlowEvent::TaskRolledBack {
                    flow_id,
                    index,
                    task: name.clone(),
                });
                outcome.rolled_back.push(name);
                continue;
            }
            Ok(Err(error)) => error,
            Err((payload, call)) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(
                    flow_id = %flow_id,
                    task = name.as_str(),
                    index,
                    panic = %message,
                    "{call} panicked during rollback pass"
                );
                outcome.panic.get_or_insert(payload);
                anyhow::anyhow!("{call} panicked: {message}")
            }
        };

        tracing::warn!(
            flow_id = %flow_id,
            task = name.as_str(),
            index,
            error = %error,
            "rollback failed, continuing with remaining tasks"
        );
        events.publish(FlowEvent::RollbackFailed {
            flow_id,
            index,
            task: name.clone(),
            error: error.to_string(),
        });
        outcome.failures.push(RollbackFailure {
            index,
            task: name,
            error,
        });
    }

    outcome
}
