use std::any::Any;

use thiserror::Error;

// ---------------------------------------------------------------------------
// FlowError
// ---------------------------------------------------------------------------

/// The terminal error explaining why a flow did not complete cleanly.
#[derive(Debug, Error)]
pub enum FlowError {
    /// A task's `execute` returned an error. The rollback pass has run.
    #[error("task '{task}' failed: {source}")]
    TaskFailed {
        task: String,
        #[source]
        source: anyhow::Error,
    },

    /// The run was cancelled at a task boundary. The rollback pass has run.
    #[error("flow cancelled")]
    Cancelled,

    /// The flow was built with a pre-seeded error; no task was executed.
    #[error("flow started with a recorded error: {0}")]
    Preset(#[source] anyhow::Error),
}

impl FlowError {
    /// Name of the failing task, if the error came from one.
    pub fn task(&self) -> Option<&str> {
        match self {
            Self::TaskFailed { task, .. } => Some(task),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

// ---------------------------------------------------------------------------
// RollbackFailure
// ---------------------------------------------------------------------------

/// A `rollback` call that returned an error during compensation.
///
/// Collected for diagnostics; it never replaces the flow's terminal error.
#[derive(Debug)]
pub struct RollbackFailure {
    /// Position of the task in the flow (0-based).
    pub index: usize,
    pub task: String,
    pub error: anyhow::Error,
}

impl std::fmt::Display for RollbackFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rollback of task '{}' failed: {}", self.task, self.error)
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
