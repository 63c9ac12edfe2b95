//! The outcome of a flow run.

use chrono::{DateTime, Utc};
use taskflow_types::{FlowState, TaskParams};
use uuid::Uuid;

use super::error::{FlowError, RollbackFailure};

/// Result of a finished flow run, returned by `TaskFlow::run`.
#[derive(Debug)]
pub struct FlowReport {
    pub flow_id: Uuid,
    /// Terminal state: `Completed`, `Failed` or `Cancelled`.
    pub state: FlowState,
    /// Terminal error; `None` only for `Completed`.
    pub error: Option<FlowError>,
    /// Parameters as the last task (or rollback) left them.
    pub params: TaskParams,
    /// Names of tasks whose `execute` succeeded, in execution order.
    pub completed_tasks: Vec<String>,
    /// Names of tasks whose `rollback` succeeded, in rollback order.
    pub rolled_back: Vec<String>,
    /// Rollbacks that returned an error, in rollback order.
    pub rollback_failures: Vec<RollbackFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl FlowReport {
    pub fn is_completed(&self) -> bool {
        self.state == FlowState::Completed
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == FlowState::Cancelled
    }

    /// Wall-clock run time in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }

    /// Final params on success, the terminal error otherwise.
    pub fn into_result(self) -> Result<TaskParams, FlowError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.params),
        }
    }
}
