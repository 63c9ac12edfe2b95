//! Flow lifecycle state and progress snapshots.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// FlowState
// ---------------------------------------------------------------------------

/// Lifecycle state of a task flow.
///
/// `Idle -> Running (<-> Paused) -> {Completed, Failed, Cancelled}`.
/// Whether the run has handed control back to its caller is tracked
/// separately by the `done` flag on [`FlowProgress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    /// Built but `run` has not started yet.
    #[default]
    Idle,
    /// Executing tasks.
    Running,
    /// Suspended at a task boundary by a pause request.
    Paused,
    /// Every task executed successfully.
    Completed,
    /// The run failed; the terminal error says why.
    Failed,
    /// Cancelled at a task boundary and the rollback pass ran.
    Cancelled,
}

impl FlowState {
    /// True for `Completed`, `Failed` and `Cancelled`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// True while a run is in progress (`Running` or `Paused`).
    ///
    /// Cancel and pause requests are only recorded in an active state.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FlowProgress
// ---------------------------------------------------------------------------

/// Point-in-time view of a flow, published by the engine at every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowProgress {
    /// Current lifecycle state.
    pub state: FlowState,
    /// Name of the task currently executing (None between tasks).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
    /// Number of tasks whose `execute` returned successfully.
    pub completed: usize,
    /// Total number of tasks in the flow.
    pub total: usize,
    /// Set exactly once, after the run has finished on any path.
    pub done: bool,
}

impl FlowProgress {
    /// Initial progress for a flow of `total` tasks.
    pub fn new(total: usize) -> Self {
        Self {
            state: FlowState::Idle,
            current_task: None,
            completed: 0,
            total,
            done: false,
        }
    }
}
