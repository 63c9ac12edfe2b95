//! Event types for the taskflow event bus.
//!
//! `FlowEvent` is the unified event type broadcast during a flow run.
//! All variants are Clone + Send + Sync for use with tokio broadcast channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::FlowState;

/// Events emitted while a flow runs.
///
/// Used by the event bus to report task lifecycle, pauses and the
/// compensation pass to subscribers (UI, logging, tests).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowEvent {
    /// `run` has started.
    FlowStarted { flow_id: Uuid, total_tasks: usize },

    /// A task's `execute` is about to be invoked.
    TaskStarted {
        flow_id: Uuid,
        /// Position of the task in the flow (0-based).
        index: usize,
        task: String,
    },

    /// A task's `execute` returned successfully.
    TaskCompleted {
        flow_id: Uuid,
        index: usize,
        task: String,
        duration_ms: u64,
    },

    /// A task's `execute` returned an error.
    TaskFailed {
        flow_id: Uuid,
        index: usize,
        task: String,
        error: String,
    },

    /// Forward progress is suspended until `resume_at`.
    FlowPaused {
        flow_id: Uuid,
        resume_at: DateTime<Utc>,
    },

    /// Forward progress continues after a pause.
    FlowResumed { flow_id: Uuid },

    /// The compensation pass is starting.
    RollbackStarted {
        flow_id: Uuid,
        /// Number of committed tasks eligible for compensation.
        committed: usize,
    },

    /// A task's `rollback` returned successfully.
    TaskRolledBack {
        flow_id: Uuid,
        index: usize,
        task: String,
    },

    /// A task's `rollback` returned an error. The pass continues.
    RollbackFailed {
        flow_id: Uuid,
        index: usize,
        task: String,
        error: String,
    },

    /// The run reached a terminal state.
    FlowFinished {
        flow_id: Uuid,
        state: FlowState,
        duration_ms: u64,
    },
}

impl FlowEvent {
    /// The flow this event belongs to.
    pub fn flow_id(&self) -> Uuid {
        match self {
            Self::FlowStarted { flow_id, .. }
            | Self::TaskStarted { flow_id, .. }
            | Self::TaskCompleted { flow_id, .. }
            | Self::TaskFailed { flow_id, .. }
            | Self::FlowPaused { flow_id, .. }
            | Self::FlowResumed { flow_id }
            | Self::RollbackStarted { flow_id, .. }
            | Self::TaskRolledBack { flow_id, .. }
            | Self::RollbackFailed { flow_id, .. }
            | Self::FlowFinished { flow_id, .. } => *flow_id,
        }
    }
}
