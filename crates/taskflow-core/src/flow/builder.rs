//! Construction surface for [`TaskFlow`].

use std::sync::Arc;

use taskflow_types::{FlowConfig, TaskParams};
use uuid::Uuid;

use super::context::FlowContext;
use super::engine::TaskFlow;
use super::handle::FlowShared;
use crate::task::{BoxTask, Task};

/// Builder for a [`TaskFlow`].
///
/// Every option has a default: empty params, no pre-seeded error, a
/// background context and [`FlowConfig::default`].
pub struct TaskFlowBuilder {
    tasks: Vec<BoxTask>,
    params: Option<TaskParams>,
    error: Option<anyhow::Error>,
    context: Option<FlowContext>,
    config: FlowConfig,
}

impl TaskFlowBuilder {
    pub(crate) fn new(tasks: impl IntoIterator<Item = BoxTask>) -> Self {
        Self {
            tasks: tasks.into_iter().collect(),
            params: None,
            error: None,
            context: None,
            config: FlowConfig::default(),
        }
    }

    /// Append a single task after those passed to `TaskFlow::builder`.
    pub fn task<T: Task + 'static>(mut self, task: T) -> Self {
        self.tasks.push(BoxTask::new(task));
        self
    }

    /// Initial parameter store. Keys also present in the config's `params`
    /// take the value given here.
    pub fn params(mut self, params: TaskParams) -> Self {
        self.params = Some(params);
        self
    }

    /// Pre-seed a terminal error. The flow will finish `Failed` without
    /// running any task.
    pub fn error(mut self, error: impl Into<anyhow::Error>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn context(mut self, context: FlowContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn config(mut self, config: FlowConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> TaskFlow {
        let flow_id = Uuid::now_v7();

        let mut params = self.config.initial_params();
        if let Some(explicit) = self.params {
            params.extend(explicit);
        }

        let mut ctx = self.context.unwrap_or_default().bind(flow_id);
        if ctx.deadline().is_none() {
            if let Some(timeout) = self.config.deadline() {
                ctx = ctx.with_timeout(timeout);
            }
        }

        let shared = Arc::new(FlowShared::new(
            flow_id,
            self.tasks.len(),
            self.config.event_capacity.max(1),
        ));

        TaskFlow::from_parts(
            self.tasks,
            params,
            ctx,
            self.error,
            self.config.name,
            shared,
        )
    }
}

impl std::fmt::Debug for TaskFlowBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskFlowBuilder")
            .field("tasks", &self.tasks)
            .field("params", &self.params)
            .field("has_error", &self.error.is_some())
            .field("config", &self.config)
            .finish()
    }
}
