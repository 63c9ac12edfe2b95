//! Recording mock tasks shared by the flow test modules.

use std::sync::{Arc, Mutex};

use taskflow_types::TaskParams;
use tokio::sync::Notify;

use super::context::FlowContext;
use crate::task::{BoxTask, Task, TaskResult};

/// Ordered log of `execute:<name>` / `rollback:<name>` calls.
#[derive(Debug, Clone, Default)]
pub(crate) struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    fn record(&self, kind: &str, name: &str) {
        self.calls.lock().unwrap().push(format!("{kind}:{name}"));
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn filtered(&self, kind: &str) -> Vec<String> {
        let prefix = format!("{kind}:");
        self.entries()
            .into_iter()
            .filter_map(|entry| entry.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    pub(crate) fn executions(&self) -> Vec<String> {
        self.filtered("execute")
    }

    pub(crate) fn rollbacks(&self) -> Vec<String> {
        self.filtered("rollback")
    }
}

/// Lets a test hold a task inside `execute` until released.
#[derive(Debug, Clone, Default)]
pub(crate) struct Gate {
    pub(crate) started: Arc<Notify>,
    pub(crate) release: Arc<Notify>,
}

impl Gate {
    /// Wait until the gated task has entered `execute`.
    pub(crate) async fn entered(&self) {
        self.started.notified().await;
    }

    pub(crate) fn open(&self) {
        self.release.notify_one();
    }
}

#[derive(Debug, Clone)]
enum Forward {
    Succeed,
    Fail(String),
    Panic,
    Gated(Gate),
}

/// Task that records its calls and marks `params[name] = true` while applied.
#[derive(Debug, Clone)]
pub(crate) struct MockTask {
    name: String,
    log: CallLog,
    forward: Forward,
    need_rollback: bool,
    rollback_error: Option<String>,
    rollback_panics: bool,
}

impl MockTask {
    pub(crate) fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            forward: Forward::Succeed,
            need_rollback: true,
            rollback_error: None,
            rollback_panics: false,
        }
    }

    pub(crate) fn failing(mut self, message: &str) -> Self {
        self.forward = Forward::Fail(message.to_string());
        self
    }

    pub(crate) fn panicking(mut self) -> Self {
        self.forward = Forward::Panic;
        self
    }

    pub(crate) fn gated(mut self, gate: &Gate) -> Self {
        self.forward = Forward::Gated(gate.clone());
        self
    }

    pub(crate) fn without_rollback(mut self) -> Self {
        self.need_rollback = false;
        self
    }

    pub(crate) fn failing_rollback(mut self, message: &str) -> Self {
        self.rollback_error = Some(message.to_string());
        self
    }

    pub(crate) fn panicking_rollback(mut self) -> Self {
        self.rollback_panics = true;
        self
    }

    pub(crate) fn boxed(self) -> BoxTask {
        BoxTask::new(self)
    }
}

impl Task for MockTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &FlowContext, params: &mut TaskParams) -> TaskResult {
        self.log.record("execute", &self.name);
        match &self.forward {
            Forward::Succeed => {}
            Forward::Fail(message) => anyhow::bail!("{message}"),
            Forward::Panic => panic!("task {} blew up", self.name),
            Forward::Gated(gate) => {
                gate.started.notify_one();
                gate.release.notified().await;
            }
        }
        params.insert(self.name.as_str(), true);
        Ok(())
    }

    async fn rollback(&self, _ctx: &FlowContext, params: &mut TaskParams) -> TaskResult {
        self.log.record("rollback", &self.name);
        if self.rollback_panics {
            panic!("rollback of {} blew up", self.name);
        }
        if let Some(message) = &self.rollback_error {
            anyhow::bail!("{message}");
        }
        params.remove(&self.name);
        Ok(())
    }

    fn need_rollback(&self) -> bool {
        self.need_rollback
    }
}
