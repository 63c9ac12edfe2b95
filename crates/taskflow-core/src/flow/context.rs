//! Read-only execution context handed to every task.
//!
//! `FlowContext` carries deadline and trace metadata plus a caller-owned
//! cancellation token. The engine never enforces any of it: a task that wants
//! to stop early when its caller gives up consults the context itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

/// Execution context shared (immutably) by every task of a flow.
///
/// Cloning is cheap: metadata values sit behind an `Arc` and the
/// cancellation token is itself a shared handle.
#[derive(Debug, Clone)]
pub struct FlowContext {
    flow_id: Uuid,
    trace_id: Uuid,
    deadline: Option<DateTime<Utc>>,
    token: CancellationToken,
    values: Arc<HashMap<String, Value>>,
}

impl Default for FlowContext {
    fn default() -> Self {
        Self::background()
    }
}

impl FlowContext {
    /// A context with no deadline, a token nobody cancels and no metadata.
    pub fn background() -> Self {
        Self {
            flow_id: Uuid::nil(),
            trace_id: Uuid::now_v7(),
            deadline: None,
            token: CancellationToken::new(),
            values: Arc::new(HashMap::new()),
        }
    }

    /// Set an absolute deadline.
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let delta = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
        let deadline = Utc::now()
            .checked_add_signed(delta)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.with_deadline(deadline)
    }

    /// Use a caller-owned token, e.g. a child of an application shutdown token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn with_trace_id(mut self, trace_id: Uuid) -> Self {
        self.trace_id = trace_id;
        self
    }

    /// Attach a metadata value visible to every task.
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        Arc::make_mut(&mut self.values).insert(key.into(), value.into());
        self
    }

    /// Stamp the owning flow's id. Called by the flow builder.
    pub(crate) fn bind(mut self, flow_id: Uuid) -> Self {
        self.flow_id = flow_id;
        self
    }

    /// Id of the flow this context belongs to (nil until bound to a flow).
    pub fn flow_id(&self) -> Uuid {
        self.flow_id
    }

    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    /// Time left until the deadline; `Some(Duration::ZERO)` once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Utc::now() >= deadline)
    }

    /// Whether the caller cancelled this context's token.
    ///
    /// This is independent of `FlowHandle::cancel`, which is observed by the
    /// engine at task boundaries.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the caller cancels this context's token.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}
