//! Cross-task control surface of a flow.
//!
//! `FlowShared` is the only state touched from both sides of a run: the engine
//! (single consumer) and any number of `FlowHandle` clones (producers). Every
//! primitive in it is non-blocking on the producer side:
//! - cancellation: `CancellationToken`, idempotent
//! - pause: single-slot `watch` mailbox, newest request wins
//! - progress: `watch` channel, also backs `FlowHandle::wait`
//! - done: `AtomicBool`, set exactly once

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use taskflow_types::{FlowEvent, FlowProgress, FlowState, PauseRequest};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::event::EventBus;

// ---------------------------------------------------------------------------
// FlowShared
// ---------------------------------------------------------------------------

pub(crate) struct FlowShared {
    pub(crate) flow_id: Uuid,
    pub(crate) cancel: CancellationToken,
    pub(crate) pause: watch::Sender<Option<PauseRequest>>,
    pub(crate) events: EventBus,
    progress: watch::Sender<FlowProgress>,
    done: AtomicBool,
}

impl FlowShared {
    pub(crate) fn new(flow_id: Uuid, total_tasks: usize, event_capacity: usize) -> Self {
        let (progress, _) = watch::channel(FlowProgress::new(total_tasks));
        let (pause, _) = watch::channel(None);
        Self {
            flow_id,
            cancel: CancellationToken::new(),
            pause,
            events: EventBus::new(event_capacity),
            progress,
            done: AtomicBool::new(false),
        }
    }

    pub(crate) fn state(&self) -> FlowState {
        self.progress.borrow().state
    }

    pub(crate) fn set_state(&self, state: FlowState) {
        self.progress.send_modify(|p| p.state = state);
    }

    pub(crate) fn task_started(&self, task: &str) {
        self.progress
            .send_modify(|p| p.current_task = Some(task.to_string()));
    }

    pub(crate) fn task_finished(&self, committed: bool) {
        self.progress.send_modify(|p| {
            p.current_task = None;
            if committed {
                p.completed += 1;
            }
        });
    }

    /// Take the pending pause request without waking the engine's own
    /// mailbox receiver.
    pub(crate) fn take_pause(&self) -> Option<PauseRequest> {
        let mut taken = None;
        self.pause.send_if_modified(|slot| {
            taken = slot.take();
            false
        });
        taken
    }

    pub(crate) fn publish(&self, event: FlowEvent) {
        self.events.publish(event);
    }

    /// Set the done flag. Only the first call has an effect.
    pub(crate) fn mark_done(&self) {
        if !self.done.swap(true, Ordering::SeqCst) {
            self.progress.send_modify(|p| p.done = true);
        }
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    /// Record a pause-mailbox request if a run is active.
    fn request_pause(&self, request: PauseRequest) -> bool {
        if !self.state().is_active() {
            return false;
        }
        self.pause.send_replace(Some(request));
        true
    }
}

// ---------------------------------------------------------------------------
// FlowHandle
// ---------------------------------------------------------------------------

/// Cloneable handle for controlling and observing a flow from another task.
///
/// Every method is non-blocking except [`FlowHandle::wait`]. Requests made
/// while the flow is idle (before `run`) or finished are ignored and report
/// `false`.
#[derive(Clone)]
pub struct FlowHandle {
    shared: Arc<FlowShared>,
}

impl FlowHandle {
    pub(crate) fn new(shared: Arc<FlowShared>) -> Self {
        Self { shared }
    }

    pub fn flow_id(&self) -> Uuid {
        self.shared.flow_id
    }

    /// Request cooperative cancellation.
    ///
    /// The task currently executing is allowed to finish; the engine observes
    /// the request at the next task boundary (or immediately while paused) and
    /// rolls back committed tasks. Repeated calls are harmless.
    pub fn cancel(&self) -> bool {
        if !self.shared.state().is_active() {
            tracing::debug!(flow_id = %self.shared.flow_id, "ignoring cancel on inactive flow");
            return false;
        }
        self.shared.cancel.cancel();
        tracing::info!(flow_id = %self.shared.flow_id, "flow cancellation requested");
        true
    }

    /// Suspend forward progress for `duration` once the current task finishes.
    pub fn pause(&self, duration: Duration) -> bool {
        self.shared.request_pause(PauseRequest::For { duration })
    }

    /// Suspend forward progress until `at` once the current task finishes.
    pub fn pause_until(&self, at: DateTime<Utc>) -> bool {
        self.shared.request_pause(PauseRequest::Until { at })
    }

    /// End an ongoing pause, or drop a pause that has not taken effect yet.
    pub fn resume(&self) -> bool {
        self.shared.request_pause(PauseRequest::Resume)
    }

    /// Whether `run` has finished. True forever once set.
    pub fn done(&self) -> bool {
        self.shared.is_done()
    }

    pub fn state(&self) -> FlowState {
        self.shared.state()
    }

    pub fn progress(&self) -> FlowProgress {
        self.shared.progress.borrow().clone()
    }

    /// Wait until the run has finished and return its terminal state.
    pub async fn wait(&self) -> FlowState {
        let mut rx = self.shared.progress.subscribe();
        match rx.wait_for(|p| p.done).await {
            Ok(progress) => progress.state,
            Err(_) => self.shared.state(),
        }
    }

    /// Subscribe to lifecycle events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.shared.events.subscribe()
    }
}

impl std::fmt::Debug for FlowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowHandle")
            .field("flow_id", &self.shared.flow_id)
            .field("state", &self.shared.state())
            .field("done", &self.shared.is_done())
            .finish()
    }
}
