//! Per-flow lifecycle event fan-out.
//!
//! Each flow owns one `EventBus`. The engine publishes `FlowEvent`s in the
//! order things happen (start, task progress, pauses, the rollback pass,
//! finish) and every `FlowHandle::subscribe` receiver sees them in that
//! order. A flow with no subscribers only pays for a failed send.

use taskflow_types::FlowEvent;
use tokio::sync::broadcast;

/// Broadcast channel carrying one flow's lifecycle events.
///
/// Receivers only see events published after they subscribed. A receiver
/// that falls more than `capacity` events behind gets `Lagged` and then
/// continues with the newest events, so `FlowFinished` is never lost to a
/// slow observer that keeps reading.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<FlowEvent>,
}

impl EventBus {
    /// `capacity` must be non-zero; the flow builder clamps it to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.sender.subscribe()
    }

    /// Fire-and-forget. Never blocks the engine.
    pub fn publish(&self, event: FlowEvent) {
        let _ = self.sender.send(event);
    }

    /// Number of live observers of this flow.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}
