//! Pause requests delivered to a running flow.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A request to suspend forward progress at the next task boundary.
///
/// Only the most recent request is kept; a new request replaces any request
/// that has not taken effect yet and re-schedules a pause already in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PauseRequest {
    /// Pause for a fixed duration, measured from the boundary where the pause
    /// takes effect.
    For { duration: Duration },
    /// Pause until a wall-clock instant. Instants in the past resume at once.
    Until { at: DateTime<Utc> },
    /// End a pause early, or discard a pause that has not taken effect yet.
    Resume,
}

impl PauseRequest {
    /// Resolve the wall-clock instant at which forward progress may resume.
    ///
    /// `now` is the moment the request is applied. Returns `None` for
    /// [`PauseRequest::Resume`].
    pub fn resume_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::For { duration } => {
                let delta = chrono::Duration::from_std(*duration).unwrap_or(chrono::Duration::MAX);
                Some(now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC))
            }
            Self::Until { at } => Some(*at),
            Self::Resume => None,
        }
    }
}
