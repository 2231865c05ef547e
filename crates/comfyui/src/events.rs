//! Lifecycle events emitted by the [`Generator`](crate::generator::Generator).
//!
//! Subscribers use these to drive progress displays. Sending is
//! best-effort: with no subscribers the events are dropped.

use serde::Serialize;

/// Broadcast channel capacity for generation events.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// State of a single generation job as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    NotStarted,
    Submitted,
    Polling,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl LifecycleState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::TimedOut | Self::Cancelled
        )
    }
}

/// A client-side event for one generation request.
#[derive(Debug, Clone, Serialize)]
pub enum GenerationEvent {
    /// The input image was accepted by the backend.
    ImageUploaded { name: String },

    /// The job moved to a new lifecycle state. `prompt_id` is `None`
    /// before the backend has accepted the job.
    StateChanged {
        prompt_id: Option<String>,
        state: LifecycleState,
    },

    /// One status request completed.
    Polled {
        prompt_id: String,
        attempt: u32,
        elapsed_ms: u64,
    },
}
