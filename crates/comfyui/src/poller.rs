//! Fixed-interval status polling with a wall-clock ceiling.
//!
//! [`wait_for_completion`] asks a [`StatusSource`] for the job status
//! immediately, then once per [`PollConfig::interval`], until the job
//! succeeds, fails, the ceiling elapses or the cancellation token fires.
//! The last sleep is clamped to the time left, and a status request still
//! in flight at the ceiling is abandoned, so the loop never overruns the
//! ceiling by more than scheduling latency.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::api::ComfyUIApiError;
use crate::events::{GenerationEvent, LifecycleState};
use crate::history::{ImageRef, JobStatus};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(60);

/// Anything that can report the status of a submitted job.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn job_status(&self, prompt_id: &str) -> Result<JobStatus, ComfyUIApiError>;
}

/// Polling cadence and ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between status requests.
    pub interval: Duration,
    /// Give up once this much time has passed since the first request.
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// How polling ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Success with at least one image, in selection order.
    Completed { images: Vec<ImageRef> },
    /// The backend reported success but listed no images.
    MissingOutput,
    /// The backend reported failure.
    Failed { error: Option<String> },
    /// No terminal status within the ceiling.
    TimedOut { waited: Duration },
    Cancelled,
}

impl PollOutcome {
    pub fn lifecycle_state(&self) -> LifecycleState {
        match self {
            Self::Completed { .. } => LifecycleState::Completed,
            Self::MissingOutput | Self::Failed { .. } => LifecycleState::Failed,
            Self::TimedOut { .. } => LifecycleState::TimedOut,
            Self::Cancelled => LifecycleState::Cancelled,
        }
    }
}

/// Poll `source` until `prompt_id` reaches a terminal state.
///
/// Returns `Err` only when a status request itself fails; that ends the
/// loop immediately, nothing is retried.
pub async fn wait_for_completion<S>(
    source: &S,
    prompt_id: &str,
    config: &PollConfig,
    cancel: &CancellationToken,
    event_tx: &broadcast::Sender<GenerationEvent>,
) -> Result<PollOutcome, ComfyUIApiError>
where
    S: StatusSource + ?Sized,
{
    let started = Instant::now();
    let deadline = started + config.timeout;
    let mut attempt = 0u32;

    loop {
        if Instant::now() >= deadline {
            return Ok(timed_out(prompt_id, started));
        }

        attempt += 1;
        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(cancelled(prompt_id, attempt)),
            _ = tokio::time::sleep_until(deadline) => return Ok(timed_out(prompt_id, started)),
            status = source.job_status(prompt_id) => status?,
        };

        let elapsed = started.elapsed();
        let _ = event_tx.send(GenerationEvent::Polled {
            prompt_id: prompt_id.to_string(),
            attempt,
            elapsed_ms: elapsed.as_millis() as u64,
        });

        match status {
            JobStatus::Completed { images } if !images.is_empty() => {
                tracing::info!(prompt_id, attempt, images = images.len(), "Job completed");
                return Ok(PollOutcome::Completed { images });
            }
            JobStatus::Completed { .. } => {
                tracing::warn!(prompt_id, attempt, "Job succeeded without output images");
                return Ok(PollOutcome::MissingOutput);
            }
            JobStatus::Failed { error } => {
                tracing::warn!(prompt_id, attempt, error = ?error, "Job failed");
                return Ok(PollOutcome::Failed { error });
            }
            JobStatus::Pending => {
                tracing::debug!(prompt_id, attempt, "Job queued");
            }
            JobStatus::Processing { status_str } => {
                tracing::debug!(prompt_id, attempt, status = ?status_str, "Job processing");
            }
        }

        let wake = (Instant::now() + config.interval).min(deadline);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(cancelled(prompt_id, attempt)),
            _ = tokio::time::sleep_until(wake) => {}
        }
    }
}

fn timed_out(prompt_id: &str, started: Instant) -> PollOutcome {
    let waited = started.elapsed();
    tracing::warn!(
        prompt_id,
        waited_ms = waited.as_millis() as u64,
        "Job did not finish before the polling ceiling",
    );
    PollOutcome::TimedOut { waited }
}

fn cancelled(prompt_id: &str, attempt: u32) -> PollOutcome {
    tracing::info!(prompt_id, attempt, "Polling cancelled");
    PollOutcome::Cancelled
}
