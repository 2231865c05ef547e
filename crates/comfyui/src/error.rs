//! Terminal outcomes of a failed generation.

use std::time::Duration;

use crate::api::ComfyUIApiError;
use crate::events::LifecycleState;
use crate::workflow::WorkflowError;

/// Why a generation did not produce an image.
///
/// Every variant is terminal for the request that produced it. Nothing is
/// retried inside the client; use [`is_retryable`](Self::is_retryable) to
/// decide whether to offer the user a "try again" action.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// The backend could not be reached.
    #[error("ComfyUI is unreachable: {0}")]
    Connectivity(String),

    /// The backend rejected the job, or answered without a job id.
    #[error("Job submission failed: {0}")]
    Submission(String),

    /// The backend reported the job as failed.
    #[error("Generation failed: {0}")]
    Generation(String),

    /// No terminal status within the polling ceiling.
    #[error("Generation timed out after {}s", .waited.as_secs())]
    Timeout { waited: Duration },

    /// The result image could not be fetched or encoded.
    #[error("Failed to retrieve result image: {0}")]
    Decode(String),

    /// The backend reported success but listed no output image.
    #[error("Job {prompt_id} succeeded without producing an image")]
    MissingOutput { prompt_id: String },

    /// The status endpoint answered with something unusable.
    #[error("Unexpected status response: {0}")]
    Protocol(String),

    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(#[from] WorkflowError),

    #[error("Generation cancelled")]
    Cancelled,
}

impl GenerateError {
    /// Whether repeating the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidWorkflow(_) | Self::Cancelled)
    }

    /// Lifecycle state the job ends in.
    pub fn lifecycle_state(&self) -> LifecycleState {
        match self {
            Self::Timeout { .. } => LifecycleState::TimedOut,
            Self::Cancelled => LifecycleState::Cancelled,
            _ => LifecycleState::Failed,
        }
    }

    /// Classify a failure of the upload or `/prompt` request.
    pub(crate) fn from_submit(err: ComfyUIApiError) -> Self {
        match err {
            ComfyUIApiError::Request(e) => Self::Connectivity(e.to_string()),
            other => Self::Submission(other.to_string()),
        }
    }

    /// Classify a failure of a `/history` request.
    pub(crate) fn from_status(err: ComfyUIApiError) -> Self {
        match err {
            ComfyUIApiError::Request(e) => Self::Connectivity(e.to_string()),
            other => Self::Protocol(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_classify_by_phase() {
        let api = || ComfyUIApiError::ApiError {
            status: 500,
            body: "boom".into(),
        };
        assert!(matches!(
            GenerateError::from_submit(api()),
            GenerateError::Submission(_)
        ));
        assert!(matches!(
            GenerateError::from_status(api()),
            GenerateError::Protocol(_)
        ));
        assert!(matches!(
            GenerateError::from_submit(ComfyUIApiError::MalformedResponse("x".into())),
            GenerateError::Submission(_)
        ));
    }

    #[test]
    fn timeout_message_and_state() {
        let err = GenerateError::Timeout {
            waited: Duration::from_secs(60),
        };
        assert_eq!(err.to_string(), "Generation timed out after 60s");
        assert_eq!(err.lifecycle_state(), LifecycleState::TimedOut);
        assert!(err.is_retryable());
    }

    #[test]
    fn cancelled_is_not_retryable() {
        assert!(!GenerateError::Cancelled.is_retryable());
        assert_eq!(
            GenerateError::Cancelled.lifecycle_state(),
            LifecycleState::Cancelled
        );
        assert_eq!(
            GenerateError::Generation("x".into()).lifecycle_state(),
            LifecycleState::Failed
        );
    }
}
