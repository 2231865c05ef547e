//! UI-facing generation records and the bounded generation history.
//!
//! A [`GenerationRecord`] is created when the user confirms a style and
//! then moves through `pending -> processing -> completed | failed`.
//! Illegal transitions are rejected with [`CoreError::Conflict`] rather
//! than silently overwriting a terminal record.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::style::Style;
use crate::types::{RecordId, Timestamp};

/// Default number of records retained by [`GenerationHistory`].
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl GenerationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One user-initiated generation and its outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub id: RecordId,
    pub style: Style,
    pub status: GenerationStatus,
    /// Backend job identifier once the job has been accepted.
    pub job_id: Option<String>,
    /// Sampler seed actually used, for reproducing the result.
    pub seed: Option<u64>,
    /// Base64-encoded result image.
    pub result_image: Option<String>,
    pub error: Option<String>,
    /// `true` when the result is a demo placeholder, not a real generation.
    pub is_demo: bool,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl GenerationRecord {
    pub fn new(style: Style) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            style,
            status: GenerationStatus::Pending,
            job_id: None,
            seed: None,
            result_image: None,
            error: None,
            is_demo: false,
            created_at: chrono::Utc::now(),
            completed_at: None,
        }
    }

    /// The job has been handed to the backend.
    pub fn mark_processing(&mut self, job_id: &str, seed: Option<u64>) -> Result<(), CoreError> {
        if self.status != GenerationStatus::Pending {
            return Err(self.transition_error(GenerationStatus::Processing));
        }
        self.status = GenerationStatus::Processing;
        self.job_id = Some(job_id.to_string());
        self.seed = seed;
        Ok(())
    }

    /// Store the result image and close the record.
    ///
    /// Demo results may complete straight from `pending`, since they never
    /// reach a backend.
    pub fn complete(&mut self, result_image: String, is_demo: bool) -> Result<(), CoreError> {
        let allowed = match self.status {
            GenerationStatus::Processing => true,
            GenerationStatus::Pending => is_demo,
            _ => false,
        };
        if !allowed {
            return Err(self.transition_error(GenerationStatus::Completed));
        }
        self.status = GenerationStatus::Completed;
        self.result_image = Some(result_image);
        self.is_demo = is_demo;
        self.error = None;
        self.completed_at = Some(chrono::Utc::now());
        Ok(())
    }

    /// Record a terminal failure. Allowed from any non-terminal state.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), CoreError> {
        if self.status.is_terminal() {
            return Err(self.transition_error(GenerationStatus::Failed));
        }
        self.status = GenerationStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(chrono::Utc::now());
        Ok(())
    }

    fn transition_error(&self, to: GenerationStatus) -> CoreError {
        CoreError::Conflict(format!(
            "Generation {} cannot move from {:?} to {to:?}",
            self.id, self.status
        ))
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Most-recent-first list of generation records with a fixed capacity.
///
/// Pushing beyond the capacity evicts the oldest record.
#[derive(Debug, Clone)]
pub struct GenerationHistory {
    records: VecDeque<GenerationRecord>,
    capacity: usize,
}

impl Default for GenerationHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl GenerationHistory {
    /// A capacity of zero is clamped to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert a record at the front, returning the evicted record if the
    /// history was full.
    pub fn push(&mut self, record: GenerationRecord) -> Option<GenerationRecord> {
        self.records.push_front(record);
        if self.records.len() > self.capacity {
            self.records.pop_back()
        } else {
            None
        }
    }

    pub fn get(&self, id: RecordId) -> Option<&GenerationRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn get_mut(&mut self, id: RecordId) -> Result<&mut GenerationRecord, CoreError> {
        self.records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| CoreError::NotFound {
                entity: "generation",
                id: id.to_string(),
            })
    }

    pub fn latest(&self) -> Option<&GenerationRecord> {
        self.records.front()
    }

    /// Records newest first.
    pub fn iter(&self) -> impl Iterator<Item = &GenerationRecord> {
        self.records.iter()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
