/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generation records are keyed by UUID.
pub type RecordId = uuid::Uuid;
