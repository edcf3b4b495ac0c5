use thiserror::Error;

use crate::{EntityId, Version};

/// Errors that can occur when interacting with the event log.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The expected version did not match the actual version at append
    /// time. Caller-recoverable: reload, re-derive, resubmit.
    #[error(
        "concurrency conflict for entity {entity_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        entity_id: EntityId,
        expected: Version,
        actual: Version,
    },

    /// A batch submitted for append was malformed (empty, mixed entities,
    /// or non-sequential versions).
    #[error("invalid append batch: {0}")]
    InvalidAppend(String),

    /// The backing medium failed on read or append. The operation fails
    /// wholesale; no partial append is ever observable.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;
