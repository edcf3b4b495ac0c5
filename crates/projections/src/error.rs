//! Projection error types.

use thiserror::Error;

/// Errors from the checkpoint store. Distinct from handler failures:
/// a missed periodic checkpoint only widens the re-delivery window.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The backing medium failed.
    #[error("checkpoint persistence error: {0}")]
    Persistence(String),

    /// Checkpointed state could not be (de)serialized.
    #[error("checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors that can occur during projection processing.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// An error occurred in the event store.
    #[error("event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// An error occurred in the checkpoint store.
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Failed to deserialize an event payload.
    #[error("event deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// A projection handler rejected an event. The processor halts
    /// without advancing the checkpoint past it.
    #[error("projection handler error: {0}")]
    Handler(String),

    /// The processor was asked to start while already running.
    #[error("projection processor is already running")]
    AlreadyRunning,

    /// The processor task panicked or was aborted.
    #[error("projection processor task failed: {0}")]
    Task(String),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
