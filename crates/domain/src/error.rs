//! Repository and domain error types.

use common::EntityId;
use event_store::EventStoreError;
use thiserror::Error;

use crate::account::AccountError;

/// Errors that can occur in repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// No events exist for the requested entity.
    #[error("entity not found: {0}")]
    NotFound(EntityId),

    /// The per-entity lock could not be acquired within the configured
    /// wait bound.
    #[error("timed out waiting for the save lock on entity {0}")]
    LockTimeout(EntityId),

    /// An error from the event log. `ConcurrencyConflict` arrives
    /// through this variant and is caller-recoverable: reload and
    /// re-derive the command's events against current state.
    #[error("event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// An error in the account domain.
    #[error("account error: {0}")]
    Account(#[from] AccountError),

    /// Event payload or snapshot state could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RepositoryError {
    /// Returns true if this is an optimistic-concurrency conflict the
    /// caller should resolve by reloading.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            RepositoryError::EventStore(EventStoreError::ConcurrencyConflict { .. })
        )
    }
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;
