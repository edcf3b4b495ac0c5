//! Durable projection progress markers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_store::GlobalSequence;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::CheckpointError;

/// A durable marker of projection progress, carrying the state snapshot
/// it was taken with.
///
/// `last_processed` only increases, and only after the corresponding
/// event's effect is reflected in `state`. The two are persisted
/// together so recovery always resumes from a consistent fold prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The projection this checkpoint belongs to.
    pub projection_id: String,

    /// The last global sequence durably incorporated into `state`.
    pub last_processed: GlobalSequence,

    /// Serialized projection state as of `last_processed`.
    pub state: serde_json::Value,

    /// When the checkpoint was taken.
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Creates a checkpoint from a serializable projection state.
    pub fn from_state<T: Serialize>(
        projection_id: impl Into<String>,
        last_processed: GlobalSequence,
        state: &T,
    ) -> Result<Self, CheckpointError> {
        Ok(Self {
            projection_id: projection_id.into(),
            last_processed,
            state: serde_json::to_value(state)?,
            saved_at: Utc::now(),
        })
    }

    /// Deserializes the checkpointed state.
    pub fn into_state<T: for<'de> Deserialize<'de>>(self) -> Result<T, CheckpointError> {
        Ok(serde_json::from_value(self.state)?)
    }
}

/// Contract for durable checkpoint storage, keyed by projection id with
/// single-slot retention.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Saves a checkpoint, replacing any prior one for the projection.
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError>;

    /// Loads the retained checkpoint for a projection, if any.
    async fn load(&self, projection_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;
}

/// In-memory checkpoint store.
#[derive(Clone, Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: Arc<RwLock<HashMap<String, Checkpoint>>>,
}

impl InMemoryCheckpointStore {
    /// Creates a new empty checkpoint store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        let mut checkpoints = self.checkpoints.write().await;
        checkpoints.insert(checkpoint.projection_id.clone(), checkpoint);
        metrics::counter!("projection_checkpoints_saved").increment(1);
        Ok(())
    }

    async fn load(&self, projection_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let checkpoints = self.checkpoints.read().await;
        Ok(checkpoints.get(projection_id).cloned())
    }
}
