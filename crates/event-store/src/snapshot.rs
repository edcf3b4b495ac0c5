use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::{EntityId, Version};

/// A point-in-time capture of an entity's reduced state.
///
/// Snapshots shortcut replay: loading starts from the snapshot state and
/// only the events after `version` are folded. A snapshot is a hint,
/// never a source of truth; losing one costs replay speed, not data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// The entity this snapshot belongs to.
    pub entity_id: EntityId,

    /// The kind of entity (e.g., "Account").
    pub entity_type: String,

    /// The entity version the state was reduced at. Always less than or
    /// equal to the entity's true latest version.
    pub version: Version,

    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,

    /// The serialized reduced state.
    pub state: serde_json::Value,
}

impl Snapshot {
    /// Creates a new snapshot from raw JSON state.
    pub fn new(
        entity_id: EntityId,
        entity_type: impl Into<String>,
        version: Version,
        state: serde_json::Value,
    ) -> Self {
        Self {
            entity_id,
            entity_type: entity_type.into(),
            version,
            timestamp: Utc::now(),
            state,
        }
    }

    /// Creates a snapshot from a serializable state.
    pub fn from_state<T: Serialize>(
        entity_id: EntityId,
        entity_type: impl Into<String>,
        version: Version,
        state: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            entity_id,
            entity_type,
            version,
            serde_json::to_value(state)?,
        ))
    }

    /// Deserializes the snapshot state into a concrete type.
    pub fn into_state<T: for<'de> Deserialize<'de>>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.state)
    }
}

/// Errors from the snapshot store. Non-fatal to the system: the
/// repository logs them and falls back to full replay from the log.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The backing medium failed.
    #[error("snapshot persistence error: {0}")]
    Persistence(String),

    /// State could not be (de)serialized.
    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Contract for keyed snapshot storage with single-slot retention:
/// saving overwrites any prior snapshot for the entity.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Saves a snapshot, replacing any existing one for the entity.
    async fn save(&self, snapshot: Snapshot) -> Result<(), SnapshotError>;

    /// Loads the retained snapshot for an entity, if any.
    async fn load(&self, entity_id: EntityId) -> Result<Option<Snapshot>, SnapshotError>;
}

/// In-memory snapshot store.
#[derive(Clone, Default)]
pub struct InMemorySnapshotStore {
    snapshots: Arc<RwLock<HashMap<EntityId, Snapshot>>>,
}

impl InMemorySnapshotStore {
    /// Creates a new empty snapshot store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of retained snapshots.
    pub async fn snapshot_count(&self) -> usize {
        self.snapshots.read().await.len()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save(&self, snapshot: Snapshot) -> Result<(), SnapshotError> {
        let mut snapshots = self.snapshots.write().await;
        snapshots.insert(snapshot.entity_id, snapshot);
        metrics::counter!("snapshot_store_saves").increment(1);
        Ok(())
    }

    async fn load(&self, entity_id: EntityId) -> Result<Option<Snapshot>, SnapshotError> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots.get(&entity_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestState {
        value: i32,
        name: String,
    }

    #[tokio::test]
    async fn save_and_load() {
        let store = InMemorySnapshotStore::new();
        let entity_id = EntityId::new();

        let snapshot = Snapshot::new(
            entity_id,
            "Account",
            Version::new(5),
            serde_json::json!({"state": "saved"}),
        );
        store.save(snapshot).await.unwrap();

        let loaded = store.load(entity_id).await.unwrap().unwrap();
        assert_eq!(loaded.entity_id, entity_id);
        assert_eq!(loaded.version, Version::new(5));
    }

    #[tokio::test]
    async fn load_missing_returns_none() {
        let store = InMemorySnapshotStore::new();
        assert!(store.load(EntityId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_overwrites_prior_snapshot() {
        let store = InMemorySnapshotStore::new();
        let entity_id = EntityId::new();

        store
            .save(Snapshot::new(
                entity_id,
                "Account",
                Version::new(5),
                serde_json::json!({"v": 5}),
            ))
            .await
            .unwrap();
        store
            .save(Snapshot::new(
                entity_id,
                "Account",
                Version::new(10),
                serde_json::json!({"v": 10}),
            ))
            .await
            .unwrap();

        assert_eq!(store.snapshot_count().await, 1);
        let loaded = store.load(entity_id).await.unwrap().unwrap();
        assert_eq!(loaded.version, Version::new(10));
    }

    #[test]
    fn snapshot_from_state_and_into_state() {
        let entity_id = EntityId::new();
        let original = TestState {
            value: 42,
            name: "test".to_string(),
        };

        let snapshot =
            Snapshot::from_state(entity_id, "Account", Version::new(5), &original).unwrap();
        let restored: TestState = snapshot.into_state().unwrap();
        assert_eq!(restored, original);
    }
}
