use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Notify, RwLock};

use crate::{
    EntityId, EventEnvelope, EventStoreError, GlobalSequence, Result, Version,
    store::{EventStore, EventStream, validate_events_for_append},
};

/// In-memory reference implementation of the event log.
///
/// Events are held in a single vector ordered by global sequence
/// (position `n` holds sequence `n + 1`). Live subscribers are woken
/// through a shared [`Notify`] whenever an append lands.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    events: Arc<RwLock<Vec<EventEnvelope>>>,
    by_entity: Arc<RwLock<HashMap<EntityId, Vec<usize>>>>,
    appended: Arc<Notify>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }

    /// Clears all events. Open subscriptions will stall rather than
    /// observe the truncation; intended for test setup only.
    pub async fn clear(&self) {
        self.events.write().await.clear();
        self.by_entity.write().await.clear();
    }

    async fn version_of(&self, entity_id: EntityId) -> Option<Version> {
        let events = self.events.read().await;
        let by_entity = self.by_entity.read().await;
        by_entity
            .get(&entity_id)
            .and_then(|indices| indices.last())
            .map(|&i| events[i].version)
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    #[tracing::instrument(skip(self, events), fields(batch_len = events.len()))]
    async fn append(
        &self,
        events: Vec<EventEnvelope>,
        expected_version: Version,
    ) -> Result<Version> {
        validate_events_for_append(&events)?;

        let entity_id = events[0].entity_id;
        let first_version = events[0].version;

        let mut store = self.events.write().await;
        let mut by_entity = self.by_entity.write().await;

        let actual = by_entity
            .get(&entity_id)
            .and_then(|indices| indices.last())
            .map(|&i| store[i].version)
            .unwrap_or(Version::initial());

        if actual != expected_version {
            return Err(EventStoreError::ConcurrencyConflict {
                entity_id,
                expected: expected_version,
                actual,
            });
        }

        if first_version != expected_version.next() {
            return Err(EventStoreError::InvalidAppend(format!(
                "batch must start at version {}, got {}",
                expected_version.next(),
                first_version
            )));
        }

        let batch_len = events.len();
        let mut last_version = expected_version;
        for mut event in events {
            event.global_sequence = GlobalSequence::new(store.len() as u64 + 1);
            last_version = event.version;
            by_entity.entry(entity_id).or_default().push(store.len());
            store.push(event);
        }

        drop(by_entity);
        drop(store);

        metrics::counter!("event_store_events_appended").increment(batch_len as u64);
        self.appended.notify_waiters();

        Ok(last_version)
    }

    async fn read_from(&self, entity_id: EntityId, after: Version) -> Result<Vec<EventEnvelope>> {
        let store = self.events.read().await;
        let by_entity = self.by_entity.read().await;
        let events = by_entity
            .get(&entity_id)
            .map(|indices| {
                indices
                    .iter()
                    .map(|&i| &store[i])
                    .filter(|e| e.version > after)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(events)
    }

    async fn current_version(&self, entity_id: EntityId) -> Result<Option<Version>> {
        Ok(self.version_of(entity_id).await)
    }

    async fn subscribe_all(&self, from: GlobalSequence) -> Result<EventStream> {
        let events = Arc::clone(&self.events);
        let appended = Arc::clone(&self.appended);
        let start = if from == GlobalSequence::unassigned() {
            GlobalSequence::first()
        } else {
            from
        };

        let stream = futures_util::stream::unfold(start, move |next| {
            let events = Arc::clone(&events);
            let appended = Arc::clone(&appended);
            async move {
                loop {
                    // Register for the wakeup before checking the log, so
                    // an append landing between the check and the await is
                    // not missed.
                    let notified = appended.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();

                    let index = (next.as_u64() - 1) as usize;
                    {
                        let guard = events.read().await;
                        if let Some(event) = guard.get(index) {
                            return Some((Ok(event.clone()), next.next()));
                        }
                    }

                    notified.await;
                }
            }
        });

        Ok(Box::pin(stream))
    }
}
