use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{EntityId, EventEnvelope, EventStoreError, GlobalSequence, Result, Version};

/// A stream of events in global-sequence order.
///
/// Returned by [`EventStore::subscribe_all`]; potentially infinite.
/// Dropping the stream cancels the subscription.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Core contract for the append-only event log.
///
/// Events for one entity are numbered 1..N with no gaps; every stored
/// event additionally carries a store-wide [`GlobalSequence`] assigned at
/// append time. All implementations must be thread-safe (Send + Sync);
/// the backing medium (memory, disk, remote service) is irrelevant to
/// the contract.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends a batch of events for a single entity.
    ///
    /// `expected_version` must equal the entity's currently stored latest
    /// version (`Version::initial()` for a brand-new entity); otherwise
    /// the append fails with `ConcurrencyConflict` and nothing is stored.
    /// On success all events are stored contiguously, each assigned the
    /// next global sequence, and the new version is returned.
    async fn append(&self, events: Vec<EventEnvelope>, expected_version: Version)
    -> Result<Version>;

    /// Reads events for an entity with version strictly greater than
    /// `after`, in version order. `Version::initial()` reads everything.
    async fn read_from(&self, entity_id: EntityId, after: Version) -> Result<Vec<EventEnvelope>>;

    /// Returns the latest stored version for an entity, or None if no
    /// events exist for it.
    async fn current_version(&self, entity_id: EntityId) -> Result<Option<Version>>;

    /// Subscribes to the store-wide event order starting at `from`
    /// (inclusive).
    ///
    /// The stream first replays the stored backlog, then stays open and
    /// yields new events as they are appended. Resumable from any
    /// position; the consumer cancels by dropping the stream.
    async fn subscribe_all(&self, from: GlobalSequence) -> Result<EventStream>;
}

/// Validates a batch of events before appending.
///
/// The batch must be non-empty, target a single entity, and carry
/// sequential versions.
pub fn validate_events_for_append(events: &[EventEnvelope]) -> Result<()> {
    let first = events
        .first()
        .ok_or_else(|| EventStoreError::InvalidAppend("empty event batch".to_string()))?;

    for event in events.iter().skip(1) {
        if event.entity_id != first.entity_id {
            return Err(EventStoreError::InvalidAppend(
                "all events in a batch must belong to the same entity".to_string(),
            ));
        }
        if event.entity_type != first.entity_type {
            return Err(EventStoreError::InvalidAppend(
                "all events in a batch must share the entity type".to_string(),
            ));
        }
    }

    let mut expected = first.version;
    for event in events.iter().skip(1) {
        expected = expected.next();
        if event.version != expected {
            return Err(EventStoreError::InvalidAppend(format!(
                "event versions must be sequential: expected {}, got {}",
                expected, event.version
            )));
        }
    }

    Ok(())
}
