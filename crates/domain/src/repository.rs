//! Aggregate repository: load/save with optimistic concurrency,
//! caching, per-entity locking, and interval snapshotting.

use std::sync::Arc;
use std::time::Duration;

use common::EntityId;
use event_store::{
    EventEnvelope, EventMetadata, EventStore, Snapshot, SnapshotStore, Version,
};

use crate::aggregate::{Aggregate, DomainEvent, Lifecycle, Reducer};
use crate::cache::AggregateCache;
use crate::error::{RepositoryError, Result};
use crate::lock::EntityLocks;

/// Tuning knobs for the repository.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// A snapshot is persisted whenever a save crosses a multiple of
    /// this many events. 0 disables snapshotting.
    pub snapshot_interval: u64,

    /// How long a cached aggregate stays valid.
    pub cache_ttl: Duration,

    /// Maximum number of cached aggregates.
    pub cache_capacity: usize,

    /// Upper bound on waiting for the per-entity save lock.
    pub lock_timeout: Duration,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            snapshot_interval: 100,
            cache_ttl: Duration::from_secs(30),
            cache_capacity: 1024,
            lock_timeout: Duration::from_secs(5),
        }
    }
}

/// Composes the event log, snapshot store, reducer, an in-process cache
/// and a per-entity lock table into `load`/`save` with optimistic
/// concurrency.
///
/// The log and snapshot store are the sole sources of truth; the cache
/// and lock table are process-wide state mutated only through these
/// operations.
pub struct AggregateRepository<R, ES, SS>
where
    R: Reducer,
    ES: EventStore,
    SS: SnapshotStore + 'static,
{
    events: Arc<ES>,
    snapshots: Arc<SS>,
    cache: AggregateCache<R>,
    locks: EntityLocks,
    config: RepositoryConfig,
}

impl<R, ES, SS> AggregateRepository<R, ES, SS>
where
    R: Reducer,
    ES: EventStore,
    SS: SnapshotStore + 'static,
{
    /// Creates a repository with default configuration.
    pub fn new(events: Arc<ES>, snapshots: Arc<SS>) -> Self {
        Self::with_config(events, snapshots, RepositoryConfig::default())
    }

    /// Creates a repository with the given configuration.
    pub fn with_config(events: Arc<ES>, snapshots: Arc<SS>, config: RepositoryConfig) -> Self {
        Self {
            events,
            snapshots,
            cache: AggregateCache::new(config.cache_ttl, config.cache_capacity),
            locks: EntityLocks::new(),
            config,
        }
    }

    /// Returns a reference to the underlying event store.
    pub fn event_store(&self) -> &Arc<ES> {
        &self.events
    }

    /// Loads an aggregate: cache first, then snapshot plus the events
    /// after it, then full replay.
    ///
    /// Returns `NotFound` if no events and no snapshot exist for the id.
    #[tracing::instrument(skip(self), fields(entity_type = R::entity_type()))]
    pub async fn load(&self, entity_id: EntityId) -> Result<Aggregate<R>> {
        if let Some(cached) = self.cache.get(entity_id).await {
            return Ok(cached);
        }

        let mut aggregate = match self.load_snapshot(entity_id).await {
            Some((state, version)) => Aggregate::from_parts(entity_id, state, version),
            None => Aggregate::new(entity_id),
        };

        let events = self.events.read_from(entity_id, aggregate.version()).await?;
        if events.is_empty() && aggregate.version() == Version::initial() {
            return Err(RepositoryError::NotFound(entity_id));
        }

        for envelope in events {
            let event: R::Event = serde_json::from_value(envelope.payload)?;
            aggregate.apply_committed(&event);
        }

        self.cache.insert(aggregate.clone()).await;
        Ok(aggregate)
    }

    /// Persists an aggregate's uncommitted events.
    ///
    /// Acquires the entity's save lock, appends with the expected
    /// version derived from the aggregate, and on success refreshes the
    /// cache and (best-effort, asynchronously) persists a snapshot when
    /// the version crosses the configured interval.
    ///
    /// A `ConcurrencyConflict` is surfaced, never retried or merged
    /// here; the stale cache entry is dropped so the caller's reload
    /// observes the winning state.
    #[tracing::instrument(skip(self, aggregate), fields(entity_id = %aggregate.id(), entity_type = R::entity_type()))]
    pub async fn save(&self, aggregate: Aggregate<R>) -> Result<Aggregate<R>> {
        self.save_with_metadata(aggregate, EventMetadata::default())
            .await
    }

    /// Like [`save`](Self::save), attaching the given metadata to every
    /// persisted event.
    pub async fn save_with_metadata(
        &self,
        mut aggregate: Aggregate<R>,
        metadata: EventMetadata,
    ) -> Result<Aggregate<R>> {
        if !aggregate.is_dirty() {
            return Ok(aggregate);
        }

        let entity_id = aggregate.id();
        let _guard = self
            .locks
            .acquire(entity_id, self.config.lock_timeout)
            .await
            .ok_or(RepositoryError::LockTimeout(entity_id))?;

        let expected = aggregate.expected_version();
        let envelopes = build_envelopes::<R>(&aggregate, expected, &metadata)?;

        match self.events.append(envelopes, expected).await {
            Ok(new_version) => {
                debug_assert_eq!(new_version, aggregate.version());
                aggregate.mark_committed();
                self.cache.insert(aggregate.clone()).await;
                self.maybe_snapshot(&aggregate, expected).await;
                Ok(aggregate)
            }
            Err(err) => {
                self.cache.invalidate(entity_id).await;
                Err(err.into())
            }
        }
    }

    async fn load_snapshot(&self, entity_id: EntityId) -> Option<(Lifecycle<R::State>, Version)> {
        let snapshot = match self.snapshots.load(entity_id).await {
            Ok(snapshot) => snapshot?,
            Err(err) => {
                tracing::warn!(%entity_id, error = %err, "snapshot load failed, replaying from scratch");
                return None;
            }
        };

        let version = snapshot.version;
        match snapshot.into_state::<Lifecycle<R::State>>() {
            Ok(state) => Some((state, version)),
            Err(err) => {
                tracing::warn!(%entity_id, error = %err, "snapshot state unreadable, replaying from scratch");
                None
            }
        }
    }

    /// Fires an async snapshot write if the save crossed the interval.
    /// Snapshot failures never fail the save.
    async fn maybe_snapshot(&self, aggregate: &Aggregate<R>, previous: Version) {
        let interval = self.config.snapshot_interval;
        if interval == 0 {
            return;
        }
        let current = aggregate.version().as_u64();
        if previous.as_u64() / interval >= current / interval {
            return;
        }

        let snapshot = match Snapshot::from_state(
            aggregate.id(),
            R::entity_type(),
            aggregate.version(),
            aggregate.state(),
        ) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(entity_id = %aggregate.id(), error = %err, "failed to serialize snapshot");
                return;
            }
        };

        let snapshots = Arc::clone(&self.snapshots);
        tokio::spawn(async move {
            let entity_id = snapshot.entity_id;
            let version = snapshot.version;
            if let Err(err) = snapshots.save(snapshot).await {
                tracing::warn!(%entity_id, %version, error = %err, "snapshot save failed");
            } else {
                tracing::debug!(%entity_id, %version, "snapshot persisted");
            }
        });
    }
}

fn build_envelopes<R: Reducer>(
    aggregate: &Aggregate<R>,
    current_version: Version,
    metadata: &EventMetadata,
) -> Result<Vec<EventEnvelope>> {
    let mut envelopes = Vec::with_capacity(aggregate.uncommitted_events().len());
    let mut version = current_version;

    for event in aggregate.uncommitted_events() {
        version = version.next();
        let envelope = EventEnvelope::builder()
            .entity_id(aggregate.id())
            .entity_type(R::entity_type())
            .event_type(event.event_type())
            .version(version)
            .payload(event)?
            .metadata(metadata.clone())
            .build();
        envelopes.push(envelope);
    }

    Ok(envelopes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{Account, AccountCommands, AccountReducer};
    use chrono::Utc;
    use event_store::{InMemoryEventStore, InMemorySnapshotStore};

    type TestRepository = AggregateRepository<AccountReducer, InMemoryEventStore, InMemorySnapshotStore>;

    fn repository() -> TestRepository {
        repository_with(RepositoryConfig::default())
    }

    fn repository_with(config: RepositoryConfig) -> TestRepository {
        AggregateRepository::with_config(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemorySnapshotStore::new()),
            config,
        )
    }

    /// A config that disables the cache so every load replays the log.
    fn uncached() -> RepositoryConfig {
        RepositoryConfig {
            cache_capacity: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn save_then_load_returns_saved_state() {
        let repo = repository();
        let id = EntityId::new();

        let account = Account::register(id, "a@example.com", "Alice", Utc::now()).unwrap();
        let saved = repo.save(account).await.unwrap();
        assert!(!saved.is_dirty());
        assert_eq!(saved.version(), Version::first());

        let loaded = repo.load(id).await.unwrap();
        assert_eq!(loaded.version(), saved.version());
        assert_eq!(loaded.state(), saved.state());
    }

    #[tokio::test]
    async fn load_unknown_entity_is_not_found() {
        let repo = repository();
        let result = repo.load(EntityId::new()).await;
        assert!(matches!(result, Err(RepositoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn load_replays_full_event_sequence() {
        let repo = repository_with(uncached());
        let id = EntityId::new();

        let mut account = Account::register(id, "a@example.com", "Alice", Utc::now()).unwrap();
        account.change_email("b@example.com", Utc::now()).unwrap();
        repo.save(account).await.unwrap();

        let mut more = repo.load(id).await.unwrap();
        more.update_profile("Alice B", Utc::now()).unwrap();
        let saved = repo.save(more).await.unwrap();

        // Uncached: this load folds all three events from the log.
        let replayed = repo.load(id).await.unwrap();
        assert_eq!(replayed.version(), Version::new(3));
        assert_eq!(replayed.state(), saved.state());
    }

    #[tokio::test]
    async fn concurrent_saves_with_same_expected_version_conflict() {
        let repo = repository();
        let id = EntityId::new();

        let account = Account::register(id, "a@example.com", "Alice", Utc::now()).unwrap();
        repo.save(account).await.unwrap();

        // Two writers both computed against version 1.
        let mut first = repo.load(id).await.unwrap();
        let mut second = repo.load(id).await.unwrap();
        first.change_email("first@example.com", Utc::now()).unwrap();
        second.change_email("second@example.com", Utc::now()).unwrap();

        let winner = repo.save(first).await.unwrap();
        assert_eq!(winner.version(), Version::new(2));

        let result = repo.save(second).await;
        match result {
            Err(RepositoryError::EventStore(
                event_store::EventStoreError::ConcurrencyConflict {
                    expected, actual, ..
                },
            )) => {
                assert_eq!(expected, Version::first());
                assert_eq!(actual, Version::new(2));
            }
            other => panic!("expected concurrency conflict, got {other:?}"),
        }

        // The loser reloads and observes the winner's state.
        let reloaded = repo.load(id).await.unwrap();
        assert_eq!(
            reloaded.state().as_active().unwrap().email,
            "first@example.com"
        );
    }

    #[tokio::test]
    async fn clean_aggregate_save_is_a_no_op() {
        let repo = repository();
        let id = EntityId::new();

        let account = Account::register(id, "a@example.com", "Alice", Utc::now()).unwrap();
        let saved = repo.save(account).await.unwrap();

        let again = repo.save(saved.clone()).await.unwrap();
        assert_eq!(again.version(), saved.version());
        assert_eq!(repo.event_store().event_count().await, 1);
    }

    #[tokio::test]
    async fn snapshot_persisted_when_interval_crossed() {
        let snapshots = Arc::new(InMemorySnapshotStore::new());
        let repo: TestRepository = AggregateRepository::with_config(
            Arc::new(InMemoryEventStore::new()),
            Arc::clone(&snapshots),
            RepositoryConfig {
                snapshot_interval: 10,
                ..uncached()
            },
        );
        let id = EntityId::new();

        let account = Account::register(id, "a@example.com", "Alice", Utc::now()).unwrap();
        repo.save(account).await.unwrap();

        for i in 2..=12 {
            let mut account = repo.load(id).await.unwrap();
            account
                .update_profile(format!("Alice v{i}"), Utc::now())
                .unwrap();
            repo.save(account).await.unwrap();
        }

        // Snapshot writes are spawned; give them a beat to land.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let snapshot = snapshots.load(id).await.unwrap().expect("snapshot saved");
        assert_eq!(snapshot.version, Version::new(10));

        // Load seeded from the snapshot must equal a full replay.
        let loaded = repo.load(id).await.unwrap();
        assert_eq!(loaded.version(), Version::new(12));
        assert_eq!(
            loaded.state().as_active().unwrap().display_name,
            "Alice v12"
        );
    }

    #[tokio::test]
    async fn snapshot_disabled_with_zero_interval() {
        let snapshots = Arc::new(InMemorySnapshotStore::new());
        let repo: TestRepository = AggregateRepository::with_config(
            Arc::new(InMemoryEventStore::new()),
            Arc::clone(&snapshots),
            RepositoryConfig {
                snapshot_interval: 0,
                ..Default::default()
            },
        );
        let id = EntityId::new();

        let mut account = Account::register(id, "a@example.com", "Alice", Utc::now()).unwrap();
        for i in 0..20 {
            account.update_profile(format!("v{i}"), Utc::now()).unwrap();
        }
        repo.save(account).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(snapshots.snapshot_count().await, 0);
    }

    #[tokio::test]
    async fn tombstoned_entity_still_loads() {
        let repo = repository_with(uncached());
        let id = EntityId::new();

        let mut account = Account::register(id, "a@example.com", "Alice", Utc::now()).unwrap();
        account.close(Some("requested".to_string()), Utc::now()).unwrap();
        repo.save(account).await.unwrap();

        let loaded = repo.load(id).await.unwrap();
        assert!(loaded.state().is_tombstoned());
        assert_eq!(loaded.version(), Version::new(2));
    }

    #[tokio::test]
    async fn batch_save_crossing_interval_snapshots_at_new_version() {
        let snapshots = Arc::new(InMemorySnapshotStore::new());
        let repo: TestRepository = AggregateRepository::with_config(
            Arc::new(InMemoryEventStore::new()),
            Arc::clone(&snapshots),
            RepositoryConfig {
                snapshot_interval: 3,
                ..Default::default()
            },
        );
        let id = EntityId::new();

        let mut account = Account::register(id, "a@example.com", "Alice", Utc::now()).unwrap();
        account.change_email("b@example.com", Utc::now()).unwrap();
        account.update_profile("Alice B", Utc::now()).unwrap();
        account.update_profile("Alice C", Utc::now()).unwrap();
        repo.save(account).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let snapshot = snapshots.load(id).await.unwrap().expect("snapshot saved");
        assert_eq!(snapshot.version, Version::new(4));
    }
}
