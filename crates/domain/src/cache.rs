//! Time-bounded aggregate cache.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use common::EntityId;
use tokio::sync::RwLock;

use crate::aggregate::{Aggregate, Reducer};

struct CacheEntry<R: Reducer> {
    aggregate: Aggregate<R>,
    inserted_at: Instant,
}

/// Bounded cache of reconstructed aggregates with TTL eviction.
///
/// Purely an accelerator: the event log remains authoritative, so
/// eviction never causes data loss.
pub struct AggregateCache<R: Reducer> {
    entries: RwLock<HashMap<EntityId, CacheEntry<R>>>,
    ttl: Duration,
    capacity: usize,
}

impl<R: Reducer> AggregateCache<R> {
    /// Creates a cache with the given TTL and maximum entry count.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            capacity,
        }
    }

    /// Returns the cached aggregate for `entity_id` if present and fresh.
    /// A stale entry is removed on access.
    pub async fn get(&self, entity_id: EntityId) -> Option<Aggregate<R>> {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(&entity_id) {
                if entry.inserted_at.elapsed() < self.ttl {
                    metrics::counter!("aggregate_cache_hits").increment(1);
                    return Some(entry.aggregate.clone());
                }
            } else {
                metrics::counter!("aggregate_cache_misses").increment(1);
                return None;
            }
        }

        // Entry exists but expired.
        self.entries.write().await.remove(&entity_id);
        metrics::counter!("aggregate_cache_misses").increment(1);
        None
    }

    /// Inserts or refreshes the cache entry for an aggregate.
    pub async fn insert(&self, aggregate: Aggregate<R>) {
        if self.capacity == 0 {
            return;
        }

        let mut entries = self.entries.write().await;
        let entity_id = aggregate.id();

        if !entries.contains_key(&entity_id) && entries.len() >= self.capacity {
            let ttl = self.ttl;
            entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);

            if entries.len() >= self.capacity {
                // Still full: evict the oldest entry.
                if let Some(&oldest) = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.inserted_at)
                    .map(|(id, _)| id)
                {
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(
            entity_id,
            CacheEntry {
                aggregate,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Removes the entry for an entity, if any.
    pub async fn invalidate(&self, entity_id: EntityId) {
        self.entries.write().await.remove(&entity_id);
    }

    /// Returns the number of cached entries, including stale ones not
    /// yet evicted.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
