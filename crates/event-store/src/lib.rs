//! Append-only event log and snapshot store.
//!
//! The log is the sole source of truth: per-entity event order is
//! enforced by expected-version checks at append time, and a store-wide
//! global sequence assigned at append provides the total order
//! projections consume. Snapshots are accelerators that can be discarded
//! and rebuilt without correctness loss.

pub mod error;
pub mod event;
pub mod memory;
pub mod snapshot;
pub mod store;

pub use common::EntityId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, EventMetadata, GlobalSequence, Version};
pub use memory::InMemoryEventStore;
pub use snapshot::{InMemorySnapshotStore, Snapshot, SnapshotError, SnapshotStore};
pub use store::{EventStore, EventStream, validate_events_for_append};
