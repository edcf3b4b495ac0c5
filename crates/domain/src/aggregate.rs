//! Reducer trait, entity lifecycle, and the aggregate value type.

use chrono::{DateTime, Utc};
use common::EntityId;
use event_store::Version;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events represent facts that have happened to an entity.
/// They are immutable and should be named in past tense.
pub trait DomainEvent:
    Serialize + DeserializeOwned + Send + Sync + Clone + std::fmt::Debug
{
    /// Returns the event type name used for storage and dispatch.
    fn event_type(&self) -> &'static str;
}

/// The lifecycle of an entity's state.
///
/// Replaces nullable state: "doesn't exist yet" and "deleted" are
/// distinct variants. Deletion is a soft delete; the tombstone keeps the
/// last known state so history is never erased.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "lifecycle", content = "state")]
pub enum Lifecycle<T> {
    /// No creation event has been applied yet.
    Uninitialized,

    /// The entity exists.
    Active(T),

    /// The entity was deleted. Carries the last known state and the
    /// deletion metadata.
    Tombstoned {
        last: T,
        reason: Option<String>,
        deleted_at: DateTime<Utc>,
    },
}

// Manual impl: `T: Default` must not be required for the uninitialized
// variant.
impl<T> Default for Lifecycle<T> {
    fn default() -> Self {
        Lifecycle::Uninitialized
    }
}

impl<T> Lifecycle<T> {
    /// Returns true if a creation event has been applied and the entity
    /// has not been tombstoned.
    pub fn is_active(&self) -> bool {
        matches!(self, Lifecycle::Active(_))
    }

    /// Returns true if the entity was deleted.
    pub fn is_tombstoned(&self) -> bool {
        matches!(self, Lifecycle::Tombstoned { .. })
    }

    /// Returns the active state, if any.
    pub fn as_active(&self) -> Option<&T> {
        match self {
            Lifecycle::Active(state) => Some(state),
            _ => None,
        }
    }
}

/// A pure fold over one entity kind's events.
///
/// `reduce` must be total over the kind's closed event enum (exhaustive
/// matching makes a new event kind a compile-time-checked change) and
/// free of captured dependencies: ids, clocks and everything else arrive
/// inside the event.
pub trait Reducer: Send + Sync + 'static {
    /// The entity's reduced state inside [`Lifecycle`].
    type State: Clone
        + Send
        + Sync
        + Serialize
        + DeserializeOwned
        + std::fmt::Debug;

    /// The closed set of events this entity kind can produce.
    type Event: DomainEvent;

    /// Returns the entity kind name (e.g., "Account").
    fn entity_type() -> &'static str;

    /// Folds one event into the prior state, producing the next state.
    ///
    /// Creation events transition `Uninitialized -> Active`; deletion
    /// events transition `Active -> Tombstoned`.
    fn reduce(state: Lifecycle<Self::State>, event: &Self::Event) -> Lifecycle<Self::State>;
}

/// An in-memory aggregate: the reconstructed state of one entity plus
/// its pending, not-yet-persisted events.
///
/// Immutable except for the controlled transitions of recording
/// uncommitted events and clearing them once durably stored.
pub struct Aggregate<R: Reducer> {
    id: EntityId,
    state: Lifecycle<R::State>,
    version: Version,
    uncommitted: Vec<R::Event>,
}

impl<R: Reducer> Aggregate<R> {
    /// Creates a brand-new, uninitialized aggregate at version 0.
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            state: Lifecycle::Uninitialized,
            version: Version::initial(),
            uncommitted: Vec::new(),
        }
    }

    /// Reconstructs an aggregate from already-committed state, e.g. a
    /// snapshot. `version` must be the number of events folded into
    /// `state`.
    pub fn from_parts(id: EntityId, state: Lifecycle<R::State>, version: Version) -> Self {
        Self {
            id,
            state,
            version,
            uncommitted: Vec::new(),
        }
    }

    /// Folds one committed event into the state, advancing the version
    /// without tracking it as uncommitted. Used during replay.
    pub fn apply_committed(&mut self, event: &R::Event) {
        self.state = R::reduce(std::mem::take(&mut self.state), event);
        self.version = self.version.next();
    }

    /// Records a new event: folds it into the state and tracks it as
    /// uncommitted until a save persists it.
    pub fn record(&mut self, event: R::Event) {
        self.state = R::reduce(std::mem::take(&mut self.state), &event);
        self.version = self.version.next();
        self.uncommitted.push(event);
    }

    /// Clears the uncommitted events after they have been durably stored.
    pub fn mark_committed(&mut self) {
        self.uncommitted.clear();
    }

    /// The entity this aggregate reconstructs.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// The current lifecycle state.
    pub fn state(&self) -> &Lifecycle<R::State> {
        &self.state
    }

    /// The number of events folded into the state, committed or not.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Events recorded by the current operation, not yet persisted.
    pub fn uncommitted_events(&self) -> &[R::Event] {
        &self.uncommitted
    }

    /// Returns true if there are uncommitted events to persist.
    pub fn is_dirty(&self) -> bool {
        !self.uncommitted.is_empty()
    }

    /// The version the entity must be at in the log for a save of this
    /// aggregate to win: the version before the uncommitted events.
    pub fn expected_version(&self) -> Version {
        Version::new(self.version.as_u64() - self.uncommitted.len() as u64)
    }
}

impl<R: Reducer> Clone for Aggregate<R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            state: self.state.clone(),
            version: self.version,
            uncommitted: self.uncommitted.clone(),
        }
    }
}

impl<R: Reducer> std::fmt::Debug for Aggregate<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregate")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("version", &self.version)
            .field("uncommitted", &self.uncommitted.len())
            .finish()
    }
}
