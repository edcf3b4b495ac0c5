//! Core projection trait.

use event_store::EventEnvelope;
use serde::{Serialize, de::DeserializeOwned};

use crate::Result;

/// A pure fold of the global event order into a read-optimized state.
///
/// Handlers receive the prior state and one event and return the next
/// state; they must be pure given `(state, event)`. Because checkpoints
/// are periodic rather than per-event, a restart can re-deliver events
/// already applied, so handlers must be safe to re-apply (keyed upserts;
/// derived statistics recomputed, never incremented).
pub trait Projection: Send + Sync + 'static {
    /// The read-model state this projection maintains.
    type State: Clone + Default + Send + Sync + Serialize + DeserializeOwned + std::fmt::Debug;

    /// Stable identifier used to key checkpoints.
    fn projection_id(&self) -> &'static str;

    /// Folds one event into the state.
    fn apply(&self, state: Self::State, event: &EventEnvelope) -> Result<Self::State>;
}
