//! Read models derived from the event log.
//!
//! This crate provides the query side of the engine:
//! - [`Projection`] — a pure fold of the global event order into a
//!   read-optimized state
//! - [`Checkpoint`] / [`CheckpointStore`] — durable progress markers
//!   persisted together with the state they describe
//! - [`ProjectionProcessor`] — a long-running subscriber that recovers
//!   from the last checkpoint, streams the log, and checkpoints
//!   periodically
//! - the accounts view exercising all of the above

pub mod checkpoint;
pub mod error;
pub mod processor;
pub mod projection;
pub mod views;

pub use checkpoint::{Checkpoint, CheckpointStore, InMemoryCheckpointStore};
pub use error::{CheckpointError, ProjectionError, Result};
pub use processor::{ProcessorStatus, ProjectionProcessor};
pub use projection::Projection;
pub use views::{AccountDto, AccountStats, AccountsProjection, AccountsViewState};
