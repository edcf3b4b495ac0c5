//! Aggregates, reducers, and the aggregate repository.
//!
//! This crate provides the write side of the engine:
//! - [`Reducer`] — the pure fold `(state, event) -> state` per entity kind
//! - [`Lifecycle`] — explicit Uninitialized/Active/Tombstoned state
//! - [`Aggregate`] — reconstructed state plus uncommitted events
//! - [`AggregateRepository`] — load/save with optimistic concurrency,
//!   TTL caching, per-entity locking, and interval snapshotting
//! - an account entity kind exercising all of the above

pub mod account;
pub mod aggregate;
pub mod cache;
pub mod error;
pub mod lock;
pub mod repository;

pub use account::{Account, AccountCommands, AccountError, AccountEvent, AccountReducer, AccountState};
pub use aggregate::{Aggregate, DomainEvent, Lifecycle, Reducer};
pub use cache::AggregateCache;
pub use error::{RepositoryError, Result};
pub use lock::EntityLocks;
pub use repository::{AggregateRepository, RepositoryConfig};
