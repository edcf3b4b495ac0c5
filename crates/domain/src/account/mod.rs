//! Account entity kind: the concrete domain exercising the engine.
//!
//! Deliberately small (registration, email change, profile update, and
//! soft-delete closure), just enough to drive the repository and the
//! projections end to end.

pub mod commands;
pub mod events;
pub mod reducer;
pub mod state;

pub use commands::{AccountCommands, AccountError};
pub use events::{
    AccountEvent, ClosedData, EmailChangedData, ProfileUpdatedData, RegisteredData,
};
pub use reducer::AccountReducer;
pub use state::AccountState;

use crate::aggregate::Aggregate;

/// An account aggregate.
pub type Account = Aggregate<AccountReducer>;
