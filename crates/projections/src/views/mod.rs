//! Concrete read-model views.

pub mod accounts;

pub use accounts::{AccountDto, AccountStats, AccountsProjection, AccountsViewState};
