//! Reduced account state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The reduced state of an active account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    /// Current login email.
    pub email: String,

    /// Current display name.
    pub display_name: String,

    /// When the account was registered.
    pub registered_at: DateTime<Utc>,

    /// When the account last changed.
    pub updated_at: DateTime<Utc>,
}
