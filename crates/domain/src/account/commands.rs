//! Command helpers producing account events.
//!
//! Validation here is state-based only (can this transition happen at
//! all); business rules beyond that belong to the command-handling
//! layer above this engine.

use chrono::{DateTime, Utc};
use common::EntityId;
use thiserror::Error;

use crate::aggregate::Aggregate;

use super::events::{
    AccountEvent, ClosedData, EmailChangedData, ProfileUpdatedData, RegisteredData,
};
use super::reducer::AccountReducer;

/// Errors from account command helpers.
#[derive(Debug, Error)]
pub enum AccountError {
    /// A creation was attempted on an entity that already has events.
    #[error("account is already registered")]
    AlreadyRegistered,

    /// A mutation was attempted before registration.
    #[error("account is not registered")]
    NotRegistered,

    /// A mutation was attempted on a closed account.
    #[error("account is closed")]
    Closed,

    /// The supplied email is not usable.
    #[error("invalid email: {0}")]
    InvalidEmail(String),
}

/// Commands on the account aggregate.
pub trait AccountCommands: Sized {
    /// Registers a new account, producing the creation event.
    fn register(
        id: EntityId,
        email: impl Into<String>,
        display_name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, AccountError>;

    /// Changes the login email.
    fn change_email(
        &mut self,
        email: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), AccountError>;

    /// Updates the display name.
    fn update_profile(
        &mut self,
        display_name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), AccountError>;

    /// Closes the account (soft delete).
    fn close(&mut self, reason: Option<String>, now: DateTime<Utc>) -> Result<(), AccountError>;
}

fn validate_email(email: &str) -> Result<(), AccountError> {
    if email.is_empty() || !email.contains('@') {
        return Err(AccountError::InvalidEmail(email.to_string()));
    }
    Ok(())
}

impl AccountCommands for Aggregate<AccountReducer> {
    fn register(
        id: EntityId,
        email: impl Into<String>,
        display_name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, AccountError> {
        let email = email.into();
        validate_email(&email)?;

        let mut aggregate = Aggregate::new(id);
        aggregate.record(AccountEvent::Registered(RegisteredData {
            email,
            display_name: display_name.into(),
            registered_at: now,
        }));
        Ok(aggregate)
    }

    fn change_email(
        &mut self,
        email: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), AccountError> {
        let email = email.into();
        validate_email(&email)?;
        ensure_active(self)?;

        self.record(AccountEvent::EmailChanged(EmailChangedData {
            email,
            changed_at: now,
        }));
        Ok(())
    }

    fn update_profile(
        &mut self,
        display_name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), AccountError> {
        ensure_active(self)?;

        self.record(AccountEvent::ProfileUpdated(ProfileUpdatedData {
            display_name: display_name.into(),
            updated_at: now,
        }));
        Ok(())
    }

    fn close(&mut self, reason: Option<String>, now: DateTime<Utc>) -> Result<(), AccountError> {
        ensure_active(self)?;

        self.record(AccountEvent::Closed(ClosedData {
            reason,
            closed_at: now,
        }));
        Ok(())
    }
}

fn ensure_active(aggregate: &Aggregate<AccountReducer>) -> Result<(), AccountError> {
    use crate::aggregate::Lifecycle;

    match aggregate.state() {
        Lifecycle::Active(_) => Ok(()),
        Lifecycle::Uninitialized => Err(AccountError::NotRegistered),
        Lifecycle::Tombstoned { .. } => Err(AccountError::Closed),
    }
}
