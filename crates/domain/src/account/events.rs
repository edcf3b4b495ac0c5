//! Account domain events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

/// Events that can occur on an account entity.
///
/// A closed enum: the reducer and every projection handler match it
/// exhaustively, so adding a kind is a compile-time-checked change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum AccountEvent {
    /// The account was registered (creation event).
    Registered(RegisteredData),

    /// The account's email address was changed.
    EmailChanged(EmailChangedData),

    /// The display name was updated.
    ProfileUpdated(ProfileUpdatedData),

    /// The account was closed (tombstone event).
    Closed(ClosedData),
}

impl DomainEvent for AccountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AccountEvent::Registered(_) => "AccountRegistered",
            AccountEvent::EmailChanged(_) => "AccountEmailChanged",
            AccountEvent::ProfileUpdated(_) => "AccountProfileUpdated",
            AccountEvent::Closed(_) => "AccountClosed",
        }
    }
}

/// Data for the Registered event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredData {
    /// Login email, unique across accounts.
    pub email: String,

    /// Human-readable name.
    pub display_name: String,

    /// When the account was registered.
    pub registered_at: DateTime<Utc>,
}

/// Data for the EmailChanged event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailChangedData {
    /// The new email address.
    pub email: String,

    /// When the change happened.
    pub changed_at: DateTime<Utc>,
}

/// Data for the ProfileUpdated event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileUpdatedData {
    /// The new display name.
    pub display_name: String,

    /// When the update happened.
    pub updated_at: DateTime<Utc>,
}

/// Data for the Closed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedData {
    /// Optional operator-supplied reason.
    pub reason: Option<String>,

    /// When the account was closed.
    pub closed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_names() {
        let event = AccountEvent::Registered(RegisteredData {
            email: "a@example.com".to_string(),
            display_name: "A".to_string(),
            registered_at: Utc::now(),
        });
        assert_eq!(event.event_type(), "AccountRegistered");

        let event = AccountEvent::Closed(ClosedData {
            reason: None,
            closed_at: Utc::now(),
        });
        assert_eq!(event.event_type(), "AccountClosed");
    }

    #[test]
    fn serialization_uses_tagged_form() {
        let event = AccountEvent::EmailChanged(EmailChangedData {
            email: "new@example.com".to_string(),
            changed_at: Utc::now(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "EmailChanged");
        assert_eq!(json["data"]["email"], "new@example.com");
    }

    #[test]
    fn unknown_event_type_fails_deserialization() {
        let json = serde_json::json!({"type": "AccountSuspended", "data": {}});
        let result: Result<AccountEvent, _> = serde_json::from_value(json);
        assert!(result.is_err());
    }
}
