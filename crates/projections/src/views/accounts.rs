//! Accounts read model: primary map, email lookup index, and stats.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::EntityId;
use domain::AccountEvent;
use event_store::EventEnvelope;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::projection::Projection;

/// Query-side view of one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountDto {
    pub entity_id: EntityId,
    pub email: String,
    pub display_name: String,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed: bool,
    pub closed_reason: Option<String>,
}

/// Aggregate statistics over the accounts view.
///
/// Recomputed from the primary map on every apply rather than
/// incremented, so re-delivered events cannot skew the counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountStats {
    pub total: usize,
    pub active: usize,
    pub closed: usize,
}

/// The accounts projection state.
///
/// External readers receive clones of this value via the processor;
/// the processor owns the only mutable copy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountsViewState {
    accounts: HashMap<EntityId, AccountDto>,
    email_index: HashMap<String, EntityId>,
    stats: AccountStats,
}

impl AccountsViewState {
    /// Gets an account by id.
    pub fn get(&self, entity_id: EntityId) -> Option<&AccountDto> {
        self.accounts.get(&entity_id)
    }

    /// Looks up an account by its current email.
    pub fn find_by_email(&self, email: &str) -> Option<&AccountDto> {
        self.email_index
            .get(email)
            .and_then(|id| self.accounts.get(id))
    }

    /// All accounts, closed ones included.
    pub fn all(&self) -> impl Iterator<Item = &AccountDto> {
        self.accounts.values()
    }

    /// Current statistics.
    pub fn stats(&self) -> &AccountStats {
        &self.stats
    }

    /// Number of accounts in the view.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Returns true if the view holds no accounts.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    fn recompute_stats(&mut self) {
        let closed = self.accounts.values().filter(|a| a.closed).count();
        self.stats = AccountStats {
            total: self.accounts.len(),
            active: self.accounts.len() - closed,
            closed,
        };
    }
}

/// Folds account events into [`AccountsViewState`].
///
/// Handlers upsert by entity id, so re-applying a tail of events after
/// a checkpoint restart leaves the state unchanged.
pub struct AccountsProjection;

impl Projection for AccountsProjection {
    type State = AccountsViewState;

    fn projection_id(&self) -> &'static str {
        "accounts"
    }

    fn apply(&self, mut state: AccountsViewState, event: &EventEnvelope) -> Result<AccountsViewState> {
        if event.entity_type != "Account" {
            return Ok(state);
        }

        let account_event: AccountEvent = serde_json::from_value(event.payload.clone())?;
        let entity_id = event.entity_id;

        match account_event {
            AccountEvent::Registered(data) => {
                state.email_index.insert(data.email.clone(), entity_id);
                state.accounts.insert(
                    entity_id,
                    AccountDto {
                        entity_id,
                        email: data.email,
                        display_name: data.display_name,
                        registered_at: data.registered_at,
                        updated_at: data.registered_at,
                        closed: false,
                        closed_reason: None,
                    },
                );
            }
            AccountEvent::EmailChanged(data) => {
                if let Some(account) = state.accounts.get_mut(&entity_id) {
                    state.email_index.remove(&account.email);
                    state.email_index.insert(data.email.clone(), entity_id);
                    account.email = data.email;
                    account.updated_at = data.changed_at;
                }
            }
            AccountEvent::ProfileUpdated(data) => {
                if let Some(account) = state.accounts.get_mut(&entity_id) {
                    account.display_name = data.display_name;
                    account.updated_at = data.updated_at;
                }
            }
            AccountEvent::Closed(data) => {
                if let Some(account) = state.accounts.get_mut(&entity_id) {
                    state.email_index.remove(&account.email);
                    account.closed = true;
                    account.closed_reason = data.reason;
                    account.updated_at = data.closed_at;
                }
            }
        }

        state.recompute_stats();
        Ok(state)
    }
}
