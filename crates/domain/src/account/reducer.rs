//! The pure fold for the account entity kind.

use crate::aggregate::{Lifecycle, Reducer};

use super::events::AccountEvent;
use super::state::AccountState;

/// Folds account events into [`AccountState`].
pub struct AccountReducer;

impl Reducer for AccountReducer {
    type State = AccountState;
    type Event = AccountEvent;

    fn entity_type() -> &'static str {
        "Account"
    }

    fn reduce(state: Lifecycle<AccountState>, event: &AccountEvent) -> Lifecycle<AccountState> {
        match event {
            AccountEvent::Registered(data) => Lifecycle::Active(AccountState {
                email: data.email.clone(),
                display_name: data.display_name.clone(),
                registered_at: data.registered_at,
                updated_at: data.registered_at,
            }),
            AccountEvent::EmailChanged(data) => match state {
                Lifecycle::Active(mut account) => {
                    account.email = data.email.clone();
                    account.updated_at = data.changed_at;
                    Lifecycle::Active(account)
                }
                other => other,
            },
            AccountEvent::ProfileUpdated(data) => match state {
                Lifecycle::Active(mut account) => {
                    account.display_name = data.display_name.clone();
                    account.updated_at = data.updated_at;
                    Lifecycle::Active(account)
                }
                other => other,
            },
            AccountEvent::Closed(data) => match state {
                Lifecycle::Active(account) => Lifecycle::Tombstoned {
                    last: account,
                    reason: data.reason.clone(),
                    deleted_at: data.closed_at,
                },
                other => other,
            },
        }
    }
}
