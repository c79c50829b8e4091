use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Conditional, Engine, EngineError};

impl Engine {
    /// Open a new account with the starting credit grant.
    pub async fn register_account(&self, id: Ulid, name: String) -> Result<Account, EngineError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(EngineError::InvalidOperation("name is required"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("name too long"));
        }
        if self.store.account_count() >= MAX_ACCOUNTS {
            return Err(EngineError::LimitExceeded("too many accounts"));
        }

        let account = Account::new(id, name, STARTING_CREDITS, now_ms());
        let _gate = self.write_gate().await;
        // Claim the id in memory first so a duplicate can't reach the journal.
        if !self.store.insert_account(account.clone()) {
            return Err(EngineError::AlreadyExists(id));
        }
        if let Err(e) = self
            .journal
            .append(&Event::AccountRegistered(account.clone()))
            .await
        {
            self.store.remove_account(&id);
            return Err(e);
        }

        info!("registered account {id} with {} credits", account.balance);
        Ok(account)
    }

    /// Replace the free-text scheduling preference. Blank clears it.
    pub async fn update_preference(
        &self,
        id: Ulid,
        preferred_hours: Option<String>,
    ) -> Result<Account, EngineError> {
        self.update_profile(id, None, Some(preferred_hours.unwrap_or_default()))
            .await
    }

    /// Edit the display name and/or the scheduling preference. `None` leaves a
    /// field as it is; a blank preference clears it.
    ///
    /// Goes through the account's record lock, so it serializes with ledger
    /// mutations on the same account.
    pub async fn update_profile(
        &self,
        id: Ulid,
        name: Option<String>,
        preferred_hours: Option<String>,
    ) -> Result<Account, EngineError> {
        if name.is_none() && preferred_hours.is_none() {
            return Err(EngineError::InvalidOperation("nothing to update"));
        }
        let name = name.map(|n| n.trim().to_string());
        if let Some(n) = &name {
            if n.is_empty() {
                return Err(EngineError::InvalidOperation("name is required"));
            }
            if n.len() > MAX_NAME_LEN {
                return Err(EngineError::LimitExceeded("name too long"));
            }
        }
        let preferred_hours = preferred_hours.map(|p| {
            let p = p.trim().to_string();
            (!p.is_empty()).then_some(p)
        });
        if let Some(Some(p)) = &preferred_hours
            && p.chars().count() > MAX_PREFERENCE_LEN
        {
            return Err(EngineError::LimitExceeded("preference too long"));
        }

        let event = Event::ProfileUpdated {
            id,
            name,
            preferred_hours,
        };
        match self.update_account_if(id, |_| true, event).await? {
            Conditional::Applied(account) | Conditional::NoMatch(account) => Ok(account),
        }
    }

    /// Top accounts by sessions taught, most first. Ties go to the older
    /// account. Balances and preferences stay private.
    pub async fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        let limit = limit.min(MAX_LEADERBOARD_SIZE);
        let mut accounts = Vec::with_capacity(self.store.account_count());
        for shared in self.store.all_accounts() {
            accounts.push(shared.read().await.clone());
        }
        accounts.sort_by(|a, b| {
            b.stats
                .classes_taught
                .cmp(&a.stats.classes_taught)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        accounts.iter().take(limit).map(LeaderboardEntry::from).collect()
    }
}
