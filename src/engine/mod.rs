mod accounts;
mod badges;
mod error;
mod journal;
mod ledger;
mod listings;
mod scheduling;
mod store;

pub use badges::{BADGE_RULES, BadgeRule, Counter};
pub use error::EngineError;
pub use journal::{Journal, WalJournal};
pub use store::{InMemoryStore, SharedAccount, SharedTransaction};

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;

use store::{apply_to_account, apply_to_transaction};

/// Result of a single-record conditional update. Both arms carry the record
/// as it stands after the attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conditional<T> {
    Applied(T),
    /// Precondition was false; nothing was written.
    NoMatch(T),
}

pub struct Engine {
    pub(super) store: InMemoryStore,
    pub(super) journal: Arc<dyn Journal>,
    pub notify: Arc<NotifyHub>,
    /// Writers hold a read guard across each journal append and the store
    /// change it records; compaction holds the write guard, so a snapshot
    /// sees both or neither. Always acquired before any record lock, and
    /// never twice by one task.
    compaction_gate: RwLock<()>,
}

impl Engine {
    /// Open the WAL at `wal_path`, replay it and start the group-commit writer.
    pub fn new(wal_path: &Path, notify: Arc<NotifyHub>) -> std::io::Result<Self> {
        let (journal, history) = WalJournal::open(wal_path)?;
        Ok(Self::with_journal(Arc::new(journal), &history, notify))
    }

    /// Build an engine over any journal, replaying `history` first.
    pub fn with_journal(journal: Arc<dyn Journal>, history: &[Event], notify: Arc<NotifyHub>) -> Self {
        let store = InMemoryStore::new();
        for event in history {
            store.replay_event(event);
        }
        tracing::debug!("replayed {} journal events", history.len());
        Self {
            store,
            journal,
            notify,
            compaction_gate: RwLock::new(()),
        }
    }

    /// Atomic conditional update of one account: check `precondition` and, if
    /// it holds, journal and apply `event` without releasing the record lock.
    pub(super) async fn update_account_if(
        &self,
        id: Ulid,
        precondition: impl FnOnce(&Account) -> bool,
        event: Event,
    ) -> Result<Conditional<Account>, EngineError> {
        let _gate = self.write_gate().await;
        let shared = self.store.get_account(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = shared.write().await;
        if !precondition(&*guard) {
            return Ok(Conditional::NoMatch(guard.clone()));
        }
        self.journal.append(&event).await?;
        apply_to_account(&mut guard, &event);
        Ok(Conditional::Applied(guard.clone()))
    }

    /// Unconditional field delta on one account.
    pub(super) async fn adjust_account(&self, id: Ulid, delta: AccountDelta) -> Result<Account, EngineError> {
        let event = Event::AccountAdjusted { id, delta };
        match self.update_account_if(id, |_| true, event).await? {
            Conditional::Applied(account) | Conditional::NoMatch(account) => Ok(account),
        }
    }

    /// Transaction counterpart of [`Engine::update_account_if`].
    pub(super) async fn update_transaction_if(
        &self,
        id: Ulid,
        precondition: impl FnOnce(&Transaction) -> bool,
        event: Event,
    ) -> Result<Conditional<Transaction>, EngineError> {
        let _gate = self.write_gate().await;
        let shared = self
            .store
            .get_transaction(&id)
            .ok_or(EngineError::NotFound(id))?;
        let mut guard = shared.write().await;
        if !precondition(&*guard) {
            return Ok(Conditional::NoMatch(guard.clone()));
        }
        self.journal.append(&event).await?;
        apply_to_transaction(&mut guard, &event);
        Ok(Conditional::Applied(guard.clone()))
    }

    /// Read side of the compaction gate. Hold it from the first store change
    /// through the journal append (and any rollback) of an unlocked record.
    pub(super) async fn write_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.compaction_gate.read().await
    }

    pub async fn account(&self, id: Ulid) -> Option<Account> {
        let shared = self.store.get_account(&id)?;
        let guard = shared.read().await;
        Some(guard.clone())
    }

    pub async fn transaction(&self, id: Ulid) -> Option<Transaction> {
        let shared = self.store.get_transaction(&id)?;
        let guard = shared.read().await;
        Some(guard.clone())
    }

    /// Every transaction where the account is sender or receiver, newest first.
    pub async fn transactions_for(&self, account_id: Ulid) -> Vec<Transaction> {
        let mut out = Vec::new();
        for id in self.store.transaction_ids_for(&account_id) {
            if let Some(tx) = self.transaction(id).await {
                out.push(tx);
            }
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        out
    }

    /// Rewrite the journal as one snapshot event per live record.
    pub async fn compact_journal(&self) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.write().await;
        let mut events = Vec::new();
        for shared in self.store.all_accounts() {
            events.push(Event::AccountRegistered(shared.read().await.clone()));
        }
        for listing in self.store.all_listings() {
            events.push(Event::ListingCreated(listing));
        }
        for shared in self.store.all_transactions() {
            events.push(Event::TransactionCreated(shared.read().await.clone()));
        }
        let count = events.len();
        self.journal.compact(events).await?;
        tracing::info!("compacted journal to {count} records");
        Ok(())
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        self.journal.appends_since_compact().await
    }
}
