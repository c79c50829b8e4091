use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

pub type SharedAccount = Arc<RwLock<Account>>;
pub type SharedTransaction = Arc<RwLock<Transaction>>;

/// The three record collections plus their secondary indexes.
///
/// Accounts and transactions sit behind per-record locks because the ledger
/// mutates them; listings are immutable once created.
pub struct InMemoryStore {
    accounts: DashMap<Ulid, SharedAccount>,
    listings: DashMap<Ulid, Listing>,
    transactions: DashMap<Ulid, SharedTransaction>,
    /// teacher → listing ids
    teacher_listings: DashMap<Ulid, Vec<Ulid>>,
    /// account → transaction ids where it is sender or receiver
    account_transactions: DashMap<Ulid, Vec<Ulid>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            listings: DashMap::new(),
            transactions: DashMap::new(),
            teacher_listings: DashMap::new(),
            account_transactions: DashMap::new(),
        }
    }

    // ── Accounts ─────────────────────────────────────────────

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn get_account(&self, id: &Ulid) -> Option<SharedAccount> {
        self.accounts.get(id).map(|e| e.value().clone())
    }

    /// Insert unless present. Returns false if the id is taken.
    pub fn insert_account(&self, account: Account) -> bool {
        match self.accounts.entry(account.id) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(RwLock::new(account)));
                true
            }
        }
    }

    pub fn remove_account(&self, id: &Ulid) {
        self.accounts.remove(id);
    }

    pub fn all_accounts(&self) -> Vec<SharedAccount> {
        self.accounts.iter().map(|e| e.value().clone()).collect()
    }

    // ── Listings ─────────────────────────────────────────────

    pub fn get_listing(&self, id: &Ulid) -> Option<Listing> {
        self.listings.get(id).map(|e| e.value().clone())
    }

    pub fn insert_listing(&self, listing: Listing) {
        self.teacher_listings
            .entry(listing.teacher_id)
            .or_default()
            .push(listing.id);
        self.listings.insert(listing.id, listing);
    }

    pub fn remove_listing(&self, id: &Ulid) -> Option<Listing> {
        let (_, listing) = self.listings.remove(id)?;
        if let Some(mut ids) = self.teacher_listings.get_mut(&listing.teacher_id) {
            ids.retain(|l| l != id);
        }
        Some(listing)
    }

    pub fn listing_count_for(&self, teacher_id: &Ulid) -> usize {
        self.teacher_listings
            .get(teacher_id)
            .map_or(0, |ids| ids.len())
    }

    pub fn listings_for(&self, teacher_id: &Ulid) -> Vec<Listing> {
        let ids = self
            .teacher_listings
            .get(teacher_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        ids.iter().filter_map(|id| self.get_listing(id)).collect()
    }

    pub fn all_listings(&self) -> Vec<Listing> {
        self.listings.iter().map(|e| e.value().clone()).collect()
    }

    // ── Transactions ─────────────────────────────────────────

    pub fn get_transaction(&self, id: &Ulid) -> Option<SharedTransaction> {
        self.transactions.get(id).map(|e| e.value().clone())
    }

    pub fn insert_transaction(&self, tx: Transaction) {
        for party in [tx.sender_id, tx.receiver_id] {
            self.account_transactions.entry(party).or_default().push(tx.id);
        }
        self.transactions.insert(tx.id, Arc::new(RwLock::new(tx)));
    }

    pub fn transaction_ids_for(&self, account_id: &Ulid) -> Vec<Ulid> {
        self.account_transactions
            .get(account_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    pub fn all_transactions(&self) -> Vec<SharedTransaction> {
        self.transactions.iter().map(|e| e.value().clone()).collect()
    }

    // ── Event application ────────────────────────────────────

    /// Apply a replayed event. Caller must be the only user of the store
    /// (startup), so record locks are uncontended.
    pub fn replay_event(&self, event: &Event) {
        match event {
            Event::AccountRegistered(account) => {
                self.accounts
                    .insert(account.id, Arc::new(RwLock::new(account.clone())));
            }
            Event::ListingCreated(listing) => self.insert_listing(listing.clone()),
            Event::ListingDeleted { id, .. } => {
                self.remove_listing(id);
            }
            Event::TransactionCreated(tx) => {
                if !self.transactions.contains_key(&tx.id) {
                    self.insert_transaction(tx.clone());
                }
            }
            Event::AccountAdjusted { id, .. }
            | Event::BadgeAwarded { account_id: id, .. }
            | Event::ProfileUpdated { id, .. } => {
                if let Some(account) = self.get_account(id)
                    && let Ok(mut guard) = account.try_write()
                {
                    apply_to_account(&mut guard, event);
                }
            }
            Event::TransactionCompleted { id, .. }
            | Event::AppointmentProposed { id, .. }
            | Event::AppointmentAccepted { id, .. }
            | Event::AppointmentRejected { id, .. } => {
                if let Some(tx) = self.get_transaction(id)
                    && let Ok(mut guard) = tx.try_write()
                {
                    apply_to_transaction(&mut guard, event);
                }
            }
        }
    }
}

/// Apply an account event to a locked record.
pub(crate) fn apply_to_account(account: &mut Account, event: &Event) {
    match event {
        Event::AccountAdjusted { delta, .. } => account.apply_delta(delta),
        Event::BadgeAwarded { badge, .. } => {
            if !account.has_badge(&badge.name) {
                account.badges.push(badge.clone());
            }
        }
        Event::ProfileUpdated {
            name,
            preferred_hours,
            ..
        } => {
            if let Some(name) = name {
                account.name = name.clone();
            }
            if let Some(preferred_hours) = preferred_hours {
                account.preferred_hours = preferred_hours.clone();
            }
        }
        _ => {}
    }
}

/// Apply a transaction event to a locked record.
pub(crate) fn apply_to_transaction(tx: &mut Transaction, event: &Event) {
    match event {
        Event::TransactionCompleted { completed_at, .. } => {
            tx.status = TxStatus::Completed;
            tx.completed_at = Some(*completed_at);
        }
        Event::AppointmentProposed { proposed_by, date, .. } => {
            tx.appointment.state = AppointmentState::Proposed;
            tx.appointment.proposed_at = Some(*date);
            tx.appointment.proposed_by = Some(*proposed_by);
            tx.appointment.rejection_reason = None;
        }
        Event::AppointmentAccepted { scheduled_at, .. } => {
            tx.appointment.state = AppointmentState::Scheduled;
            tx.appointment.scheduled_at = Some(*scheduled_at);
        }
        Event::AppointmentRejected { reason, .. } => {
            tx.appointment.state = AppointmentState::Rejected;
            tx.appointment.rejection_reason = Some(reason.clone());
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_account_rejects_duplicate_id() {
        let store = InMemoryStore::new();
        let a = Account::new(Ulid::new(), "Ada".into(), 2, 0);
        assert!(store.insert_account(a.clone()));
        assert!(!store.insert_account(a));
        assert_eq!(store.account_count(), 1);
    }

    #[test]
    fn listings_indexed_by_teacher() {
        let store = InMemoryStore::new();
        let teacher = Ulid::new();
        let listing = Listing {
            id: Ulid::new(),
            teacher_id: teacher,
            title: "Guitar".into(),
            description: "Chords".into(),
            category: Category::Music,
            duration_minutes: 60,
            created_at: 0,
        };
        store.insert_listing(listing.clone());
        assert_eq!(store.listings_for(&teacher), vec![listing.clone()]);
        assert_eq!(store.listing_count_for(&teacher), 1);

        store.remove_listing(&listing.id);
        assert!(store.listings_for(&teacher).is_empty());
        assert!(store.get_listing(&listing.id).is_none());
    }

    #[test]
    fn transactions_indexed_for_both_parties() {
        let store = InMemoryStore::new();
        let (student, teacher) = (Ulid::new(), Ulid::new());
        let tx = Transaction::new(Ulid::new(), student, teacher, Ulid::new(), 0);
        store.insert_transaction(tx.clone());
        assert_eq!(store.transaction_ids_for(&student), vec![tx.id]);
        assert_eq!(store.transaction_ids_for(&teacher), vec![tx.id]);
        assert!(store.transaction_ids_for(&Ulid::new()).is_empty());
    }

    #[test]
    fn replay_rebuilds_records() {
        let store = InMemoryStore::new();
        let account = Account::new(Ulid::new(), "Ada".into(), 2, 0);
        let tx = Transaction::new(Ulid::new(), account.id, Ulid::new(), Ulid::new(), 0);

        store.replay_event(&Event::AccountRegistered(account.clone()));
        store.replay_event(&Event::AccountAdjusted {
            id: account.id,
            delta: AccountDelta::balance(-1),
        });
        store.replay_event(&Event::TransactionCreated(tx.clone()));
        store.replay_event(&Event::AppointmentProposed {
            id: tx.id,
            proposed_by: account.id,
            date: 1_000,
        });
        store.replay_event(&Event::TransactionCompleted { id: tx.id, completed_at: 5 });

        let a = store.get_account(&account.id).unwrap();
        assert_eq!(a.try_read().unwrap().balance, 1);
        let t = store.get_transaction(&tx.id).unwrap();
        let t = t.try_read().unwrap();
        assert_eq!(t.status, TxStatus::Completed);
        assert_eq!(t.appointment.state, AppointmentState::Proposed);
        assert_eq!(t.appointment.proposed_at, Some(1_000));
    }

    #[test]
    fn duplicate_badge_event_is_ignored() {
        let mut account = Account::new(Ulid::new(), "Ada".into(), 2, 0);
        let event = Event::BadgeAwarded {
            account_id: account.id,
            badge: Badge { name: "Teacher Rookie".into(), icon: "🎓".into(), earned_at: 1 },
        };
        apply_to_account(&mut account, &event);
        apply_to_account(&mut account, &event);
        assert_eq!(account.badges.len(), 1);
    }

    #[test]
    fn profile_update_touches_only_given_fields() {
        let mut account = Account::new(Ulid::new(), "Ada".into(), 2, 0);
        let id = account.id;
        apply_to_account(
            &mut account,
            &Event::ProfileUpdated { id, name: None, preferred_hours: Some(Some("evenings".into())) },
        );
        apply_to_account(
            &mut account,
            &Event::ProfileUpdated { id, name: Some("Ada L.".into()), preferred_hours: None },
        );
        assert_eq!(account.name, "Ada L.");
        assert_eq!(account.preferred_hours.as_deref(), Some("evenings"));

        apply_to_account(&mut account, &Event::ProfileUpdated { id, name: None, preferred_hours: Some(None) });
        assert_eq!(account.preferred_hours, None);
        assert_eq!(account.name, "Ada L.");
    }

    #[test]
    fn proposal_clears_previous_rejection() {
        let mut tx = Transaction::new(Ulid::new(), Ulid::new(), Ulid::new(), Ulid::new(), 0);
        let (id, proposer) = (tx.id, tx.receiver_id);
        apply_to_transaction(&mut tx, &Event::AppointmentRejected { id, reason: "busy".into() });
        assert_eq!(tx.appointment.rejection_reason.as_deref(), Some("busy"));

        apply_to_transaction(&mut tx, &Event::AppointmentProposed { id, proposed_by: proposer, date: 42 });
        assert_eq!(tx.appointment.state, AppointmentState::Proposed);
        assert_eq!(tx.appointment.rejection_reason, None);
    }
}
