use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, the only time type.
pub type Ms = i64;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

// ── Accounts ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub name: String,
    pub icon: String,
    pub earned_at: Ms,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStats {
    pub classes_taught: u32,
    pub classes_attended: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Ulid,
    pub name: String,
    /// Spendable time credits. Never negative.
    pub balance: u32,
    pub stats: AccountStats,
    /// Earned badges in award order. Names are unique.
    pub badges: Vec<Badge>,
    pub preferred_hours: Option<String>,
    pub created_at: Ms,
}

impl Account {
    pub fn new(id: Ulid, name: String, balance: u32, created_at: Ms) -> Self {
        Self {
            id,
            name,
            balance,
            stats: AccountStats::default(),
            badges: Vec::new(),
            preferred_hours: None,
            created_at,
        }
    }

    pub fn has_badge(&self, name: &str) -> bool {
        self.badges.iter().any(|b| b.name == name)
    }

    /// Apply a field delta. Callers check the precondition first; a delta that
    /// would take the balance below zero saturates at zero.
    pub fn apply_delta(&mut self, delta: &AccountDelta) {
        let balance = i64::from(self.balance) + delta.balance;
        self.balance = balance.clamp(0, i64::from(u32::MAX)) as u32;
        self.stats.classes_taught += delta.classes_taught;
        self.stats.classes_attended += delta.classes_attended;
    }
}

/// Public view of an account on the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub id: Ulid,
    pub name: String,
    pub stats: AccountStats,
    pub badges: Vec<Badge>,
}

impl From<&Account> for LeaderboardEntry {
    fn from(a: &Account) -> Self {
        Self {
            id: a.id,
            name: a.name.clone(),
            stats: a.stats,
            badges: a.badges.clone(),
        }
    }
}

/// Field increments applied to one account in a single atomic step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDelta {
    pub balance: i64,
    pub classes_taught: u32,
    pub classes_attended: u32,
}

impl AccountDelta {
    pub fn balance(amount: i64) -> Self {
        Self {
            balance: amount,
            ..Self::default()
        }
    }
}

// ── Listings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Coding,
    Music,
    Design,
    Language,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub id: Ulid,
    /// Owning account. Only the teacher may delete the listing.
    pub teacher_id: Ulid,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub duration_minutes: u32,
    pub created_at: Ms,
}

/// Caller-supplied fields for a new listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewListing {
    pub title: String,
    pub description: String,
    pub category: Category,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

// ── Transactions ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentState {
    Unscheduled,
    Proposed,
    Scheduled,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub state: AppointmentState,
    pub proposed_at: Option<Ms>,
    pub proposed_by: Option<Ulid>,
    pub scheduled_at: Option<Ms>,
    pub rejection_reason: Option<String>,
}

impl Default for Appointment {
    fn default() -> Self {
        Self {
            state: AppointmentState::Unscheduled,
            proposed_at: None,
            proposed_by: None,
            scheduled_at: None,
            rejection_reason: None,
        }
    }
}

/// One booking of one listing. References accounts and listing by id only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Ulid,
    /// The student who paid.
    pub sender_id: Ulid,
    /// The teacher who gets paid on completion.
    pub receiver_id: Ulid,
    pub listing_id: Ulid,
    pub status: TxStatus,
    pub appointment: Appointment,
    pub created_at: Ms,
    pub completed_at: Option<Ms>,
}

impl Transaction {
    pub fn new(id: Ulid, sender_id: Ulid, receiver_id: Ulid, listing_id: Ulid, created_at: Ms) -> Self {
        Self {
            id,
            sender_id,
            receiver_id,
            listing_id,
            status: TxStatus::Pending,
            appointment: Appointment::default(),
            created_at,
            completed_at: None,
        }
    }

    pub fn is_party(&self, account_id: Ulid) -> bool {
        self.sender_id == account_id || self.receiver_id == account_id
    }

    pub fn is_pending(&self) -> bool {
        self.status == TxStatus::Pending
    }
}

// ── Journal records ──────────────────────────────────────────────

/// Journal records, flat with no nesting. This is the WAL record format.
///
/// The `*Registered`/`*Created` variants carry the whole record so compaction
/// can reuse them as snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    AccountRegistered(Account),
    AccountAdjusted {
        id: Ulid,
        delta: AccountDelta,
    },
    BadgeAwarded {
        account_id: Ulid,
        badge: Badge,
    },
    /// `None` fields are unchanged; `Some(None)` clears the preference.
    ProfileUpdated {
        id: Ulid,
        name: Option<String>,
        preferred_hours: Option<Option<String>>,
    },
    ListingCreated(Listing),
    ListingDeleted {
        id: Ulid,
        teacher_id: Ulid,
    },
    TransactionCreated(Transaction),
    TransactionCompleted {
        id: Ulid,
        completed_at: Ms,
    },
    AppointmentProposed {
        id: Ulid,
        proposed_by: Ulid,
        date: Ms,
    },
    AppointmentAccepted {
        id: Ulid,
        scheduled_at: Ms,
    },
    AppointmentRejected {
        id: Ulid,
        reason: String,
    },
}

/// Pushed to subscribers of `account_id` whenever its balance moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChanged {
    pub account_id: Ulid,
    pub balance: u32,
}
