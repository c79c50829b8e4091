use tracing::info;
use ulid::Ulid;

use crate::model::*;

use super::{Conditional, Engine, EngineError};

/// Which lifetime statistic a badge is earned on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    ClassesTaught,
    ClassesAttended,
}

impl Counter {
    pub fn value(self, stats: &AccountStats) -> u32 {
        match self {
            Counter::ClassesTaught => stats.classes_taught,
            Counter::ClassesAttended => stats.classes_attended,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BadgeRule {
    pub name: &'static str,
    pub icon: &'static str,
    pub counter: Counter,
    pub threshold: u32,
}

impl BadgeRule {
    /// Counter has reached the threshold and the badge isn't held yet.
    pub fn is_due(&self, account: &Account) -> bool {
        self.counter.value(&account.stats) >= self.threshold && !account.has_badge(self.name)
    }

    fn badge(&self, earned_at: Ms) -> Badge {
        Badge {
            name: self.name.to_string(),
            icon: self.icon.to_string(),
            earned_at,
        }
    }
}

pub const BADGE_RULES: &[BadgeRule] = &[
    BadgeRule {
        name: "Teacher Rookie",
        icon: "🎓",
        counter: Counter::ClassesTaught,
        threshold: 5,
    },
    BadgeRule {
        name: "Dedicated Student",
        icon: "📚",
        counter: Counter::ClassesAttended,
        threshold: 5,
    },
];

impl Engine {
    /// Award every badge the account has become eligible for.
    ///
    /// Each award is a conditional append guarded on the badge name being
    /// absent, so this is safe to run any number of times, from any path.
    /// Returns only the badges newly added by this call.
    pub async fn award_badges(&self, account_id: Ulid) -> Result<Vec<Badge>, EngineError> {
        let account = self
            .account(account_id)
            .await
            .ok_or(EngineError::NotFound(account_id))?;

        let mut awarded = Vec::new();
        for rule in BADGE_RULES.iter().filter(|r| r.is_due(&account)) {
            let badge = rule.badge(now_ms());
            let event = Event::BadgeAwarded {
                account_id,
                badge: badge.clone(),
            };
            match self
                .update_account_if(account_id, |a| rule.is_due(a), event)
                .await?
            {
                Conditional::Applied(_) => {
                    info!("account {account_id} earned badge {:?}", rule.name);
                    metrics::counter!(crate::observability::BADGES_AWARDED_TOTAL, "badge" => rule.name)
                        .increment(1);
                    awarded.push(badge);
                }
                Conditional::NoMatch(_) => {
                    tracing::debug!("badge {:?} already held by {account_id}", rule.name);
                }
            }
        }
        Ok(awarded)
    }
}
