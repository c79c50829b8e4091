//! Appointment negotiation for a pending transaction.
//!
//! ```text
//! Unscheduled ──propose──▶ Proposed ──accept (counter-party)──▶ Scheduled
//!                            ▲   │
//!                    propose │   └──reject──▶ Rejected
//!                            └──────────────────┘
//! ```

use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::CONFLICTS_TOTAL;

use super::{Conditional, Engine, EngineError};

fn validate_date(date: Ms) -> Result<(), EngineError> {
    if !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&date) {
        return Err(EngineError::LimitExceeded("date out of range"));
    }
    Ok(())
}

/// The actor must be a party, and only pending transactions negotiate.
fn ensure_negotiable(tx: &Transaction, actor: Ulid) -> Result<(), EngineError> {
    if !tx.is_party(actor) {
        return Err(EngineError::Unauthorized(actor));
    }
    if !tx.is_pending() {
        return Err(EngineError::InvalidOperation("transaction is already completed"));
    }
    Ok(())
}

fn conflict(tx_id: Ulid, op: &'static str) -> EngineError {
    metrics::counter!(CONFLICTS_TOTAL, "op" => op).increment(1);
    EngineError::ConflictedUpdate(tx_id)
}

impl Engine {
    async fn negotiable(&self, tx_id: Ulid, actor: Ulid) -> Result<Transaction, EngineError> {
        let tx = self
            .transaction(tx_id)
            .await
            .ok_or(EngineError::NotFound(tx_id))?;
        ensure_negotiable(&tx, actor)?;
        Ok(tx)
    }

    /// Either party proposes a time. Allowed from `Unscheduled`, and again
    /// after a rejection.
    pub async fn propose(&self, tx_id: Ulid, proposer: Ulid, date: Ms) -> Result<Transaction, EngineError> {
        validate_date(date)?;
        let current = self.negotiable(tx_id, proposer).await?;
        let from = current.appointment.state;
        if !matches!(from, AppointmentState::Unscheduled | AppointmentState::Rejected) {
            return Err(EngineError::InvalidOperation(
                "appointment is already proposed or scheduled",
            ));
        }

        let event = Event::AppointmentProposed {
            id: tx_id,
            proposed_by: proposer,
            date,
        };
        match self
            .update_transaction_if(tx_id, |t| t.is_pending() && t.appointment.state == from, event)
            .await?
        {
            Conditional::Applied(tx) => {
                info!("tx {tx_id}: {proposer} proposed {date}");
                Ok(tx)
            }
            Conditional::NoMatch(_) => Err(conflict(tx_id, "propose")),
        }
    }

    /// The counter-party confirms the proposed time.
    pub async fn accept(&self, tx_id: Ulid, accepter: Ulid) -> Result<Transaction, EngineError> {
        let current = self.negotiable(tx_id, accepter).await?;
        let appt = &current.appointment;
        let (Some(proposed_by), Some(date)) = (appt.proposed_by, appt.proposed_at) else {
            return Err(EngineError::InvalidOperation("no proposal to accept"));
        };
        if appt.state != AppointmentState::Proposed {
            return Err(EngineError::InvalidOperation("no proposal to accept"));
        }
        if proposed_by == accepter {
            return Err(EngineError::Unauthorized(accepter));
        }

        // Guard on the exact proposal seen, so a re-proposal in between isn't
        // accepted blind.
        let event = Event::AppointmentAccepted {
            id: tx_id,
            scheduled_at: date,
        };
        let still_same = |t: &Transaction| {
            t.is_pending()
                && t.appointment.state == AppointmentState::Proposed
                && t.appointment.proposed_by == Some(proposed_by)
                && t.appointment.proposed_at == Some(date)
        };
        match self.update_transaction_if(tx_id, still_same, event).await? {
            Conditional::Applied(tx) => {
                info!("tx {tx_id}: scheduled for {date}");
                Ok(tx)
            }
            Conditional::NoMatch(_) => Err(conflict(tx_id, "accept")),
        }
    }

    /// Decline the current proposal with a reason. Either party may reject;
    /// the proposer rejecting amounts to withdrawing it.
    pub async fn reject(&self, tx_id: Ulid, rejecter: Ulid, reason: String) -> Result<Transaction, EngineError> {
        let reason = reason.trim().to_string();
        if reason.is_empty() {
            return Err(EngineError::InvalidOperation("rejection reason is required"));
        }
        if reason.len() > MAX_REASON_LEN {
            return Err(EngineError::LimitExceeded("rejection reason too long"));
        }

        let current = self.negotiable(tx_id, rejecter).await?;
        if current.appointment.state != AppointmentState::Proposed {
            return Err(EngineError::InvalidOperation("no proposal to reject"));
        }
        let seen = (current.appointment.proposed_by, current.appointment.proposed_at);

        let event = Event::AppointmentRejected { id: tx_id, reason };
        let still_same = |t: &Transaction| {
            t.is_pending()
                && t.appointment.state == AppointmentState::Proposed
                && (t.appointment.proposed_by, t.appointment.proposed_at) == seen
        };
        match self.update_transaction_if(tx_id, still_same, event).await? {
            Conditional::Applied(tx) => {
                info!("tx {tx_id}: proposal rejected by {rejecter}");
                Ok(tx)
            }
            Conditional::NoMatch(_) => Err(conflict(tx_id, "reject")),
        }
    }
}
