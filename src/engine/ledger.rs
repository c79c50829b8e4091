use tracing::{error, info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{CONFLICTS_TOTAL, REFUNDS_TOTAL};

use super::{Conditional, Engine, EngineError};

impl Engine {
    /// Book a listing: debit the student one credit, then record a pending
    /// transaction.
    ///
    /// The balance check and the debit are one conditional update, so
    /// concurrent bookings can never spend more credits than the account
    /// holds. If the transaction can't be recorded after the debit, the credit
    /// is given back before returning [`EngineError::BookingFailed`].
    pub async fn book(&self, student_id: Ulid, listing_id: Ulid) -> Result<Transaction, EngineError> {
        let listing = self
            .store
            .get_listing(&listing_id)
            .ok_or(EngineError::NotFound(listing_id))?;
        if listing.teacher_id == student_id {
            return Err(EngineError::InvalidOperation("cannot book your own listing"));
        }

        let debit = Event::AccountAdjusted {
            id: student_id,
            delta: AccountDelta::balance(-i64::from(BOOKING_COST)),
        };
        let student = match self
            .update_account_if(student_id, |a| a.balance >= BOOKING_COST, debit)
            .await?
        {
            Conditional::Applied(account) => account,
            Conditional::NoMatch(account) => {
                return Err(EngineError::InsufficientBalance {
                    account: student_id,
                    balance: account.balance,
                });
            }
        };
        self.notify.balance_changed(student_id, student.balance);

        let tx = Transaction::new(Ulid::new(), student_id, listing.teacher_id, listing_id, now_ms());
        match self.record_transaction(&tx).await {
            Ok(()) => {
                info!(
                    "booked listing {listing_id}: tx {} from {student_id} to {}",
                    tx.id, tx.receiver_id
                );
                Ok(tx)
            }
            Err(e) => {
                warn!("recording booking for {student_id} failed after debit: {e}");
                let refunded = self.refund(student_id).await;
                Err(EngineError::BookingFailed {
                    refunded,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn record_transaction(&self, tx: &Transaction) -> Result<(), EngineError> {
        let _gate = self.write_gate().await;
        self.journal
            .append(&Event::TransactionCreated(tx.clone()))
            .await?;
        self.store.insert_transaction(tx.clone());
        Ok(())
    }

    /// Compensate a debit whose booking never got recorded.
    async fn refund(&self, student_id: Ulid) -> bool {
        for attempt in 1..=REFUND_ATTEMPTS {
            match self
                .adjust_account(student_id, AccountDelta::balance(i64::from(BOOKING_COST)))
                .await
            {
                Ok(account) => {
                    metrics::counter!(REFUNDS_TOTAL, "outcome" => "refunded").increment(1);
                    self.notify.balance_changed(student_id, account.balance);
                    info!("refunded {BOOKING_COST} credit to {student_id}");
                    return true;
                }
                Err(e) => warn!("refund attempt {attempt} for {student_id} failed: {e}"),
            }
        }
        metrics::counter!(REFUNDS_TOTAL, "outcome" => "failed").increment(1);
        error!("could not refund {student_id} after {REFUND_ATTEMPTS} attempts");
        false
    }

    /// Confirm a session happened and release the credit to the teacher.
    ///
    /// Only the paying student may complete. The `Pending → Completed` flip is
    /// a conditional update, and the reward phase runs only for the caller
    /// that won it, so a retried or duplicated request can't pay twice.
    pub async fn complete(&self, tx_id: Ulid, requester: Ulid) -> Result<Transaction, EngineError> {
        let current = self
            .transaction(tx_id)
            .await
            .ok_or(EngineError::NotFound(tx_id))?;
        if current.sender_id != requester {
            return Err(EngineError::Unauthorized(requester));
        }
        if !current.is_pending() {
            return Err(EngineError::AlreadyCompleted(tx_id));
        }

        let event = Event::TransactionCompleted {
            id: tx_id,
            completed_at: now_ms(),
        };
        let completed = match self
            .update_transaction_if(tx_id, Transaction::is_pending, event)
            .await?
        {
            Conditional::Applied(tx) => tx,
            Conditional::NoMatch(_) => {
                metrics::counter!(CONFLICTS_TOTAL, "op" => "complete").increment(1);
                return Err(EngineError::ConflictedUpdate(tx_id));
            }
        };

        self.reward(&completed).await?;
        info!("completed tx {tx_id}: {} paid", completed.receiver_id);
        Ok(completed)
    }

    /// Teacher gets the credit and a taught session; student gets an
    /// attended session; then both are checked for badges.
    async fn reward(&self, tx: &Transaction) -> Result<(), EngineError> {
        let teacher = self
            .adjust_account(
                tx.receiver_id,
                AccountDelta {
                    balance: i64::from(BOOKING_COST),
                    classes_taught: 1,
                    classes_attended: 0,
                },
            )
            .await?;
        self.notify.balance_changed(teacher.id, teacher.balance);

        self.adjust_account(
            tx.sender_id,
            AccountDelta {
                classes_attended: 1,
                ..AccountDelta::default()
            },
        )
        .await?;

        for account_id in [tx.receiver_id, tx.sender_id] {
            self.award_badges(account_id).await?;
        }
        Ok(())
    }
}
