use thiserror::Error;
use ulid::Ulid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("already exists: {0}")]
    AlreadyExists(Ulid),
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),
    #[error("account {0} is not allowed to do that")]
    Unauthorized(Ulid),
    #[error("insufficient balance on {account}: {balance} credits")]
    InsufficientBalance { account: Ulid, balance: u32 },
    /// A conditional update found its precondition already false.
    #[error("record {0} was changed concurrently, try again")]
    ConflictedUpdate(Ulid),
    #[error("transaction {0} already completed")]
    AlreadyCompleted(Ulid),
    #[error("booking failed ({reason}); credit refunded: {refunded}")]
    BookingFailed { refunded: bool, reason: String },
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("journal error: {0}")]
    Journal(String),
}

impl EngineError {
    /// HTTP-style status the request layer reports for this error.
    pub fn status(&self) -> u16 {
        match self {
            EngineError::NotFound(_) => 404,
            EngineError::Unauthorized(_) => 401,
            EngineError::AlreadyExists(_) | EngineError::ConflictedUpdate(_) => 409,
            EngineError::InvalidOperation(_)
            | EngineError::InsufficientBalance { .. }
            | EngineError::AlreadyCompleted(_)
            | EngineError::LimitExceeded(_) => 400,
            EngineError::BookingFailed { .. } | EngineError::Journal(_) => 500,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::InvalidOperation(_) => "invalid_operation",
            EngineError::Unauthorized(_) => "unauthorized",
            EngineError::InsufficientBalance { .. } => "insufficient_balance",
            EngineError::ConflictedUpdate(_) => "conflicted_update",
            EngineError::AlreadyCompleted(_) => "already_completed",
            EngineError::BookingFailed { .. } => "booking_failed",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::Journal(_) => "journal_error",
        }
    }

    /// Someone else got there first; the same request may succeed if repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::ConflictedUpdate(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let id = Ulid::new();
        assert_eq!(EngineError::NotFound(id).status(), 404);
        assert_eq!(EngineError::InvalidOperation("self-booking").status(), 400);
        assert_eq!(EngineError::Unauthorized(id).status(), 401);
        assert_eq!(EngineError::ConflictedUpdate(id).status(), 409);
        assert_eq!(
            EngineError::BookingFailed { refunded: true, reason: "disk".into() }.status(),
            500
        );
    }

    #[test]
    fn only_conflicts_are_retryable() {
        let id = Ulid::new();
        assert!(EngineError::ConflictedUpdate(id).is_retryable());
        assert!(!EngineError::AlreadyCompleted(id).is_retryable());
        assert!(!EngineError::InsufficientBalance { account: id, balance: 0 }.is_retryable());
    }

    #[test]
    fn booking_failed_reports_refund() {
        let e = EngineError::BookingFailed { refunded: true, reason: "journal error: disk full".into() };
        assert!(e.to_string().contains("credit refunded: true"));
    }
}
