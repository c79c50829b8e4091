//! Newline-delimited JSON messages exchanged with clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::{BalanceChanged, Category, Ms};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Register {
        name: String,
        password: String,
    },
    Login {
        account_id: Ulid,
        password: String,
    },
    Me,
    /// Omitted fields are left unchanged; a blank preference clears it.
    UpdateProfile {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        preferred_hours: Option<String>,
    },
    CreateListing {
        title: String,
        description: String,
        category: Category,
        #[serde(default)]
        duration_minutes: Option<u32>,
    },
    DeleteListing {
        listing_id: Ulid,
    },
    Listings,
    MyListings,
    Book {
        listing_id: Ulid,
    },
    MyTransactions,
    Complete {
        transaction_id: Ulid,
    },
    Propose {
        transaction_id: Ulid,
        date: Ms,
    },
    Accept {
        transaction_id: Ulid,
    },
    Reject {
        transaction_id: Ulid,
        reason: String,
    },
    Leaderboard {
        #[serde(default)]
        limit: Option<usize>,
    },
    Subscribe,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Ok {
        status: u16,
        body: Value,
    },
    Error {
        status: u16,
        code: String,
        message: String,
        retryable: bool,
    },
    BalanceChanged(BalanceChanged),
}

impl Response {
    pub fn ok(body: impl Serialize) -> Self {
        Self::with_status(200, body)
    }

    pub fn created(body: impl Serialize) -> Self {
        Self::with_status(201, body)
    }

    fn with_status(status: u16, body: impl Serialize) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Response::Ok { status, body },
            Err(e) => Response::error(500, "encode_error", e.to_string()),
        }
    }

    pub fn error(status: u16, code: &str, message: impl Into<String>) -> Self {
        Response::Error {
            status,
            code: code.to_string(),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Response::Ok { status, .. } | Response::Error { status, .. } => *status,
            Response::BalanceChanged(_) => 200,
        }
    }
}

impl From<EngineError> for Response {
    fn from(e: EngineError) -> Self {
        Response::Error {
            status: e.status(),
            code: e.code().to_string(),
            message: e.to_string(),
            retryable: e.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_requests() {
        let id = Ulid::new();
        let line = format!(r#"{{"op":"book","listing_id":"{id}"}}"#);
        assert_eq!(
            serde_json::from_str::<Request>(&line).unwrap(),
            Request::Book { listing_id: id }
        );
        assert_eq!(serde_json::from_str::<Request>(r#"{"op":"me"}"#).unwrap(), Request::Me);
        assert_eq!(
            serde_json::from_str::<Request>(r#"{"op":"leaderboard"}"#).unwrap(),
            Request::Leaderboard { limit: None }
        );
    }

    #[test]
    fn create_listing_duration_is_optional() {
        let req: Request = serde_json::from_str(
            r#"{"op":"create_listing","title":"Piano","description":"Scales","category":"Music"}"#,
        )
        .unwrap();
        assert_eq!(
            req,
            Request::CreateListing {
                title: "Piano".into(),
                description: "Scales".into(),
                category: Category::Music,
                duration_minutes: None,
            }
        );
    }

    #[test]
    fn update_profile_fields_are_optional() {
        let req: Request =
            serde_json::from_str(r#"{"op":"update_profile","name":"Ada"}"#).unwrap();
        assert_eq!(
            req,
            Request::UpdateProfile {
                name: Some("Ada".into()),
                preferred_hours: None,
            }
        );
    }

    #[test]
    fn unknown_op_is_rejected() {
        assert!(serde_json::from_str::<Request>(r#"{"op":"teleport"}"#).is_err());
    }

    #[test]
    fn conflict_error_is_retryable_409() {
        let resp = Response::from(EngineError::ConflictedUpdate(Ulid::new()));
        match resp {
            Response::Error { status, code, retryable, .. } => {
                assert_eq!(status, 409);
                assert_eq!(code, "conflicted_update");
                assert!(retryable);
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn notice_serializes_with_type_tag() {
        let id = Ulid::new();
        let json = serde_json::to_value(Response::BalanceChanged(BalanceChanged {
            account_id: id,
            balance: 4,
        }))
        .unwrap();
        assert_eq!(json["type"], "balance_changed");
        assert_eq!(json["balance"], 4);
        assert_eq!(json["account_id"], id.to_string());
    }
}
