use std::io;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::engine::{Engine, EngineError};
use crate::limits::DEFAULT_LEADERBOARD_SIZE;
use crate::model::{BalanceChanged, NewListing};
use crate::observability::{self, AUTH_FAILURES_TOTAL, REQUEST_DURATION_SECONDS, REQUESTS_TOTAL};
use crate::protocol::{Request, Response};

const MAX_LINE_LEN: usize = 64 * 1024;

/// Run one client connection until it closes.
///
/// The first request must be `register` or `login`; the identity it
/// establishes is the caller for every later request on the connection.
pub async fn process_connection(socket: TcpStream, engine: Arc<Engine>, password: String) -> io::Result<()> {
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    let mut caller: Option<Ulid> = None;
    let mut notices: Option<broadcast::Receiver<BalanceChanged>> = None;

    loop {
        tokio::select! {
            line = framed.next() => {
                let Some(line) = line else { break };
                let line = line.map_err(io::Error::other)?;
                if line.trim().is_empty() {
                    continue;
                }

                let response = match serde_json::from_str::<Request>(&line) {
                    Ok(req) => {
                        let label = observability::request_label(&req);
                        let start = std::time::Instant::now();
                        let subscribe = matches!(req, Request::Subscribe);
                        let response = handle(&engine, &password, &mut caller, req).await;
                        if subscribe
                            && let (Response::Ok { .. }, Some(id)) = (&response, caller)
                        {
                            notices = Some(engine.notify.subscribe(id));
                        }
                        metrics::counter!(REQUESTS_TOTAL, "op" => label, "status" => response.status().to_string())
                            .increment(1);
                        metrics::histogram!(REQUEST_DURATION_SECONDS, "op" => label)
                            .record(start.elapsed().as_secs_f64());
                        response
                    }
                    Err(e) => Response::error(400, "bad_request", e.to_string()),
                };
                send(&mut framed, &response).await?;
            }
            notice = next_notice(&mut notices) => {
                match notice {
                    Some(n) => send(&mut framed, &Response::BalanceChanged(n)).await?,
                    None => notices = None,
                }
            }
        }
    }

    debug!("connection closed (caller: {caller:?})");
    Ok(())
}

async fn send(framed: &mut Framed<TcpStream, LinesCodec>, response: &Response) -> io::Result<()> {
    let line = serde_json::to_string(response).map_err(io::Error::other)?;
    framed.send(line).await.map_err(io::Error::other)
}

/// Next balance notice, or pending forever when not subscribed.
/// `None` means the channel closed.
async fn next_notice(rx: &mut Option<broadcast::Receiver<BalanceChanged>>) -> Option<BalanceChanged> {
    let Some(rx) = rx else {
        return std::future::pending().await;
    };
    loop {
        match rx.recv().await {
            Ok(n) => return Some(n),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("subscriber lagged, skipped {skipped} notices");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

fn reply<T: serde::Serialize>(result: Result<T, EngineError>) -> Response {
    match result {
        Ok(body) => Response::ok(body),
        Err(e) => e.into(),
    }
}

fn reply_created<T: serde::Serialize>(result: Result<T, EngineError>) -> Response {
    match result {
        Ok(body) => Response::created(body),
        Err(e) => e.into(),
    }
}

/// Map one request onto the engine.
pub async fn handle(engine: &Engine, password: &str, caller: &mut Option<Ulid>, req: Request) -> Response {
    match req {
        Request::Register { name, password: given } => {
            if given != password {
                metrics::counter!(AUTH_FAILURES_TOTAL).increment(1);
                return Response::error(401, "unauthorized", "bad password");
            }
            let result = engine.register_account(Ulid::new(), name).await;
            if let Ok(account) = &result {
                *caller = Some(account.id);
            }
            reply_created(result)
        }
        Request::Login { account_id, password: given } => match engine.account(account_id).await {
            Some(account) if given == password => {
                *caller = Some(account.id);
                Response::ok(account)
            }
            _ => {
                metrics::counter!(AUTH_FAILURES_TOTAL).increment(1);
                warn!("failed login for {account_id}");
                Response::error(401, "unauthorized", "invalid credentials")
            }
        },
        other => {
            let Some(me) = *caller else {
                return Response::error(401, "unauthorized", "login required");
            };
            handle_authenticated(engine, me, other).await
        }
    }
}

async fn handle_authenticated(engine: &Engine, me: Ulid, req: Request) -> Response {
    match req {
        Request::Me => reply(engine.account(me).await.ok_or(EngineError::NotFound(me))),
        Request::UpdateProfile {
            name,
            preferred_hours,
        } => reply(engine.update_profile(me, name, preferred_hours).await),
        Request::CreateListing {
            title,
            description,
            category,
            duration_minutes,
        } => {
            let new = NewListing {
                title,
                description,
                category,
                duration_minutes,
            };
            reply_created(engine.create_listing(Ulid::new(), me, new).await)
        }
        Request::DeleteListing { listing_id } => reply(
            engine
                .delete_listing(listing_id, me)
                .await
                .map(|()| serde_json::json!({ "id": listing_id })),
        ),
        Request::Listings => Response::ok(engine.listings()),
        Request::MyListings => Response::ok(engine.listings_by_teacher(me)),
        Request::Book { listing_id } => reply_created(engine.book(me, listing_id).await),
        Request::MyTransactions => Response::ok(engine.transactions_for(me).await),
        Request::Complete { transaction_id } => reply(engine.complete(transaction_id, me).await),
        Request::Propose { transaction_id, date } => {
            reply(engine.propose(transaction_id, me, date).await)
        }
        Request::Accept { transaction_id } => reply(engine.accept(transaction_id, me).await),
        Request::Reject { transaction_id, reason } => {
            reply(engine.reject(transaction_id, me, reason).await)
        }
        Request::Leaderboard { limit } => {
            Response::ok(engine.leaderboard(limit.unwrap_or(DEFAULT_LEADERBOARD_SIZE)).await)
        }
        Request::Subscribe => reply(engine.account(me).await.ok_or(EngineError::NotFound(me))),
        Request::Register { .. } | Request::Login { .. } => {
            Response::error(400, "bad_request", "already logged in")
        }
    }
}
