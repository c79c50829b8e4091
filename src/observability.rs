use std::net::SocketAddr;

use crate::protocol::Request;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total requests handled. Labels: op, status.
pub const REQUESTS_TOTAL: &str = "timebarter_requests_total";

/// Histogram: request latency in seconds. Labels: op.
pub const REQUEST_DURATION_SECONDS: &str = "timebarter_request_duration_seconds";

// ── Ledger metrics ──────────────────────────────────────────────

/// Counter: conditional updates that lost a race. Labels: op.
pub const CONFLICTS_TOTAL: &str = "timebarter_conflicts_total";

/// Counter: compensating refunds after a failed booking. Labels: outcome.
pub const REFUNDS_TOTAL: &str = "timebarter_refunds_total";

/// Counter: badges awarded. Labels: badge.
pub const BADGES_AWARDED_TOTAL: &str = "timebarter_badges_awarded_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "timebarter_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "timebarter_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "timebarter_connections_rejected_total";

/// Counter: failed logins.
pub const AUTH_FAILURES_TOTAL: &str = "timebarter_auth_failures_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "timebarter_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "timebarter_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a request to a short label for metrics.
pub fn request_label(req: &Request) -> &'static str {
    match req {
        Request::Register { .. } => "register",
        Request::Login { .. } => "login",
        Request::Me => "me",
        Request::UpdateProfile { .. } => "update_profile",
        Request::CreateListing { .. } => "create_listing",
        Request::DeleteListing { .. } => "delete_listing",
        Request::Listings => "listings",
        Request::MyListings => "my_listings",
        Request::Book { .. } => "book",
        Request::MyTransactions => "my_transactions",
        Request::Complete { .. } => "complete",
        Request::Propose { .. } => "propose",
        Request::Accept { .. } => "accept",
        Request::Reject { .. } => "reject",
        Request::Leaderboard { .. } => "leaderboard",
        Request::Subscribe => "subscribe",
    }
}
