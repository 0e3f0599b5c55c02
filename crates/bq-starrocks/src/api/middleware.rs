//! Request middleware: API key check and access logging.

use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{error, info};

use super::{error_body, AppState};

const API_KEY_HEADER: &str = "x-api-key";
const SCHEDULER_JOB_HEADER: &str = "x-cloudscheduler-jobname";
const SCHEDULER_TIME_HEADER: &str = "x-cloudscheduler-scheduletime";

/// Reject requests without the configured `X-API-Key`. `/health` stays open.
pub(super) async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.api_key.as_deref() else {
        return next.run(req).await;
    };
    if req.uri().path() == "/health" {
        return next.run(req).await;
    }

    let provided = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    if provided == Some(expected) {
        return next.run(req).await;
    }

    (StatusCode::UNAUTHORIZED, error_body("unauthorized")).into_response()
}

/// Log one line per request; server errors log at error level.
pub(super) async fn log_request(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);
    let client_ip = client_ip(&req);
    let scheduler_job = header(&req, SCHEDULER_JOB_HEADER);
    let scheduler_time = header(&req, SCHEDULER_TIME_HEADER);

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let latency_ms = start.elapsed().as_millis() as u64;
    if status >= 500 {
        error!(
            method = %method,
            path = %path,
            status,
            latency_ms,
            client_ip = %client_ip,
            query = query.as_deref(),
            scheduler_job = scheduler_job.as_deref(),
            scheduler_time = scheduler_time.as_deref(),
            "Request processed"
        );
    } else {
        info!(
            method = %method,
            path = %path,
            status,
            latency_ms,
            client_ip = %client_ip,
            query = query.as_deref(),
            scheduler_job = scheduler_job.as_deref(),
            scheduler_time = scheduler_time.as_deref(),
            "Request processed"
        );
    }
    response
}

fn header(req: &Request, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// First `X-Forwarded-For` hop, else the peer address.
fn client_ip(req: &Request) -> String {
    if let Some(forwarded) = header(req, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return first.to_string();
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "-".to_string())
}
