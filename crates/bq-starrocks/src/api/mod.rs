//! HTTP front end.
//!
//! - `GET /health`: liveness, never authenticated
//! - `POST /api/export`: run one [`ExportParams`] request through the configured driver
//!
//! Every request gets a cancellation token derived from the server shutdown
//! token, so a SIGTERM aborts in-flight loads (rolled back) before the
//! listener closes.

mod middleware;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::core::traits::Warehouse;
use crate::driver::{DriverImpl, ExportDriver, ExportParams, ExportResult};
use crate::error::Result;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    warehouse: Arc<dyn Warehouse>,
    driver: Arc<DriverImpl>,
    api_key: Option<Arc<str>>,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        driver: Arc<DriverImpl>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            warehouse,
            driver,
            api_key: None,
            shutdown,
        }
    }

    /// Require `X-API-Key` on every route but `/health`. Blank keys disable the check.
    pub fn with_api_key(mut self, api_key: Option<&str>) -> Self {
        self.api_key = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(Arc::from);
        self
    }
}

#[derive(Serialize)]
struct ExportResponse {
    message: &'static str,
    #[serde(flatten)]
    result: ExportResult,
}

fn error_body(message: impl Into<String>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "error": message.into() }))
}

/// Build the router with CORS, access logging and API key layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/export", post(export))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_api_key,
        ))
        .layer(axum::middleware::from_fn(middleware::log_request))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve on `0.0.0.0:<port>` until the state's shutdown token fires.
pub async fn serve(port: u16, state: AppState) -> Result<()> {
    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
    info!(port, driver = state.driver.name(), "Server starting");
    serve_listener(listener, state).await
}

/// Serve on an already bound listener until the state's shutdown token fires.
pub async fn serve_listener(listener: TcpListener, state: AppState) -> Result<()> {
    let shutdown = state.shutdown.clone();
    let app = router(state);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;

    info!("Server exited");
    Ok(())
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn export(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ExportParams>, JsonRejection>,
) -> Response {
    let Json(params) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            let message = rejection.body_text();
            warn!(error = %message, "Invalid request body");
            return (StatusCode::BAD_REQUEST, error_body(message)).into_response();
        }
    };
    if let Err(e) = params.validate() {
        warn!(error = %e, "Invalid request body");
        return (StatusCode::BAD_REQUEST, error_body(e.to_string())).into_response();
    }

    info!(
        driver = state.driver.name(),
        location = %params.query_location,
        table = params.table.as_deref(),
        database = params.database.as_deref(),
        output = params.output.as_deref(),
        filename = params.filename.as_deref(),
        use_timestamp = params.use_timestamp,
        explicit_ddl = params.create_ddl.is_some(),
        "Received export request"
    );

    let cancel = state.shutdown.child_token();
    match state
        .driver
        .execute(state.warehouse.as_ref(), &params, &cancel)
        .await
    {
        Ok(result) => (
            StatusCode::OK,
            Json(ExportResponse {
                message: "Export completed successfully",
                result,
            }),
        )
            .into_response(),
        Err(e) if e.is_client_error() => {
            warn!(error = %e, "Export rejected");
            (StatusCode::BAD_REQUEST, error_body(e.to_string())).into_response()
        }
        Err(e) => {
            error!(error = %e, "Export failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body(format!("Failed to export data: {}", e)),
            )
                .into_response()
        }
    }
}
