//! # grc-api: Axum API Service for the Compliance Lifecycle Engine
//!
//! HTTP transport over the approval engine. Handlers parse the request,
//! build a [`RequestContext`](grc_workflow::RequestContext) from the scope
//! headers, call one engine operation, and render the result or an
//! [`AppError`].
//!
//! ## API Surface
//!
//! | Prefix                 | Module                  | Domain |
//! |------------------------|-------------------------|--------|
//! | `/v1/compliances/*`    | [`routes::compliances`] | Create, edit, clone, toggle, deactivation request, export |
//! | `/v1/identifiers/*`    | [`routes::identifiers`] | Version chains, approval history |
//! | `/v1/approvals/*`      | [`routes::approvals`]   | Review, resubmit, deactivation decision |
//! | `/v1/reviewers/*`, `/v1/users/*` | [`routes::people`] | Dashboards |
//! | `/v1/notifications`    | [`routes::notifications`] | In-app polling |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → AuthMiddleware → Handler
//! ```
//!
//! Health probes, `/metrics`, and `/openapi.json` are mounted outside the
//! auth middleware.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;

pub use config::AppConfig;
pub use error::AppError;
pub use state::AppState;

/// Assemble the application router.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };

    let api = Router::new()
        .merge(routes::compliances::router())
        .merge(routes::identifiers::router())
        .merge(routes::approvals::router())
        .merge(routes::people::router())
        .merge(routes::notifications::router())
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(from_fn(auth::auth_middleware))
        .layer(axum::Extension(auth_config));

    let unauthenticated = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .merge(openapi::router());

    Router::new()
        .merge(unauthenticated)
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health/liveness
async fn liveness() -> &'static str {
    "ok"
}

/// GET /health/readiness: fails while the database is unreachable.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if state.is_ready().await {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "database unavailable")
    }
}

/// GET /metrics: Prometheus text exposition.
async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let (compliances, approvals) = state.engine.ledger().len();
    metrics::gauge!("grc_ledger_rows", "table" => "compliances").set(compliances as f64);
    metrics::gauge!("grc_ledger_rows", "table" => "approvals").set(approvals as f64);
    metrics::gauge!("grc_notifications_buffered").set(state.notifications.len() as f64);
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::OK, String::new()),
    }
}
