//! # Notification Polling
//!
//! Routes:
//! - GET /v1/notifications: newest events addressed to the caller

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use grc_workflow::ComplianceEvent;

use crate::auth::Caller;
use crate::error::{AppError, ErrorBody};
use crate::extractors::extract_query;
use crate::state::AppState;

/// Default page size.
const DEFAULT_LIMIT: usize = 20;

/// Query parameters of the polling endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct NotificationParams {
    /// Maximum number of events. Defaults to 20.
    pub limit: Option<usize>,
}

/// Build the notifications router.
pub fn router() -> Router<AppState> {
    Router::new().route("/v1/notifications", get(poll))
}

/// GET /v1/notifications: Poll in-app notifications.
#[utoipa::path(
    get,
    path = "/v1/notifications",
    params(("limit" = Option<usize>, Query, description = "Maximum number of events")),
    responses(
        (status = 200, description = "Events, newest first", body = serde_json::Value),
        (status = 400, description = "Tenant or user missing", body = ErrorBody),
    ),
    tag = "notifications"
)]
pub async fn poll(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    query: Result<Query<NotificationParams>, QueryRejection>,
) -> Result<Json<Vec<ComplianceEvent>>, AppError> {
    let params = extract_query(query)?;
    let (tenant, user) = ctx.scope()?;
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    Ok(Json(state.notifications.recent(tenant, user, limit)))
}
