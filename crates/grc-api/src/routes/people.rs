//! # Reviewer and Submitter Views
//!
//! Routes:
//! - GET /v1/reviewers/{id}/dashboard: pending, deactivation, and approved buckets
//! - GET /v1/users/{id}/submissions: latest row per family submitted by the user

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use grc_core::UserId;
use grc_workflow::{ReviewerDashboard, SubmissionItem};

use crate::auth::Caller;
use crate::error::{AppError, ErrorBody};
use crate::extractors::{extract_path, extract_query};
use crate::state::AppState;

/// Query parameters of the dashboard endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct DashboardParams {
    /// Include recently approved items. Defaults to `true`.
    pub include_recent: Option<bool>,
}

/// Build the people router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/reviewers/{id}/dashboard", get(reviewer_dashboard))
        .route("/v1/users/{id}/submissions", get(my_submissions))
}

/// GET /v1/reviewers/{id}/dashboard: A reviewer's work list.
#[utoipa::path(
    get,
    path = "/v1/reviewers/{id}/dashboard",
    params(
        ("id" = i64, Path, description = "Reviewer"),
        ("include_recent" = Option<bool>, Query, description = "Include recently approved items"),
    ),
    responses(
        (status = 200, description = "Dashboard buckets", body = serde_json::Value),
        (status = 400, description = "Tenant missing", body = ErrorBody),
    ),
    tag = "dashboards"
)]
pub async fn reviewer_dashboard(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    id: Result<Path<UserId>, PathRejection>,
    query: Result<Query<DashboardParams>, QueryRejection>,
) -> Result<Json<ReviewerDashboard>, AppError> {
    let reviewer = extract_path(id)?;
    let params = extract_query(query)?;
    let include_recent = params.include_recent.unwrap_or(true);
    Ok(Json(state.engine.reviewer_dashboard(&ctx, reviewer, include_recent)?))
}

/// GET /v1/users/{id}/submissions: A submitter's families and their status.
#[utoipa::path(
    get,
    path = "/v1/users/{id}/submissions",
    params(("id" = i64, Path, description = "Submitter")),
    responses(
        (status = 200, description = "Submissions, newest first", body = serde_json::Value),
        (status = 403, description = "Viewing another user's submissions", body = ErrorBody),
    ),
    tag = "dashboards"
)]
pub async fn my_submissions(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    id: Result<Path<UserId>, PathRejection>,
) -> Result<Json<Vec<SubmissionItem>>, AppError> {
    let user = extract_path(id)?;
    Ok(Json(state.engine.my_submissions(&ctx, user)?))
}
