//! # Approval Routes
//!
//! Routes:
//! - POST /v1/approvals/{id}/review: decide an edit under review
//! - POST /v1/approvals/{id}/resubmit: reopen a family with edited data
//! - POST /v1/approvals/{id}/deactivation-decision: decide a deactivation request

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use grc_core::ApprovalId;
use grc_workflow::{ComplianceApproval, DecisionOutcome};

use crate::auth::Caller;
use crate::error::{AppError, ErrorBody};
use crate::extractors::{extract_json, extract_path};
use crate::state::AppState;

/// Body of both decision endpoints.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DecisionRequest {
    /// `true` approves, `false` rejects.
    pub approved: bool,
    /// Reviewer remarks, at most 5000 characters.
    #[serde(default)]
    pub remarks: Option<String>,
}

/// Response of the resubmit endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct ResubmitResponse {
    /// The new `u` row.
    #[schema(value_type = Object)]
    pub approval: ComplianceApproval,
}

/// Build the approvals router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/approvals/{id}/review", post(review))
        .route("/v1/approvals/{id}/resubmit", post(resubmit))
        .route(
            "/v1/approvals/{id}/deactivation-decision",
            post(decide_deactivation),
        )
}

/// POST /v1/approvals/{id}/review: Approve or reject an edit.
#[utoipa::path(
    post,
    path = "/v1/approvals/{id}/review",
    params(("id" = i64, Path, description = "Approval row of the family")),
    request_body = DecisionRequest,
    responses(
        (status = 201, description = "Decision recorded", body = serde_json::Value),
        (status = 403, description = "Caller is not the assigned reviewer", body = ErrorBody),
        (status = 404, description = "No such approval", body = ErrorBody),
    ),
    tag = "approvals"
)]
pub async fn review(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    id: Result<Path<ApprovalId>, PathRejection>,
    body: Result<Json<DecisionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DecisionOutcome>), AppError> {
    let id = extract_path(id)?;
    let req = extract_json(body)?;
    let outcome = state
        .engine
        .review(&ctx, id, req.approved, req.remarks.as_deref())?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// POST /v1/approvals/{id}/resubmit: Resubmit with edited data.
///
/// The Compliance row is reset to Under Review in the background; the
/// response does not wait for it.
#[utoipa::path(
    post,
    path = "/v1/approvals/{id}/resubmit",
    params(("id" = i64, Path, description = "Approval row whose snapshot is edited")),
    request_body = serde_json::Value,
    responses(
        (status = 201, description = "Resubmission opened", body = ResubmitResponse),
        (status = 422, description = "Merged snapshot is invalid", body = ErrorBody),
    ),
    tag = "approvals"
)]
pub async fn resubmit(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    id: Result<Path<ApprovalId>, PathRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<ResubmitResponse>), AppError> {
    let id = extract_path(id)?;
    let edited = extract_json(body)?;
    let outcome = state.engine.resubmit(&ctx, id, &edited)?;
    if let Some(mirror) = outcome.mirror {
        let approval_id = outcome.approval.id;
        tokio::spawn(async move {
            if let Err(e) = mirror.await {
                tracing::error!(error = %e, %approval_id, "resubmission mirror task failed");
            }
        });
    }
    Ok((
        StatusCode::CREATED,
        Json(ResubmitResponse {
            approval: outcome.approval,
        }),
    ))
}

/// POST /v1/approvals/{id}/deactivation-decision: Decide a deactivation request.
#[utoipa::path(
    post,
    path = "/v1/approvals/{id}/deactivation-decision",
    params(("id" = i64, Path, description = "Approval row of the deactivation family")),
    request_body = DecisionRequest,
    responses(
        (status = 201, description = "Decision recorded", body = serde_json::Value),
        (status = 409, description = "Not a deactivation request", body = ErrorBody),
    ),
    tag = "approvals"
)]
pub async fn decide_deactivation(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    id: Result<Path<ApprovalId>, PathRejection>,
    body: Result<Json<DecisionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DecisionOutcome>), AppError> {
    let id = extract_path(id)?;
    let req = extract_json(body)?;
    let outcome = state
        .engine
        .decide_deactivation(&ctx, id, req.approved, req.remarks.as_deref())?;
    Ok((StatusCode::CREATED, Json(outcome)))
}
