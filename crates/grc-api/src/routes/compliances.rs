//! # Compliance Routes
//!
//! Routes:
//! - POST /v1/compliances: create and assign for review
//! - GET  /v1/compliances: export listing with filters
//! - GET  /v1/compliances/{id}: one version
//! - POST /v1/compliances/{id}/edit: new version plus a new `u` row
//! - POST /v1/compliances/{id}/clone: copy under another sub-policy
//! - POST /v1/compliances/{id}/toggle: activate or deactivate
//! - POST /v1/compliances/{id}/deactivation: request deactivation

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use grc_core::{ComplianceId, SubPolicyId, ToggleIntent, UserId, VersioningType};
use grc_workflow::{
    AssignOutcome, Compliance, DeactivationInput, DeactivationRequested, ExportFilter, ToggleOutcome,
};

use crate::auth::Caller;
use crate::error::{AppError, ErrorBody};
use crate::extractors::{extract_json, extract_path, extract_query};
use crate::state::AppState;

// -- Request DTOs -------------------------------------------------------------

/// Query parameters of the edit endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct EditParams {
    /// `Minor` (default) or `Major`.
    pub versioning: Option<VersioningType>,
}

/// Body of the clone endpoint.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CloneRequest {
    /// Sub-policy the copy is filed under.
    #[schema(value_type = i64)]
    pub sub_policy_id: SubPolicyId,
    /// Payload keys replacing the source content. Must carry `reviewer`
    /// and `ApprovalDueDate`.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub overrides: Value,
}

/// Body of the toggle endpoint.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ToggleRequest {
    /// `Activate` or `Deactivate`.
    #[schema(value_type = String)]
    pub intent: ToggleIntent,
}

/// Body of the deactivation-request endpoint.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DeactivationBody {
    /// Why the compliance should be taken out of service.
    pub reason: String,
    /// Reviewer to decide the request.
    #[schema(value_type = Option<i64>)]
    pub reviewer: Option<UserId>,
    /// Decision due date.
    pub due_date: Option<NaiveDate>,
}

impl From<DeactivationBody> for DeactivationInput {
    fn from(body: DeactivationBody) -> Self {
        Self {
            reason: body.reason,
            reviewer: body.reviewer,
            due_date: body.due_date,
        }
    }
}

/// Build the compliance router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/compliances", post(create_compliance).get(list_compliances))
        .route("/v1/compliances/{id}", get(get_compliance))
        .route("/v1/compliances/{id}/edit", post(edit_compliance))
        .route("/v1/compliances/{id}/clone", post(clone_compliance))
        .route("/v1/compliances/{id}/toggle", post(toggle_compliance))
        .route("/v1/compliances/{id}/deactivation", post(request_deactivation))
}

// -- Handlers -----------------------------------------------------------------

/// POST /v1/compliances: Create a compliance and assign it for review.
#[utoipa::path(
    post,
    path = "/v1/compliances",
    request_body = serde_json::Value,
    responses(
        (status = 201, description = "Compliance created and assigned", body = serde_json::Value),
        (status = 200, description = "Pending duplicate reused", body = serde_json::Value),
        (status = 422, description = "Validation failed", body = ErrorBody),
        (status = 404, description = "Sub-policy not found", body = ErrorBody),
    ),
    tag = "compliances"
)]
pub async fn create_compliance(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<AssignOutcome>), AppError> {
    let payload = extract_json(body)?;
    let outcome = state.engine.create(&ctx, &payload)?;
    let status = if outcome.reused {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(outcome)))
}

/// GET /v1/compliances: Export listing.
#[utoipa::path(
    get,
    path = "/v1/compliances",
    params(
        ("framework_id" = Option<i64>, Query, description = "Framework filter"),
        ("policy_id" = Option<i64>, Query, description = "Policy filter"),
        ("sub_policy_id" = Option<i64>, Query, description = "Sub-policy filter"),
        ("status" = Option<String>, Query, description = "Status filter"),
        ("active" = Option<String>, Query, description = "Active/Inactive filter"),
    ),
    responses(
        (status = 200, description = "Matching compliance rows", body = serde_json::Value),
        (status = 403, description = "Export capability denied", body = ErrorBody),
    ),
    tag = "compliances"
)]
pub async fn list_compliances(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    query: Result<Query<ExportFilter>, QueryRejection>,
) -> Result<Json<Vec<Compliance>>, AppError> {
    let filter = extract_query(query)?;
    Ok(Json(state.engine.list_for_export(&ctx, &filter)?))
}

/// GET /v1/compliances/{id}: One compliance version.
#[utoipa::path(
    get,
    path = "/v1/compliances/{id}",
    params(("id" = i64, Path, description = "Compliance id")),
    responses(
        (status = 200, description = "The compliance row", body = serde_json::Value),
        (status = 404, description = "No such compliance", body = ErrorBody),
    ),
    tag = "compliances"
)]
pub async fn get_compliance(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    id: Result<Path<ComplianceId>, PathRejection>,
) -> Result<Json<Compliance>, AppError> {
    let id = extract_path(id)?;
    Ok(Json(state.engine.get(&ctx, id)?))
}

/// POST /v1/compliances/{id}/edit: Submit a new version for review.
#[utoipa::path(
    post,
    path = "/v1/compliances/{id}/edit",
    params(
        ("id" = i64, Path, description = "Any version of the compliance"),
        ("versioning" = Option<String>, Query, description = "Minor (default) or Major"),
    ),
    request_body = serde_json::Value,
    responses(
        (status = 201, description = "New version created and assigned", body = serde_json::Value),
        (status = 422, description = "Validation failed", body = ErrorBody),
        (status = 404, description = "No such compliance", body = ErrorBody),
    ),
    tag = "compliances"
)]
pub async fn edit_compliance(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    id: Result<Path<ComplianceId>, PathRejection>,
    query: Result<Query<EditParams>, QueryRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<AssignOutcome>), AppError> {
    let id = extract_path(id)?;
    let params = extract_query(query)?;
    let payload = extract_json(body)?;
    let kind = params.versioning.unwrap_or(VersioningType::Minor);
    let outcome = state.engine.edit(&ctx, id, &payload, kind)?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// POST /v1/compliances/{id}/clone: Copy under another sub-policy.
#[utoipa::path(
    post,
    path = "/v1/compliances/{id}/clone",
    params(("id" = i64, Path, description = "Source compliance")),
    request_body = CloneRequest,
    responses(
        (status = 201, description = "Copy created and assigned", body = serde_json::Value),
        (status = 422, description = "Validation failed", body = ErrorBody),
        (status = 404, description = "Source or sub-policy not found", body = ErrorBody),
    ),
    tag = "compliances"
)]
pub async fn clone_compliance(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    id: Result<Path<ComplianceId>, PathRejection>,
    body: Result<Json<CloneRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AssignOutcome>), AppError> {
    let id = extract_path(id)?;
    let req = extract_json(body)?;
    let outcome = state
        .engine
        .clone_compliance(&ctx, id, req.sub_policy_id, &req.overrides)?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// POST /v1/compliances/{id}/toggle: Activate or deactivate an approved version.
#[utoipa::path(
    post,
    path = "/v1/compliances/{id}/toggle",
    params(("id" = i64, Path, description = "Compliance version")),
    request_body = ToggleRequest,
    responses(
        (status = 200, description = "Toggle applied", body = serde_json::Value),
        (status = 409, description = "Version is not approved", body = ErrorBody),
    ),
    tag = "compliances"
)]
pub async fn toggle_compliance(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    id: Result<Path<ComplianceId>, PathRejection>,
    body: Result<Json<ToggleRequest>, JsonRejection>,
) -> Result<Json<ToggleOutcome>, AppError> {
    let id = extract_path(id)?;
    let req = extract_json(body)?;
    Ok(Json(state.engine.toggle(&ctx, id, req.intent)?))
}

/// POST /v1/compliances/{id}/deactivation: Ask a reviewer to deactivate.
#[utoipa::path(
    post,
    path = "/v1/compliances/{id}/deactivation",
    params(("id" = i64, Path, description = "Active compliance version")),
    request_body = DeactivationBody,
    responses(
        (status = 201, description = "Deactivation request opened", body = serde_json::Value),
        (status = 409, description = "Compliance is not active", body = ErrorBody),
        (status = 400, description = "Reviewer missing", body = ErrorBody),
    ),
    tag = "compliances"
)]
pub async fn request_deactivation(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    id: Result<Path<ComplianceId>, PathRejection>,
    body: Result<Json<DeactivationBody>, JsonRejection>,
) -> Result<(StatusCode, Json<DeactivationRequested>), AppError> {
    let id = extract_path(id)?;
    let input = DeactivationInput::from(extract_json(body)?);
    let outcome = state.engine.request_deactivation(&ctx, id, &input)?;
    Ok((StatusCode::CREATED, Json(outcome)))
}
