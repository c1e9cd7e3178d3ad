//! # Identifier Routes
//!
//! Routes:
//! - GET /v1/identifiers/{identifier}/versions: version chain, latest first
//! - GET /v1/identifiers/{identifier}/approvals: approval history

use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use grc_core::Identifier;
use grc_workflow::{Compliance, ComplianceApproval};

use crate::auth::Caller;
use crate::error::{AppError, ErrorBody};
use crate::extractors::extract_path;
use crate::state::AppState;

/// Build the identifiers router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/identifiers/{identifier}/versions", get(list_versions))
        .route("/v1/identifiers/{identifier}/approvals", get(approval_history))
}

fn identifier(raw: Result<Path<String>, PathRejection>) -> Result<Identifier, AppError> {
    Ok(Identifier::new(extract_path(raw)?)?)
}

/// GET /v1/identifiers/{identifier}/versions: Every version, latest first.
#[utoipa::path(
    get,
    path = "/v1/identifiers/{identifier}/versions",
    params(("identifier" = String, Path, description = "Compliance identifier")),
    responses(
        (status = 200, description = "Version chain", body = serde_json::Value),
        (status = 404, description = "Unknown identifier", body = ErrorBody),
    ),
    tag = "identifiers"
)]
pub async fn list_versions(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    raw: Result<Path<String>, PathRejection>,
) -> Result<Json<Vec<Compliance>>, AppError> {
    let identifier = identifier(raw)?;
    Ok(Json(state.engine.list_version_chain(&ctx, &identifier)?))
}

/// GET /v1/identifiers/{identifier}/approvals: Approval rows of the
/// family and its deactivation family.
#[utoipa::path(
    get,
    path = "/v1/identifiers/{identifier}/approvals",
    params(("identifier" = String, Path, description = "Compliance identifier")),
    responses(
        (status = 200, description = "Approval history", body = serde_json::Value),
    ),
    tag = "identifiers"
)]
pub async fn approval_history(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    raw: Result<Path<String>, PathRejection>,
) -> Result<Json<Vec<ComplianceApproval>>, AppError> {
    let identifier = identifier(raw)?;
    Ok(Json(state.engine.approval_history(&ctx, &identifier)?))
}
