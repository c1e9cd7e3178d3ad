//! # OpenAPI Document Assembly
//!
//! Assembles the utoipa-documented routes into one OpenAPI document served
//! at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Adds the bearer token security scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some("Bearer token. Set via the AUTH_TOKEN env var."))
                        .build(),
                ),
            );
        }
    }
}

/// The API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "GRC Compliance Lifecycle API",
        description = "Versioned compliance items with a reviewer approval workflow.\n\nScope headers: `X-Tenant-Id` (UUID) and `X-User-Id` (integer principal). Health probes, `/metrics`, and this document are unauthenticated."
    ),
    security(("bearer_auth" = [])),
    paths(
        // ── Compliances ─────────────────────────────────────────────────
        crate::routes::compliances::create_compliance,
        crate::routes::compliances::list_compliances,
        crate::routes::compliances::get_compliance,
        crate::routes::compliances::edit_compliance,
        crate::routes::compliances::clone_compliance,
        crate::routes::compliances::toggle_compliance,
        crate::routes::compliances::request_deactivation,
        // ── Identifiers ─────────────────────────────────────────────────
        crate::routes::identifiers::list_versions,
        crate::routes::identifiers::approval_history,
        // ── Approvals ───────────────────────────────────────────────────
        crate::routes::approvals::review,
        crate::routes::approvals::resubmit,
        crate::routes::approvals::decide_deactivation,
        // ── Dashboards ──────────────────────────────────────────────────
        crate::routes::people::reviewer_dashboard,
        crate::routes::people::my_submissions,
        // ── Notifications ───────────────────────────────────────────────
        crate::routes::notifications::poll,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::routes::compliances::CloneRequest,
        crate::routes::compliances::ToggleRequest,
        crate::routes::compliances::DeactivationBody,
        crate::routes::approvals::DecisionRequest,
        crate::routes::approvals::ResubmitResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "compliances", description = "Compliance versions"),
        (name = "identifiers", description = "Version chains and approval history"),
        (name = "approvals", description = "Review, resubmission, and deactivation decisions"),
        (name = "dashboards", description = "Reviewer and submitter views"),
        (name = "notifications", description = "In-app notification polling"),
    )
)]
pub struct ApiDoc;

/// Router serving `/openapi.json`.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/v1/compliances",
            "/v1/compliances/{id}",
            "/v1/compliances/{id}/edit",
            "/v1/compliances/{id}/clone",
            "/v1/compliances/{id}/toggle",
            "/v1/compliances/{id}/deactivation",
            "/v1/identifiers/{identifier}/versions",
            "/v1/identifiers/{identifier}/approvals",
            "/v1/approvals/{id}/review",
            "/v1/approvals/{id}/resubmit",
            "/v1/approvals/{id}/deactivation-decision",
            "/v1/reviewers/{id}/dashboard",
            "/v1/users/{id}/submissions",
            "/v1/notifications",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path}");
        }
    }

    #[test]
    fn bearer_scheme_is_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
