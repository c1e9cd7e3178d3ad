//! # Authentication & Request Scope
//!
//! Bearer-token middleware plus the [`Caller`] extractor that turns the
//! `X-Tenant-Id` and `X-User-Id` headers into a [`RequestContext`].
//!
//! The token only gates access to `/v1/*`. Authorization proper is the
//! engine's capability check against the principal in `X-User-Id`.
//! Missing headers are not rejected here: the engine reports a missing
//! tenant as `TenantMissing` and a missing principal on a write as a
//! contract violation.

use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use grc_core::{TenantId, UserId};
use grc_workflow::RequestContext;

use crate::error::{AppError, ErrorBody, ErrorDetail};

/// Header carrying the tenant UUID.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Header carrying the numeric principal id.
pub const USER_HEADER: &str = "x-user-id";

// -- Auth Configuration -------------------------------------------------------

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// -- Token Validation ---------------------------------------------------------

/// Constant-time comparison of bearer tokens.
///
/// When lengths differ, a dummy comparison keeps the timing independent
/// of where the mismatch is.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

// -- Middleware ---------------------------------------------------------------

/// Require `Authorization: Bearer <token>` when a token is configured.
pub async fn auth_middleware(request: Request, next: Next) -> Response {
    let expected = request
        .extensions()
        .get::<AuthConfig>()
        .and_then(|config| config.token.clone());

    let Some(expected) = expected else {
        return next.run(request).await;
    };

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth_header {
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(provided) if constant_time_token_eq(provided, &expected) => next.run(request).await,
            Some(_) => {
                tracing::warn!("authentication failed: invalid bearer token");
                unauthorized_response("invalid bearer token")
            }
            None => {
                tracing::warn!("authentication failed: non-Bearer authorization scheme");
                unauthorized_response("authorization header must use Bearer scheme")
            }
        },
        None => {
            tracing::warn!("authentication failed: missing authorization header");
            unauthorized_response("missing authorization header")
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

// -- Caller -------------------------------------------------------------------

/// The request scope of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub RequestContext);

impl Caller {
    /// Parse the scope headers. Absent headers leave the field unset;
    /// malformed ones are rejected.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
        let tenant = header_str(headers, TENANT_HEADER)?
            .map(|raw| {
                Uuid::parse_str(raw)
                    .map(TenantId::from_uuid)
                    .map_err(|_| AppError::BadRequest(format!("{TENANT_HEADER} must be a UUID")))
            })
            .transpose()?;
        let user = header_str(headers, USER_HEADER)?
            .map(|raw| {
                UserId::parse(raw)
                    .map_err(|_| AppError::BadRequest(format!("{USER_HEADER} must be a positive integer")))
            })
            .transpose()?;
        Ok(Self(RequestContext { tenant, user }))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, AppError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|s| Some(s.trim()).filter(|s| !s.is_empty()))
            .map_err(|_| AppError::BadRequest(format!("{name} is not valid ASCII"))),
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app(token: Option<&str>) -> Router {
        let auth_config = AuthConfig {
            token: token.map(str::to_string),
        };
        Router::new()
            .route("/test", get(|| async { "ok" }))
            .layer(from_fn(auth_middleware))
            .layer(axum::Extension(auth_config))
    }

    async fn status_and_message(app: Router, auth: Option<&str>) -> (StatusCode, String) {
        let mut request = Request::builder().uri("/test");
        if let Some(auth) = auth {
            request = request.header("Authorization", auth);
        }
        let response = app.oneshot(request.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let message = serde_json::from_slice::<serde_json::Value>(&bytes)
            .map(|v| v["error"]["message"].as_str().unwrap_or_default().to_string())
            .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());
        (status, message)
    }

    #[tokio::test]
    async fn valid_bearer_token_accepted() {
        let (status, body) = status_and_message(test_app(Some("s3cret")), Some("Bearer s3cret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn missing_header_rejected() {
        let (status, message) = status_and_message(test_app(Some("s3cret")), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(message.contains("missing"));
    }

    #[tokio::test]
    async fn wrong_token_rejected() {
        let (status, message) = status_and_message(test_app(Some("s3cret")), Some("Bearer nope")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(message.contains("invalid"));
    }

    #[tokio::test]
    async fn non_bearer_scheme_rejected() {
        let (status, message) =
            status_and_message(test_app(Some("s3cret")), Some("Basic dXNlcjpwYXNz")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(message.contains("Bearer scheme"));
    }

    #[tokio::test]
    async fn auth_disabled_allows_all_requests() {
        let (status, _) = status_and_message(test_app(None), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[test]
    fn constant_time_eq_cases() {
        assert!(constant_time_token_eq("secret-token", "secret-token"));
        assert!(!constant_time_token_eq("secret", "secret-token"));
        assert!(!constant_time_token_eq("", "secret-token"));
        assert!(!constant_time_token_eq("secret-tokem", "secret-token"));
    }

    #[test]
    fn caller_reads_scope_headers() {
        let tenant = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(TENANT_HEADER, tenant.to_string().parse().unwrap());
        headers.insert(USER_HEADER, "7".parse().unwrap());
        let Caller(ctx) = Caller::from_headers(&headers).unwrap();
        assert_eq!(ctx.tenant, Some(TenantId::from_uuid(tenant)));
        assert_eq!(ctx.user, Some(UserId::new(7)));
    }

    #[test]
    fn caller_without_headers_is_unscoped() {
        let Caller(ctx) = Caller::from_headers(&HeaderMap::new()).unwrap();
        assert_eq!(ctx.tenant, None);
        assert_eq!(ctx.user, None);
    }

    #[test]
    fn malformed_headers_are_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(TENANT_HEADER, "not-a-uuid".parse().unwrap());
        assert!(matches!(Caller::from_headers(&headers), Err(AppError::BadRequest(_))));

        let mut headers = HeaderMap::new();
        headers.insert(USER_HEADER, "-4".parse().unwrap());
        assert!(matches!(Caller::from_headers(&headers), Err(AppError::BadRequest(_))));
    }
}
