//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps [`GrcError`] kinds to HTTP status codes and renders a JSON body
//! with a machine-readable code, a message, and (for validation failures)
//! the field map. Internal details are logged, never returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use grc_core::GrcError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g. "NOT_FOUND", "VALIDATION_FAILURE").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Field → messages map for validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A domain error from the engine.
    #[error(transparent)]
    Domain(#[from] GrcError),

    /// The request body or a header could not be parsed (422).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid bearer token (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Unexpected failure outside the engine (500).
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status and machine-readable code.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Domain(err) => {
                let status = match err {
                    GrcError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    GrcError::ReferenceNotFound { .. } | GrcError::NotFound { .. } => {
                        StatusCode::NOT_FOUND
                    }
                    GrcError::InvariantViolation(_) | GrcError::Conflict(_) => StatusCode::CONFLICT,
                    GrcError::ContractViolation(_) | GrcError::TenantMissing => {
                        StatusCode::BAD_REQUEST
                    }
                    GrcError::CapabilityDenied { .. } => StatusCode::FORBIDDEN,
                    GrcError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.code())
            }
            Self::BadRequest(_) => (StatusCode::UNPROCESSABLE_ENTITY, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_) | Self::Domain(GrcError::Internal(_)))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = if self.is_internal() {
            tracing::error!(error = %self, "internal server error");
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };
        let details = match &self {
            Self::Domain(GrcError::Validation(fields)) => serde_json::to_value(fields).ok(),
            _ => None,
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    fn status_of(err: GrcError) -> StatusCode {
        AppError::from(err).status_and_code().0
    }

    #[test]
    fn domain_errors_map_to_statuses() {
        assert_eq!(status_of(GrcError::field("x", "bad")), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_of(GrcError::reference("sub-policy", 9)), StatusCode::NOT_FOUND);
        assert_eq!(status_of(GrcError::not_found("compliance", 9)), StatusCode::NOT_FOUND);
        assert_eq!(status_of(GrcError::InvariantViolation("x".into())), StatusCode::CONFLICT);
        assert_eq!(status_of(GrcError::Conflict("x".into())), StatusCode::CONFLICT);
        assert_eq!(status_of(GrcError::ContractViolation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(GrcError::TenantMissing), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(GrcError::CapabilityDenied {
                capability: "compliance.approve".into()
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(GrcError::Internal("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn transport_errors_map_to_statuses() {
        let (status, code) = AppError::BadRequest("x".into()).status_and_code();
        assert_eq!((status, code), (StatusCode::UNPROCESSABLE_ENTITY, "BAD_REQUEST"));
        let (status, code) = AppError::Unauthorized("x".into()).status_and_code();
        assert_eq!((status, code), (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"));
    }

    #[tokio::test]
    async fn validation_body_carries_field_map() {
        let response = AppError::from(GrcError::field("Criticality", "must be one of High")).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "VALIDATION_FAILURE");
        assert_eq!(body["error"]["details"]["Criticality"][0], "must be one of High");
    }

    #[tokio::test]
    async fn internal_messages_are_not_leaked() {
        let response = AppError::Internal("pool exhausted at 10.0.0.4".into()).into_response();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["message"], "An internal error occurred");
        assert!(body["error"].get("details").is_none());
    }
}
