//! # HTTP API Integration Tests
//!
//! Drives the assembled router with `oneshot` requests: health probes,
//! authentication, the compliance lifecycle over HTTP, error rendering,
//! dashboards, notification polling, and the OpenAPI document.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use grc_api::config::AppConfig;
use grc_api::state::AppState;
use grc_core::{FrameworkId, PolicyId, SubPolicyId, TenantId, UserId};
use grc_workflow::{InMemoryDirectory, InMemoryRegistry, UserProfile};

const SUBMITTER: i64 = 3;
const REVIEWER: i64 = 7;

struct Harness {
    app: Router,
    tenant: Uuid,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    fn with_config(config: AppConfig) -> Self {
        let tenant = Uuid::new_v4();
        let tenant_id = TenantId::from_uuid(tenant);
        let registry = InMemoryRegistry::new();
        registry.add_chain(tenant_id, FrameworkId::new(1), PolicyId::new(5), SubPolicyId::new(42));
        let users = InMemoryDirectory::new();
        users.insert(
            tenant_id,
            UserId::new(SUBMITTER),
            UserProfile {
                display_name: "Dana Reyes".into(),
                email: "dana@example.com".into(),
            },
        );
        let state = AppState::builder(config)
            .registry(Arc::new(registry))
            .users(Arc::new(users))
            .build();
        Self {
            app: grc_api::app(state),
            tenant,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body)
    }

    async fn get(&self, user: i64, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .uri(uri)
            .header("x-tenant-id", self.tenant.to_string())
            .header("x-user-id", user.to_string())
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn wait_for_status(&self, user: i64, compliance_id: i64, status: &str) -> Value {
        let uri = format!("/v1/compliances/{compliance_id}");
        for _ in 0..100 {
            let (_, row) = self.get(user, &uri).await;
            if row["status"] == status {
                return row;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("compliance {compliance_id} never reached {status}");
    }

    async fn post(&self, user: i64, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-tenant-id", self.tenant.to_string())
            .header("x-user-id", user.to_string())
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }
}

fn create_payload() -> Value {
    json!({
        "SubPolicy": 42,
        "ComplianceTitle": "Access Logging",
        "ComplianceItemDescription": "All privileged access is logged centrally.",
        "ComplianceType": "Technical",
        "BusinessUnitsCovered": "IT Operations",
        "IsRisk": false,
        "mitigation": "1. Enable logs\n2. Rotate keys",
        "Criticality": "High",
        "MandatoryOptional": "Mandatory",
        "ManualAutomatic": "Automatic",
        "reviewer": REVIEWER,
        "ApprovalDueDate": "2024-02-01"
    })
}

// -- Health Probes ------------------------------------------------------------

#[tokio::test]
async fn health_probes_need_no_credentials() {
    let h = Harness::with_config(AppConfig {
        auth_token: Some("s3cret".into()),
        ..AppConfig::default()
    });
    for (uri, expected) in [("/health/liveness", "ok"), ("/health/readiness", "ready")] {
        let (status, body) = h
            .send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::String(expected.into()));
    }
    let (status, _) = h
        .send(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
}

// -- Authentication -----------------------------------------------------------

#[tokio::test]
async fn api_requires_token_when_configured() {
    let h = Harness::with_config(AppConfig {
        auth_token: Some("s3cret".into()),
        ..AppConfig::default()
    });
    let (status, body) = h.get(SUBMITTER, "/v1/compliances/1").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let request = Request::builder()
        .uri("/v1/compliances/1")
        .header("authorization", "Bearer s3cret")
        .header("x-tenant-id", h.tenant.to_string())
        .header("x-user-id", "3")
        .body(Body::empty())
        .unwrap();
    let (status, body) = h.send(request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn missing_tenant_is_a_bad_request() {
    let h = Harness::new();
    let request = Request::builder()
        .method("POST")
        .uri("/v1/compliances")
        .header("content-type", "application/json")
        .header("x-user-id", "3")
        .body(Body::from(create_payload().to_string()))
        .unwrap();
    let (status, body) = h.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "TENANT_MISSING");
}

#[tokio::test]
async fn malformed_tenant_header_is_rejected() {
    let h = Harness::new();
    let request = Request::builder()
        .uri("/v1/compliances/1")
        .header("x-tenant-id", "acme")
        .body(Body::empty())
        .unwrap();
    let (status, body) = h.send(request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

// -- Lifecycle ----------------------------------------------------------------

#[tokio::test]
async fn create_review_edit_over_http() {
    let h = Harness::new();
    let mut payload = create_payload();
    payload["Identifier"] = json!("HTTP-1");

    let (status, created) = h.post(SUBMITTER, "/v1/compliances", payload.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["reused"], false);
    assert_eq!(created["compliance"]["status"], "Under Review");
    assert_eq!(created["compliance"]["active"], "Inactive");
    assert_eq!(created["compliance"]["created_by_name"], "Dana Reyes");
    assert_eq!(created["approval"]["version"], "u1");
    let compliance_id = created["compliance"]["id"].as_i64().unwrap();
    let approval_id = created["approval"]["id"].as_i64().unwrap();
    let identifier = created["compliance"]["identifier"].as_str().unwrap().to_string();

    // Same identifier, submitter, and reviewer while pending: reused.
    let (status, again) = h.post(SUBMITTER, "/v1/compliances", payload).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["reused"], true);
    assert_eq!(again["compliance"]["id"], created["compliance"]["id"]);
    assert_eq!(again["approval"]["id"], created["approval"]["id"]);

    let (status, decided) = h
        .post(
            REVIEWER,
            &format!("/v1/approvals/{approval_id}/review"),
            json!({ "approved": true }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(decided["decision"]["version"], "r1");
    assert_eq!(decided["compliance"]["status"], "Approved");
    assert_eq!(decided["compliance"]["active"], "Active");

    let (status, edited) = h
        .post(
            SUBMITTER,
            &format!("/v1/compliances/{compliance_id}/edit?versioning=Major"),
            create_payload(),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(edited["compliance"]["version"], "2.0");
    assert_eq!(edited["approval"]["version"], "u2");

    let (status, chain) = h
        .get(SUBMITTER, &format!("/v1/identifiers/{identifier}/versions"))
        .await;
    assert_eq!(status, StatusCode::OK);
    let versions: Vec<&str> = chain
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["version"].as_str().unwrap())
        .collect();
    assert_eq!(versions, ["2.0", "1.0"]);

    let (status, history) = h
        .get(SUBMITTER, &format!("/v1/identifiers/{identifier}/approvals"))
        .await;
    assert_eq!(status, StatusCode::OK);
    let tags: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["version"].as_str().unwrap())
        .collect();
    assert_eq!(tags, ["u1", "u2", "r1"]);

    let (status, dashboard) = h
        .get(REVIEWER, &format!("/v1/reviewers/{REVIEWER}/dashboard"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["pending"].as_array().unwrap().len(), 1);
    assert_eq!(dashboard["pending"][0]["approval"]["version"], "u2");
}

#[tokio::test]
async fn reject_and_resubmit_over_http() {
    let h = Harness::new();
    let (_, created) = h.post(SUBMITTER, "/v1/compliances", create_payload()).await;
    let approval_id = created["approval"]["id"].as_i64().unwrap();
    let compliance_id = created["compliance"]["id"].as_i64().unwrap();

    let (_, rejected) = h
        .post(
            REVIEWER,
            &format!("/v1/approvals/{approval_id}/review"),
            json!({ "approved": false, "remarks": "Add retention" }),
        )
        .await;
    assert_eq!(rejected["compliance"]["status"], "Rejected");
    let decision_id = rejected["decision"]["id"].as_i64().unwrap();

    let (status, resubmitted) = h
        .post(
            SUBMITTER,
            &format!("/v1/approvals/{decision_id}/resubmit"),
            json!({ "ComplianceItemDescription": "Logs are retained for 400 days." }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(resubmitted["approval"]["version"], "u2");

    assert_eq!(
        resubmitted["approval"]["extracted_data"]["ComplianceItemDescription"],
        "Logs are retained for 400 days."
    );

    // The row is reset in the background; the decided text is kept.
    let row = h.wait_for_status(SUBMITTER, compliance_id, "Under Review").await;
    assert_eq!(
        row["content"]["ComplianceItemDescription"],
        "All privileged access is logged centrally."
    );

    let (status, submissions) = h
        .get(SUBMITTER, &format!("/v1/users/{SUBMITTER}/submissions"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(submissions[0]["state"], "pending");
}

#[tokio::test]
async fn toggle_and_deactivation_over_http() {
    let h = Harness::new();
    let (_, created) = h.post(SUBMITTER, "/v1/compliances", create_payload()).await;
    let approval_id = created["approval"]["id"].as_i64().unwrap();
    let compliance_id = created["compliance"]["id"].as_i64().unwrap();

    // Not yet approved: the toggle guard refuses.
    let (status, body) = h
        .post(
            REVIEWER,
            &format!("/v1/compliances/{compliance_id}/toggle"),
            json!({ "intent": "Activate" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVARIANT_VIOLATION");

    h.post(
        REVIEWER,
        &format!("/v1/approvals/{approval_id}/review"),
        json!({ "approved": true }),
    )
    .await;

    let (status, requested) = h
        .post(
            SUBMITTER,
            &format!("/v1/compliances/{compliance_id}/deactivation"),
            json!({ "reason": "Deprecated", "reviewer": REVIEWER }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(requested["approval"]["extracted_data"]["type"], "compliance_deactivation");
    let request_id = requested["approval"]["id"].as_i64().unwrap();

    let (_, dashboard) = h
        .get(REVIEWER, &format!("/v1/reviewers/{REVIEWER}/dashboard?include_recent=false"))
        .await;
    assert_eq!(dashboard["deactivations"].as_array().unwrap().len(), 1);
    assert!(dashboard["approved"].as_array().unwrap().is_empty());

    let (status, decided) = h
        .post(
            REVIEWER,
            &format!("/v1/approvals/{request_id}/deactivation-decision"),
            json!({ "approved": true }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(decided["compliance"]["status"], "Approved");
    assert_eq!(decided["compliance"]["active"], "Inactive");

    let (status, toggled) = h
        .post(
            REVIEWER,
            &format!("/v1/compliances/{compliance_id}/toggle"),
            json!({ "intent": "Activate" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(toggled["compliance"]["active"], "Active");
}

#[tokio::test]
async fn deactivation_without_reviewer_is_a_contract_violation() {
    let h = Harness::new();
    let (_, created) = h.post(SUBMITTER, "/v1/compliances", create_payload()).await;
    let compliance_id = created["compliance"]["id"].as_i64().unwrap();
    let (status, body) = h
        .post(
            SUBMITTER,
            &format!("/v1/compliances/{compliance_id}/deactivation"),
            json!({ "reason": "Deprecated" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "CONTRACT_VIOLATION");
}

// -- Errors -------------------------------------------------------------------

#[tokio::test]
async fn validation_failures_carry_field_details() {
    let h = Harness::new();
    let mut payload = create_payload();
    payload["Criticality"] = json!("Severe");
    payload["ComplianceTitle"] = json!("x".repeat(146));
    let (status, body) = h.post(SUBMITTER, "/v1/compliances", payload).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_FAILURE");
    assert!(body["error"]["details"]["Criticality"].is_array());
    assert!(body["error"]["details"]["ComplianceTitle"].is_array());
}

#[tokio::test]
async fn unknown_sub_policy_is_not_found() {
    let h = Harness::new();
    let mut payload = create_payload();
    payload["SubPolicy"] = json!(99);
    let (status, body) = h.post(SUBMITTER, "/v1/compliances", payload).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "REFERENCE_NOT_FOUND");
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let h = Harness::new();
    let request = Request::builder()
        .method("POST")
        .uri("/v1/compliances")
        .header("content-type", "application/json")
        .header("x-tenant-id", h.tenant.to_string())
        .header("x-user-id", "3")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = h.send(request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn review_by_another_user_is_forbidden() {
    let h = Harness::new();
    let (_, created) = h.post(SUBMITTER, "/v1/compliances", create_payload()).await;
    let approval_id = created["approval"]["id"].as_i64().unwrap();
    let (status, body) = h
        .post(
            9,
            &format!("/v1/approvals/{approval_id}/review"),
            json!({ "approved": true }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "CAPABILITY_DENIED");
}

// -- Export & Notifications ---------------------------------------------------

#[tokio::test]
async fn export_listing_filters_rows() {
    let h = Harness::new();
    let (_, created) = h.post(SUBMITTER, "/v1/compliances", create_payload()).await;
    let approval_id = created["approval"]["id"].as_i64().unwrap();
    h.post(
        REVIEWER,
        &format!("/v1/approvals/{approval_id}/review"),
        json!({ "approved": true }),
    )
    .await;

    let (status, rows) = h
        .get(SUBMITTER, "/v1/compliances?framework_id=1&status=Approved&active=Active")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rows.as_array().unwrap().len(), 1);

    let (_, rows) = h.get(SUBMITTER, "/v1/compliances?status=Rejected").await;
    assert!(rows.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn notifications_are_polled_per_user() {
    let h = Harness::new();
    h.post(SUBMITTER, "/v1/compliances", create_payload()).await;

    let (status, events) = h.get(REVIEWER, "/v1/notifications?limit=5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(events[0]["kind"], "ComplianceAssigned");

    let (_, events) = h.get(SUBMITTER, "/v1/notifications").await;
    assert!(events
        .as_array()
        .unwrap()
        .iter()
        .all(|e| e["kind"] != "ComplianceAssigned"));
}

// -- OpenAPI ------------------------------------------------------------------

#[tokio::test]
async fn openapi_document_is_served() {
    let h = Harness::new();
    let (status, doc) = h
        .send(Request::builder().uri("/openapi.json").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/v1/approvals/{id}/review"].is_object());
}
