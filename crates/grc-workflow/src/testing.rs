//! Shared unit-test fixtures.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};

use grc_compliance::{validate, ValidatedSubmission, ValidationMode};
use grc_core::{
    ApprovalTag, ComplianceVersion, FrameworkId, Identifier, PolicyId, SubPolicyId, TenantId,
    UserId,
};
use grc_state::{ApprovalStage, LifecycleState};

use crate::collaborators::InMemoryRegistry;
use crate::records::{Compliance, ComplianceApproval};
use crate::repository::ComplianceRepository;
use crate::store::{Ledger, Transaction};

pub fn create_payload() -> Value {
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
        "ComplianceVersion": "1.0",
        "reviewer": 7,
        "ApprovalDueDate": "2024-02-01"
    })
}

pub fn submission() -> ValidatedSubmission {
    validate(&create_payload(), ValidationMode::Create).unwrap()
}

/// Registry with framework 1 → policy 5 → sub-policy 42 for one tenant.
pub fn registry(tenant: TenantId) -> Arc<InMemoryRegistry> {
    let registry = InMemoryRegistry::new();
    registry.add_chain(tenant, FrameworkId::new(1), PolicyId::new(5), SubPolicyId::new(42));
    Arc::new(registry)
}

pub fn world() -> (ComplianceRepository, TenantId) {
    let tenant = TenantId::new();
    let repo = ComplianceRepository::new(Arc::new(Ledger::new()), registry(tenant));
    (repo, tenant)
}

pub fn compliance_row(tx: &Transaction<'_>, identifier: &str, version: &str) -> Compliance {
    let now = Utc::now();
    let state = LifecycleState::submitted();
    Compliance {
        id: tx.new_compliance_id(),
        tenant: tx.tenant(),
        identifier: Identifier::new(identifier).unwrap(),
        version: ComplianceVersion::new(version).unwrap(),
        previous_version_id: None,
        sub_policy_id: SubPolicyId::new(42),
        policy_id: Some(PolicyId::new(5)),
        framework_id: Some(FrameworkId::new(1)),
        content: submission().content,
        status: state.status,
        active: state.active,
        created_by_name: "Dana".into(),
        created_by_user: UserId::new(3),
        created_at: now,
        updated_at: now,
        revision: 0,
    }
}

pub fn approval_row(tx: &Transaction<'_>, identifier: &str, tag: &str) -> ComplianceApproval {
    let tag = ApprovalTag::parse(tag).unwrap();
    let stage = if tag.family() == grc_core::TagFamily::User {
        ApprovalStage::submitted(tag).unwrap()
    } else {
        ApprovalStage::decided(tag, true, Utc::now()).unwrap()
    };
    ComplianceApproval {
        id: tx.new_approval_id(),
        tenant: tx.tenant(),
        identifier: Identifier::new(identifier).unwrap(),
        stage,
        extracted_data: Map::new(),
        user_id: UserId::new(3),
        reviewer_id: UserId::new(7),
        policy_id: Some(PolicyId::new(5)),
        framework_id: FrameworkId::new(1),
        approval_due_date: None,
        created_at: Utc::now(),
        revision: 0,
    }
}
