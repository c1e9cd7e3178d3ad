//! # Ledger Records
//!
//! The two persisted row types: [`Compliance`] (one version of one
//! compliance item) and [`ComplianceApproval`] (one entry of the approval
//! ledger). Both carry their tenant and a `revision` counter used for
//! optimistic concurrency; both are append-mostly and never deleted.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use grc_compliance::ComplianceContent;
use grc_core::{
    ActiveState, ApprovalId, ComplianceId, ComplianceStatus, ComplianceVersion, FrameworkId,
    Identifier, PolicyId, SubPolicyId, TenantId, UserId,
};
use grc_state::{ApprovalStage, ChainMember, FamilyEntry, LifecycleState};

/// One version of a compliance item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compliance {
    /// Primary key.
    pub id: ComplianceId,
    /// Owning tenant.
    pub tenant: TenantId,
    /// Identifier shared across the version chain.
    pub identifier: Identifier,
    /// Decimal version.
    pub version: ComplianceVersion,
    /// Row this version supersedes. Lookup only.
    pub previous_version_id: Option<ComplianceId>,
    /// Sub-policy the item is filed under.
    pub sub_policy_id: SubPolicyId,
    /// Policy denormalized from the sub-policy.
    pub policy_id: Option<PolicyId>,
    /// Framework denormalized from the policy.
    pub framework_id: Option<FrameworkId>,
    /// Canonical content.
    pub content: ComplianceContent,
    /// Review status.
    pub status: ComplianceStatus,
    /// Activation flag.
    pub active: ActiveState,
    /// Display name of the creator, resolved server-side.
    pub created_by_name: String,
    /// Creator principal.
    pub created_by_user: UserId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last change.
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency counter.
    pub revision: u64,
}

impl Compliance {
    /// The row's lifecycle state.
    pub fn lifecycle(&self) -> LifecycleState {
        LifecycleState {
            status: self.status,
            active: self.active,
        }
    }

    /// Replace the lifecycle state.
    pub fn set_lifecycle(&mut self, state: LifecycleState, now: DateTime<Utc>) {
        self.status = state.status;
        self.active = state.active;
        self.updated_at = now;
    }

    /// View of this row for the chain planners.
    pub fn chain_member(&self) -> ChainMember {
        ChainMember {
            id: self.id,
            version: self.version.clone(),
            state: self.lifecycle(),
        }
    }
}

/// One entry of the approval ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceApproval {
    /// Primary key.
    pub id: ApprovalId,
    /// Owning tenant.
    pub tenant: TenantId,
    /// Compliance identifier, or its `COMP-DEACTIVATE-` family.
    pub identifier: Identifier,
    /// `u<N>` submission or `r<N>` decision.
    #[serde(flatten)]
    pub stage: ApprovalStage,
    /// Snapshot used by the review UI and the audit trail.
    pub extracted_data: Map<String, Value>,
    /// Submitter of the edit under review.
    pub user_id: UserId,
    /// Assigned reviewer.
    pub reviewer_id: UserId,
    /// Policy of the compliance chain.
    pub policy_id: Option<PolicyId>,
    /// Framework of the compliance chain.
    pub framework_id: FrameworkId,
    /// Due date for the decision.
    pub approval_due_date: Option<NaiveDate>,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency counter.
    pub revision: u64,
}

impl ComplianceApproval {
    /// View of this row for the family state machine.
    pub fn family_entry(&self) -> FamilyEntry {
        FamilyEntry {
            ordinal: self.id.get(),
            stage: self.stage,
        }
    }

    /// Whether the row belongs to a deactivation family.
    pub fn is_deactivation(&self) -> bool {
        self.identifier.is_deactivation_family()
    }

    /// A string field of the snapshot.
    pub fn snapshot_str(&self, key: &str) -> Option<&str> {
        self.extracted_data.get(key).and_then(Value::as_str)
    }
}
