//! # Approval Snapshots
//!
//! Builders for the `extracted_data` object stored on approval rows. A
//! snapshot is a copy of the Compliance fields at submission time plus a
//! `compliance_approval` sub-object carrying decision state:
//!
//! ```text
//! u rows:           { "approved": null, "remarks": "" }
//! u rows (resub):   { "approved": null, "remarks": "", "inResubmission": true }
//! r rows:           { "approved": true|false, "remarks": "..." }
//! ```

use chrono::NaiveDate;
use serde_json::{json, Map, Value};

use grc_compliance::keys as payload_keys;
use grc_core::{ComplianceStatus, UserId};

use crate::records::Compliance;

/// Snapshot keys beyond the payload keys.
pub mod keys {
    /// Decision sub-object.
    pub const DECISION: &str = "compliance_approval";
    /// Review status of the snapshotted row.
    pub const STATUS: &str = "Status";
    /// Activation flag of the snapshotted row.
    pub const ACTIVE: &str = "ActiveInactive";
    /// Creator display name.
    pub const CREATED_BY_NAME: &str = "CreatedByName";
    /// Creation date.
    pub const CREATED_BY_DATE: &str = "CreatedByDate";
    /// Row id of the snapshotted compliance.
    pub const COMPLIANCE_ID: &str = "ComplianceId";
    /// Policy of the chain.
    pub const POLICY: &str = "PolicyId";
    /// Framework of the chain.
    pub const FRAMEWORK: &str = "FrameworkId";
    /// Dashboard enrichment: submitter display name.
    pub const CREATOR_NAME: &str = "CreatorName";
    /// Deactivation request marker.
    pub const TYPE: &str = "type";
    /// Deactivation request kind.
    pub const REQUEST_TYPE: &str = "RequestType";
    /// Deactivation: status before.
    pub const CURRENT_STATUS: &str = "current_status";
    /// Deactivation: status requested.
    pub const REQUESTED_STATUS: &str = "requested_status";
    /// Deactivation reason.
    pub const REASON: &str = "reason";
    /// Deactivation target row.
    pub const TARGET: &str = "compliance_id";
}

/// `type` value of deactivation snapshots.
pub const DEACTIVATION_TYPE: &str = "compliance_deactivation";
/// `RequestType` value of deactivation snapshots.
pub const DEACTIVATION_REQUEST: &str = "Change Status to Inactive";

/// Decision sub-object of a fresh submission.
pub fn pending_decision() -> Value {
    json!({ "approved": null, "remarks": "" })
}

/// Decision sub-object of a resubmission.
pub fn resubmitted_decision() -> Value {
    json!({ "approved": null, "remarks": "", "inResubmission": true })
}

/// Decision sub-object of a decided row.
pub fn decided(approved: bool, remarks: &str) -> Value {
    json!({ "approved": approved, "remarks": remarks })
}

/// Full snapshot of a Compliance row for a `u` row.
pub fn of_compliance(
    row: &Compliance,
    reviewer: UserId,
    due_date: Option<NaiveDate>,
) -> Map<String, Value> {
    let mut map = row.content.to_map();
    map.insert(payload_keys::IDENTIFIER.into(), json!(row.identifier));
    map.insert(payload_keys::VERSION.into(), json!(row.version));
    map.insert(payload_keys::SUB_POLICY.into(), json!(row.sub_policy_id));
    map.insert(keys::POLICY.into(), json!(row.policy_id));
    map.insert(keys::FRAMEWORK.into(), json!(row.framework_id));
    map.insert(keys::COMPLIANCE_ID.into(), json!(row.id));
    map.insert(keys::STATUS.into(), json!(row.status));
    map.insert(keys::ACTIVE.into(), json!(row.active));
    map.insert(keys::CREATED_BY_NAME.into(), json!(row.created_by_name));
    map.insert(
        keys::CREATED_BY_DATE.into(),
        json!(row.created_at.date_naive().to_string()),
    );
    map.insert(payload_keys::REVIEWER.into(), json!(reviewer));
    map.insert(
        payload_keys::DUE_DATE.into(),
        json!(due_date.map(|d| d.to_string())),
    );
    map.insert(keys::DECISION.into(), pending_decision());
    map
}

/// Snapshot of a deactivation request against `row`.
pub fn of_deactivation(
    row: &Compliance,
    reason: &str,
    reviewer: UserId,
    due_date: Option<NaiveDate>,
) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(keys::TYPE.into(), json!(DEACTIVATION_TYPE));
    map.insert(keys::REQUEST_TYPE.into(), json!(DEACTIVATION_REQUEST));
    map.insert(keys::CURRENT_STATUS.into(), json!("Active"));
    map.insert(keys::REQUESTED_STATUS.into(), json!("Inactive"));
    map.insert(keys::REASON.into(), json!(reason));
    map.insert(keys::TARGET.into(), json!(row.id));
    map.insert(payload_keys::IDENTIFIER.into(), json!(row.identifier));
    map.insert(payload_keys::VERSION.into(), json!(row.version));
    map.insert(payload_keys::TITLE.into(), json!(row.content.title));
    map.insert(payload_keys::IMPACT.into(), json!(row.content.impact));
    map.insert(payload_keys::PROBABILITY.into(), json!(row.content.probability));
    map.insert(payload_keys::REVIEWER.into(), json!(reviewer));
    map.insert(
        payload_keys::DUE_DATE.into(),
        json!(due_date.map(|d| d.to_string())),
    );
    map.insert(keys::DECISION.into(), pending_decision());
    map
}

/// Copy of `base` for an `r` row recording `approved`.
pub fn with_decision(base: &Map<String, Value>, approved: bool, remarks: &str) -> Map<String, Value> {
    let mut map = base.clone();
    map.insert(
        keys::STATUS.into(),
        json!(ComplianceStatus::from_decision(approved)),
    );
    map.insert(keys::DECISION.into(), decided(approved, remarks));
    map
}

/// Whether a score key is absent or blank.
pub fn score_missing(map: &Map<String, Value>, key: &str) -> bool {
    match map.get(key) {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Fill absent Impact/Probability from the first source that has them.
pub fn backfill_scores<'a>(
    map: &mut Map<String, Value>,
    sources: impl IntoIterator<Item = &'a Map<String, Value>>,
) {
    let sources: Vec<&Map<String, Value>> = sources.into_iter().collect();
    for key in [payload_keys::IMPACT, payload_keys::PROBABILITY] {
        if !score_missing(map, key) {
            continue;
        }
        if let Some(value) = sources
            .iter()
            .find(|s| !score_missing(s, key))
            .and_then(|s| s.get(key))
        {
            map.insert(key.into(), value.clone());
        }
    }
}

/// The decision recorded on a snapshot, if any.
pub fn recorded_decision(map: &Map<String, Value>) -> Option<bool> {
    map.get(keys::DECISION)
        .and_then(|d| d.get("approved"))
        .and_then(Value::as_bool)
}
