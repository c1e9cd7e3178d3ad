//! # Canonical Compliance Payload
//!
//! [`ComplianceContent`] is the fully-typed record the validator emits.
//! Its serde representation uses the wire keys external callers send, so
//! serializing a stored record and validating it again yields the same
//! record.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use grc_core::{
    ComplianceVersion, Criticality, DataClassification, Identifier, MandatoryOptional,
    ManualAutomatic, MaturityLevel, PermanentTemporary, SubPolicyId, UserId,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::mitigation::MitigationSteps;

/// Wire keys. Every key the validator reads is listed here.
pub mod keys {
    #![allow(missing_docs)]
    pub const SUB_POLICY: &str = "SubPolicy";
    pub const IDENTIFIER: &str = "Identifier";
    pub const VERSION: &str = "ComplianceVersion";
    pub const TITLE: &str = "ComplianceTitle";
    pub const DESCRIPTION: &str = "ComplianceItemDescription";
    pub const TYPE: &str = "ComplianceType";
    pub const SCOPE: &str = "Scope";
    pub const OBJECTIVE: &str = "Objective";
    pub const BUSINESS_UNITS: &str = "BusinessUnitsCovered";
    pub const APPLICABILITY: &str = "Applicability";
    pub const IS_RISK: &str = "IsRisk";
    pub const POSSIBLE_DAMAGE: &str = "PossibleDamage";
    pub const RISK_SCENARIOS: &str = "PotentialRiskScenarios";
    pub const RISK_TYPE: &str = "RiskType";
    pub const RISK_CATEGORY: &str = "RiskCategory";
    pub const RISK_IMPACT: &str = "RiskBusinessImpact";
    pub const MITIGATION: &str = "mitigation";
    pub const CRITICALITY: &str = "Criticality";
    pub const MANDATORY_OPTIONAL: &str = "MandatoryOptional";
    pub const MANUAL_AUTOMATIC: &str = "ManualAutomatic";
    pub const MATURITY_LEVEL: &str = "MaturityLevel";
    pub const PERMANENT_TEMPORARY: &str = "PermanentTemporary";
    pub const IMPACT: &str = "Impact";
    pub const PROBABILITY: &str = "Probability";
    pub const DATA_INVENTORY: &str = "DataInventory";
    pub const REVIEWER: &str = "reviewer";
    pub const DUE_DATE: &str = "ApprovalDueDate";
    pub const REMARKS: &str = "remarks";
}

/// Default score for Impact and Probability when absent.
pub const DEFAULT_SCORE: f64 = 5.0;

/// Risk attributes, required as a group when `IsRisk` is true.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    /// Damage the risk may cause.
    #[serde(rename = "PossibleDamage", default, skip_serializing_if = "Option::is_none")]
    pub possible_damage: Option<String>,
    /// Scenarios in which the risk materializes.
    #[serde(rename = "PotentialRiskScenarios", default, skip_serializing_if = "Option::is_none")]
    pub potential_risk_scenarios: Option<String>,
    /// Risk type label.
    #[serde(rename = "RiskType", default, skip_serializing_if = "Option::is_none")]
    pub risk_type: Option<String>,
    /// Risk category label.
    #[serde(rename = "RiskCategory", default, skip_serializing_if = "Option::is_none")]
    pub risk_category: Option<String>,
    /// Business impact label.
    #[serde(rename = "RiskBusinessImpact", default, skip_serializing_if = "Option::is_none")]
    pub risk_business_impact: Option<String>,
}

/// The canonical content of one compliance version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceContent {
    /// Short title.
    #[serde(rename = "ComplianceTitle")]
    pub title: String,
    /// Long description.
    #[serde(rename = "ComplianceItemDescription")]
    pub description: String,
    /// Free-form compliance type.
    #[serde(rename = "ComplianceType")]
    pub compliance_type: String,
    /// Scope statement.
    #[serde(rename = "Scope", default)]
    pub scope: String,
    /// Objective statement.
    #[serde(rename = "Objective", default)]
    pub objective: String,
    /// Business units covered.
    #[serde(rename = "BusinessUnitsCovered")]
    pub business_units_covered: String,
    /// Applicability label.
    #[serde(rename = "Applicability", default)]
    pub applicability: String,
    /// Whether the control addresses a risk.
    #[serde(rename = "IsRisk")]
    pub is_risk: bool,
    /// Risk attributes.
    #[serde(flatten)]
    pub risk: RiskProfile,
    /// Ordered mitigation steps.
    #[serde(rename = "mitigation", default)]
    pub mitigation: MitigationSteps,
    /// Criticality.
    #[serde(rename = "Criticality")]
    pub criticality: Criticality,
    /// Mandatory or optional.
    #[serde(rename = "MandatoryOptional")]
    pub mandatory_optional: MandatoryOptional,
    /// Manual or automatic.
    #[serde(rename = "ManualAutomatic")]
    pub manual_automatic: ManualAutomatic,
    /// Maturity level.
    #[serde(rename = "MaturityLevel", default)]
    pub maturity_level: MaturityLevel,
    /// Permanent or temporary.
    #[serde(rename = "PermanentTemporary", default)]
    pub permanent_temporary: PermanentTemporary,
    /// Impact score in `[1.0, 10.0]`.
    #[serde(rename = "Impact")]
    pub impact: f64,
    /// Probability score in `[1.0, 10.0]`.
    #[serde(rename = "Probability")]
    pub probability: f64,
    /// Field label to data classification.
    #[serde(rename = "DataInventory", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data_inventory: BTreeMap<String, DataClassification>,
}

impl ComplianceContent {
    /// Render as a wire object.
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// A validated external submission.
///
/// `content` is always complete. The envelope fields are optional because
/// which of them are required depends on the [`ValidationMode`](crate::ValidationMode).
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSubmission {
    /// Target sub-policy.
    pub sub_policy_id: Option<SubPolicyId>,
    /// Caller-supplied identifier.
    pub identifier: Option<Identifier>,
    /// Caller-supplied version.
    pub version: Option<ComplianceVersion>,
    /// Assigned reviewer.
    pub reviewer_id: Option<UserId>,
    /// Approval due date.
    pub approval_due_date: Option<NaiveDate>,
    /// Submitter remarks.
    pub remarks: Option<String>,
    /// The compliance content.
    pub content: ComplianceContent,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::{json, Value};

    /// A complete, valid create payload.
    pub fn create_payload() -> Value {
        json!({
            "SubPolicy": 42,
            "ComplianceTitle": "Access Logging",
            "ComplianceItemDescription": "All privileged access is logged centrally.",
            "ComplianceType": "Technical",
            "Scope": "Production systems",
            "Objective": "Detect misuse of privileged accounts",
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
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn content_serializes_with_wire_keys() {
        let content = ComplianceContent {
            title: "T".into(),
            description: "D".into(),
            compliance_type: "Technical".into(),
            scope: String::new(),
            objective: String::new(),
            business_units_covered: "IT".into(),
            applicability: String::new(),
            is_risk: false,
            risk: RiskProfile::default(),
            mitigation: MitigationSteps::from_steps(["A"]),
            criticality: Criticality::Low,
            mandatory_optional: MandatoryOptional::Optional,
            manual_automatic: ManualAutomatic::Manual,
            maturity_level: MaturityLevel::Initial,
            permanent_temporary: PermanentTemporary::Permanent,
            impact: DEFAULT_SCORE,
            probability: DEFAULT_SCORE,
            data_inventory: BTreeMap::new(),
        };
        let map = content.to_map();
        assert_eq!(map["ComplianceTitle"], json!("T"));
        assert_eq!(map["mitigation"], json!({"1": "A"}));
        assert_eq!(map["Impact"], json!(5.0));
        assert!(!map.contains_key("PossibleDamage"));
        assert!(!map.contains_key("DataInventory"));
        let back: ComplianceContent = serde_json::from_value(Value::Object(map)).unwrap();
        assert_eq!(back, content);
    }
}
