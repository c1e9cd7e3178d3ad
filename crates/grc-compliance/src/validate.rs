//! # Input Validator
//!
//! Allow-list validation of external compliance payloads. Known keys are
//! type-checked, length-bounded, pattern-matched, and constrained to their
//! enumerations; unknown keys are ignored. Server-controlled keys (status,
//! active flag, creator name) are ignored as well, so clients cannot spoof
//! them.
//!
//! Errors accumulate into a [`FieldErrors`] map so the caller sees every
//! problem at once.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::NaiveDate;
use grc_core::{
    ComplianceVersion, Criticality, DataClassification, FieldErrors, Identifier,
    MandatoryOptional, ManualAutomatic, MaturityLevel, PermanentTemporary, SubPolicyId,
    UnknownVariant, UserId,
};
use regex::Regex;
use serde_json::{Map, Value};

use crate::mitigation::{normalize, MitigationSteps, NormalizeMode};
use crate::payload::{keys, ComplianceContent, RiskProfile, ValidatedSubmission, DEFAULT_SCORE};
use crate::text::{canonical_prose, is_short_token};

const SCORE_MIN: f64 = 1.0;
const SCORE_MAX: f64 = 10.0;
const DATA_LABEL_MAX: usize = 100;

/// Which envelope fields a submission must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// New compliance: sub-policy, reviewer, and due date are required.
    Create,
    /// New version of an existing compliance: reviewer and due date are
    /// required, the sub-policy is inherited when absent.
    Edit,
    /// Edited snapshot on resubmission: envelope fields are inherited.
    Resubmission,
}

impl ValidationMode {
    fn requires_sub_policy(self) -> bool {
        matches!(self, Self::Create)
    }

    fn requires_assignment(self) -> bool {
        matches!(self, Self::Create | Self::Edit)
    }
}

/// Result of validating an in-progress form.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftReport {
    /// Shape problems found. Missing fields are not reported.
    pub errors: FieldErrors,
    /// Mitigation with empty slots preserved.
    pub mitigation: MitigationSteps,
}

/// Validate a payload and emit the canonical submission.
pub fn validate(payload: &Value, mode: ValidationMode) -> Result<ValidatedSubmission, FieldErrors> {
    let Some(map) = payload.as_object() else {
        let mut errors = FieldErrors::new();
        errors.add("payload", "must be a JSON object");
        return Err(errors);
    };
    let mut r = Reader::new(map, true);

    let sub_policy_id = r
        .positive_int(keys::SUB_POLICY, mode.requires_sub_policy())
        .map(SubPolicyId::new);
    let identifier = r.identifier();
    let version = r.version();
    let reviewer_id = r
        .positive_int(keys::REVIEWER, mode.requires_assignment())
        .map(UserId::new);
    let approval_due_date = r.date(keys::DUE_DATE, mode.requires_assignment());
    let remarks = r.prose(keys::REMARKS, 5000, false);

    let content = read_content(&mut r, NormalizeMode::Canonical);

    let errors = r.finish();
    match content {
        Some(content) if errors.is_empty() => Ok(ValidatedSubmission {
            sub_policy_id,
            identifier,
            version,
            reviewer_id,
            approval_due_date,
            remarks,
            content,
        }),
        _ => Err(errors),
    }
}

/// Validate an in-progress form without requiring any field.
///
/// Mitigation keeps empty slots so step numbering shown in a form stays
/// stable while the user edits.
pub fn validate_draft(payload: &Value) -> DraftReport {
    let Some(map) = payload.as_object() else {
        let mut errors = FieldErrors::new();
        errors.add("payload", "must be a JSON object");
        return DraftReport {
            errors,
            mitigation: MitigationSteps::new(),
        };
    };
    let mut r = Reader::new(map, false);
    r.positive_int(keys::SUB_POLICY, false);
    r.identifier();
    r.version();
    r.positive_int(keys::REVIEWER, false);
    r.date(keys::DUE_DATE, false);
    r.prose(keys::REMARKS, 5000, false);
    let mitigation = map
        .get(keys::MITIGATION)
        .map(|v| normalize(v, NormalizeMode::PreserveSlots))
        .unwrap_or_default();
    read_content(&mut r, NormalizeMode::PreserveSlots);
    DraftReport {
        errors: r.finish(),
        mitigation,
    }
}

fn read_content(r: &mut Reader<'_>, mode: NormalizeMode) -> Option<ComplianceContent> {
    let title = r.prose(keys::TITLE, 145, true);
    let description = r.prose(keys::DESCRIPTION, 5000, true);
    let compliance_type = r.prose(keys::TYPE, 100, true);
    let scope = r.prose(keys::SCOPE, 5000, false).unwrap_or_default();
    let objective = r.prose(keys::OBJECTIVE, 5000, false).unwrap_or_default();
    let business_units_covered = r.prose(keys::BUSINESS_UNITS, 225, true);
    let applicability = r.short_token(keys::APPLICABILITY, 45).unwrap_or_default();
    let is_risk = r.boolean(keys::IS_RISK, true);

    let risk_required = is_risk.unwrap_or(false);
    let risk = RiskProfile {
        possible_damage: r.prose(keys::POSSIBLE_DAMAGE, 5000, risk_required),
        potential_risk_scenarios: r.prose(keys::RISK_SCENARIOS, 5000, risk_required),
        risk_type: r.prose(keys::RISK_TYPE, 45, risk_required),
        risk_category: r.prose(keys::RISK_CATEGORY, 45, risk_required),
        risk_business_impact: r.prose(keys::RISK_IMPACT, 45, risk_required),
    };

    let mitigation = r
        .map
        .get(keys::MITIGATION)
        .map(|v| normalize(v, mode))
        .unwrap_or_default();
    if risk_required && mitigation.is_empty() {
        r.require_failed(keys::MITIGATION);
    }

    let criticality = r.enumeration::<Criticality>(keys::CRITICALITY, true);
    let mandatory_optional = r.enumeration::<MandatoryOptional>(keys::MANDATORY_OPTIONAL, true);
    let manual_automatic = r.enumeration::<ManualAutomatic>(keys::MANUAL_AUTOMATIC, true);
    let maturity_level = r
        .enumeration::<MaturityLevel>(keys::MATURITY_LEVEL, false)
        .unwrap_or_default();
    let permanent_temporary = r
        .enumeration::<PermanentTemporary>(keys::PERMANENT_TEMPORARY, false)
        .unwrap_or_default();
    let impact = r.score(keys::IMPACT);
    let probability = r.score(keys::PROBABILITY);
    let data_inventory = r.data_inventory();

    Some(ComplianceContent {
        title: title?,
        description: description?,
        compliance_type: compliance_type?,
        scope,
        objective,
        business_units_covered: business_units_covered?,
        applicability,
        is_risk: is_risk?,
        risk,
        mitigation,
        criticality: criticality?,
        mandatory_optional: mandatory_optional?,
        manual_automatic: manual_automatic?,
        maturity_level,
        permanent_temporary,
        impact: impact?,
        probability: probability?,
        data_inventory,
    })
}

// -- Field reader ------------------------------------------------------------

struct Reader<'a> {
    map: &'a Map<String, Value>,
    errors: FieldErrors,
    enforce_required: bool,
}

impl<'a> Reader<'a> {
    fn new(map: &'a Map<String, Value>, enforce_required: bool) -> Self {
        Self {
            map,
            errors: FieldErrors::new(),
            enforce_required,
        }
    }

    fn finish(self) -> FieldErrors {
        self.errors
    }

    fn require_failed(&mut self, key: &str) {
        if self.enforce_required {
            self.errors.add(key, "is required");
        }
    }

    /// Present and not null.
    fn raw(&self, key: &str) -> Option<&'a Value> {
        match self.map.get(key) {
            None | Some(Value::Null) => None,
            Some(v) => Some(v),
        }
    }

    fn prose(&mut self, key: &str, max: usize, required: bool) -> Option<String> {
        let value = match self.raw(key) {
            None => None,
            Some(Value::String(s)) => Some(canonical_prose(s)),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(_) => {
                self.errors.add(key, "must be a string");
                return None;
            }
        };
        match value {
            Some(s) if s.is_empty() => {
                if required {
                    self.require_failed(key);
                }
                None
            }
            Some(s) => {
                if s.chars().count() > max {
                    self.errors.add(key, format!("must not exceed {max} characters"));
                    return None;
                }
                Some(s)
            }
            None => {
                if required {
                    self.require_failed(key);
                }
                None
            }
        }
    }

    fn short_token(&mut self, key: &str, max: usize) -> Option<String> {
        let value = self.prose(key, max, false)?;
        if !is_short_token(&value) {
            self.errors
                .add(key, "may only contain letters, digits, spaces and punctuation");
            return None;
        }
        Some(value)
    }

    fn positive_int(&mut self, key: &str, required: bool) -> Option<i64> {
        let parsed = match self.raw(key) {
            None => {
                if required {
                    self.require_failed(key);
                }
                return None;
            }
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().parse::<i64>().ok(),
            Some(Value::String(_)) => {
                if required {
                    self.require_failed(key);
                }
                return None;
            }
            Some(_) => None,
        };
        match parsed {
            Some(v) if v > 0 => Some(v),
            _ => {
                self.errors.add(key, "must be a positive integer");
                None
            }
        }
    }

    fn boolean(&mut self, key: &str, required: bool) -> Option<bool> {
        match self.raw(key) {
            None => {
                if required {
                    self.require_failed(key);
                }
                None
            }
            Some(Value::Bool(b)) => Some(*b),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => {
                    self.errors.add(key, "must be a boolean");
                    None
                }
            },
            Some(_) => {
                self.errors.add(key, "must be a boolean");
                None
            }
        }
    }

    fn enumeration<T>(&mut self, key: &str, required: bool) -> Option<T>
    where
        T: FromStr<Err = UnknownVariant>,
    {
        match self.raw(key) {
            None => {
                if required {
                    self.require_failed(key);
                }
                None
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                if required {
                    self.require_failed(key);
                }
                None
            }
            Some(Value::String(s)) => match s.parse::<T>() {
                Ok(v) => Some(v),
                Err(e) => {
                    self.errors.add(key, e.to_string());
                    None
                }
            },
            Some(_) => {
                self.errors.add(key, "must be a string");
                None
            }
        }
    }

    /// Impact/Probability: optional, default 5.0, within [1.0, 10.0].
    fn score(&mut self, key: &str) -> Option<f64> {
        let parsed = match self.raw(key) {
            None => return Some(DEFAULT_SCORE),
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) if s.trim().is_empty() => return Some(DEFAULT_SCORE),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            Some(_) => None,
        };
        match parsed {
            Some(v) if v.is_finite() && (SCORE_MIN..=SCORE_MAX).contains(&v) => Some(v),
            Some(v) if v.is_finite() => {
                self.errors.add(key, "must be between 1.0 and 10.0");
                None
            }
            _ => {
                self.errors.add(key, "must be a decimal number");
                None
            }
        }
    }

    fn date(&mut self, key: &str, required: bool) -> Option<NaiveDate> {
        let s = match self.raw(key) {
            None => {
                if required {
                    self.require_failed(key);
                }
                return None;
            }
            Some(Value::String(s)) => s.trim(),
            Some(_) => {
                self.errors.add(key, "must be a date in YYYY-MM-DD format");
                return None;
            }
        };
        if s.is_empty() {
            if required {
                self.require_failed(key);
            }
            return None;
        }
        if !date_re().is_match(s) {
            self.errors.add(key, "must be a date in YYYY-MM-DD format");
            return None;
        }
        match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            Ok(d) => Some(d),
            Err(_) => {
                self.errors.add(key, "is not a valid calendar date");
                None
            }
        }
    }

    fn identifier(&mut self) -> Option<Identifier> {
        match self.raw(keys::IDENTIFIER) {
            None => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(s)) => match Identifier::new(s.as_str()) {
                Ok(id) => Some(id),
                Err(grc_core::GrcError::Validation(e)) => {
                    self.errors.merge(e);
                    None
                }
                Err(_) => None,
            },
            Some(_) => {
                self.errors.add(keys::IDENTIFIER, "must be a string");
                None
            }
        }
    }

    fn version(&mut self) -> Option<ComplianceVersion> {
        let s = match self.raw(keys::VERSION) {
            None => return None,
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            Some(_) => {
                self.errors.add(keys::VERSION, "must be a string");
                return None;
            }
        };
        if s.is_empty() {
            return None;
        }
        if s.chars().count() > 50 {
            self.errors.add(keys::VERSION, "must not exceed 50 characters");
            return None;
        }
        if !version_re().is_match(&s) {
            self.errors
                .add(keys::VERSION, "must be a decimal version such as 1.0");
            return None;
        }
        match ComplianceVersion::new(s) {
            Ok(v) => Some(v),
            Err(grc_core::GrcError::Validation(e)) => {
                self.errors.merge(e);
                None
            }
            Err(_) => None,
        }
    }

    fn data_inventory(&mut self) -> BTreeMap<String, DataClassification> {
        let mut out = BTreeMap::new();
        let parsed;
        let map = match self.raw(keys::DATA_INVENTORY) {
            None => return out,
            Some(Value::Object(m)) => m,
            Some(Value::String(s)) if s.trim().is_empty() => return out,
            Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
                Ok(Value::Object(m)) => {
                    parsed = m;
                    &parsed
                }
                _ => {
                    self.errors.add(keys::DATA_INVENTORY, "must be an object");
                    return out;
                }
            },
            Some(_) => {
                self.errors.add(keys::DATA_INVENTORY, "must be an object");
                return out;
            }
        };
        for (label, value) in map {
            let label = canonical_prose(label);
            if label.is_empty() || label.chars().count() > DATA_LABEL_MAX {
                self.errors.add(
                    keys::DATA_INVENTORY,
                    format!("labels must be 1 to {DATA_LABEL_MAX} characters"),
                );
                continue;
            }
            match value.as_str().map(str::parse::<DataClassification>) {
                Some(Ok(class)) => {
                    out.insert(label, class);
                }
                _ => self.errors.add(
                    keys::DATA_INVENTORY,
                    format!(
                        "'{label}' must be one of {}",
                        DataClassification::expected()
                    ),
                ),
            }
        }
        out
    }
}

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap_or_else(|_| unreachable!()))
}

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+(\.\d+)?$").unwrap_or_else(|_| unreachable!()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::payload::fixtures::create_payload;

    fn with(mut payload: Value, key: &str, value: Value) -> Value {
        payload[key] = value;
        payload
    }

    fn without(mut payload: Value, key: &str) -> Value {
        if let Some(map) = payload.as_object_mut() {
            map.remove(key);
        }
        payload
    }

    #[test]
    fn valid_create_payload_passes_with_defaults() {
        let sub = validate(&create_payload(), ValidationMode::Create).unwrap();
        assert_eq!(sub.sub_policy_id, Some(SubPolicyId::new(42)));
        assert_eq!(sub.reviewer_id, Some(UserId::new(7)));
        assert_eq!(sub.version.unwrap().as_str(), "1.0");
        assert_eq!(sub.content.title, "Access Logging");
        assert_eq!(sub.content.maturity_level, MaturityLevel::Initial);
        assert_eq!(sub.content.permanent_temporary, PermanentTemporary::Permanent);
        assert_eq!(sub.content.impact, 5.0);
        assert_eq!(sub.content.probability, 5.0);
        assert_eq!(sub.content.mitigation.steps(), &["Enable logs", "Rotate keys"]);
    }

    #[test]
    fn unknown_and_server_controlled_keys_are_ignored() {
        let mut payload = create_payload();
        payload["Status"] = json!("Approved");
        payload["ActiveInactive"] = json!("Active");
        payload["CreatedByName"] = json!("Mallory");
        payload["Nonsense"] = json!({"deep": true});
        assert!(validate(&payload, ValidationMode::Create).is_ok());
    }

    #[test]
    fn missing_required_fields_are_all_reported() {
        let payload = json!({"IsRisk": false});
        let errors = validate(&payload, ValidationMode::Create).unwrap_err();
        for key in [
            "SubPolicy",
            "ComplianceTitle",
            "ComplianceItemDescription",
            "ComplianceType",
            "BusinessUnitsCovered",
            "Criticality",
            "MandatoryOptional",
            "ManualAutomatic",
            "reviewer",
            "ApprovalDueDate",
        ] {
            assert_eq!(errors.get(key).unwrap(), &["is required"], "{key}");
        }
    }

    #[test]
    fn title_length_is_bounded() {
        let payload = with(create_payload(), "ComplianceTitle", json!("x".repeat(146)));
        let errors = validate(&payload, ValidationMode::Create).unwrap_err();
        assert_eq!(
            errors.get("ComplianceTitle").unwrap(),
            &["must not exceed 145 characters"]
        );
        let ok = with(create_payload(), "ComplianceTitle", json!("x".repeat(145)));
        assert!(validate(&ok, ValidationMode::Create).is_ok());
    }

    #[test]
    fn enumerations_are_closed() {
        let payload = with(create_payload(), "Criticality", json!("Critical"));
        let errors = validate(&payload, ValidationMode::Create).unwrap_err();
        assert_eq!(
            errors.get("Criticality").unwrap(),
            &["must be one of High, Medium, Low"]
        );
    }

    #[test]
    fn risk_fields_required_only_when_is_risk() {
        let payload = with(create_payload(), "IsRisk", json!(true));
        let errors = validate(&payload, ValidationMode::Create).unwrap_err();
        for key in [
            "PossibleDamage",
            "PotentialRiskScenarios",
            "RiskType",
            "RiskCategory",
            "RiskBusinessImpact",
        ] {
            assert!(errors.contains(key), "{key}");
        }
        assert!(!errors.contains("mitigation"));
    }

    #[test]
    fn risk_requires_mitigation() {
        let mut payload = with(create_payload(), "IsRisk", json!("true"));
        payload["PossibleDamage"] = json!("Data loss");
        payload["PotentialRiskScenarios"] = json!("Insider exfiltration");
        payload["RiskType"] = json!("Operational");
        payload["RiskCategory"] = json!("IT");
        payload["RiskBusinessImpact"] = json!("High");
        payload["mitigation"] = json!("   ");
        let errors = validate(&payload, ValidationMode::Create).unwrap_err();
        assert_eq!(errors.get("mitigation").unwrap(), &["is required"]);
        assert_eq!(errors.len(), 1);

        payload["mitigation"] = json!(["Restrict exports"]);
        let sub = validate(&payload, ValidationMode::Create).unwrap();
        assert!(sub.content.is_risk);
        assert_eq!(sub.content.risk.risk_type.as_deref(), Some("Operational"));
    }

    #[test]
    fn scores_default_and_bound() {
        let payload = with(create_payload(), "Impact", json!("7.5"));
        assert_eq!(validate(&payload, ValidationMode::Create).unwrap().content.impact, 7.5);

        for bad in [json!(0.5), json!(10.5), json!("11")] {
            let payload = with(create_payload(), "Probability", bad);
            let errors = validate(&payload, ValidationMode::Create).unwrap_err();
            assert_eq!(errors.get("Probability").unwrap(), &["must be between 1.0 and 10.0"]);
        }
        let payload = with(create_payload(), "Impact", json!("high"));
        assert!(validate(&payload, ValidationMode::Create).is_err());
        let payload = with(create_payload(), "Impact", json!(1.0));
        assert!(validate(&payload, ValidationMode::Create).is_ok());
    }

    #[test]
    fn due_date_must_be_calendar_date() {
        for bad in ["01/02/2024", "2024-1-2", "2024-02-30"] {
            let payload = with(create_payload(), "ApprovalDueDate", json!(bad));
            let errors = validate(&payload, ValidationMode::Create).unwrap_err();
            assert!(errors.contains("ApprovalDueDate"), "{bad}");
        }
    }

    #[test]
    fn version_pattern_is_strict() {
        let payload = with(create_payload(), "ComplianceVersion", json!("v1"));
        assert!(validate(&payload, ValidationMode::Create).is_err());
        let payload = without(create_payload(), "ComplianceVersion");
        assert_eq!(validate(&payload, ValidationMode::Create).unwrap().version, None);
    }

    #[test]
    fn edit_inherits_sub_policy_and_resubmission_inherits_assignment() {
        let payload = without(create_payload(), "SubPolicy");
        assert!(validate(&payload, ValidationMode::Create).is_err());
        assert!(validate(&payload, ValidationMode::Edit).is_ok());

        let payload = without(without(payload, "reviewer"), "ApprovalDueDate");
        assert!(validate(&payload, ValidationMode::Edit).is_err());
        assert!(validate(&payload, ValidationMode::Resubmission).is_ok());
    }

    #[test]
    fn data_inventory_is_validated() {
        let payload = with(
            create_payload(),
            "DataInventory",
            json!({"Email": "personal", "Salary": "confidential"}),
        );
        let sub = validate(&payload, ValidationMode::Create).unwrap();
        assert_eq!(sub.content.data_inventory["Email"], DataClassification::Personal);

        let payload = with(create_payload(), "DataInventory", json!({"Email": "secret"}));
        let errors = validate(&payload, ValidationMode::Create).unwrap_err();
        assert!(errors.get("DataInventory").unwrap()[0].contains("personal, confidential, regular"));

        let payload = with(create_payload(), "DataInventory", json!("{\"Name\":\"regular\"}"));
        assert!(validate(&payload, ValidationMode::Create).is_ok());
    }

    #[test]
    fn applicability_rejects_markup() {
        let payload = with(create_payload(), "Applicability", json!("<b>all</b>"));
        assert!(validate(&payload, ValidationMode::Create).is_err());
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let errors = validate(&json!([1, 2]), ValidationMode::Create).unwrap_err();
        assert!(errors.contains("payload"));
    }

    #[test]
    fn canonical_content_round_trips_through_validation() {
        let first = validate(&create_payload(), ValidationMode::Create).unwrap();
        let mut wire = first.content.to_map();
        wire.insert("SubPolicy".into(), json!(42));
        wire.insert("reviewer".into(), json!(7));
        wire.insert("ApprovalDueDate".into(), json!("2024-02-01"));
        let second = validate(&Value::Object(wire), ValidationMode::Create).unwrap();
        assert_eq!(first.content, second.content);
    }

    #[test]
    fn draft_reports_shape_errors_only() {
        let report = validate_draft(&json!({
            "ComplianceTitle": "x".repeat(200),
            "mitigation": {"1": "A", "2": "", "3": "C"}
        }));
        assert!(report.errors.contains("ComplianceTitle"));
        assert!(!report.errors.contains("Criticality"));
        assert_eq!(report.mitigation.steps(), &["A", "", "C"]);
    }
}
