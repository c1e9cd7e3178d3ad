//! # Compliance Identifiers
//!
//! A compliance identifier is the stable, human-readable string shared by
//! every version of one compliance item. Machine-generated identifiers have
//! the shape `COMP-<sub-policy>-<yymmdd>-<6 hex>`.
//!
//! Approval rows are filed under the same identifier, or under the derived
//! deactivation family `COMP-DEACTIVATE-<identifier>`.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::GrcError;
use crate::identity::SubPolicyId;

/// Prefix of the derived deactivation approval family.
pub const DEACTIVATION_PREFIX: &str = "COMP-DEACTIVATE-";

const MAX_LEN: usize = 100;

/// A compliance identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Validate a caller-supplied identifier.
    ///
    /// Identifiers are short tokens: ASCII alphanumerics plus `-`, `_`, `.`,
    /// at most 100 characters.
    pub fn new(value: impl Into<String>) -> Result<Self, GrcError> {
        let s = value.into();
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(GrcError::field("Identifier", "must not be empty"));
        }
        if trimmed.len() > MAX_LEN {
            return Err(GrcError::field(
                "Identifier",
                format!("must not exceed {MAX_LEN} characters"),
            ));
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(GrcError::field(
                "Identifier",
                "may only contain letters, digits, '-', '_' and '.'",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Generate a fresh identifier for a compliance filed under `sub_policy`.
    pub fn generate(sub_policy: SubPolicyId, now: DateTime<Utc>) -> Self {
        let suffix: u32 = rand::thread_rng().gen_range(0..0x0100_0000);
        Self(format!(
            "COMP-{}-{}-{:06x}",
            sub_policy,
            now.format("%y%m%d"),
            suffix
        ))
    }

    /// The derived deactivation-family identifier for this compliance.
    pub fn deactivation_family(&self) -> Self {
        Self(format!("{DEACTIVATION_PREFIX}{}", self.0))
    }

    /// Whether this identifier names a deactivation family.
    pub fn is_deactivation_family(&self) -> bool {
        self.0.starts_with(DEACTIVATION_PREFIX) && self.0.len() > DEACTIVATION_PREFIX.len()
    }

    /// For a deactivation family, the identifier of the target compliance.
    pub fn deactivation_target(&self) -> Option<Self> {
        if self.is_deactivation_family() {
            Some(Self(self.0[DEACTIVATION_PREFIX.len()..].to_string()))
        } else {
            None
        }
    }

    /// Access the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identifier {
    type Error = GrcError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> String {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::TimeZone;

    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn generated_identifier_has_expected_shape() {
        let id = Identifier::generate(SubPolicyId::new(42), fixed_now());
        let s = id.as_str();
        assert!(s.starts_with("COMP-42-240101-"), "got {s}");
        let hex = s.rsplit('-').next().unwrap();
        assert_eq!(hex.len(), 6);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(Identifier::new(s).is_ok());
    }

    #[test]
    fn generated_identifiers_rarely_collide() {
        let ids: HashSet<_> = (0..200)
            .map(|_| Identifier::generate(SubPolicyId::new(42), fixed_now()))
            .collect();
        assert!(ids.len() >= 199);
    }

    #[test]
    fn deactivation_family_round_trip() {
        let id = Identifier::new("COMP-42-240101-a1b2c3").unwrap();
        let family = id.deactivation_family();
        assert_eq!(family.as_str(), "COMP-DEACTIVATE-COMP-42-240101-a1b2c3");
        assert!(family.is_deactivation_family());
        assert!(!id.is_deactivation_family());
        assert_eq!(family.deactivation_target(), Some(id));
    }

    #[test]
    fn rejects_empty_and_illegal_characters() {
        assert!(Identifier::new("   ").is_err());
        assert!(Identifier::new("COMP 42").is_err());
        assert!(Identifier::new("x".repeat(101)).is_err());
    }

    #[test]
    fn serde_validates_on_deserialize() {
        let ok: Identifier = serde_json::from_str("\"X-1\"").unwrap();
        assert_eq!(ok.as_str(), "X-1");
        assert!(serde_json::from_str::<Identifier>("\"bad id\"").is_err());
    }
}
