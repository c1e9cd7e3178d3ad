//! # Compliance Versions
//!
//! Versions are decimal strings (`"1.0"`, `"2.3"`). Equality is by string;
//! ordering is by numeric value. To avoid floating-point drift the numeric
//! value is held as a fixed-point integer with six fractional digits.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::GrcError;

/// Fixed-point scale: one unit of the integer part.
pub const SCALE: i64 = 1_000_000;

const MAX_INT_DIGITS: usize = 12;
const MAX_LEN: usize = 50;

/// A compliance version string such as `"1.0"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ComplianceVersion(String);

impl ComplianceVersion {
    /// The version every new compliance starts at.
    pub fn initial() -> Self {
        Self("1.0".to_string())
    }

    /// Validate a `MAJOR.MINOR` (or bare `MAJOR`) string.
    pub fn new(value: impl Into<String>) -> Result<Self, GrcError> {
        let s = value.into();
        let trimmed = s.trim();
        if trimmed.len() > MAX_LEN {
            return Err(GrcError::field(
                "ComplianceVersion",
                format!("must not exceed {MAX_LEN} characters"),
            ));
        }
        if parse_scaled(trimmed).is_none() {
            return Err(GrcError::field(
                "ComplianceVersion",
                "must be a decimal version such as 1.0",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Build from a fixed-point value, rendering at least one fractional digit.
    pub fn from_scaled(value: i64) -> Self {
        let int = value / SCALE;
        let frac = value % SCALE;
        if frac == 0 {
            return Self(format!("{int}.0"));
        }
        let digits = format!("{frac:06}");
        Self(format!("{int}.{}", digits.trim_end_matches('0')))
    }

    /// Fixed-point numeric value.
    pub fn scaled(&self) -> i64 {
        // Construction guarantees the string parses.
        parse_scaled(&self.0).unwrap_or(0)
    }

    /// Access the version string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for ComplianceVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.scaled()
            .cmp(&other.scaled())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for ComplianceVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for ComplianceVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ComplianceVersion {
    type Error = GrcError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ComplianceVersion> for String {
    fn from(v: ComplianceVersion) -> String {
        v.0
    }
}

/// Parse a non-negative decimal string into fixed-point.
///
/// Accepts `D+` or `D+.D+`. Fractional digits beyond the sixth are
/// truncated. Returns `None` for anything else, including integer parts
/// too wide to scale.
pub fn parse_scaled(s: &str) -> Option<i64> {
    let s = s.trim();
    let (int, frac) = match s.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (s, None),
    };
    if int.is_empty() || int.len() > MAX_INT_DIGITS || !int.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let int_val: i64 = int.parse().ok()?;
    let frac_val = match frac {
        None => 0,
        Some(f) => {
            if f.is_empty() || !f.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let mut padded: String = f.chars().take(6).collect();
            while padded.len() < 6 {
                padded.push('0');
            }
            padded.parse::<i64>().ok()?
        }
    };
    int_val.checked_mul(SCALE)?.checked_add(frac_val)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_common_versions() {
        assert_eq!(parse_scaled("1.0"), Some(SCALE));
        assert_eq!(parse_scaled("2.3"), Some(2 * SCALE + 300_000));
        assert_eq!(parse_scaled("7"), Some(7 * SCALE));
        assert_eq!(parse_scaled("0.05"), Some(50_000));
    }

    #[test]
    fn rejects_malformed_versions() {
        for bad in ["", ".5", "1.", "v1.0", "1.0.0", "-1.0", "1,0", "abc"] {
            assert_eq!(parse_scaled(bad), None, "{bad}");
            assert!(ComplianceVersion::new(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn ordering_is_numeric_not_lexical() {
        let a = ComplianceVersion::new("1.9").unwrap();
        let b = ComplianceVersion::new("10.0").unwrap();
        let c = ComplianceVersion::new("1.10").unwrap();
        assert!(a < b);
        // 1.10 is numerically 1.1, below 1.9.
        assert!(c < a);
    }

    #[test]
    fn equality_is_by_string() {
        let a = ComplianceVersion::new("1.1").unwrap();
        let b = ComplianceVersion::new("1.10").unwrap();
        assert_ne!(a, b);
        assert_eq!(a.scaled(), b.scaled());
    }

    #[test]
    fn from_scaled_renders_minimal_fraction() {
        assert_eq!(ComplianceVersion::from_scaled(3 * SCALE).as_str(), "3.0");
        assert_eq!(
            ComplianceVersion::from_scaled(2 * SCALE + 400_000).as_str(),
            "2.4"
        );
        assert_eq!(
            ComplianceVersion::from_scaled(SCALE + 50_000).as_str(),
            "1.05"
        );
    }

    #[test]
    fn serde_round_trip_validates() {
        let v: ComplianceVersion = serde_json::from_str("\"1.0\"").unwrap();
        assert_eq!(v, ComplianceVersion::initial());
        assert!(serde_json::from_str::<ComplianceVersion>("\"one\"").is_err());
    }

    proptest! {
        #[test]
        fn scaled_rendering_parses_back(value in 0i64..1_000_000 * SCALE) {
            let v = ComplianceVersion::from_scaled(value);
            prop_assert_eq!(v.scaled(), value);
            prop_assert!(ComplianceVersion::new(v.as_str()).is_ok());
        }

        #[test]
        fn ordering_follows_numeric_value(a in 0i64..1_000 * SCALE, b in 0i64..1_000 * SCALE) {
            let (va, vb) = (ComplianceVersion::from_scaled(a), ComplianceVersion::from_scaled(b));
            prop_assert_eq!(va.cmp(&vb), a.cmp(&b));
        }
    }
}
