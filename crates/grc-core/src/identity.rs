//! # Identity Newtypes
//!
//! Domain-primitive newtypes for the identities the engine handles. Each
//! identifier is a distinct type; a [`UserId`] cannot be passed where a
//! [`ComplianceId`] is expected.
//!
//! ## Kinds
//!
//! - [`TenantId`] is UUID-based and opaque. The engine never interprets it,
//!   it only scopes every read and write by it.
//! - Row and principal identifiers ([`UserId`], [`ComplianceId`],
//!   [`ApprovalId`], [`SubPolicyId`], [`PolicyId`], [`FrameworkId`]) are
//!   positive 64-bit integers, serialized as plain JSON numbers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GrcError;

// ---------------------------------------------------------------------------
// Tenant
// ---------------------------------------------------------------------------

/// Opaque tenant identifier attached to every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(Uuid);

impl TenantId {
    /// Create a new random tenant identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a tenant identifier from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TenantId {
    type Err = GrcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| GrcError::TenantMissing)
    }
}

// ---------------------------------------------------------------------------
// Numeric identifiers
// ---------------------------------------------------------------------------

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wrap a raw integer. Callers must pass a positive value;
            /// use [`Self::parse`] for untrusted input.
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Parse a positive integer from an untrusted string.
            pub fn parse(value: &str) -> Result<Self, GrcError> {
                match value.trim().parse::<i64>() {
                    Ok(v) if v > 0 => Ok(Self(v)),
                    _ => Err(GrcError::field($kind, "must be a positive integer")),
                }
            }

            /// The raw integer value.
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }
    };
}

numeric_id!(
    /// A principal in the user subsystem (submitter or reviewer).
    UserId,
    "user"
);
numeric_id!(
    /// Primary key of a Compliance row.
    ComplianceId,
    "compliance"
);
numeric_id!(
    /// Primary key of a ComplianceApproval row.
    ApprovalId,
    "approval"
);
numeric_id!(
    /// A sub-policy in the external framework hierarchy.
    SubPolicyId,
    "SubPolicy"
);
numeric_id!(
    /// A policy in the external framework hierarchy.
    PolicyId,
    "PolicyId"
);
numeric_id!(
    /// A framework at the root of the external hierarchy.
    FrameworkId,
    "FrameworkId"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_serialize_as_plain_numbers() {
        let id = UserId::new(7);
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
        let back: UserId = serde_json::from_str("7").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn parse_rejects_zero_and_negative() {
        assert!(SubPolicyId::parse("0").is_err());
        assert!(SubPolicyId::parse("-4").is_err());
        assert!(SubPolicyId::parse("abc").is_err());
        assert_eq!(SubPolicyId::parse(" 42 ").unwrap().get(), 42);
    }

    #[test]
    fn parse_error_names_the_field() {
        match SubPolicyId::parse("x") {
            Err(GrcError::Validation(errors)) => assert!(errors.contains("SubPolicy")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn tenant_id_round_trips_through_string() {
        let tenant = TenantId::new();
        let parsed: TenantId = tenant.to_string().parse().unwrap();
        assert_eq!(parsed, tenant);
    }

    #[test]
    fn malformed_tenant_is_tenant_missing() {
        assert_eq!(
            "not-a-uuid".parse::<TenantId>(),
            Err(GrcError::TenantMissing)
        );
    }

    #[test]
    fn ids_order_numerically() {
        assert!(ComplianceId::new(2) < ComplianceId::new(10));
    }
}
