//! # Error Hierarchy
//!
//! Structured error types for the compliance-lifecycle engine, built with
//! `thiserror`. No `Box<dyn Error>`, no `.unwrap()` outside tests.
//!
//! [`GrcError`] is the single taxonomy surfaced to callers. Every variant
//! except [`GrcError::Conflict`] is terminal for the caller; `Conflict` is
//! retried inside the engine before it escapes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience alias used across the workspace.
pub type GrcResult<T> = Result<T, GrcError>;

/// Top-level error type for the compliance-lifecycle engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GrcError {
    /// Payload violates allow-list, enumeration, length, or pattern rules.
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    /// A referenced sub-policy, policy, framework, compliance, or approval
    /// does not resolve in the tenant scope.
    #[error("{kind} {id} not found")]
    ReferenceNotFound {
        /// Kind of the missing reference (e.g. "sub-policy").
        kind: &'static str,
        /// The identifier that failed to resolve.
        id: String,
    },

    /// The addressed compliance or approval row does not exist in the tenant scope.
    #[error("{kind} {id} does not exist")]
    NotFound {
        /// Kind of the missing row.
        kind: &'static str,
        /// The identifier that failed to resolve.
        id: String,
    },

    /// The requested state change would break a Compliance or Approval invariant.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A required principal, reviewer, or framework context is missing.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// The capability check returned false.
    #[error("capability '{capability}' denied")]
    CapabilityDenied {
        /// Name of the denied capability (e.g. `compliance.approve`).
        capability: String,
    },

    /// The request carried no resolvable tenant.
    #[error("tenant could not be resolved")]
    TenantMissing,

    /// An optimistic transaction lost a race. The caller may retry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unexpected internal failure (corrupted row, poisoned state).
    #[error("internal error: {0}")]
    Internal(String),
}

impl GrcError {
    /// Build a `ReferenceNotFound` error.
    pub fn reference(kind: &'static str, id: impl ToString) -> Self {
        Self::ReferenceNotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Build a `NotFound` error.
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Build a `Validation` error carrying a single field message.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.add(field, message);
        Self::Validation(errors)
    }

    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_FAILURE",
            Self::ReferenceNotFound { .. } => "REFERENCE_NOT_FOUND",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvariantViolation(_) => "INVARIANT_VIOLATION",
            Self::ContractViolation(_) => "CONTRACT_VIOLATION",
            Self::CapabilityDenied { .. } => "CAPABILITY_DENIED",
            Self::TenantMissing => "TENANT_MISSING",
            Self::Conflict(_) => "CONFLICT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the engine may transparently retry the failed unit.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<FieldErrors> for GrcError {
    fn from(errors: FieldErrors) -> Self {
        Self::Validation(errors)
    }
}

/// Field-keyed validation messages.
///
/// Fields are kept in a `BTreeMap` so that rendered output is deterministic;
/// messages for a single field keep their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    /// Create an empty error map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message against a field.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Whether no messages were recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of fields with at least one message.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Messages recorded for `field`, if any.
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// Whether `field` has at least one message.
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Iterate over `(field, messages)` pairs in field order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Merge another map into this one, appending messages.
    pub fn merge(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    /// Return `Ok(value)` when empty, otherwise the errors.
    pub fn into_result<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{field}: {}", messages.join(", "))?;
        }
        Ok(())
    }
}
