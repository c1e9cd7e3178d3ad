#![deny(missing_docs)]

//! # grc-compliance: Payload Validation, Normalization, and Versioning
//!
//! Pure functions over external compliance payloads. Nothing here touches
//! storage, and nothing here fails with anything but a field-keyed
//! [`FieldErrors`](grc_core::FieldErrors) map.
//!
//! - [`validate`]: allow-list validator producing a [`ValidatedSubmission`].
//! - [`mitigation`]: mitigation step normalizer.
//! - [`versioning`]: compliance version and approval tag calculators.

pub mod mitigation;
pub mod payload;
pub mod text;
pub mod validate;
pub mod versioning;

pub use mitigation::{normalize, MitigationSteps, NormalizeMode};
pub use payload::{keys, ComplianceContent, RiskProfile, ValidatedSubmission, DEFAULT_SCORE};
pub use validate::{validate, validate_draft, DraftReport, ValidationMode};
pub use versioning::{next_tag, next_version};
