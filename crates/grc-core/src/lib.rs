#![deny(missing_docs)]

//! # grc-core: Foundational Types for the Compliance-Lifecycle Engine
//!
//! This crate defines the types every other crate in the workspace depends
//! on. It has no internal crate dependencies.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for domain primitives.** A [`UserId`] cannot be
//!    passed where a [`ComplianceId`] is expected, and a [`TenantId`] is
//!    opaque.
//!
//! 2. **Closed enumerations.** Every enumerated payload field is a Rust
//!    enum with a single wire spelling; see [`domain`].
//!
//! 3. **Fixed-point versions.** [`ComplianceVersion`] compares numerically
//!    without floating point.
//!
//! 4. **[`GrcError`] hierarchy.** Structured errors with `thiserror`, one
//!    variant per failure kind surfaced to callers.

pub mod capability;
pub mod domain;
pub mod error;
pub mod identifier;
pub mod identity;
pub mod tag;
pub mod version;

pub use capability::Capability;
pub use domain::{
    ActiveState, ComplianceStatus, Criticality, DataClassification, MandatoryOptional,
    ManualAutomatic, MaturityLevel, PermanentTemporary, ToggleIntent, UnknownVariant,
    VersioningType,
};
pub use error::{FieldErrors, GrcError, GrcResult};
pub use identifier::{Identifier, DEACTIVATION_PREFIX};
pub use identity::{
    ApprovalId, ComplianceId, FrameworkId, PolicyId, SubPolicyId, TenantId, UserId,
};
pub use tag::{ApprovalTag, TagFamily};
pub use version::ComplianceVersion;
