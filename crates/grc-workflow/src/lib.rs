//! # grc-workflow: Compliance Repository and Approval Engine
//!
//! The stateful half of the compliance-lifecycle engine.
//!
//! ## Layers
//!
//! - **Ledger** (`store.rs`): tenant-scoped in-memory tables with staged
//!   transactions, optimistic revision checks, and per-identifier locks.
//!   Every atomic unit commits completely or not at all.
//!
//! - **Repository** (`repository.rs`): Compliance rows and version chains.
//!   Create, edit, clone, decisions, toggles, and read-side listings.
//!
//! - **Engine** (`engine.rs`): the approval workflow. Assign, review,
//!   resubmit, deactivation request and decision, toggle. Capability and
//!   principal checks happen here, events are emitted here.
//!
//! - **Dashboards** (`dashboard.rs`): reviewer work lists and submitter
//!   status views.
//!
//! - **Collaborators** (`collaborators.rs`, `events.rs`): trait seams for
//!   RBAC, the user directory, the policy hierarchy, and notification
//!   delivery, each with an in-memory implementation.

pub mod collaborators;
pub mod context;
pub mod dashboard;
pub mod engine;
pub mod events;
pub mod records;
pub mod repository;
pub mod snapshot;
pub mod store;

#[cfg(test)]
mod testing;

pub use collaborators::{
    AllowAll, CapabilityChecker, InMemoryDirectory, InMemoryRegistry, PolicyChain, PolicyRecord,
    PolicyRegistry, StaticGrants, SubPolicyRecord, UserDirectory, UserProfile,
};
pub use context::RequestContext;
pub use dashboard::{DashboardBucket, DashboardItem, ReviewerDashboard, SubmissionItem, SubmissionState};
pub use engine::{
    ApprovalEngine, AssignOutcome, DeactivationInput, DeactivationRequested, DecisionOutcome,
    EngineBuilder, EnginePolicy, FallbackPolicy, ResubmitOutcome, ReviewerPolicy, ToggleOutcome,
};
pub use events::{
    ComplianceEvent, EventKind, FanoutNotifier, NotificationBuffer, Notifier, NotifyError,
    TracingNotifier, DEFAULT_BUFFER_CAPACITY,
};
pub use records::{Compliance, ComplianceApproval};
pub use repository::{ComplianceRepository, Creator, ExportFilter};
pub use store::{ChangeSet, ChangeSink, Ledger, Transaction, MAX_ATTEMPTS};
