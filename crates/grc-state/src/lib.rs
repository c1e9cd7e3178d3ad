//! # grc-state: Approval and Compliance State Machines
//!
//! Pure state logic. Nothing here reads or writes storage; the workflow
//! crate loads rows, asks these types what should change, and commits the
//! answer atomically.
//!
//! ## State Machines
//!
//! - **Approval family** (`approval.rs`): the `u<N>` / `r<N>` row sum type,
//!   family state (`Empty → Pending ⇄ Decided`), tag allocation, and ledger
//!   verification (contiguous tags, no decided submissions, no orphaned
//!   decisions).
//!
//! - **Compliance lifecycle** (`lifecycle.rs`): `(status, active)` per row
//!   and chain-wide planners for decisions, toggles, resubmissions, and
//!   deactivation decisions. Every plan preserves single-active-version.

pub mod approval;
pub mod lifecycle;

// ─── Approval re-exports ────────────────────────────────────────────

pub use approval::{ApprovalError, ApprovalFamily, ApprovalStage, FamilyEntry, FamilyState};

// ─── Lifecycle re-exports ───────────────────────────────────────────

pub use lifecycle::{
    apply_plan, require_active, ChainMember, ChainUpdate, LifecycleError, LifecycleState,
    VersionChain,
};
