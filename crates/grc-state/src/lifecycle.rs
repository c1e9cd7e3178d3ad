//! # Compliance Lifecycle
//!
//! The per-row state `(status, active)` and the planners that compute,
//! for a whole version chain, which rows change when a decision, toggle, or
//! deactivation decision is applied.
//!
//! ## States
//!
//! ```text
//! Under Review/Inactive ──approve──▶ Approved/Active ◀──toggle──▶ Approved/Inactive
//!          │                                 ▲
//!          └──────reject──▶ Rejected/Inactive│(re-review)
//! ```
//!
//! Planners never mutate; they return the list of `(row, new state)`
//! updates that must be committed as one atomic unit. Every plan keeps the
//! chain invariants: at most one Active row, and Active implies Approved.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use grc_core::{ActiveState, ComplianceId, ComplianceStatus, ComplianceVersion, GrcError, ToggleIntent};

// ─── Errors ──────────────────────────────────────────────────────────

/// Violations of the Compliance lifecycle invariants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Only Approved rows may be Active.
    #[error("only approved compliances can be toggled (compliance {id} is {status})")]
    NotApproved {
        /// The offending row.
        id: ComplianceId,
        /// Its status.
        status: ComplianceStatus,
    },

    /// Deactivation was requested for a row that is not Active.
    #[error("compliance {id} is not active")]
    NotActive {
        /// The offending row.
        id: ComplianceId,
    },

    /// The target row is not part of the chain handed to the planner.
    #[error("compliance {id} is not part of its version chain")]
    NotInChain {
        /// The missing row.
        id: ComplianceId,
    },

    /// The chain already violates single-active-version.
    #[error("version chain has {count} active rows")]
    MultipleActive {
        /// Number of Active rows found.
        count: usize,
    },

    /// A row is Active without being Approved.
    #[error("compliance {id} is active but {status}")]
    ActiveWithoutApproval {
        /// The offending row.
        id: ComplianceId,
        /// Its status.
        status: ComplianceStatus,
    },
}

impl From<LifecycleError> for GrcError {
    fn from(err: LifecycleError) -> Self {
        GrcError::InvariantViolation(err.to_string())
    }
}

// ─── Row state ───────────────────────────────────────────────────────

/// The lifecycle state of one Compliance row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleState {
    /// Review status.
    pub status: ComplianceStatus,
    /// Activation flag.
    pub active: ActiveState,
}

impl LifecycleState {
    /// State of a freshly created, edited, or resubmitted row.
    pub const fn submitted() -> Self {
        Self {
            status: ComplianceStatus::UnderReview,
            active: ActiveState::Inactive,
        }
    }

    /// Result of a reviewer decision.
    pub const fn decided(approved: bool) -> Self {
        if approved {
            Self {
                status: ComplianceStatus::Approved,
                active: ActiveState::Active,
            }
        } else {
            Self {
                status: ComplianceStatus::Rejected,
                active: ActiveState::Inactive,
            }
        }
    }

    /// Whether the row is Active.
    pub fn is_active(&self) -> bool {
        self.active.is_active()
    }

    /// Whether the row is Approved.
    pub fn is_approved(&self) -> bool {
        self.status == ComplianceStatus::Approved
    }

    /// The same row with the activation flag replaced.
    pub fn with_active(self, active: ActiveState) -> Self {
        Self { active, ..self }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.status, self.active)
    }
}

// ─── Chain planning ──────────────────────────────────────────────────

/// One row of a version chain as seen by the planners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainMember {
    /// Row id.
    pub id: ComplianceId,
    /// Row version.
    pub version: ComplianceVersion,
    /// Current state.
    pub state: LifecycleState,
}

/// A planned state change for one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainUpdate {
    /// Row to update.
    pub id: ComplianceId,
    /// State before.
    pub from: LifecycleState,
    /// State after.
    pub to: LifecycleState,
}

/// A version chain for one identifier.
#[derive(Debug, Clone)]
pub struct VersionChain {
    members: Vec<ChainMember>,
}

impl VersionChain {
    /// Build a chain, ordered by version descending.
    pub fn new(members: impl IntoIterator<Item = ChainMember>) -> Self {
        let mut members: Vec<ChainMember> = members.into_iter().collect();
        members.sort_by(|a, b| b.version.cmp(&a.version).then(b.id.cmp(&a.id)));
        Self { members }
    }

    /// Members, latest version first.
    pub fn members(&self) -> &[ChainMember] {
        &self.members
    }

    /// The highest-version row.
    pub fn latest(&self) -> Option<&ChainMember> {
        self.members.first()
    }

    /// The current Active row, if any.
    pub fn active(&self) -> Option<&ChainMember> {
        self.members.iter().find(|m| m.state.is_active())
    }

    fn member(&self, id: ComplianceId) -> Result<&ChainMember, LifecycleError> {
        self.members
            .iter()
            .find(|m| m.id == id)
            .ok_or(LifecycleError::NotInChain { id })
    }

    /// Check single-active-version and Active-implies-Approved.
    pub fn verify(&self) -> Result<(), LifecycleError> {
        let active: Vec<&ChainMember> = self.members.iter().filter(|m| m.state.is_active()).collect();
        if active.len() > 1 {
            return Err(LifecycleError::MultipleActive {
                count: active.len(),
            });
        }
        if let Some(m) = active.iter().find(|m| !m.state.is_approved()) {
            return Err(LifecycleError::ActiveWithoutApproval {
                id: m.id,
                status: m.state.status,
            });
        }
        Ok(())
    }

    /// Apply a reviewer decision to `target`. On approval every other
    /// Active row is deactivated in the same plan.
    pub fn plan_decision(
        &self,
        target: ComplianceId,
        approved: bool,
    ) -> Result<Vec<ChainUpdate>, LifecycleError> {
        let member = self.member(target)?;
        let mut plan = Plan::default();
        if approved {
            self.deactivate_others(target, &mut plan);
        }
        plan.set(member, LifecycleState::decided(approved));
        Ok(plan.finish())
    }

    /// Reset `target` to `Under Review/Inactive` after a resubmission.
    pub fn plan_resubmission(&self, target: ComplianceId) -> Result<Vec<ChainUpdate>, LifecycleError> {
        let member = self.member(target)?;
        let mut plan = Plan::default();
        plan.set(member, LifecycleState::submitted());
        Ok(plan.finish())
    }

    /// Toggle the activation of an Approved row.
    ///
    /// Activate replaces the current Active row. Deactivate hands the active
    /// slot to the latest other Approved row when one exists. Toggling a row
    /// that is already in the requested state changes nothing.
    pub fn plan_toggle(
        &self,
        target: ComplianceId,
        intent: ToggleIntent,
    ) -> Result<Vec<ChainUpdate>, LifecycleError> {
        let member = self.member(target)?;
        if !member.state.is_approved() {
            return Err(LifecycleError::NotApproved {
                id: target,
                status: member.state.status,
            });
        }
        let mut plan = Plan::default();
        match intent {
            ToggleIntent::Activate => {
                if !member.state.is_active() {
                    self.deactivate_others(target, &mut plan);
                    plan.set(member, member.state.with_active(ActiveState::Active));
                }
            }
            ToggleIntent::Deactivate => {
                if member.state.is_active() {
                    plan.set(member, member.state.with_active(ActiveState::Inactive));
                    if let Some(successor) = self
                        .members
                        .iter()
                        .find(|m| m.id != target && m.state.is_approved())
                    {
                        plan.set(successor, successor.state.with_active(ActiveState::Active));
                    }
                }
            }
        }
        Ok(plan.finish())
    }

    /// Apply a deactivation-request decision to `target`.
    ///
    /// Approval takes the row out of service and keeps it Approved.
    /// Rejection leaves it alone. An Approved row that drifted to Inactive
    /// is re-asserted only while no other version of the chain is Active.
    pub fn plan_deactivation_decision(
        &self,
        target: ComplianceId,
        approved: bool,
    ) -> Result<Vec<ChainUpdate>, LifecycleError> {
        let member = self.member(target)?;
        let mut plan = Plan::default();
        if approved {
            if member.state.is_active() {
                plan.set(member, member.state.with_active(ActiveState::Inactive));
            }
        } else if member.state.is_approved() && self.active().is_none() {
            plan.set(member, member.state.with_active(ActiveState::Active));
        }
        Ok(plan.finish())
    }

    fn deactivate_others(&self, target: ComplianceId, plan: &mut Plan) {
        for other in self
            .members
            .iter()
            .filter(|m| m.id != target && m.state.is_active())
        {
            plan.set(other, other.state.with_active(ActiveState::Inactive));
        }
    }
}

/// Guard a deactivation request: the row must be Active.
pub fn require_active(id: ComplianceId, state: LifecycleState) -> Result<(), LifecycleError> {
    if state.is_active() {
        Ok(())
    } else {
        Err(LifecycleError::NotActive { id })
    }
}

#[derive(Default)]
struct Plan {
    updates: Vec<ChainUpdate>,
}

impl Plan {
    fn set(&mut self, member: &ChainMember, to: LifecycleState) {
        self.updates.retain(|u| u.id != member.id);
        self.updates.push(ChainUpdate {
            id: member.id,
            from: member.state,
            to,
        });
    }

    fn finish(self) -> Vec<ChainUpdate> {
        self.updates
    }
}

/// Apply a plan to a chain snapshot, for verification and tests.
pub fn apply_plan(chain: &VersionChain, plan: &[ChainUpdate]) -> VersionChain {
    VersionChain::new(chain.members().iter().map(|m| {
        let state = plan
            .iter()
            .find(|u| u.id == m.id)
            .map_or(m.state, |u| u.to);
        ChainMember {
            state,
            ..m.clone()
        }
    }))
}

// ─── Tests ───────────────────────────────────────────────────────────


#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;

    fn arb_state() -> impl Strategy<Value = LifecycleState> {
        prop_oneof![
            Just(LifecycleState::submitted()),
            Just(LifecycleState::decided(false)),
            Just(LifecycleState {
                status: ComplianceStatus::Approved,
                active: ActiveState::Inactive,
            }),
        ]
    }

    /// Chains that satisfy the invariants: at most one Active Approved row.
    fn arb_chain() -> impl Strategy<Value = VersionChain> {
        (prop::collection::vec(arb_state(), 1..6), any::<prop::sample::Index>(), any::<bool>())
            .prop_map(|(states, pick, with_active)| {
                let n = states.len();
                let active_at = pick.index(n);
                VersionChain::new(states.into_iter().enumerate().map(|(i, mut state)| {
                    if with_active && i == active_at {
                        state = LifecycleState::decided(true);
                    }
                    ChainMember {
                        id: ComplianceId::new(i as i64 + 1),
                        version: ComplianceVersion::from_scaled((i as i64 + 1) * 100_000 + 1_000_000),
                        state,
                    }
                }))
            })
    }

    proptest! {
        /// Every planner preserves the chain invariants.
        #[test]
        fn plans_preserve_invariants(chain in arb_chain(), pick in any::<prop::sample::Index>(), approved in any::<bool>(), op in 0u8..4) {
            let target = chain.members()[pick.index(chain.members().len())].id;
            let plan = match op {
                0 => chain.plan_decision(target, approved),
                1 => chain.plan_toggle(target, ToggleIntent::Activate),
                2 => chain.plan_toggle(target, ToggleIntent::Deactivate),
                _ => chain.plan_deactivation_decision(target, approved),
            };
            if let Ok(plan) = plan {
                let after = apply_plan(&chain, &plan);
                prop_assert!(after.verify().is_ok(), "{:?}", after);
            }
        }
    }
}
