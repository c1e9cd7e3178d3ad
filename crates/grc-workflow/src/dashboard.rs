//! # Reviewer Dashboards
//!
//! Read-side views over committed approval families.
//!
//! Each family is classified by its derived state, so an identifier lands
//! in at most one bucket: a family whose latest row is a pending `u` row is
//! pending, one whose latest row is an approving `r` row is approved. A
//! stale `u` row that was followed by an approval therefore never shows as
//! pending.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use grc_core::{Capability, ComplianceStatus, GrcResult, Identifier, TenantId, UserId};
use grc_state::{ApprovalFamily, FamilyState};

use crate::context::RequestContext;
use crate::engine::{enrich, ApprovalEngine};
use crate::records::{Compliance, ComplianceApproval};
use crate::repository::latest_of;
use crate::store::Transaction;

/// Which list an item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DashboardBucket {
    /// Edits awaiting the reviewer.
    Pending,
    /// Deactivation requests awaiting the reviewer.
    Deactivation,
    /// Recently approved, for context.
    Approved,
}

/// One dashboard entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardItem {
    /// Bucket.
    pub bucket: DashboardBucket,
    /// The approval row, with an enriched snapshot.
    pub approval: ComplianceApproval,
    /// Live Compliance row the entry refers to.
    pub compliance: Option<Compliance>,
}

/// A reviewer's work list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReviewerDashboard {
    /// Pending edits, oldest first.
    pub pending: Vec<DashboardItem>,
    /// Pending deactivation requests, oldest first.
    pub deactivations: Vec<DashboardItem>,
    /// Recently approved items, newest first.
    pub approved: Vec<DashboardItem>,
}

impl ReviewerDashboard {
    /// Every item across buckets.
    pub fn items(&self) -> impl Iterator<Item = &DashboardItem> {
        self.pending
            .iter()
            .chain(&self.deactivations)
            .chain(&self.approved)
    }
}

/// Derived status of a submitter's family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    /// Awaiting decision.
    Pending,
    /// Latest decision approved.
    Approved,
    /// Latest decision rejected.
    Rejected,
}

/// One entry of a submitter's list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionItem {
    /// Latest row of the family.
    pub approval: ComplianceApproval,
    /// Derived family status.
    pub state: SubmissionState,
    /// Whether the family is a deactivation request.
    pub deactivation: bool,
}

impl ApprovalEngine {
    /// The work list of `reviewer`.
    pub fn reviewer_dashboard(
        &self,
        ctx: &RequestContext,
        reviewer: UserId,
        include_recent: bool,
    ) -> GrcResult<ReviewerDashboard> {
        let (tenant, _) = self.inner.authorize(ctx, Capability::View)?;
        let tx = self.inner.ledger.begin(tenant);
        let mut board = ReviewerDashboard::default();

        for (identifier, rows) in families(&tx, |row| row.reviewer_id == reviewer) {
            let family = ApprovalFamily::new(rows.iter().map(ComplianceApproval::family_entry));
            let Some(latest) = rows.iter().max_by_key(|r| r.id) else {
                continue;
            };
            if latest.reviewer_id != reviewer {
                continue;
            }
            let deactivation = identifier.is_deactivation_family();
            let live_identifier = identifier.deactivation_target().unwrap_or(identifier);
            let live = latest_of(tx.chain(&live_identifier));

            match family.state() {
                FamilyState::Pending { .. } if deactivation => {
                    board.deactivations.push(self.item(tenant, DashboardBucket::Deactivation, latest, live));
                }
                FamilyState::Pending { .. } => {
                    if live.as_ref().map(|c| c.status) == Some(ComplianceStatus::UnderReview) {
                        board.pending.push(self.item(tenant, DashboardBucket::Pending, latest, live));
                    }
                }
                FamilyState::Decided { approved: true, .. } if include_recent && !deactivation => {
                    board.approved.push(self.item(tenant, DashboardBucket::Approved, latest, live));
                }
                _ => {}
            }
        }

        board.pending.sort_by_key(|i| i.approval.id);
        board.deactivations.sort_by_key(|i| i.approval.id);
        board
            .approved
            .sort_by_key(|i| std::cmp::Reverse((i.approval.stage.approved_at(), i.approval.id)));
        board.approved.truncate(self.inner.policy.dashboard_recent);
        Ok(board)
    }

    /// Latest row of every family `user` submitted into, newest first.
    pub fn my_submissions(&self, ctx: &RequestContext, user: UserId) -> GrcResult<Vec<SubmissionItem>> {
        let (tenant, caller) = self.inner.authorize(ctx, Capability::View)?;
        if caller != user {
            self.inner.authorize(ctx, Capability::Approve)?;
        }
        let tx = self.inner.ledger.begin(tenant);
        let mut items = Vec::new();
        for (identifier, rows) in families(&tx, |row| row.user_id == user) {
            let family = ApprovalFamily::new(rows.iter().map(ComplianceApproval::family_entry));
            let submitted_by_user = family
                .latest_submission()
                .and_then(|e| rows.iter().find(|r| r.id.get() == e.ordinal))
                .is_some_and(|r| r.user_id == user);
            if !submitted_by_user {
                continue;
            }
            let state = match family.state() {
                FamilyState::Empty => continue,
                FamilyState::Pending { .. } => SubmissionState::Pending,
                FamilyState::Decided { approved: true, .. } => SubmissionState::Approved,
                FamilyState::Decided { approved: false, .. } => SubmissionState::Rejected,
            };
            if let Some(latest) = rows.iter().max_by_key(|r| r.id) {
                items.push(SubmissionItem {
                    approval: latest.clone(),
                    state,
                    deactivation: identifier.is_deactivation_family(),
                });
            }
        }
        items.sort_by_key(|i| std::cmp::Reverse(i.approval.id));
        Ok(items)
    }

    fn item(
        &self,
        tenant: TenantId,
        bucket: DashboardBucket,
        row: &ComplianceApproval,
        live: Option<Compliance>,
    ) -> DashboardItem {
        let mut approval = row.clone();
        approval.extracted_data = enrich(
            &row.extracted_data,
            self.inner.display_name(tenant, row.user_id),
            live.as_ref(),
        );
        DashboardItem {
            bucket,
            approval,
            compliance: live,
        }
    }
}

/// Whole families touched by at least one row matching `pred`.
fn families(
    tx: &Transaction<'_>,
    pred: impl Fn(&ComplianceApproval) -> bool,
) -> BTreeMap<Identifier, Vec<ComplianceApproval>> {
    let mut touched: Vec<Identifier> = tx
        .approvals_where(pred)
        .into_iter()
        .map(|row| row.identifier)
        .collect();
    touched.sort();
    touched.dedup();
    touched
        .into_iter()
        .map(|identifier| {
            let rows = tx.family(&identifier);
            (identifier, rows)
        })
        .collect()
}
