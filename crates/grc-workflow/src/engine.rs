//! # Approval Workflow Engine
//!
//! Orchestrates the paired user/reviewer approval ledger on top of the
//! Compliance repository.
//!
//! ## Operations
//!
//! | Operation | Atomic unit |
//! |-----------|-------------|
//! | create / clone | Compliance insert + `u1` |
//! | edit | Compliance insert + `u<N+1>` |
//! | review | `u<N>` snapshot update + `r<M>` insert + decision on the chain |
//! | resubmit | `u<N+1>` insert; Compliance mirror runs afterwards |
//! | deactivation request | `u<N+1>` in `COMP-DEACTIVATE-<id>` |
//! | deactivation decision | `r<M>` insert + activation flip |
//! | toggle | activation swap on the chain |
//!
//! Every unit runs under the `(tenant, identifier)` lock and commits through
//! [`Ledger::atomic`], so a unit either lands completely or not at all and
//! lost optimistic races are retried. Events are emitted after commit and
//! their failures never reach the caller.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;

use grc_compliance::{keys, text, validate, ValidationMode};
use grc_core::{
    ApprovalId, Capability, ComplianceId, ComplianceStatus, FrameworkId, GrcError, GrcResult,
    Identifier, SubPolicyId, TagFamily, TenantId, ToggleIntent, UserId, VersioningType,
};
use grc_state::{require_active, ApprovalFamily, ApprovalStage};

use crate::collaborators::{AllowAll, CapabilityChecker, InMemoryDirectory, PolicyRegistry, UserDirectory};
use crate::context::RequestContext;
use crate::events::{ComplianceEvent, EventKind, Notifier, TracingNotifier};
use crate::records::{Compliance, ComplianceApproval};
use crate::repository::{ComplianceRepository, Creator, ExportFilter};
use crate::snapshot;
use crate::store::{ChangeSet, ChangeSink, Ledger, Transaction};

/// Longest accepted remarks or deactivation reason.
const NOTE_MAX: usize = 5000;
/// Characters compared by the alternate-match fallback.
const MATCH_PREFIX: usize = 50;

// ─── Policy ──────────────────────────────────────────────────────────

/// Whether the reviewer may change across resubmissions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewerPolicy {
    /// The original reviewer is kept; a reviewer in the payload is ignored.
    #[default]
    Stable,
    /// A reviewer in the resubmitted payload replaces the original.
    AllowChange,
}

/// What a review does when no Compliance row matches its identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackPolicy {
    /// Match on sub-policy and title/description prefix; record the
    /// decision with a warning when nothing matches.
    #[default]
    AlternateMatch,
    /// Fail the review with `NotFound`.
    Refuse,
}

/// Engine switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnginePolicy {
    /// Reviewer stability on resubmission.
    pub reviewer: ReviewerPolicy,
    /// Review fallback for unmatched identifiers.
    pub fallback: FallbackPolicy,
    /// Recently approved items shown on reviewer dashboards.
    pub dashboard_recent: usize,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            reviewer: ReviewerPolicy::Stable,
            fallback: FallbackPolicy::AlternateMatch,
            dashboard_recent: 10,
        }
    }
}

// ─── Outcomes ────────────────────────────────────────────────────────

/// Result of create, edit, and clone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignOutcome {
    /// The new Compliance row.
    pub compliance: Compliance,
    /// The submission row opened for it.
    pub approval: ComplianceApproval,
    /// Whether an existing pending `u1` was reused.
    pub reused: bool,
}

/// Result of a review or deactivation decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionOutcome {
    /// The new `r` row.
    pub decision: ComplianceApproval,
    /// The `u` row that was decided.
    pub submission: ComplianceApproval,
    /// The Compliance row the decision was applied to.
    pub compliance: Option<Compliance>,
    /// Set when the decision could not be applied as addressed.
    pub warning: Option<String>,
}

/// Result of a resubmission.
#[derive(Debug)]
pub struct ResubmitOutcome {
    /// The new `u` row.
    pub approval: ComplianceApproval,
    /// Background mirror update of the Compliance row, when a runtime was
    /// available to spawn it on. `None` means it already ran.
    pub mirror: Option<JoinHandle<()>>,
}

/// Result of a deactivation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeactivationRequested {
    /// The new `u` row in the deactivation family.
    pub approval: ComplianceApproval,
    /// The targeted Compliance row.
    pub compliance: Compliance,
}

/// Result of a toggle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToggleOutcome {
    /// The targeted row after the toggle.
    pub compliance: Compliance,
    /// Every row whose activation changed.
    pub changed: Vec<ComplianceId>,
}

/// A deactivation request as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivationInput {
    /// Why the compliance should be taken out of service.
    pub reason: String,
    /// Reviewer to decide the request.
    pub reviewer: Option<UserId>,
    /// Decision due date.
    pub due_date: Option<NaiveDate>,
}

// ─── Engine ──────────────────────────────────────────────────────────

pub(crate) struct Inner {
    pub(crate) ledger: Arc<Ledger>,
    pub(crate) repo: ComplianceRepository,
    pub(crate) capabilities: Arc<dyn CapabilityChecker>,
    pub(crate) users: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    sink: Option<Arc<dyn ChangeSink>>,
    pub(crate) policy: EnginePolicy,
}

/// The approval workflow engine. Cheap to clone.
#[derive(Clone)]
pub struct ApprovalEngine {
    pub(crate) inner: Arc<Inner>,
}

impl std::fmt::Debug for ApprovalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalEngine")
            .field("policy", &self.inner.policy)
            .field("rows", &self.inner.ledger.len())
            .finish_non_exhaustive()
    }
}

/// Assembles an [`ApprovalEngine`] from its collaborators.
pub struct EngineBuilder {
    ledger: Arc<Ledger>,
    registry: Arc<dyn PolicyRegistry>,
    capabilities: Arc<dyn CapabilityChecker>,
    users: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    sink: Option<Arc<dyn ChangeSink>>,
    policy: EnginePolicy,
}

impl EngineBuilder {
    /// Capability checker. Defaults to [`AllowAll`].
    pub fn capabilities(mut self, checker: Arc<dyn CapabilityChecker>) -> Self {
        self.capabilities = checker;
        self
    }

    /// User directory. Defaults to an empty directory.
    pub fn users(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.users = users;
        self
    }

    /// Event sink. Defaults to [`TracingNotifier`].
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Receiver of committed change sets.
    pub fn sink(mut self, sink: Arc<dyn ChangeSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Engine switches.
    pub fn policy(mut self, policy: EnginePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Finish.
    pub fn build(self) -> ApprovalEngine {
        let repo = ComplianceRepository::new(self.ledger.clone(), self.registry);
        ApprovalEngine {
            inner: Arc::new(Inner {
                ledger: self.ledger,
                repo,
                capabilities: self.capabilities,
                users: self.users,
                notifier: self.notifier,
                sink: self.sink,
                policy: self.policy,
            }),
        }
    }
}

impl ApprovalEngine {
    /// Start building an engine over `ledger` and `registry`.
    pub fn builder(ledger: Arc<Ledger>, registry: Arc<dyn PolicyRegistry>) -> EngineBuilder {
        EngineBuilder {
            ledger,
            registry,
            capabilities: Arc::new(AllowAll),
            users: Arc::new(InMemoryDirectory::new()),
            notifier: Arc::new(TracingNotifier),
            sink: None,
            policy: EnginePolicy::default(),
        }
    }

    /// The Compliance repository.
    pub fn repository(&self) -> &ComplianceRepository {
        &self.inner.repo
    }

    /// The ledger.
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.inner.ledger
    }

    /// Active switches.
    pub fn policy(&self) -> EnginePolicy {
        self.inner.policy
    }

    // ─── Assign ──────────────────────────────────────────────────────

    /// Create a compliance item and open `u1` for its reviewer.
    pub fn create(&self, ctx: &RequestContext, payload: &Value) -> GrcResult<AssignOutcome> {
        let (tenant, user) = self.inner.authorize(ctx, Capability::Create)?;
        let submission = validate(payload, ValidationMode::Create)?;
        let reviewer = require_reviewer(submission.reviewer_id)?;
        let creator = self.inner.creator(tenant, user);

        let lock = submission
            .identifier
            .as_ref()
            .map(|id| self.inner.ledger.identifier_lock(tenant, id));
        let _guard = lock.as_ref().map(|l| l.lock());

        let now = Utc::now();
        let ((compliance, approval, reused), changes) =
            self.inner.ledger.atomic(tenant, |tx| {
                let pending = submission.identifier.as_ref().and_then(|id| {
                    let rows = tx.family(id);
                    reusable_submission(&rows, user, reviewer)?;
                    self.inner.repo.latest_in(tx, id)
                });
                let compliance = match pending {
                    Some(row) => row,
                    None => self.inner.repo.create(tx, &submission, &creator, now)?,
                };
                let (approval, reused) = open_submission(
                    tx,
                    &compliance,
                    user,
                    reviewer,
                    submission.approval_due_date,
                    true,
                    now,
                )?;
                Ok((compliance, approval, reused))
            })?;
        self.inner.committed(&changes);

        if reused {
            tracing::info!(
                %tenant,
                identifier = %compliance.identifier,
                compliance_id = %compliance.id,
                approval_id = %approval.id,
                "pending submission reused"
            );
            return Ok(AssignOutcome {
                compliance,
                approval,
                reused,
            });
        }
        tracing::info!(
            %tenant,
            identifier = %compliance.identifier,
            compliance_id = %compliance.id,
            tag = %approval.stage.tag(),
            "compliance created"
        );
        metrics::counter!("grc_compliance_created_total").increment(1);
        self.inner.assigned(&compliance, &approval, user);
        self.inner.emit(event(
            EventKind::ComplianceCreated,
            &compliance,
            user,
            user,
            Some(compliance.status.to_string()),
        ));
        Ok(AssignOutcome {
            compliance,
            approval,
            reused,
        })
    }

    /// Append a new version of `existing` and open the next `u` row.
    pub fn edit(
        &self,
        ctx: &RequestContext,
        existing: ComplianceId,
        payload: &Value,
        kind: VersioningType,
    ) -> GrcResult<AssignOutcome> {
        let (tenant, user) = self.inner.authorize(ctx, Capability::Edit)?;
        let submission = validate(payload, ValidationMode::Edit)?;
        let reviewer = require_reviewer(submission.reviewer_id)?;
        let base = self.inner.repo.get(tenant, existing)?;
        let creator = self.inner.creator(tenant, user);

        let lock = self.inner.ledger.identifier_lock(tenant, &base.identifier);
        let _guard = lock.lock();
        let now = Utc::now();
        let ((compliance, approval), changes) = self.inner.ledger.atomic(tenant, |tx| {
            let compliance = self
                .inner
                .repo
                .edit(tx, existing, &submission, kind, &creator, now)?;
            let (approval, _) = open_submission(
                tx,
                &compliance,
                user,
                reviewer,
                submission.approval_due_date,
                false,
                now,
            )?;
            Ok((compliance, approval))
        })?;
        self.inner.committed(&changes);

        tracing::info!(
            %tenant,
            identifier = %compliance.identifier,
            version = %compliance.version,
            tag = %approval.stage.tag(),
            "compliance edited"
        );
        self.inner.assigned(&compliance, &approval, user);
        Ok(AssignOutcome {
            compliance,
            approval,
            reused: false,
        })
    }

    /// Copy `source` under `target` as a new item at `1.0`.
    pub fn clone_compliance(
        &self,
        ctx: &RequestContext,
        source: ComplianceId,
        target: SubPolicyId,
        overrides: &Value,
    ) -> GrcResult<AssignOutcome> {
        let (tenant, user) = self.inner.authorize(ctx, Capability::Create)?;
        let creator = self.inner.creator(tenant, user);
        let now = Utc::now();
        let ((compliance, approval), changes) = self.inner.ledger.atomic(tenant, |tx| {
            let (compliance, submission) = self
                .inner
                .repo
                .clone_to(tx, source, target, overrides, &creator, now)?;
            let reviewer = require_reviewer(submission.reviewer_id)?;
            let (approval, _) = open_submission(
                tx,
                &compliance,
                user,
                reviewer,
                submission.approval_due_date,
                false,
                now,
            )?;
            Ok((compliance, approval))
        })?;
        self.inner.committed(&changes);

        tracing::info!(
            %tenant,
            source = %source,
            identifier = %compliance.identifier,
            "compliance cloned"
        );
        metrics::counter!("grc_compliance_created_total").increment(1);
        self.inner.assigned(&compliance, &approval, user);
        Ok(AssignOutcome {
            compliance,
            approval,
            reused: false,
        })
    }

    // ─── Review ──────────────────────────────────────────────────────

    /// Decide the edit under review addressed by `approval_id`.
    ///
    /// A `u` row is decided directly; an `r` row falls back to the latest
    /// `u` row of its family. Deciding again appends another `r` row.
    pub fn review(
        &self,
        ctx: &RequestContext,
        approval_id: ApprovalId,
        approved: bool,
        remarks: Option<&str>,
    ) -> GrcResult<DecisionOutcome> {
        let (tenant, user) = self.inner.authorize(ctx, Capability::Approve)?;
        let remarks = note("remarks", remarks.unwrap_or(""), false)?;
        let addressed = self.inner.approval(tenant, approval_id)?;
        if addressed.is_deactivation() {
            return Err(GrcError::InvariantViolation(format!(
                "approval {approval_id} belongs to a deactivation request"
            )));
        }

        let lock = self.inner.ledger.identifier_lock(tenant, &addressed.identifier);
        let _guard = lock.lock();
        let now = Utc::now();
        let (outcome, changes) = self.inner.ledger.atomic(tenant, |tx| {
            let (submission, decision) =
                record_decision(tx, &addressed, user, approved, &remarks, now)?;

            let (target, warning) = match self.inner.repo.latest_in(tx, &addressed.identifier) {
                Some(row) => (Some(row), None),
                None => self.inner.fallback_target(tx, &submission)?,
            };
            let compliance = match target {
                Some(row) => {
                    self.inner.repo.apply_decision(tx, row.id, approved, now)?;
                    tx.compliance(row.id)
                }
                None => None,
            };
            Ok(DecisionOutcome {
                decision,
                submission,
                compliance,
                warning,
            })
        })?;
        self.inner.committed(&changes);

        let verdict = decision_label(approved);
        tracing::info!(
            %tenant,
            identifier = %outcome.decision.identifier,
            approval_id = %outcome.decision.id,
            tag = %outcome.decision.stage.tag(),
            decision = verdict,
            "review recorded"
        );
        if let Some(warning) = &outcome.warning {
            tracing::warn!(%tenant, identifier = %outcome.decision.identifier, "{warning}");
        }
        metrics::counter!("grc_review_decisions_total", "decision" => verdict).increment(1);

        let title = title_of(&outcome.submission, outcome.compliance.as_ref());
        let outcome_text = if remarks.is_empty() {
            verdict.to_string()
        } else {
            format!("{verdict}: {remarks}")
        };
        self.inner.emit(ComplianceEvent {
            kind: EventKind::ComplianceReviewed,
            tenant,
            compliance_id: outcome.compliance.as_ref().map(|c| c.id),
            identifier: outcome.decision.identifier.clone(),
            actor: user,
            subject: outcome.submission.user_id,
            title: title.clone(),
            outcome: Some(outcome_text),
            timestamp: now,
        });
        self.inner.emit(ComplianceEvent {
            kind: EventKind::ComplianceReviewSubmitted,
            tenant,
            compliance_id: outcome.compliance.as_ref().map(|c| c.id),
            identifier: outcome.decision.identifier.clone(),
            actor: user,
            subject: outcome.decision.reviewer_id,
            title,
            outcome: Some(verdict.to_string()),
            timestamp: now,
        });
        Ok(outcome)
    }

    // ─── Resubmit ────────────────────────────────────────────────────

    /// Reopen the family of `approval_id` with an edited snapshot.
    ///
    /// The new `u` row is committed before returning. The Compliance row
    /// is reset to `Under Review/Inactive` afterwards, on a blocking task
    /// when a Tokio runtime is available.
    pub fn resubmit(
        &self,
        ctx: &RequestContext,
        approval_id: ApprovalId,
        edited: &Value,
    ) -> GrcResult<ResubmitOutcome> {
        let (tenant, user) = self.inner.authorize(ctx, Capability::Edit)?;
        let edited = edited
            .as_object()
            .ok_or_else(|| GrcError::field("payload", "must be a JSON object"))?;
        let addressed = self.inner.approval(tenant, approval_id)?;
        if addressed.is_deactivation() {
            return Err(GrcError::InvariantViolation(format!(
                "approval {approval_id} belongs to a deactivation request"
            )));
        }
        let creator = self.inner.creator(tenant, user);
        let identifier = addressed.identifier.clone();

        let lock = self.inner.ledger.identifier_lock(tenant, &identifier);
        let guard = lock.lock();
        let now = Utc::now();
        let ((approval, content), changes) = self.inner.ledger.atomic(tenant, |tx| {
            let rows = tx.family(&identifier);
            let family = ApprovalFamily::new(rows.iter().map(ComplianceApproval::family_entry));
            let prior = family
                .latest_submission()
                .and_then(|e| tx.approval(ApprovalId::new(e.ordinal)))
                .unwrap_or_else(|| addressed.clone());
            let live = self.inner.repo.latest_in(tx, &identifier);

            let mut merged = addressed.extracted_data.clone();
            for (key, value) in edited {
                merged.insert(key.clone(), value.clone());
            }
            let live_map = live.as_ref().map(|c| c.content.to_map()).unwrap_or_default();
            snapshot::backfill_scores(
                &mut merged,
                [&addressed.extracted_data, &prior.extracted_data, &live_map],
            );
            let submission = validate(&Value::Object(merged.clone()), ValidationMode::Resubmission)?;

            let reviewer = match (self.inner.policy.reviewer, submission.reviewer_id) {
                (ReviewerPolicy::AllowChange, Some(changed)) => changed,
                _ => prior.reviewer_id,
            };
            let due = submission.approval_due_date.or(prior.approval_due_date);

            for (key, value) in submission.content.to_map() {
                merged.insert(key, value);
            }
            merged.insert(snapshot::keys::STATUS.into(), Value::from(ComplianceStatus::UnderReview.as_str()));
            merged.insert(snapshot::keys::ACTIVE.into(), Value::from("Inactive"));
            merged.insert(snapshot::keys::CREATED_BY_NAME.into(), Value::from(creator.name.clone()));
            merged.insert(keys::REVIEWER.into(), serde_json::json!(reviewer));
            merged.insert(keys::DUE_DATE.into(), serde_json::json!(due.map(|d| d.to_string())));
            merged.insert(snapshot::keys::DECISION.into(), snapshot::resubmitted_decision());

            let tag = family.next_tag(TagFamily::User);
            let row = ComplianceApproval {
                id: tx.new_approval_id(),
                tenant,
                identifier: identifier.clone(),
                stage: ApprovalStage::submitted(tag)?,
                extracted_data: merged,
                user_id: user,
                reviewer_id: reviewer,
                policy_id: prior.policy_id,
                framework_id: prior.framework_id,
                approval_due_date: due,
                created_at: now,
                revision: 0,
            };
            tx.insert_approval(row.clone())?;
            Ok((row, submission.content))
        })?;
        drop(guard);
        self.inner.committed(&changes);

        tracing::info!(
            %tenant,
            %identifier,
            approval_id = %approval.id,
            tag = %approval.stage.tag(),
            "resubmission opened"
        );
        self.inner.emit(ComplianceEvent {
            kind: EventKind::ComplianceReassigned,
            tenant,
            compliance_id: None,
            identifier: identifier.clone(),
            actor: user,
            subject: approval.reviewer_id,
            title: content.title.clone(),
            outcome: approval.approval_due_date.map(|d| d.to_string()),
            timestamp: now,
        });

        let mirror = self.spawn_mirror(tenant, identifier, creator);
        Ok(ResubmitOutcome { approval, mirror })
    }

    fn spawn_mirror(
        &self,
        tenant: TenantId,
        identifier: Identifier,
        creator: Creator,
    ) -> Option<JoinHandle<()>> {
        let inner = self.inner.clone();
        let task = move || inner.mirror_resubmission(tenant, &identifier, &creator);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(handle.spawn_blocking(task)),
            Err(_) => {
                task();
                None
            }
        }
    }

    // ─── Deactivation ────────────────────────────────────────────────

    /// Ask a reviewer to take an Active compliance out of service.
    pub fn request_deactivation(
        &self,
        ctx: &RequestContext,
        compliance_id: ComplianceId,
        input: &DeactivationInput,
    ) -> GrcResult<DeactivationRequested> {
        let (tenant, user) = self.inner.authorize(ctx, Capability::Deactivate)?;
        let reviewer = require_reviewer(input.reviewer)?;
        let reason = note("reason", &input.reason, true)?;
        let target = self.inner.repo.get(tenant, compliance_id)?;
        let family_id = target.identifier.deactivation_family();

        let lock = self.inner.ledger.identifier_lock(tenant, &target.identifier);
        let _guard = lock.lock();
        let now = Utc::now();
        let ((approval, compliance), changes) = self.inner.ledger.atomic(tenant, |tx| {
            let row = tx
                .compliance(compliance_id)
                .ok_or_else(|| GrcError::not_found("compliance", compliance_id))?;
            require_active(row.id, row.lifecycle())?;
            let framework_id = require_framework(&row)?;
            let family = ApprovalFamily::new(
                tx.family(&family_id).iter().map(ComplianceApproval::family_entry),
            );
            let approval = ComplianceApproval {
                id: tx.new_approval_id(),
                tenant,
                identifier: family_id.clone(),
                stage: ApprovalStage::submitted(family.next_tag(TagFamily::User))?,
                extracted_data: snapshot::of_deactivation(&row, &reason, reviewer, input.due_date),
                user_id: user,
                reviewer_id: reviewer,
                policy_id: row.policy_id,
                framework_id,
                approval_due_date: input.due_date,
                created_at: now,
                revision: 0,
            };
            tx.insert_approval(approval.clone())?;
            Ok((approval, row))
        })?;
        self.inner.committed(&changes);

        tracing::info!(
            %tenant,
            identifier = %approval.identifier,
            tag = %approval.stage.tag(),
            "deactivation requested"
        );
        self.inner.emit(event(
            EventKind::ComplianceDeactivationRequested,
            &compliance,
            user,
            reviewer,
            Some(reason),
        ));
        Ok(DeactivationRequested {
            approval,
            compliance,
        })
    }

    /// Decide a deactivation request.
    pub fn decide_deactivation(
        &self,
        ctx: &RequestContext,
        approval_id: ApprovalId,
        approved: bool,
        remarks: Option<&str>,
    ) -> GrcResult<DecisionOutcome> {
        let (tenant, user) = self.inner.authorize(ctx, Capability::Approve)?;
        let remarks = note("remarks", remarks.unwrap_or(""), false)?;
        let addressed = self.inner.approval(tenant, approval_id)?;
        let Some(target_identifier) = addressed.identifier.deactivation_target() else {
            return Err(GrcError::InvariantViolation(format!(
                "approval {approval_id} is not a deactivation request"
            )));
        };

        let lock = self.inner.ledger.identifier_lock(tenant, &target_identifier);
        let _guard = lock.lock();
        let now = Utc::now();
        let (outcome, changes) = self.inner.ledger.atomic(tenant, |tx| {
            let (submission, decision) =
                record_decision(tx, &addressed, user, approved, &remarks, now)?;
            let target = submission
                .extracted_data
                .get(snapshot::keys::TARGET)
                .and_then(Value::as_i64)
                .and_then(|id| tx.compliance(ComplianceId::new(id)))
                .or_else(|| self.inner.repo.latest_in(tx, &target_identifier));
            let (compliance, warning) = match target {
                Some(row) => {
                    self.inner
                        .repo
                        .apply_deactivation_decision(tx, row.id, approved, now)?;
                    (tx.compliance(row.id), None)
                }
                None => (
                    None,
                    Some(format!(
                        "no compliance found for {target_identifier}; decision recorded only"
                    )),
                ),
            };
            Ok(DecisionOutcome {
                decision,
                submission,
                compliance,
                warning,
            })
        })?;
        self.inner.committed(&changes);

        let verdict = decision_label(approved);
        tracing::info!(
            %tenant,
            identifier = %outcome.decision.identifier,
            tag = %outcome.decision.stage.tag(),
            decision = verdict,
            "deactivation decided"
        );
        if let Some(warning) = &outcome.warning {
            tracing::warn!(%tenant, "{warning}");
        }
        let title = title_of(&outcome.submission, outcome.compliance.as_ref());
        self.inner.emit(ComplianceEvent {
            kind: EventKind::ComplianceDeactivationDecided,
            tenant,
            compliance_id: outcome.compliance.as_ref().map(|c| c.id),
            identifier: target_identifier,
            actor: user,
            subject: outcome.submission.user_id,
            title,
            outcome: Some(verdict.to_string()),
            timestamp: now,
        });
        Ok(outcome)
    }

    // ─── Toggle ──────────────────────────────────────────────────────

    /// Activate or deactivate an Approved row directly.
    pub fn toggle(
        &self,
        ctx: &RequestContext,
        compliance_id: ComplianceId,
        intent: ToggleIntent,
    ) -> GrcResult<ToggleOutcome> {
        let (tenant, user) = self.inner.authorize(ctx, Capability::Toggle)?;
        let base = self.inner.repo.get(tenant, compliance_id)?;
        let lock = self.inner.ledger.identifier_lock(tenant, &base.identifier);
        let _guard = lock.lock();
        let now = Utc::now();
        let ((compliance, changed), changes) = self.inner.ledger.atomic(tenant, |tx| {
            let plan = self
                .inner
                .repo
                .toggle_active(tx, compliance_id, intent, now)?;
            let row = tx
                .compliance(compliance_id)
                .ok_or_else(|| GrcError::not_found("compliance", compliance_id))?;
            Ok((row, plan.iter().map(|u| u.id).collect::<Vec<_>>()))
        })?;
        self.inner.committed(&changes);

        if !changed.is_empty() {
            tracing::info!(
                %tenant,
                identifier = %compliance.identifier,
                compliance_id = %compliance.id,
                intent = %intent,
                changed = changed.len(),
                "activation toggled"
            );
            self.inner.emit(event(
                EventKind::ComplianceActiveToggled,
                &compliance,
                user,
                compliance.created_by_user,
                Some(compliance.active.to_string()),
            ));
        }
        Ok(ToggleOutcome {
            compliance,
            changed,
        })
    }

    // ─── Reads ───────────────────────────────────────────────────────

    /// A Compliance row by id.
    pub fn get(&self, ctx: &RequestContext, id: ComplianceId) -> GrcResult<Compliance> {
        let (tenant, _) = self.inner.authorize(ctx, Capability::View)?;
        self.inner.repo.get(tenant, id)
    }

    /// The highest version of `identifier`.
    pub fn resolve_latest(&self, ctx: &RequestContext, identifier: &Identifier) -> GrcResult<Compliance> {
        let (tenant, _) = self.inner.authorize(ctx, Capability::View)?;
        self.inner.repo.resolve_latest(tenant, identifier)
    }

    /// Every version of `identifier`, highest first.
    pub fn list_version_chain(
        &self,
        ctx: &RequestContext,
        identifier: &Identifier,
    ) -> GrcResult<Vec<Compliance>> {
        let (tenant, _) = self.inner.authorize(ctx, Capability::View)?;
        self.inner.repo.list_version_chain(tenant, identifier)
    }

    /// Approval rows of `identifier` and its deactivation family, ordered
    /// by family, then tag family, then tag number.
    pub fn approval_history(
        &self,
        ctx: &RequestContext,
        identifier: &Identifier,
    ) -> GrcResult<Vec<ComplianceApproval>> {
        let (tenant, _) = self.inner.authorize(ctx, Capability::View)?;
        let base = identifier
            .deactivation_target()
            .unwrap_or_else(|| identifier.clone());
        let tx = self.inner.ledger.begin(tenant);
        let mut rows = tx.family(&base);
        rows.extend(tx.family(&base.deactivation_family()));
        rows.sort_by_key(|row| {
            let tag = row.stage.tag();
            (row.is_deactivation(), tag.family(), tag.number(), row.id)
        });
        Ok(rows)
    }

    /// Rows for the export orchestrator.
    pub fn list_for_export(
        &self,
        ctx: &RequestContext,
        filter: &ExportFilter,
    ) -> GrcResult<Vec<Compliance>> {
        let (tenant, _) = self.inner.authorize(ctx, Capability::Export)?;
        Ok(self.inner.repo.list_for_export(tenant, filter))
    }
}

// ─── Inner helpers ───────────────────────────────────────────────────

impl Inner {
    pub(crate) fn authorize(
        &self,
        ctx: &RequestContext,
        capability: Capability,
    ) -> GrcResult<(TenantId, UserId)> {
        let (tenant, user) = ctx.scope()?;
        if self.capabilities.has_capability(tenant, user, capability) {
            Ok((tenant, user))
        } else {
            tracing::warn!(%tenant, %user, capability = capability.as_str(), "capability denied");
            Err(GrcError::CapabilityDenied {
                capability: capability.as_str().to_string(),
            })
        }
    }

    pub(crate) fn display_name(&self, tenant: TenantId, user: UserId) -> String {
        match self.users.lookup_user(tenant, user) {
            Some(profile) => profile.display_name,
            None => format!("User {user}"),
        }
    }

    fn creator(&self, tenant: TenantId, user: UserId) -> Creator {
        let name = match self.users.lookup_user(tenant, user) {
            Some(profile) => profile.display_name,
            None => {
                tracing::warn!(%tenant, %user, "no profile for creator, using fallback name");
                format!("User {user}")
            }
        };
        Creator { user, name }
    }

    fn approval(&self, tenant: TenantId, id: ApprovalId) -> GrcResult<ComplianceApproval> {
        self.ledger
            .begin(tenant)
            .approval(id)
            .ok_or_else(|| GrcError::not_found("approval", id))
    }

    fn committed(&self, changes: &ChangeSet) {
        if let Some(sink) = &self.sink {
            if !changes.is_empty() {
                sink.persist(changes);
            }
        }
    }

    fn emit(&self, event: ComplianceEvent) {
        if let Err(err) = self.notifier.emit(&event) {
            tracing::warn!(
                kind = %event.kind,
                tenant = %event.tenant,
                identifier = %event.identifier,
                error = %err,
                "notification dropped"
            );
            metrics::counter!("grc_notifications_dropped_total").increment(1);
        }
    }

    fn assigned(&self, compliance: &Compliance, approval: &ComplianceApproval, actor: UserId) {
        self.emit(event(
            EventKind::ComplianceAssigned,
            compliance,
            actor,
            approval.reviewer_id,
            approval.approval_due_date.map(|d| d.to_string()),
        ));
    }

    /// Best-effort match for a review whose identifier resolves to no row.
    fn fallback_target(
        &self,
        tx: &Transaction<'_>,
        submission: &ComplianceApproval,
    ) -> GrcResult<(Option<Compliance>, Option<String>)> {
        let identifier = &submission.identifier;
        if self.policy.fallback == FallbackPolicy::Refuse {
            return Err(GrcError::not_found("compliance", identifier));
        }
        let data = &submission.extracted_data;
        let sub_policy = data.get(keys::SUB_POLICY).and_then(Value::as_i64);
        let title = data.get(keys::TITLE).and_then(Value::as_str).map(match_key);
        let description = data
            .get(keys::DESCRIPTION)
            .and_then(Value::as_str)
            .map(match_key);
        let Some(sub_policy) = sub_policy else {
            return Ok((
                None,
                Some(format!("no compliance matches {identifier}; decision recorded only")),
            ));
        };
        let candidates = tx.compliances_where(|row| {
            row.sub_policy_id.get() == sub_policy
                && (title.as_deref().is_some_and(|t| !t.is_empty() && match_key(&row.content.title) == t)
                    || description.as_deref().is_some_and(|d| {
                        !d.is_empty() && match_key(&row.content.description) == d
                    }))
        });
        match crate::repository::latest_of(candidates) {
            Some(row) => {
                let warning = format!(
                    "no compliance has identifier {identifier}; decision applied to {} ({})",
                    row.identifier, row.id
                );
                Ok((Some(row), Some(warning)))
            }
            None => Ok((
                None,
                Some(format!("no compliance matches {identifier}; decision recorded only")),
            )),
        }
    }

    fn mirror_resubmission(
        &self,
        tenant: TenantId,
        identifier: &Identifier,
        creator: &Creator,
    ) {
        let lock = self.ledger.identifier_lock(tenant, identifier);
        let _guard = lock.lock();
        let now = Utc::now();
        let result = self.ledger.atomic(tenant, |tx| {
            match self.repo.latest_in(tx, identifier) {
                Some(row) => self
                    .repo
                    .reset_for_resubmission(tx, row.id, creator, now)
                    .map(Some),
                None => Ok(None),
            }
        });
        match result {
            Ok((Some(row), changes)) => {
                self.committed(&changes);
                tracing::info!(
                    %tenant,
                    %identifier,
                    compliance_id = %row.id,
                    "compliance reset for resubmission"
                );
            }
            Ok((None, _)) => {
                tracing::warn!(%tenant, %identifier, "resubmission mirror found no compliance row");
            }
            Err(err) => {
                tracing::error!(%tenant, %identifier, error = %err, "resubmission mirror failed");
            }
        }
    }
}

// ─── Unit helpers ────────────────────────────────────────────────────

/// The pending `u1` of a family, when `user` submitted it to `reviewer`.
fn reusable_submission(
    rows: &[ComplianceApproval],
    user: UserId,
    reviewer: UserId,
) -> Option<&ComplianceApproval> {
    let family = ApprovalFamily::new(rows.iter().map(ComplianceApproval::family_entry));
    if !matches!(family.state(), grc_state::FamilyState::Pending { .. }) {
        return None;
    }
    rows.iter().find(|row| {
        row.stage == ApprovalStage::Submitted { number: 1 }
            && row.user_id == user
            && row.reviewer_id == reviewer
    })
}

/// Open a submission row for `compliance`. With `reuse`, an existing
/// pending `u1` by the same submitter for the same reviewer is returned
/// instead of inserting a duplicate.
fn open_submission(
    tx: &mut Transaction<'_>,
    compliance: &Compliance,
    user: UserId,
    reviewer: UserId,
    due_date: Option<NaiveDate>,
    reuse: bool,
    now: DateTime<Utc>,
) -> GrcResult<(ComplianceApproval, bool)> {
    let framework_id = require_framework(compliance)?;
    let rows = tx.family(&compliance.identifier);
    let family = ApprovalFamily::new(rows.iter().map(ComplianceApproval::family_entry));
    let data = snapshot::of_compliance(compliance, reviewer, due_date);

    if reuse {
        if let Some(existing) = reusable_submission(&rows, user, reviewer) {
            let mut existing = existing.clone();
            existing.extracted_data = data;
            existing.approval_due_date = due_date;
            tx.update_approval(existing.clone())?;
            return Ok((existing, true));
        }
    }

    let row = ComplianceApproval {
        id: tx.new_approval_id(),
        tenant: tx.tenant(),
        identifier: compliance.identifier.clone(),
        stage: ApprovalStage::submitted(family.next_tag(TagFamily::User))?,
        extracted_data: data,
        user_id: user,
        reviewer_id: reviewer,
        policy_id: compliance.policy_id,
        framework_id,
        approval_due_date: due_date,
        created_at: now,
        revision: 0,
    };
    tx.insert_approval(row.clone())?;
    Ok((row, false))
}

/// Mark the edit under review as decided and append the `r` row.
/// Returns `(updated u row, new r row)`.
fn record_decision(
    tx: &mut Transaction<'_>,
    addressed: &ComplianceApproval,
    reviewer: UserId,
    approved: bool,
    remarks: &str,
    now: DateTime<Utc>,
) -> GrcResult<(ComplianceApproval, ComplianceApproval)> {
    let rows = tx.family(&addressed.identifier);
    let family = ApprovalFamily::new(rows.iter().map(ComplianceApproval::family_entry));
    let subject = family.subject_for_decision(addressed.id.get())?;
    let mut submission = tx
        .approval(ApprovalId::new(subject.ordinal))
        .ok_or_else(|| GrcError::not_found("approval", subject.ordinal))?;
    if submission.reviewer_id != reviewer {
        return Err(GrcError::CapabilityDenied {
            capability: format!(
                "{} (assigned reviewer is {})",
                Capability::Approve.as_str(),
                submission.reviewer_id
            ),
        });
    }

    submission.extracted_data.insert(
        snapshot::keys::DECISION.into(),
        snapshot::decided(approved, remarks),
    );
    tx.update_approval(submission.clone())?;

    let decision = ComplianceApproval {
        id: tx.new_approval_id(),
        tenant: tx.tenant(),
        identifier: submission.identifier.clone(),
        stage: ApprovalStage::decided(family.next_tag(TagFamily::Reviewer), approved, now)?,
        extracted_data: snapshot::with_decision(&submission.extracted_data, approved, remarks),
        user_id: submission.user_id,
        reviewer_id: submission.reviewer_id,
        policy_id: submission.policy_id,
        framework_id: submission.framework_id,
        approval_due_date: submission.approval_due_date,
        created_at: now,
        revision: 0,
    };
    tx.insert_approval(decision.clone())?;
    Ok((submission, decision))
}

fn require_reviewer(reviewer: Option<UserId>) -> GrcResult<UserId> {
    reviewer.ok_or_else(|| GrcError::ContractViolation("reviewer is required".into()))
}

fn require_framework(compliance: &Compliance) -> GrcResult<FrameworkId> {
    compliance.framework_id.ok_or_else(|| {
        GrcError::ContractViolation(format!(
            "compliance {} has no framework; approvals require framework context",
            compliance.identifier
        ))
    })
}

fn note(field: &str, raw: &str, required: bool) -> GrcResult<String> {
    let value = text::canonical_prose(raw);
    if required && value.is_empty() {
        return Err(GrcError::field(field, "is required"));
    }
    if value.chars().count() > NOTE_MAX {
        return Err(GrcError::field(
            field,
            format!("must not exceed {NOTE_MAX} characters"),
        ));
    }
    Ok(value)
}

fn match_key(s: &str) -> String {
    s.trim().to_lowercase().chars().take(MATCH_PREFIX).collect()
}

fn decision_label(approved: bool) -> &'static str {
    if approved {
        "approved"
    } else {
        "rejected"
    }
}

fn title_of(submission: &ComplianceApproval, compliance: Option<&Compliance>) -> String {
    compliance
        .map(|c| c.content.title.clone())
        .or_else(|| submission.snapshot_str(keys::TITLE).map(str::to_string))
        .unwrap_or_default()
}

fn event(
    kind: EventKind,
    compliance: &Compliance,
    actor: UserId,
    subject: UserId,
    outcome: Option<String>,
) -> ComplianceEvent {
    ComplianceEvent {
        kind,
        tenant: compliance.tenant,
        compliance_id: Some(compliance.id),
        identifier: compliance.identifier.clone(),
        actor,
        subject,
        title: compliance.content.title.clone(),
        outcome,
        timestamp: Utc::now(),
    }
}

/// The snapshot a dashboard shows, filled from the live row when the
/// stored scores are missing.
pub(crate) fn enrich(
    data: &Map<String, Value>,
    creator_name: String,
    live: Option<&Compliance>,
) -> Map<String, Value> {
    let mut out = data.clone();
    out.insert(snapshot::keys::CREATOR_NAME.into(), Value::from(creator_name));
    if let Some(live) = live {
        let live_map = live.content.to_map();
        snapshot::backfill_scores(&mut out, [&live_map]);
    }
    out
}
