//! # Compliance Repository
//!
//! Persistence of Compliance rows and their per-identifier version chain.
//!
//! Write operations take the caller's [`Transaction`] so the engine can
//! compose them with approval-row writes into one atomic unit. Read
//! operations open their own read-only view of committed state.
//!
//! ## Invariants enforced here
//!
//! - New and edited rows enter `Under Review/Inactive`.
//! - Edits append a row; the predecessor is never mutated.
//! - Decisions and toggles go through the `grc-state` chain planners, so
//!   at most one row per identifier is Active and only Approved rows are.
//! - Rows are never deleted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use grc_compliance::{keys, next_version, validate, ComplianceContent, ValidatedSubmission, ValidationMode};
use grc_core::{
    ActiveState, ComplianceId, ComplianceStatus, ComplianceVersion, FrameworkId, GrcError,
    GrcResult, Identifier, PolicyId, SubPolicyId, TenantId, ToggleIntent, UserId, VersioningType,
};
use grc_state::{ChainUpdate, LifecycleState, VersionChain};

use crate::collaborators::{PolicyChain, PolicyRegistry};
use crate::records::Compliance;
use crate::store::{Ledger, Transaction};

/// Attempts at drawing an unused generated identifier.
const IDENTIFIER_ATTEMPTS: usize = 8;

/// Who is writing a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Creator {
    /// Authenticated principal.
    pub user: UserId,
    /// Display name resolved from the user directory.
    pub name: String,
}

/// Filter for the export listing. Every set field must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportFilter {
    /// Framework of the row.
    pub framework_id: Option<FrameworkId>,
    /// Policy of the row.
    pub policy_id: Option<PolicyId>,
    /// Sub-policy of the row.
    pub sub_policy_id: Option<SubPolicyId>,
    /// Review status.
    pub status: Option<ComplianceStatus>,
    /// Activation flag.
    pub active: Option<ActiveState>,
}

impl ExportFilter {
    fn matches(&self, row: &Compliance) -> bool {
        self.framework_id.map_or(true, |f| row.framework_id == Some(f))
            && self.policy_id.map_or(true, |p| row.policy_id == Some(p))
            && self.sub_policy_id.map_or(true, |s| row.sub_policy_id == s)
            && self.status.map_or(true, |s| row.status == s)
            && self.active.map_or(true, |a| row.active == a)
    }
}

/// The Compliance repository.
#[derive(Clone)]
pub struct ComplianceRepository {
    ledger: Arc<Ledger>,
    registry: Arc<dyn PolicyRegistry>,
}

impl std::fmt::Debug for ComplianceRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComplianceRepository")
            .field("ledger", &self.ledger.len())
            .finish_non_exhaustive()
    }
}

impl ComplianceRepository {
    /// A repository over `ledger`, resolving hierarchy links in `registry`.
    pub fn new(ledger: Arc<Ledger>, registry: Arc<dyn PolicyRegistry>) -> Self {
        Self { ledger, registry }
    }

    /// The underlying ledger.
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    // ─── Writes ──────────────────────────────────────────────────────

    /// Insert a new compliance item at its initial version.
    ///
    /// A caller-supplied identifier must not already name a chain. Without
    /// one, a `COMP-<sub-policy>-<yymmdd>-<hex>` identifier is generated.
    pub fn create(
        &self,
        tx: &mut Transaction<'_>,
        submission: &ValidatedSubmission,
        creator: &Creator,
        now: DateTime<Utc>,
    ) -> GrcResult<Compliance> {
        let sub_policy_id = submission
            .sub_policy_id
            .ok_or_else(|| GrcError::field(keys::SUB_POLICY, "is required"))?;
        let chain = self.registry.resolve_chain(tx.tenant(), sub_policy_id)?;
        let identifier = match &submission.identifier {
            Some(id) => {
                if !tx.chain(id).is_empty() {
                    return Err(GrcError::InvariantViolation(format!(
                        "identifier {id} is already in use"
                    )));
                }
                id.clone()
            }
            None => fresh_identifier(tx, sub_policy_id, now)?,
        };
        let version = submission
            .version
            .clone()
            .unwrap_or_else(ComplianceVersion::initial);
        let row = new_row(
            tx,
            identifier,
            version,
            None,
            &chain,
            submission.content.clone(),
            creator,
            now,
        );
        tx.insert_compliance(row.clone())?;
        Ok(row)
    }

    /// Append a new version to the chain of `existing`.
    ///
    /// The new row links to the latest version of the chain (not
    /// necessarily `existing`) and takes the next version for `kind`.
    pub fn edit(
        &self,
        tx: &mut Transaction<'_>,
        existing: ComplianceId,
        submission: &ValidatedSubmission,
        kind: VersioningType,
        creator: &Creator,
        now: DateTime<Utc>,
    ) -> GrcResult<Compliance> {
        let base = tx
            .compliance(existing)
            .ok_or_else(|| GrcError::not_found("compliance", existing))?;
        let latest = latest_of(tx.chain(&base.identifier))
            .ok_or_else(|| GrcError::not_found("compliance", existing))?;
        let chain = match submission.sub_policy_id {
            Some(sp) if sp != latest.sub_policy_id => self.registry.resolve_chain(tx.tenant(), sp)?,
            _ => PolicyChain {
                sub_policy_id: latest.sub_policy_id,
                policy_id: latest
                    .policy_id
                    .ok_or_else(|| GrcError::reference("policy", latest.sub_policy_id))?,
                framework_id: latest.framework_id,
            },
        };
        let version = next_version(Some(latest.version.as_str()), kind);
        let row = new_row(
            tx,
            latest.identifier.clone(),
            version,
            Some(latest.id),
            &chain,
            submission.content.clone(),
            creator,
            now,
        );
        tx.insert_compliance(row.clone())?;
        Ok(row)
    }

    /// Copy `source` under `target` with a fresh identifier at `1.0`.
    ///
    /// The source content is the base; `overrides` replaces it key by key.
    /// The merged payload is validated like an edit, so the caller must
    /// supply reviewer and due date in `overrides`.
    pub fn clone_to(
        &self,
        tx: &mut Transaction<'_>,
        source: ComplianceId,
        target: SubPolicyId,
        overrides: &Value,
        creator: &Creator,
        now: DateTime<Utc>,
    ) -> GrcResult<(Compliance, ValidatedSubmission)> {
        let source_row = tx
            .compliance(source)
            .ok_or_else(|| GrcError::not_found("compliance", source))?;
        let merged = merge_payload(source_row.content.to_map(), overrides, target);
        let submission = validate(&Value::Object(merged), ValidationMode::Edit)?;
        let chain = self.registry.resolve_chain(tx.tenant(), target)?;
        let identifier = fresh_identifier(tx, target, now)?;
        let row = new_row(
            tx,
            identifier,
            ComplianceVersion::initial(),
            None,
            &chain,
            submission.content.clone(),
            creator,
            now,
        );
        tx.insert_compliance(row.clone())?;
        Ok((row, submission))
    }

    /// Record a reviewer decision on `id`. Approval makes it the single
    /// Active row of its chain.
    pub fn apply_decision(
        &self,
        tx: &mut Transaction<'_>,
        id: ComplianceId,
        approved: bool,
        now: DateTime<Utc>,
    ) -> GrcResult<Vec<ChainUpdate>> {
        let chain = self.chain_of(tx, id)?;
        let plan = chain.plan_decision(id, approved)?;
        apply_updates(tx, &plan, now)?;
        Ok(plan)
    }

    /// Activate or deactivate an Approved row.
    pub fn toggle_active(
        &self,
        tx: &mut Transaction<'_>,
        id: ComplianceId,
        intent: ToggleIntent,
        now: DateTime<Utc>,
    ) -> GrcResult<Vec<ChainUpdate>> {
        let chain = self.chain_of(tx, id)?;
        if !chain.members().iter().any(|m| m.state.is_approved()) {
            return Err(GrcError::InvariantViolation(format!(
                "only approved compliances can be toggled (no approved version of compliance {id})"
            )));
        }
        let plan = chain.plan_toggle(id, intent)?;
        apply_updates(tx, &plan, now)?;
        Ok(plan)
    }

    /// Apply the outcome of a deactivation request on `id`.
    pub fn apply_deactivation_decision(
        &self,
        tx: &mut Transaction<'_>,
        id: ComplianceId,
        approved: bool,
        now: DateTime<Utc>,
    ) -> GrcResult<Vec<ChainUpdate>> {
        let chain = self.chain_of(tx, id)?;
        let plan = chain.plan_deactivation_decision(id, approved)?;
        apply_updates(tx, &plan, now)?;
        Ok(plan)
    }

    /// Put `id` back under review for a resubmission and record the new
    /// creator. Content stays as decided; the edited payload lives in the
    /// new `u` snapshot.
    pub fn reset_for_resubmission(
        &self,
        tx: &mut Transaction<'_>,
        id: ComplianceId,
        creator: &Creator,
        now: DateTime<Utc>,
    ) -> GrcResult<Compliance> {
        let chain = self.chain_of(tx, id)?;
        let plan = chain.plan_resubmission(id)?;
        let mut row = tx
            .compliance(id)
            .ok_or_else(|| GrcError::not_found("compliance", id))?;
        for update in &plan {
            row.set_lifecycle(update.to, now);
        }
        row.created_by_user = creator.user;
        row.created_by_name = creator.name.clone();
        row.created_at = now;
        row.updated_at = now;
        tx.update_compliance(row.clone())?;
        Ok(row)
    }

    // ─── Reads inside a unit ─────────────────────────────────────────

    /// Highest-version row of `identifier` as seen by `tx`.
    pub fn latest_in(&self, tx: &Transaction<'_>, identifier: &Identifier) -> Option<Compliance> {
        latest_of(tx.chain(identifier))
    }

    fn chain_of(&self, tx: &Transaction<'_>, id: ComplianceId) -> GrcResult<VersionChain> {
        let row = tx
            .compliance(id)
            .ok_or_else(|| GrcError::not_found("compliance", id))?;
        Ok(VersionChain::new(
            tx.chain(&row.identifier).iter().map(Compliance::chain_member),
        ))
    }

    // ─── Committed reads ─────────────────────────────────────────────

    /// A row by id.
    pub fn get(&self, tenant: TenantId, id: ComplianceId) -> GrcResult<Compliance> {
        self.ledger
            .begin(tenant)
            .compliance(id)
            .ok_or_else(|| GrcError::not_found("compliance", id))
    }

    /// The highest-version row of `identifier`.
    pub fn resolve_latest(&self, tenant: TenantId, identifier: &Identifier) -> GrcResult<Compliance> {
        latest_of(self.ledger.begin(tenant).chain(identifier))
            .ok_or_else(|| GrcError::not_found("compliance", identifier))
    }

    /// Every row of `identifier`, highest version first.
    pub fn list_version_chain(
        &self,
        tenant: TenantId,
        identifier: &Identifier,
    ) -> GrcResult<Vec<Compliance>> {
        let mut rows = self.ledger.begin(tenant).chain(identifier);
        if rows.is_empty() {
            return Err(GrcError::not_found("compliance", identifier));
        }
        sort_latest_first(&mut rows);
        Ok(rows)
    }

    /// Rows matching `filter`, by identifier then version descending.
    pub fn list_for_export(&self, tenant: TenantId, filter: &ExportFilter) -> Vec<Compliance> {
        let mut rows = self
            .ledger
            .begin(tenant)
            .compliances_where(|row| filter.matches(row));
        rows.sort_by(|a, b| {
            a.identifier
                .cmp(&b.identifier)
                .then_with(|| b.version.cmp(&a.version))
        });
        rows
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn new_row(
    tx: &Transaction<'_>,
    identifier: Identifier,
    version: ComplianceVersion,
    previous_version_id: Option<ComplianceId>,
    chain: &PolicyChain,
    content: ComplianceContent,
    creator: &Creator,
    now: DateTime<Utc>,
) -> Compliance {
    let state = LifecycleState::submitted();
    Compliance {
        id: tx.new_compliance_id(),
        tenant: tx.tenant(),
        identifier,
        version,
        previous_version_id,
        sub_policy_id: chain.sub_policy_id,
        policy_id: Some(chain.policy_id),
        framework_id: chain.framework_id,
        content,
        status: state.status,
        active: state.active,
        created_by_name: creator.name.clone(),
        created_by_user: creator.user,
        created_at: now,
        updated_at: now,
        revision: 0,
    }
}

fn fresh_identifier(
    tx: &Transaction<'_>,
    sub_policy: SubPolicyId,
    now: DateTime<Utc>,
) -> GrcResult<Identifier> {
    for _ in 0..IDENTIFIER_ATTEMPTS {
        let candidate = Identifier::generate(sub_policy, now);
        if tx.chain(&candidate).is_empty() && tx.family(&candidate).is_empty() {
            return Ok(candidate);
        }
    }
    Err(GrcError::Conflict(format!(
        "no free identifier for sub-policy {sub_policy}"
    )))
}

fn apply_updates(
    tx: &mut Transaction<'_>,
    plan: &[ChainUpdate],
    now: DateTime<Utc>,
) -> GrcResult<()> {
    for update in plan {
        let mut row = tx
            .compliance(update.id)
            .ok_or_else(|| GrcError::not_found("compliance", update.id))?;
        row.set_lifecycle(update.to, now);
        tx.update_compliance(row)?;
    }
    Ok(())
}

fn merge_payload(base: Map<String, Value>, overrides: &Value, target: SubPolicyId) -> Map<String, Value> {
    let mut merged = base;
    if let Some(over) = overrides.as_object() {
        for (key, value) in over {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged.remove(keys::IDENTIFIER);
    merged.remove(keys::VERSION);
    merged.insert(keys::SUB_POLICY.into(), Value::from(target.get()));
    merged
}

pub(crate) fn sort_latest_first(rows: &mut [Compliance]) {
    rows.sort_by(|a, b| b.version.cmp(&a.version).then(b.id.cmp(&a.id)));
}

pub(crate) fn latest_of(mut rows: Vec<Compliance>) -> Option<Compliance> {
    sort_latest_first(&mut rows);
    rows.into_iter().next()
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::InMemoryRegistry;
    use crate::testing::{submission, world};
    use grc_core::ActiveState;

    fn creator() -> Creator {
        Creator {
            user: UserId::new(3),
            name: "Dana".into(),
        }
    }

    fn commit_create(repo: &ComplianceRepository, tenant: TenantId) -> Compliance {
        let mut tx = repo.ledger().begin(tenant);
        let row = repo.create(&mut tx, &submission(), &creator(), Utc::now()).unwrap();
        tx.commit().unwrap();
        row
    }

    #[test]
    fn create_enters_review_with_generated_identifier() {
        let (repo, tenant) = world();
        let row = commit_create(&repo, tenant);
        assert_eq!(row.status, ComplianceStatus::UnderReview);
        assert_eq!(row.active, ActiveState::Inactive);
        assert!(row.identifier.as_str().starts_with("COMP-42-"));
        assert_eq!(row.version.as_str(), "1.0");
        assert_eq!(row.framework_id, Some(FrameworkId::new(1)));
        assert_eq!(row.policy_id, Some(PolicyId::new(5)));
    }

    #[test]
    fn create_under_unknown_sub_policy_is_reference_not_found() {
        let ledger = Arc::new(Ledger::new());
        let repo = ComplianceRepository::new(ledger, Arc::new(InMemoryRegistry::new()));
        let mut tx = repo.ledger().begin(TenantId::new());
        let err = repo
            .create(&mut tx, &submission(), &creator(), Utc::now())
            .unwrap_err();
        assert_eq!(err.code(), "REFERENCE_NOT_FOUND");
    }

    #[test]
    fn supplied_identifier_must_be_unused() {
        let (repo, tenant) = world();
        let first = commit_create(&repo, tenant);
        let mut sub = submission();
        sub.identifier = Some(first.identifier.clone());
        let mut tx = repo.ledger().begin(tenant);
        let err = repo.create(&mut tx, &sub, &creator(), Utc::now()).unwrap_err();
        assert_eq!(err.code(), "INVARIANT_VIOLATION");
    }

    #[test]
    fn edit_appends_to_latest_version() {
        let (repo, tenant) = world();
        let first = commit_create(&repo, tenant);
        let mut tx = repo.ledger().begin(tenant);
        let second = repo
            .edit(&mut tx, first.id, &submission(), VersioningType::Minor, &creator(), Utc::now())
            .unwrap();
        tx.commit().unwrap();
        // Editing the old row still appends after the latest.
        let mut tx = repo.ledger().begin(tenant);
        let third = repo
            .edit(&mut tx, first.id, &submission(), VersioningType::Major, &creator(), Utc::now())
            .unwrap();
        tx.commit().unwrap();

        assert_eq!(second.version.as_str(), "1.1");
        assert_eq!(second.previous_version_id, Some(first.id));
        assert_eq!(third.version.as_str(), "2.0");
        assert_eq!(third.previous_version_id, Some(second.id));

        let chain = repo.list_version_chain(tenant, &first.identifier).unwrap();
        let versions: Vec<&str> = chain.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(versions, ["2.0", "1.1", "1.0"]);
        assert_eq!(repo.get(tenant, first.id).unwrap().revision, 1);
        assert_eq!(repo.resolve_latest(tenant, &first.identifier).unwrap().id, third.id);
    }

    #[test]
    fn decision_and_toggle_keep_one_active_row() {
        let (repo, tenant) = world();
        let first = commit_create(&repo, tenant);
        let mut tx = repo.ledger().begin(tenant);
        repo.apply_decision(&mut tx, first.id, true, Utc::now()).unwrap();
        let second = repo
            .edit(&mut tx, first.id, &submission(), VersioningType::Minor, &creator(), Utc::now())
            .unwrap();
        repo.apply_decision(&mut tx, second.id, true, Utc::now()).unwrap();
        tx.commit().unwrap();
        assert_eq!(repo.get(tenant, first.id).unwrap().active, ActiveState::Inactive);
        assert_eq!(repo.get(tenant, second.id).unwrap().active, ActiveState::Active);

        let mut tx = repo.ledger().begin(tenant);
        repo.toggle_active(&mut tx, first.id, ToggleIntent::Activate, Utc::now())
            .unwrap();
        tx.commit().unwrap();
        assert_eq!(repo.get(tenant, first.id).unwrap().active, ActiveState::Active);
        assert_eq!(repo.get(tenant, second.id).unwrap().active, ActiveState::Inactive);
    }

    #[test]
    fn toggle_without_approved_versions_is_refused() {
        let (repo, tenant) = world();
        let row = commit_create(&repo, tenant);
        let mut tx = repo.ledger().begin(tenant);
        let err = repo
            .toggle_active(&mut tx, row.id, ToggleIntent::Activate, Utc::now())
            .unwrap_err();
        assert!(err.to_string().contains("only approved compliances can be toggled"));
    }

    #[test]
    fn clone_starts_a_new_chain() {
        let (repo, tenant) = world();
        let source = commit_create(&repo, tenant);
        let overrides = serde_json::json!({
            "ComplianceTitle": "Access Logging (EU)",
            "reviewer": 7,
            "ApprovalDueDate": "2024-03-01"
        });
        let mut tx = repo.ledger().begin(tenant);
        let (row, sub) = repo
            .clone_to(&mut tx, source.id, SubPolicyId::new(42), &overrides, &creator(), Utc::now())
            .unwrap();
        tx.commit().unwrap();
        assert_ne!(row.identifier, source.identifier);
        assert_eq!(row.version.as_str(), "1.0");
        assert_eq!(row.content.title, "Access Logging (EU)");
        assert_eq!(row.content.mitigation, source.content.mitigation);
        assert_eq!(sub.reviewer_id, Some(UserId::new(7)));
    }

    #[test]
    fn clone_without_reviewer_fails_validation() {
        let (repo, tenant) = world();
        let source = commit_create(&repo, tenant);
        let mut tx = repo.ledger().begin(tenant);
        let err = repo
            .clone_to(&mut tx, source.id, SubPolicyId::new(42), &Value::Null, &creator(), Utc::now())
            .unwrap_err();
        match err {
            GrcError::Validation(fields) => assert!(fields.contains("reviewer")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn export_filter_matches_every_set_field() {
        let (repo, tenant) = world();
        let row = commit_create(&repo, tenant);
        let all = repo.list_for_export(tenant, &ExportFilter::default());
        assert_eq!(all.len(), 1);
        let filter = ExportFilter {
            framework_id: Some(FrameworkId::new(1)),
            status: Some(ComplianceStatus::UnderReview),
            ..ExportFilter::default()
        };
        assert_eq!(repo.list_for_export(tenant, &filter)[0].id, row.id);
        let filter = ExportFilter {
            active: Some(ActiveState::Active),
            ..ExportFilter::default()
        };
        assert!(repo.list_for_export(tenant, &filter).is_empty());
        assert!(repo.list_for_export(TenantId::new(), &ExportFilter::default()).is_empty());
    }

    #[test]
    fn missing_rows_are_not_found() {
        let (repo, tenant) = world();
        assert_eq!(
            repo.get(tenant, ComplianceId::new(99)).unwrap_err().code(),
            "NOT_FOUND"
        );
        let id = Identifier::new("NOPE").unwrap();
        assert!(repo.resolve_latest(tenant, &id).is_err());
        assert!(repo.list_version_chain(tenant, &id).is_err());
    }
}
