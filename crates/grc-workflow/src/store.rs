//! # Transactional Ledger
//!
//! The authoritative in-memory state: Compliance rows and approval rows for
//! every tenant, behind one `parking_lot::RwLock`.
//!
//! ## Atomic units
//!
//! Every write goes through a [`Transaction`]. A transaction reads through
//! to the committed tables, stages inserts and updates locally, and commits
//! them under a single write lock after checking:
//!
//! - every updated row still has the revision it was read at,
//! - no inserted Compliance duplicates `(tenant, identifier, version)`,
//! - no inserted approval duplicates `(tenant, identifier, tag)`,
//! - every touched version chain keeps single-active-version.
//!
//! A failed check discards the whole unit. A stale revision or duplicate is
//! [`GrcError::Conflict`]; [`Ledger::atomic`] retries those up to
//! [`MAX_ATTEMPTS`] times.
//!
//! Units on the same identifier are serialized by a per
//! `(tenant, identifier)` mutex obtained from [`Ledger::identifier_lock`].
//! All rows are never held across an `.await`.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use grc_core::{ApprovalId, ComplianceId, GrcError, GrcResult, Identifier, TenantId};
use grc_state::VersionChain;

use crate::records::{Compliance, ComplianceApproval};

/// Attempts per atomic unit before a conflict is surfaced.
pub const MAX_ATTEMPTS: usize = 3;

// -- Tables ------------------------------------------------------------------

type FamilyKey = (TenantId, Identifier);

#[derive(Debug, Default)]
struct Tables {
    compliances: BTreeMap<ComplianceId, Compliance>,
    approvals: BTreeMap<ApprovalId, ComplianceApproval>,
    chains: HashMap<FamilyKey, Vec<ComplianceId>>,
    families: HashMap<FamilyKey, Vec<ApprovalId>>,
}

impl Tables {
    fn put_compliance(&mut self, row: Compliance) {
        let key = (row.tenant, row.identifier.clone());
        if !self.compliances.contains_key(&row.id) {
            self.chains.entry(key).or_default().push(row.id);
        }
        self.compliances.insert(row.id, row);
    }

    fn put_approval(&mut self, row: ComplianceApproval) {
        let key = (row.tenant, row.identifier.clone());
        if !self.approvals.contains_key(&row.id) {
            self.families.entry(key).or_default().push(row.id);
        }
        self.approvals.insert(row.id, row);
    }

    fn chain(&self, tenant: TenantId, identifier: &Identifier) -> Vec<&Compliance> {
        self.chains
            .get(&(tenant, identifier.clone()))
            .map(|ids| ids.iter().filter_map(|id| self.compliances.get(id)).collect())
            .unwrap_or_default()
    }

    fn family(&self, tenant: TenantId, identifier: &Identifier) -> Vec<&ComplianceApproval> {
        self.families
            .get(&(tenant, identifier.clone()))
            .map(|ids| ids.iter().filter_map(|id| self.approvals.get(id)).collect())
            .unwrap_or_default()
    }
}

/// Rows written by one committed unit, in their committed form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// Inserted or updated Compliance rows.
    pub compliances: Vec<Compliance>,
    /// Inserted or updated approval rows.
    pub approvals: Vec<ComplianceApproval>,
}

impl ChangeSet {
    /// Whether nothing was written.
    pub fn is_empty(&self) -> bool {
        self.compliances.is_empty() && self.approvals.is_empty()
    }
}

/// Receiver of committed change sets (e.g. a database write-through).
pub trait ChangeSink: Send + Sync {
    /// Called once per committed unit, after the in-memory commit.
    fn persist(&self, changes: &ChangeSet);
}

// -- Ledger ------------------------------------------------------------------

/// The in-memory ledger shared by the repository and the engine.
#[derive(Debug)]
pub struct Ledger {
    tables: RwLock<Tables>,
    next_compliance: AtomicI64,
    next_approval: AtomicI64,
    locks: DashMap<FamilyKey, Arc<Mutex<()>>>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// An empty ledger.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            next_compliance: AtomicI64::new(1),
            next_approval: AtomicI64::new(1),
            locks: DashMap::new(),
        }
    }

    /// Load previously persisted rows. Id counters continue after the
    /// highest loaded id.
    pub fn hydrate(
        &self,
        compliances: impl IntoIterator<Item = Compliance>,
        approvals: impl IntoIterator<Item = ComplianceApproval>,
    ) -> (usize, usize) {
        let mut tables = self.tables.write();
        let mut loaded = (0, 0);
        for row in compliances {
            self.next_compliance
                .fetch_max(row.id.get() + 1, Ordering::SeqCst);
            tables.put_compliance(row);
            loaded.0 += 1;
        }
        for row in approvals {
            self.next_approval.fetch_max(row.id.get() + 1, Ordering::SeqCst);
            tables.put_approval(row);
            loaded.1 += 1;
        }
        loaded
    }

    /// Start a unit of work scoped to `tenant`.
    pub fn begin(&self, tenant: TenantId) -> Transaction<'_> {
        Transaction {
            ledger: self,
            tenant,
            compliances: BTreeMap::new(),
            approvals: BTreeMap::new(),
        }
    }

    /// Run `unit` in a fresh transaction and commit it, retrying on
    /// [`GrcError::Conflict`] up to [`MAX_ATTEMPTS`] times.
    pub fn atomic<T, F>(&self, tenant: TenantId, mut unit: F) -> GrcResult<(T, ChangeSet)>
    where
        F: FnMut(&mut Transaction<'_>) -> GrcResult<T>,
    {
        let mut attempt = 1;
        loop {
            let mut tx = self.begin(tenant);
            let outcome = unit(&mut tx).and_then(|value| tx.commit().map(|cs| (value, cs)));
            match outcome {
                Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                    tracing::warn!(%tenant, attempt, error = %err, "retrying conflicted unit");
                    metrics::counter!("grc_conflict_retries_total").increment(1);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// The mutex serializing units on one identifier. Deactivation families
    /// share the lock of the compliance they target.
    pub fn identifier_lock(&self, tenant: TenantId, identifier: &Identifier) -> Arc<Mutex<()>> {
        let base = identifier
            .deactivation_target()
            .unwrap_or_else(|| identifier.clone());
        self.locks
            .entry((tenant, base))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Number of committed `(compliance, approval)` rows across tenants.
    pub fn len(&self) -> (usize, usize) {
        let tables = self.tables.read();
        (tables.compliances.len(), tables.approvals.len())
    }

    /// Whether the ledger holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == (0, 0)
    }

    fn allocate_compliance_id(&self) -> ComplianceId {
        ComplianceId::new(self.next_compliance.fetch_add(1, Ordering::SeqCst))
    }

    fn allocate_approval_id(&self) -> ApprovalId {
        ApprovalId::new(self.next_approval.fetch_add(1, Ordering::SeqCst))
    }
}

// -- Transaction -------------------------------------------------------------

#[derive(Debug)]
struct Staged<T> {
    row: T,
    /// `None` for inserts, otherwise the revision the row was read at.
    base_revision: Option<u64>,
}

/// A unit of work against one tenant's rows.
///
/// Reads see committed rows overlaid with this transaction's own staged
/// writes. Dropping a transaction without committing discards it.
#[derive(Debug)]
pub struct Transaction<'l> {
    ledger: &'l Ledger,
    tenant: TenantId,
    compliances: BTreeMap<ComplianceId, Staged<Compliance>>,
    approvals: BTreeMap<ApprovalId, Staged<ComplianceApproval>>,
}

impl<'l> Transaction<'l> {
    /// The tenant this unit is scoped to.
    pub fn tenant(&self) -> TenantId {
        self.tenant
    }

    // -- reads ---------------------------------------------------------------

    /// A Compliance row by id.
    pub fn compliance(&self, id: ComplianceId) -> Option<Compliance> {
        if let Some(staged) = self.compliances.get(&id) {
            return Some(staged.row.clone());
        }
        self.ledger
            .tables
            .read()
            .compliances
            .get(&id)
            .filter(|row| row.tenant == self.tenant)
            .cloned()
    }

    /// All rows of one version chain, in insertion order.
    pub fn chain(&self, identifier: &Identifier) -> Vec<Compliance> {
        let mut rows: BTreeMap<ComplianceId, Compliance> = self
            .ledger
            .tables
            .read()
            .chain(self.tenant, identifier)
            .into_iter()
            .map(|row| (row.id, row.clone()))
            .collect();
        for (id, staged) in &self.compliances {
            if &staged.row.identifier == identifier {
                rows.insert(*id, staged.row.clone());
            }
        }
        rows.into_values().collect()
    }

    /// An approval row by id.
    pub fn approval(&self, id: ApprovalId) -> Option<ComplianceApproval> {
        if let Some(staged) = self.approvals.get(&id) {
            return Some(staged.row.clone());
        }
        self.ledger
            .tables
            .read()
            .approvals
            .get(&id)
            .filter(|row| row.tenant == self.tenant)
            .cloned()
    }

    /// All approval rows of one family, in insertion order.
    pub fn family(&self, identifier: &Identifier) -> Vec<ComplianceApproval> {
        let mut rows: BTreeMap<ApprovalId, ComplianceApproval> = self
            .ledger
            .tables
            .read()
            .family(self.tenant, identifier)
            .into_iter()
            .map(|row| (row.id, row.clone()))
            .collect();
        for (id, staged) in &self.approvals {
            if &staged.row.identifier == identifier {
                rows.insert(*id, staged.row.clone());
            }
        }
        rows.into_values().collect()
    }

    /// Every Compliance row of the tenant matching `pred`, by id.
    pub fn compliances_where(&self, pred: impl Fn(&Compliance) -> bool) -> Vec<Compliance> {
        let mut rows: BTreeMap<ComplianceId, Compliance> = self
            .ledger
            .tables
            .read()
            .compliances
            .values()
            .filter(|row| row.tenant == self.tenant)
            .map(|row| (row.id, row.clone()))
            .collect();
        for (id, staged) in &self.compliances {
            rows.insert(*id, staged.row.clone());
        }
        rows.into_values().filter(|row| pred(row)).collect()
    }

    /// Every approval row of the tenant matching `pred`, by id.
    pub fn approvals_where(
        &self,
        pred: impl Fn(&ComplianceApproval) -> bool,
    ) -> Vec<ComplianceApproval> {
        let mut rows: BTreeMap<ApprovalId, ComplianceApproval> = self
            .ledger
            .tables
            .read()
            .approvals
            .values()
            .filter(|row| row.tenant == self.tenant)
            .map(|row| (row.id, row.clone()))
            .collect();
        for (id, staged) in &self.approvals {
            rows.insert(*id, staged.row.clone());
        }
        rows.into_values().filter(|row| pred(row)).collect()
    }

    // -- writes --------------------------------------------------------------

    /// Allocate an id for a new Compliance row.
    pub fn new_compliance_id(&self) -> ComplianceId {
        self.ledger.allocate_compliance_id()
    }

    /// Allocate an id for a new approval row.
    pub fn new_approval_id(&self) -> ApprovalId {
        self.ledger.allocate_approval_id()
    }

    /// Stage a new Compliance row.
    pub fn insert_compliance(&mut self, mut row: Compliance) -> GrcResult<()> {
        self.check_tenant(row.tenant)?;
        row.revision = 1;
        self.compliances.insert(
            row.id,
            Staged {
                row,
                base_revision: None,
            },
        );
        Ok(())
    }

    /// Stage an update of a Compliance row previously read in this unit.
    pub fn update_compliance(&mut self, row: Compliance) -> GrcResult<()> {
        self.check_tenant(row.tenant)?;
        let base_revision = match self.compliances.get(&row.id) {
            Some(staged) => staged.base_revision,
            None => Some(row.revision),
        };
        self.compliances.insert(row.id, Staged { row, base_revision });
        Ok(())
    }

    /// Stage a new approval row.
    pub fn insert_approval(&mut self, mut row: ComplianceApproval) -> GrcResult<()> {
        self.check_tenant(row.tenant)?;
        row.revision = 1;
        self.approvals.insert(
            row.id,
            Staged {
                row,
                base_revision: None,
            },
        );
        Ok(())
    }

    /// Stage an update of an approval row previously read in this unit.
    pub fn update_approval(&mut self, row: ComplianceApproval) -> GrcResult<()> {
        self.check_tenant(row.tenant)?;
        let base_revision = match self.approvals.get(&row.id) {
            Some(staged) => staged.base_revision,
            None => Some(row.revision),
        };
        self.approvals.insert(row.id, Staged { row, base_revision });
        Ok(())
    }

    fn check_tenant(&self, tenant: TenantId) -> GrcResult<()> {
        if tenant == self.tenant {
            Ok(())
        } else {
            Err(GrcError::Internal(format!(
                "row of tenant {tenant} staged in unit of tenant {}",
                self.tenant
            )))
        }
    }

    // -- commit --------------------------------------------------------------

    /// Validate and publish every staged write, or none of them.
    pub fn commit(self) -> GrcResult<ChangeSet> {
        let Transaction {
            ledger,
            tenant,
            compliances,
            approvals,
        } = self;
        if compliances.is_empty() && approvals.is_empty() {
            return Ok(ChangeSet::default());
        }

        let mut tables = ledger.tables.write();

        for (id, staged) in &compliances {
            check_revision(
                "compliance",
                id.get(),
                staged.base_revision,
                tables.compliances.get(id).map(|r| r.revision),
            )?;
            if staged.base_revision.is_none() {
                let clash = tables
                    .chain(tenant, &staged.row.identifier)
                    .into_iter()
                    .any(|row| row.version == staged.row.version);
                let staged_clash = compliances.values().any(|other| {
                    other.row.id != *id
                        && other.row.identifier == staged.row.identifier
                        && other.row.version == staged.row.version
                });
                if clash || staged_clash {
                    return Err(GrcError::Conflict(format!(
                        "{} version {} already exists",
                        staged.row.identifier, staged.row.version
                    )));
                }
            }
        }
        for (id, staged) in &approvals {
            check_revision(
                "approval",
                id.get(),
                staged.base_revision,
                tables.approvals.get(id).map(|r| r.revision),
            )?;
            if staged.base_revision.is_none() {
                let tag = staged.row.stage.tag();
                let clash = tables
                    .family(tenant, &staged.row.identifier)
                    .into_iter()
                    .any(|row| row.stage.tag() == tag);
                let staged_clash = approvals.values().any(|other| {
                    other.row.id != *id
                        && other.row.identifier == staged.row.identifier
                        && other.row.stage.tag() == tag
                });
                if clash || staged_clash {
                    return Err(GrcError::Conflict(format!(
                        "{} tag {tag} already exists",
                        staged.row.identifier
                    )));
                }
            }
        }

        // Single-active-version over every touched chain, after the writes.
        let mut touched: Vec<&Identifier> = compliances.values().map(|s| &s.row.identifier).collect();
        touched.sort();
        touched.dedup();
        for identifier in touched {
            let mut merged: BTreeMap<ComplianceId, &Compliance> = tables
                .chain(tenant, identifier)
                .into_iter()
                .map(|row| (row.id, row))
                .collect();
            for staged in compliances.values().filter(|s| &s.row.identifier == identifier) {
                merged.insert(staged.row.id, &staged.row);
            }
            VersionChain::new(merged.values().map(|row| row.chain_member())).verify()?;
        }

        let mut changes = ChangeSet::default();
        for (_, staged) in compliances {
            let mut row = staged.row;
            row.revision = staged.base_revision.map_or(1, |r| r + 1);
            changes.compliances.push(row.clone());
            tables.put_compliance(row);
        }
        for (_, staged) in approvals {
            let mut row = staged.row;
            row.revision = staged.base_revision.map_or(1, |r| r + 1);
            changes.approvals.push(row.clone());
            tables.put_approval(row);
        }
        Ok(changes)
    }
}

fn check_revision(
    kind: &str,
    id: i64,
    expected: Option<u64>,
    current: Option<u64>,
) -> GrcResult<()> {
    match (expected, current) {
        (None, None) => Ok(()),
        (Some(e), Some(c)) if e == c => Ok(()),
        (None, Some(_)) => Err(GrcError::Conflict(format!("{kind} {id} already exists"))),
        (Some(_), None) => Err(GrcError::Conflict(format!("{kind} {id} vanished"))),
        (Some(e), Some(c)) => Err(GrcError::Conflict(format!(
            "{kind} {id} changed concurrently (read revision {e}, now {c})"
        ))),
    }
}
