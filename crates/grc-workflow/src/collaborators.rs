//! # Collaborator Seams
//!
//! The engine consumes four external services through narrow traits:
//!
//! - [`CapabilityChecker`]: boolean permission check per named capability.
//! - [`UserDirectory`]: display names for dashboards and creator fields.
//! - [`PolicyRegistry`]: read-only sub-policy → policy → framework lookups.
//! - [`Notifier`](crate::events::Notifier): event delivery, in `events.rs`.
//!
//! Each has an in-memory implementation used by the binary and the tests.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use grc_core::{Capability, FrameworkId, GrcError, GrcResult, PolicyId, SubPolicyId, TenantId, UserId};

// ─── Capabilities ────────────────────────────────────────────────────

/// RBAC evaluation, consumed as a boolean.
pub trait CapabilityChecker: Send + Sync {
    /// Whether `user` holds `capability` in `tenant`.
    fn has_capability(&self, tenant: TenantId, user: UserId, capability: Capability) -> bool;
}

/// Grants every capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl CapabilityChecker for AllowAll {
    fn has_capability(&self, _: TenantId, _: UserId, _: Capability) -> bool {
        true
    }
}

/// Explicit per-user grants.
#[derive(Debug, Default)]
pub struct StaticGrants {
    grants: RwLock<HashMap<(TenantId, UserId), HashSet<Capability>>>,
}

impl StaticGrants {
    /// No grants.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `capabilities` to `user`.
    pub fn grant(&self, tenant: TenantId, user: UserId, capabilities: &[Capability]) {
        self.grants
            .write()
            .entry((tenant, user))
            .or_default()
            .extend(capabilities.iter().copied());
    }

    /// Remove one capability from `user`.
    pub fn revoke(&self, tenant: TenantId, user: UserId, capability: Capability) {
        if let Some(set) = self.grants.write().get_mut(&(tenant, user)) {
            set.remove(&capability);
        }
    }
}

impl CapabilityChecker for StaticGrants {
    fn has_capability(&self, tenant: TenantId, user: UserId, capability: Capability) -> bool {
        self.grants
            .read()
            .get(&(tenant, user))
            .is_some_and(|set| set.contains(&capability))
    }
}

// ─── Users ───────────────────────────────────────────────────────────

/// What the user subsystem exposes about a principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Name shown in dashboards and stored as creator name.
    pub display_name: String,
    /// Contact address for notification delivery.
    pub email: String,
}

/// Read-only access to user profiles.
pub trait UserDirectory: Send + Sync {
    /// Profile of `user`, if known.
    fn lookup_user(&self, tenant: TenantId, user: UserId) -> Option<UserProfile>;
}

/// In-memory user directory.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    users: RwLock<HashMap<(TenantId, UserId), UserProfile>>,
}

impl InMemoryDirectory {
    /// An empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a profile.
    pub fn insert(&self, tenant: TenantId, user: UserId, profile: UserProfile) {
        self.users.write().insert((tenant, user), profile);
    }
}

impl UserDirectory for InMemoryDirectory {
    fn lookup_user(&self, tenant: TenantId, user: UserId) -> Option<UserProfile> {
        self.users.read().get(&(tenant, user)).cloned()
    }
}

// ─── Policy hierarchy ────────────────────────────────────────────────

/// A sub-policy as seen by this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubPolicyRecord {
    /// Owning policy.
    pub policy_id: PolicyId,
}

/// A policy as seen by this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRecord {
    /// Owning framework. Legacy policies may have none.
    pub framework_id: Option<FrameworkId>,
}

/// The resolved sub-policy → policy → framework chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyChain {
    /// The sub-policy.
    pub sub_policy_id: SubPolicyId,
    /// Its policy.
    pub policy_id: PolicyId,
    /// The policy's framework, when it has one.
    pub framework_id: Option<FrameworkId>,
}

impl PolicyChain {
    /// The framework, required for approval rows.
    pub fn require_framework(&self) -> GrcResult<FrameworkId> {
        self.framework_id.ok_or_else(|| {
            GrcError::ContractViolation(format!(
                "policy {} has no framework; approvals require framework context",
                self.policy_id
            ))
        })
    }
}

/// Read-only lookups into the framework hierarchy.
pub trait PolicyRegistry: Send + Sync {
    /// A sub-policy by id.
    fn sub_policy(&self, tenant: TenantId, id: SubPolicyId) -> Option<SubPolicyRecord>;
    /// A policy by id.
    fn policy(&self, tenant: TenantId, id: PolicyId) -> Option<PolicyRecord>;
    /// Whether a framework exists.
    fn framework_exists(&self, tenant: TenantId, id: FrameworkId) -> bool;

    /// Resolve the full chain, failing with `ReferenceNotFound` on any
    /// missing link.
    fn resolve_chain(&self, tenant: TenantId, sub_policy_id: SubPolicyId) -> GrcResult<PolicyChain> {
        let sub = self
            .sub_policy(tenant, sub_policy_id)
            .ok_or_else(|| GrcError::reference("sub-policy", sub_policy_id))?;
        let policy = self
            .policy(tenant, sub.policy_id)
            .ok_or_else(|| GrcError::reference("policy", sub.policy_id))?;
        if let Some(framework_id) = policy.framework_id {
            if !self.framework_exists(tenant, framework_id) {
                return Err(GrcError::reference("framework", framework_id));
            }
        }
        Ok(PolicyChain {
            sub_policy_id,
            policy_id: sub.policy_id,
            framework_id: policy.framework_id,
        })
    }
}

#[derive(Debug, Default)]
struct Hierarchy {
    sub_policies: HashMap<(TenantId, SubPolicyId), SubPolicyRecord>,
    policies: HashMap<(TenantId, PolicyId), PolicyRecord>,
    frameworks: HashSet<(TenantId, FrameworkId)>,
}

/// In-memory framework hierarchy.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    inner: RwLock<Hierarchy>,
}

impl InMemoryRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a framework.
    pub fn add_framework(&self, tenant: TenantId, id: FrameworkId) {
        self.inner.write().frameworks.insert((tenant, id));
    }

    /// Register a policy under an optional framework.
    pub fn add_policy(&self, tenant: TenantId, id: PolicyId, framework_id: Option<FrameworkId>) {
        self.inner
            .write()
            .policies
            .insert((tenant, id), PolicyRecord { framework_id });
    }

    /// Register a sub-policy under a policy.
    pub fn add_sub_policy(&self, tenant: TenantId, id: SubPolicyId, policy_id: PolicyId) {
        self.inner
            .write()
            .sub_policies
            .insert((tenant, id), SubPolicyRecord { policy_id });
    }

    /// Register a complete framework → policy → sub-policy chain.
    pub fn add_chain(
        &self,
        tenant: TenantId,
        framework_id: FrameworkId,
        policy_id: PolicyId,
        sub_policy_id: SubPolicyId,
    ) {
        self.add_framework(tenant, framework_id);
        self.add_policy(tenant, policy_id, Some(framework_id));
        self.add_sub_policy(tenant, sub_policy_id, policy_id);
    }
}

impl PolicyRegistry for InMemoryRegistry {
    fn sub_policy(&self, tenant: TenantId, id: SubPolicyId) -> Option<SubPolicyRecord> {
        self.inner.read().sub_policies.get(&(tenant, id)).copied()
    }

    fn policy(&self, tenant: TenantId, id: PolicyId) -> Option<PolicyRecord> {
        self.inner.read().policies.get(&(tenant, id)).copied()
    }

    fn framework_exists(&self, tenant: TenantId, id: FrameworkId) -> bool {
        self.inner.read().frameworks.contains(&(tenant, id))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_grants_are_per_tenant() {
        let grants = StaticGrants::new();
        let (a, b) = (TenantId::new(), TenantId::new());
        let user = UserId::new(3);
        grants.grant(a, user, &[Capability::Create, Capability::View]);
        assert!(grants.has_capability(a, user, Capability::Create));
        assert!(!grants.has_capability(a, user, Capability::Approve));
        assert!(!grants.has_capability(b, user, Capability::Create));
        grants.revoke(a, user, Capability::Create);
        assert!(!grants.has_capability(a, user, Capability::Create));
    }

    #[test]
    fn chain_resolution_reports_the_missing_link() {
        let reg = InMemoryRegistry::new();
        let t = TenantId::new();
        let err = reg.resolve_chain(t, SubPolicyId::new(42)).unwrap_err();
        assert_eq!(err.code(), "REFERENCE_NOT_FOUND");

        reg.add_sub_policy(t, SubPolicyId::new(42), PolicyId::new(5));
        assert!(reg
            .resolve_chain(t, SubPolicyId::new(42))
            .unwrap_err()
            .to_string()
            .contains("policy"));

        reg.add_policy(t, PolicyId::new(5), Some(FrameworkId::new(1)));
        assert_eq!(
            reg.resolve_chain(t, SubPolicyId::new(42)).unwrap_err().code(),
            "REFERENCE_NOT_FOUND"
        );

        reg.add_framework(t, FrameworkId::new(1));
        let chain = reg.resolve_chain(t, SubPolicyId::new(42)).unwrap();
        assert_eq!(chain.policy_id, PolicyId::new(5));
        assert_eq!(chain.require_framework().unwrap(), FrameworkId::new(1));
    }

    #[test]
    fn policy_without_framework_cannot_host_approvals() {
        let reg = InMemoryRegistry::new();
        let t = TenantId::new();
        reg.add_policy(t, PolicyId::new(5), None);
        reg.add_sub_policy(t, SubPolicyId::new(42), PolicyId::new(5));
        let chain = reg.resolve_chain(t, SubPolicyId::new(42)).unwrap();
        assert_eq!(chain.framework_id, None);
        assert_eq!(chain.require_framework().unwrap_err().code(), "CONTRACT_VIOLATION");
    }
}
