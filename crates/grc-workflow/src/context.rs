//! Request scope handed to every repository and engine operation.

use serde::{Deserialize, Serialize};

use grc_core::{GrcError, GrcResult, TenantId, UserId};

/// Tenant and principal resolved by the transport layer.
///
/// Either may be absent; the operation decides whether that is fatal.
/// A missing tenant always is. A missing principal is fatal on writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Resolved tenant.
    pub tenant: Option<TenantId>,
    /// Authenticated principal.
    pub user: Option<UserId>,
}

impl RequestContext {
    /// A fully resolved context.
    pub fn new(tenant: TenantId, user: UserId) -> Self {
        Self {
            tenant: Some(tenant),
            user: Some(user),
        }
    }

    /// A context with a tenant but no principal.
    pub fn anonymous(tenant: TenantId) -> Self {
        Self {
            tenant: Some(tenant),
            user: None,
        }
    }

    /// The tenant, or [`GrcError::TenantMissing`].
    pub fn tenant(&self) -> GrcResult<TenantId> {
        self.tenant.ok_or(GrcError::TenantMissing)
    }

    /// The principal, or [`GrcError::ContractViolation`].
    pub fn user(&self) -> GrcResult<UserId> {
        self.user
            .ok_or_else(|| GrcError::ContractViolation("authenticated user is required".into()))
    }

    /// Both, tenant checked first.
    pub fn scope(&self) -> GrcResult<(TenantId, UserId)> {
        Ok((self.tenant()?, self.user()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tenant_wins_over_missing_user() {
        let ctx = RequestContext::default();
        assert_eq!(ctx.scope(), Err(GrcError::TenantMissing));
        let ctx = RequestContext::anonymous(TenantId::new());
        assert_eq!(ctx.user().unwrap_err().code(), "CONTRACT_VIOLATION");
        assert!(ctx.tenant().is_ok());
    }
}
