//! Policy hierarchy and user directory snapshots.
//!
//! Read once at startup into the in-memory collaborators.

use sqlx::PgPool;
use uuid::Uuid;

use grc_core::{FrameworkId, PolicyId, SubPolicyId, TenantId, UserId};
use grc_workflow::{InMemoryDirectory, InMemoryRegistry, UserProfile};

/// Rows loaded per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReferenceCounts {
    pub frameworks: usize,
    pub policies: usize,
    pub sub_policies: usize,
    pub users: usize,
}

/// Fill `registry` and `directory` from the reference tables.
pub async fn load(
    pool: &PgPool,
    registry: &InMemoryRegistry,
    directory: &InMemoryDirectory,
) -> Result<ReferenceCounts, sqlx::Error> {
    let mut counts = ReferenceCounts::default();

    let frameworks = sqlx::query_as::<_, (Uuid, i64)>("SELECT tenant_id, id FROM frameworks")
        .fetch_all(pool)
        .await?;
    for (tenant, id) in frameworks {
        registry.add_framework(TenantId::from_uuid(tenant), FrameworkId::new(id));
        counts.frameworks += 1;
    }

    let policies = sqlx::query_as::<_, (Uuid, i64, Option<i64>)>(
        "SELECT tenant_id, id, framework_id FROM policies",
    )
    .fetch_all(pool)
    .await?;
    for (tenant, id, framework) in policies {
        registry.add_policy(
            TenantId::from_uuid(tenant),
            PolicyId::new(id),
            framework.map(FrameworkId::new),
        );
        counts.policies += 1;
    }

    let sub_policies = sqlx::query_as::<_, (Uuid, i64, i64)>(
        "SELECT tenant_id, id, policy_id FROM sub_policies",
    )
    .fetch_all(pool)
    .await?;
    for (tenant, id, policy) in sub_policies {
        registry.add_sub_policy(TenantId::from_uuid(tenant), SubPolicyId::new(id), PolicyId::new(policy));
        counts.sub_policies += 1;
    }

    let users = sqlx::query_as::<_, (Uuid, i64, String, String)>(
        "SELECT tenant_id, id, display_name, email FROM users",
    )
    .fetch_all(pool)
    .await?;
    for (tenant, id, display_name, email) in users {
        directory.insert(
            TenantId::from_uuid(tenant),
            UserId::new(id),
            UserProfile { display_name, email },
        );
        counts.users += 1;
    }

    tracing::info!(
        frameworks = counts.frameworks,
        policies = counts.policies,
        sub_policies = counts.sub_policies,
        users = counts.users,
        "reference data loaded"
    );
    Ok(counts)
}
