//! Approval ledger persistence.
//!
//! The `version` column holds the `u<N>`/`r<N>` tag.

use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use grc_workflow::ComplianceApproval;

use super::revision_column;

/// Insert or update one approval row.
pub async fn upsert(conn: &mut PgConnection, row: &ComplianceApproval) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO compliance_approvals (id, tenant_id, identifier, version, approved_not,
         user_id, reviewer_id, framework_id, record, revision, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         ON CONFLICT (id) DO UPDATE SET
            approved_not = EXCLUDED.approved_not,
            record = EXCLUDED.record,
            revision = EXCLUDED.revision",
    )
    .bind(row.id.get())
    .bind(*row.tenant.as_uuid())
    .bind(row.identifier.as_str())
    .bind(row.stage.tag().to_string())
    .bind(row.stage.approved_not())
    .bind(row.user_id.get())
    .bind(row.reviewer_id.get())
    .bind(row.framework_id.get())
    .bind(Json(row))
    .bind(revision_column(row.revision))
    .bind(row.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Every stored approval row, in id order.
pub async fn load_all(pool: &PgPool) -> Result<Vec<ComplianceApproval>, sqlx::Error> {
    let rows = sqlx::query_scalar::<_, Json<ComplianceApproval>>(
        "SELECT record FROM compliance_approvals ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|Json(row)| row).collect())
}
