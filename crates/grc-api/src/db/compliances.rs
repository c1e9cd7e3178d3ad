//! Compliance row persistence.
//!
//! Rows are upserted by primary key; `record` carries the full serialized
//! row and the scalar columns mirror the fields used for constraints and
//! filtering.

use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use grc_workflow::Compliance;

use super::revision_column;

/// Insert or update one Compliance row.
pub async fn upsert(conn: &mut PgConnection, row: &Compliance) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO compliances (id, tenant_id, identifier, version, previous_version_id,
         sub_policy_id, policy_id, framework_id, status, active, record, revision,
         created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
         ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            active = EXCLUDED.active,
            record = EXCLUDED.record,
            revision = EXCLUDED.revision,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(row.id.get())
    .bind(*row.tenant.as_uuid())
    .bind(row.identifier.as_str())
    .bind(row.version.as_str())
    .bind(row.previous_version_id.map(|id| id.get()))
    .bind(row.sub_policy_id.get())
    .bind(row.policy_id.map(|id| id.get()))
    .bind(row.framework_id.map(|id| id.get()))
    .bind(row.status.as_str())
    .bind(row.active.as_str())
    .bind(Json(row))
    .bind(revision_column(row.revision))
    .bind(row.created_at)
    .bind(row.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Every stored Compliance row, in id order.
pub async fn load_all(pool: &PgPool) -> Result<Vec<Compliance>, sqlx::Error> {
    let rows = sqlx::query_scalar::<_, Json<Compliance>>("SELECT record FROM compliances ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|Json(row)| row).collect())
}
