//! # Database Persistence Layer
//!
//! Postgres write-through persistence for the compliance ledger via SQLx.
//!
//! ## Architecture
//!
//! The database layer is **optional**. The in-memory ledger is the
//! authoritative runtime state; when `DATABASE_URL` is set, every committed
//! unit of work is written through to Postgres in one database transaction
//! ([`persist::PgSink`]) and the ledger is hydrated from Postgres at startup.
//! When absent, the service runs in-memory only.
//!
//! ## What is persisted
//!
//! - `compliances`: one row per compliance version
//! - `compliance_approvals`: the approval ledger
//!
//! The policy hierarchy and user directory tables are read once at startup
//! into the in-memory collaborators ([`reference`]).

pub mod approvals;
pub mod compliances;
pub mod persist;
pub mod reference;

use sqlx::postgres::{PgPool, PgPoolOptions};

/// Connect to Postgres and run the embedded migrations.
///
/// Returns `None` when no URL is configured (in-memory only mode).
pub async fn init_pool(url: Option<&str>) -> Result<Option<PgPool>, sqlx::Error> {
    let Some(url) = url else {
        tracing::warn!("DATABASE_URL not set; running in-memory only. State will not survive restarts.");
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await?;
    tracing::info!("connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("database migrations applied");

    Ok(Some(pool))
}

/// Clamp a revision counter into a BIGINT column.
pub(crate) fn revision_column(revision: u64) -> i64 {
    i64::try_from(revision).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_url_means_in_memory() {
        assert!(init_pool(None).await.unwrap().is_none());
    }

    #[test]
    fn revision_is_clamped() {
        assert_eq!(revision_column(3), 3);
        assert_eq!(revision_column(u64::MAX), i64::MAX);
    }
}
