//! # Write-Through Sink
//!
//! [`PgSink`] implements the ledger's [`ChangeSink`]. The engine calls it
//! synchronously after each in-memory commit; the sink queues the change
//! set and a single writer task applies the queue in commit order, one
//! database transaction per change set. Write failures are logged and
//! counted; the in-memory state stays authoritative.

use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use grc_workflow::{ChangeSet, ChangeSink, Ledger};

use super::{approvals, compliances};

/// Queue-backed Postgres sink.
#[derive(Debug, Clone)]
pub struct PgSink {
    queue: mpsc::UnboundedSender<ChangeSet>,
}

impl PgSink {
    /// Start the writer task on the current runtime.
    pub fn spawn(pool: PgPool) -> (Self, JoinHandle<()>) {
        let (queue, mut rx) = mpsc::unbounded_channel::<ChangeSet>();
        let writer = tokio::spawn(async move {
            while let Some(changes) = rx.recv().await {
                if let Err(e) = write(&pool, &changes).await {
                    metrics::counter!("grc_persistence_failures_total").increment(1);
                    tracing::error!(
                        error = %e,
                        compliances = changes.compliances.len(),
                        approvals = changes.approvals.len(),
                        "write-through failed; change set not persisted"
                    );
                }
            }
            tracing::info!("persistence writer stopped");
        });
        (Self { queue }, writer)
    }
}

impl ChangeSink for PgSink {
    fn persist(&self, changes: &ChangeSet) {
        if changes.is_empty() {
            return;
        }
        if self.queue.send(changes.clone()).is_err() {
            metrics::counter!("grc_persistence_failures_total").increment(1);
            tracing::error!("persistence writer is gone; change set dropped");
        }
    }
}

/// Write one change set in a single database transaction.
pub async fn write(pool: &PgPool, changes: &ChangeSet) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for row in &changes.compliances {
        compliances::upsert(&mut *tx, row).await?;
    }
    for row in &changes.approvals {
        approvals::upsert(&mut *tx, row).await?;
    }
    tx.commit().await
}

/// Load every stored row into `ledger`.
pub async fn hydrate(pool: &PgPool, ledger: &Ledger) -> Result<(usize, usize), sqlx::Error> {
    let compliances = compliances::load_all(pool).await?;
    let approvals = approvals::load_all(pool).await?;
    let loaded = ledger.hydrate(compliances, approvals);
    tracing::info!(
        compliances = loaded.0,
        approvals = loaded.1,
        "ledger hydrated from database"
    );
    Ok(loaded)
}
