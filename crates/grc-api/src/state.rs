//! # Application State
//!
//! Shared state for the Axum application: the approval engine, the in-app
//! notification buffer, configuration, the optional metrics handle, and
//! the optional database pool.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;

use grc_workflow::{
    AllowAll, ApprovalEngine, CapabilityChecker, ChangeSink, FanoutNotifier, InMemoryDirectory,
    InMemoryRegistry, Ledger, NotificationBuffer, PolicyRegistry, TracingNotifier, UserDirectory,
};

use crate::config::AppConfig;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// The approval workflow engine.
    pub engine: ApprovalEngine,
    /// Polled by `/v1/notifications`.
    pub notifications: Arc<NotificationBuffer>,
    /// Service configuration.
    pub config: Arc<AppConfig>,
    /// Prometheus renderer, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// Database pool, when persistence is enabled.
    pub db_pool: Option<PgPool>,
}

impl AppState {
    /// In-memory state with default configuration and empty collaborators.
    pub fn new() -> Self {
        Self::builder(AppConfig::default()).build()
    }

    /// Start building state for `config`.
    pub fn builder(config: AppConfig) -> StateBuilder {
        StateBuilder {
            config,
            ledger: Arc::new(Ledger::new()),
            registry: Arc::new(InMemoryRegistry::new()),
            users: Arc::new(InMemoryDirectory::new()),
            capabilities: Arc::new(AllowAll),
            sink: None,
            metrics: None,
            db_pool: None,
        }
    }

    /// Whether the service is ready to take traffic.
    pub async fn is_ready(&self) -> bool {
        match &self.db_pool {
            Some(pool) => sqlx::query("SELECT 1").execute(pool).await.is_ok(),
            None => true,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`AppState`].
pub struct StateBuilder {
    config: AppConfig,
    ledger: Arc<Ledger>,
    registry: Arc<dyn PolicyRegistry>,
    users: Arc<dyn UserDirectory>,
    capabilities: Arc<dyn CapabilityChecker>,
    sink: Option<Arc<dyn ChangeSink>>,
    metrics: Option<PrometheusHandle>,
    db_pool: Option<PgPool>,
}

impl StateBuilder {
    /// Use a pre-hydrated ledger.
    pub fn ledger(mut self, ledger: Arc<Ledger>) -> Self {
        self.ledger = ledger;
        self
    }

    /// Policy hierarchy lookups.
    pub fn registry(mut self, registry: Arc<dyn PolicyRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// User directory.
    pub fn users(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.users = users;
        self
    }

    /// Capability checks.
    pub fn capabilities(mut self, capabilities: Arc<dyn CapabilityChecker>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Write-through sink for committed change sets.
    pub fn sink(mut self, sink: Arc<dyn ChangeSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Prometheus renderer for `/metrics`.
    pub fn metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Database pool for readiness checks.
    pub fn db_pool(mut self, pool: PgPool) -> Self {
        self.db_pool = Some(pool);
        self
    }

    pub fn build(self) -> AppState {
        let notifications = Arc::new(NotificationBuffer::new(self.config.notification_capacity));
        let notifier = FanoutNotifier::new()
            .with(Arc::new(TracingNotifier))
            .with(notifications.clone());
        let mut engine = ApprovalEngine::builder(self.ledger, self.registry)
            .capabilities(self.capabilities)
            .users(self.users)
            .notifier(Arc::new(notifier))
            .policy(self.config.policy());
        if let Some(sink) = self.sink {
            engine = engine.sink(sink);
        }
        AppState {
            engine: engine.build(),
            notifications,
            config: Arc::new(self.config),
            metrics: self.metrics,
            db_pool: self.db_pool,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_is_in_memory() {
        let state = AppState::new();
        assert!(state.db_pool.is_none());
        assert!(state.metrics.is_none());
        assert!(state.engine.ledger().is_empty());
        assert!(state.notifications.is_empty());
    }

    #[test]
    fn config_flows_into_engine_policy() {
        let config = AppConfig {
            allow_reviewer_change: true,
            dashboard_recent: 4,
            notification_capacity: 7,
            ..AppConfig::default()
        };
        let state = AppState::builder(config).build();
        assert_eq!(state.engine.policy().dashboard_recent, 4);
        assert_eq!(state.engine.policy().reviewer, grc_workflow::ReviewerPolicy::AllowChange);
        assert_eq!(state.notifications.capacity(), 7);
    }

    #[tokio::test]
    async fn in_memory_state_is_ready() {
        assert!(AppState::new().is_ready().await);
    }
}
