//! # Service Configuration
//!
//! [`AppConfig`] is read from the environment, with command-line flags
//! taking precedence. Every setting has a default, so the binary starts
//! with no configuration at all: auth disabled, in-memory only.

use clap::{ArgAction, Parser, ValueEnum};

use grc_workflow::{EnginePolicy, FallbackPolicy, ReviewerPolicy, DEFAULT_BUFFER_CAPACITY};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Runtime configuration of the API service.
///
/// Custom `Debug` redacts the bearer token and the database URL.
#[derive(Clone, Parser)]
#[command(name = "grc-api", version, about = "Compliance-lifecycle API service")]
pub struct AppConfig {
    /// Listen port.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Bearer token required on `/v1/*`. Auth is disabled when unset.
    #[arg(long, env = "AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Postgres URL. The service runs in-memory only when unset.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Log output format.
    #[arg(long, env = "GRC_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Let a resubmission reassign the reviewer.
    #[arg(long, env = "GRC_ALLOW_REVIEWER_CHANGE", action = ArgAction::Set, default_value_t = false)]
    pub allow_reviewer_change: bool,

    /// Apply review decisions to an alternate match when the identifier
    /// has no Compliance row.
    #[arg(long, env = "GRC_ALTERNATE_MATCH", action = ArgAction::Set, default_value_t = true)]
    pub alternate_match: bool,

    /// Recently approved items shown on reviewer dashboards.
    #[arg(long, env = "GRC_DASHBOARD_RECENT", default_value_t = 10)]
    pub dashboard_recent: usize,

    /// Events kept by the in-app notification buffer.
    #[arg(long, env = "GRC_NOTIFICATION_CAPACITY", default_value_t = DEFAULT_BUFFER_CAPACITY)]
    pub notification_capacity: usize,
}

impl AppConfig {
    /// Engine policy switches derived from this configuration.
    pub fn policy(&self) -> EnginePolicy {
        EnginePolicy {
            reviewer: if self.allow_reviewer_change {
                ReviewerPolicy::AllowChange
            } else {
                ReviewerPolicy::Stable
            },
            fallback: if self.alternate_match {
                FallbackPolicy::AlternateMatch
            } else {
                FallbackPolicy::Refuse
            },
            dashboard_recent: self.dashboard_recent,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            database_url: None,
            log_format: LogFormat::Text,
            allow_reviewer_change: false,
            alternate_match: true,
            dashboard_recent: 10,
            notification_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("log_format", &self.log_format)
            .field("allow_reviewer_change", &self.allow_reviewer_change)
            .field("alternate_match", &self.alternate_match)
            .field("dashboard_recent", &self.dashboard_recent)
            .field("notification_capacity", &self.notification_capacity)
            .finish()
    }
}
