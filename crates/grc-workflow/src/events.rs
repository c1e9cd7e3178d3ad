//! # Workflow Events
//!
//! Every committed workflow step emits one or more [`ComplianceEvent`]s to a
//! [`Notifier`]. Delivery is fire-and-forget: the engine logs and counts a
//! failed emit and moves on, because the approval write is authoritative.
//!
//! [`NotificationBuffer`] is the in-app notification store polled by the UI.
//! It keeps the last N events FIFO, is process-wide and best-effort, and is
//! never read by the engine.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use grc_core::{ComplianceId, Identifier, TenantId, UserId};

/// Default in-app buffer capacity.
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A reviewer was assigned a new submission.
    ComplianceAssigned,
    /// The creator's compliance was created.
    ComplianceCreated,
    /// The creator's submission was decided.
    ComplianceReviewed,
    /// The reviewer's decision was recorded.
    ComplianceReviewSubmitted,
    /// A rejected or pending submission was resubmitted to its reviewer.
    ComplianceReassigned,
    /// A reviewer was asked to deactivate a compliance.
    ComplianceDeactivationRequested,
    /// A deactivation request was decided.
    ComplianceDeactivationDecided,
    /// A compliance was activated or deactivated directly.
    ComplianceActiveToggled,
}

impl EventKind {
    /// Event name as delivered to the notification bus.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ComplianceAssigned => "ComplianceAssigned",
            Self::ComplianceCreated => "ComplianceCreated",
            Self::ComplianceReviewed => "ComplianceReviewed",
            Self::ComplianceReviewSubmitted => "ComplianceReviewSubmitted",
            Self::ComplianceReassigned => "ComplianceReassigned",
            Self::ComplianceDeactivationRequested => "ComplianceDeactivationRequested",
            Self::ComplianceDeactivationDecided => "ComplianceDeactivationDecided",
            Self::ComplianceActiveToggled => "ComplianceActiveToggled",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One notification-worthy fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceEvent {
    /// What happened.
    pub kind: EventKind,
    /// Tenant scope.
    pub tenant: TenantId,
    /// Affected compliance row, when one resolved.
    pub compliance_id: Option<ComplianceId>,
    /// Compliance identifier.
    pub identifier: Identifier,
    /// Who caused it.
    pub actor: UserId,
    /// Who should be told.
    pub subject: UserId,
    /// Compliance title.
    pub title: String,
    /// Decision, new state, or due date, depending on `kind`.
    pub outcome: Option<String>,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
}

/// Delivery failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The channel refused or dropped the event.
    #[error("notification channel unavailable: {0}")]
    Unavailable(String),
}

/// Event delivery seam.
pub trait Notifier: Send + Sync {
    /// Deliver one event.
    fn emit(&self, event: &ComplianceEvent) -> Result<(), NotifyError>;
}

/// Writes every event to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn emit(&self, event: &ComplianceEvent) -> Result<(), NotifyError> {
        tracing::info!(
            kind = %event.kind,
            tenant = %event.tenant,
            identifier = %event.identifier,
            subject = %event.subject,
            outcome = event.outcome.as_deref().unwrap_or(""),
            "compliance event"
        );
        Ok(())
    }
}

/// Delivers to several notifiers; the first error is reported after all
/// have been tried.
#[derive(Clone, Default)]
pub struct FanoutNotifier {
    targets: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    /// No targets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a target.
    pub fn with(mut self, target: Arc<dyn Notifier>) -> Self {
        self.targets.push(target);
        self
    }
}

impl std::fmt::Debug for FanoutNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutNotifier")
            .field("targets", &self.targets.len())
            .finish()
    }
}

impl Notifier for FanoutNotifier {
    fn emit(&self, event: &ComplianceEvent) -> Result<(), NotifyError> {
        let mut first = None;
        for target in &self.targets {
            if let Err(err) = target.emit(event) {
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

// ─── In-app buffer ───────────────────────────────────────────────────

/// Bounded FIFO of recent events for UI polling.
#[derive(Debug)]
pub struct NotificationBuffer {
    capacity: usize,
    events: Mutex<VecDeque<ComplianceEvent>>,
}

impl Default for NotificationBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

impl NotificationBuffer {
    /// A buffer keeping at most `capacity` events (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffered events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Newest-first events addressed to `user` in `tenant`.
    pub fn recent(&self, tenant: TenantId, user: UserId, limit: usize) -> Vec<ComplianceEvent> {
        self.events
            .lock()
            .iter()
            .rev()
            .filter(|e| e.tenant == tenant && e.subject == user)
            .take(limit)
            .cloned()
            .collect()
    }
}

impl Notifier for NotificationBuffer {
    fn emit(&self, event: &ComplianceEvent) -> Result<(), NotifyError> {
        let mut events = self.events.lock();
        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event.clone());
        Ok(())
    }
}
