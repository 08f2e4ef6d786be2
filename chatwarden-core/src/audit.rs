// chatwarden-core/src/audit.rs
//! Durable audit trail types.
//!
//! Every evaluation that produces a verdict appends one entry describing the
//! reason, the strike delta, and the resulting action, so moderators can
//! reconstruct exactly why a user ended up muted or banned. Appending is
//! best effort: a failing sink never blocks enforcement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Routing category for an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    /// Ordinary moderation traffic.
    Moderation,
    /// Needs human attention, e.g. a punishment the platform refused.
    Alert,
}

/// One auditable moderation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub user_id: String,
    pub reason: String,
    /// Net strike change applied by this event.
    pub strike_delta: i64,
    /// The user's active strike count after the event.
    pub strikes_after: u64,
    /// Human-readable rendering of the resulting action.
    pub action: String,
    /// False when the platform refused the punishment; such entries are
    /// categorized as alerts so failed attempts stay visibly distinct.
    pub punishment_applied: bool,
    pub category: AuditCategory,
}

impl AuditEntry {
    /// JSON rendering for sinks that forward to structured log channels.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

/// Write-only audit sink supplied by the host.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> anyhow::Result<()>;
}
