// chatwarden-core/src/gateway.rs
//! The punishment-action seam between the engine and the chat platform.
//!
//! The escalation controller only ever talks to this trait; the host bot
//! supplies the concrete adapter. Permission refusals are a distinct error
//! variant because the controller handles them differently from transport
//! failures (logged at alert severity, never retried, never propagated).

use async_trait::async_trait;
use chrono::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// The platform refused the action for lack of permission.
    #[error("missing permission: {0}")]
    PermissionDenied(String),

    /// Anything else: network trouble, unknown user, rate limiting.
    #[error("platform transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

/// Platform actions the escalation controller may request.
#[async_trait]
pub trait PunishmentGateway: Send + Sync {
    /// Restricts the user's communication for `duration`.
    async fn timeout(&self, user_id: &str, duration: Duration, reason: &str)
        -> Result<(), GatewayError>;

    /// Permanently removes the user from the community.
    async fn ban(&self, user_id: &str, reason: &str) -> Result<(), GatewayError>;

    /// Best-effort private notification to the user.
    async fn direct_message(&self, user_id: &str, content: &str) -> Result<(), GatewayError>;
}
