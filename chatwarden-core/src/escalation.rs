// chatwarden-core/src/escalation.rs
//! The escalation controller: turns a censor verdict plus ledger state into
//! a punishment decision and drives the durable audit trail.
//!
//! Per-user lifecycle: Clean → Warned(strikes) → Muted(index) → Banned.
//! Transitions are driven solely by `warn()` crossing multiples of the
//! configured threshold; Banned is terminal for this engine, and regression
//! toward Clean happens only through expiry or an explicit unwarn.
//!
//! License: MIT OR Apache-2.0

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{error, warn};

use crate::audit::{AuditCategory, AuditEntry, AuditSink};
use crate::errors::WardenError;
use crate::gateway::{GatewayError, PunishmentGateway};
use crate::ledger::{MuteLedger, StrikeLedger, WarnOutcome};
use crate::policy::ModerationPolicy;
use crate::records::MuteRecord;
use crate::verdict::CensorVerdict;

/// The punishment decided for one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Nothing happened, or strikes were recorded without crossing a
    /// threshold.
    None,
    /// A zero-weight (flag-only) verdict: redacted and audited, no strikes.
    VerbalWarning,
    /// A timed communication restriction.
    Timeout { duration: Duration },
    /// Terminal removal.
    Ban,
}

impl Action {
    fn describe(&self) -> String {
        match self {
            Action::None => "strike".to_string(),
            Action::VerbalWarning => "verbal_warning".to_string(),
            Action::Timeout { duration } => format!("timeout:{}h", duration.num_hours()),
            Action::Ban => "ban".to_string(),
        }
    }
}

/// Where and why an evaluation happened; carried into records and audit.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    pub reason: String,
    /// Reference to the triggering message or command.
    pub source_ref: String,
}

/// Combines censor verdicts with ledger state to decide and execute
/// punishment, per the configured [`ModerationPolicy`].
pub struct EscalationController {
    policy: ModerationPolicy,
    strikes: Arc<StrikeLedger>,
    mutes: Arc<MuteLedger>,
    gateway: Arc<dyn PunishmentGateway>,
    audit: Arc<dyn AuditSink>,
}

impl EscalationController {
    pub fn new(
        policy: ModerationPolicy,
        strikes: Arc<StrikeLedger>,
        mutes: Arc<MuteLedger>,
        gateway: Arc<dyn PunishmentGateway>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { policy, strikes, mutes, gateway, audit }
    }

    /// Evaluates a verdict for a user and executes whatever the escalation
    /// rules call for. `None` verdicts are a strict no-op.
    pub async fn evaluate(
        &self,
        user_id: &str,
        verdict: Option<&CensorVerdict>,
        ctx: &EvaluationContext,
    ) -> Result<Action, WardenError> {
        self.evaluate_at(user_id, verdict, ctx, Utc::now()).await
    }

    /// Deterministic-time variant of [`evaluate`](Self::evaluate).
    pub async fn evaluate_at(
        &self,
        user_id: &str,
        verdict: Option<&CensorVerdict>,
        ctx: &EvaluationContext,
        now: DateTime<Utc>,
    ) -> Result<Action, WardenError> {
        let Some(verdict) = verdict else {
            return Ok(Action::None);
        };

        if verdict.strike_score == 0 {
            // Flag-only verdict: never touches the strike ledger, so it can
            // never trip the at-the-cap ban rule.
            let strikes_after = self.strikes.strike_count_at(user_id, now).await?;
            let action = Action::VerbalWarning;
            self.append_audit(user_id, &ctx.reason, 0, strikes_after, &action, true).await;
            self.notify_user(user_id, &ctx.reason, strikes_after, None).await;
            return Ok(action);
        }

        self.apply_strikes_at(user_id, i64::from(verdict.strike_score), ctx, now).await
    }

    /// Applies a strike delta and escalates. Also the entry point for
    /// administrative warns that bypass the censor.
    pub async fn apply_strikes_at(
        &self,
        user_id: &str,
        delta: i64,
        ctx: &EvaluationContext,
        now: DateTime<Utc>,
    ) -> Result<Action, WardenError> {
        let outcome = self.strikes.warn_at(user_id, delta, &ctx.source_ref, now).await?;
        let action = self.decide(&outcome);

        let punishment_applied = match &action {
            Action::Timeout { duration } => {
                self.record_mutes(user_id, &outcome, now).await?;
                self.attempt(self.gateway.timeout(user_id, *duration, &ctx.reason), user_id, "timeout")
                    .await
            }
            Action::Ban => self.attempt(self.gateway.ban(user_id, &ctx.reason), user_id, "ban").await,
            Action::None | Action::VerbalWarning => true,
        };

        self.append_audit(
            user_id,
            &ctx.reason,
            outcome.applied,
            outcome.strikes_after,
            &action,
            punishment_applied,
        )
        .await;

        let expiry = match &action {
            Action::Timeout { duration } => Some(now + *duration),
            _ => None,
        };
        self.notify_user(user_id, &ctx.reason, outcome.strikes_after, expiry).await;

        Ok(action)
    }

    /// The single, consistent ban-vs-timeout rule:
    /// - already at or over the mute cap and strikes were added: ban;
    /// - blew past the cap in one call: ban;
    /// - crossed at least one threshold: one timeout summing every crossed
    ///   threshold's length;
    /// - otherwise just the strike records.
    fn decide(&self, outcome: &WarnOutcome) -> Action {
        if outcome.applied > 0 && outcome.mutes_before >= self.policy.max_mutes {
            return Action::Ban;
        }
        if outcome.mutes_after > self.policy.max_mutes {
            return Action::Ban;
        }
        if outcome.crossed_threshold() {
            let duration =
                self.policy.timeout_for_crossing(outcome.mutes_before, outcome.mutes_after);
            return Action::Timeout { duration };
        }
        Action::None
    }

    /// One `MuteRecord` per crossed threshold; each carries the cumulative
    /// expiry, so the last record's expiry equals the end of the issued
    /// timeout.
    async fn record_mutes(
        &self,
        user_id: &str,
        outcome: &WarnOutcome,
        now: DateTime<Utc>,
    ) -> Result<(), WardenError> {
        for index in outcome.mutes_before..outcome.mutes_after {
            let expires_at =
                now + self.policy.timeout_for_crossing(outcome.mutes_before, index + 1);
            self.mutes.record(MuteRecord::issue(user_id, now, expires_at), now).await?;
        }
        Ok(())
    }

    /// Runs a punishment action, converting failure into logging. Permission
    /// refusals are alert-severity and never retried.
    async fn attempt(
        &self,
        action: impl std::future::Future<Output = Result<(), GatewayError>>,
        user_id: &str,
        what: &str,
    ) -> bool {
        match action.await {
            Ok(()) => true,
            Err(GatewayError::PermissionDenied(detail)) => {
                error!(
                    target: "chatwarden_core::escalation",
                    "platform refused to {what} {user_id}: {detail}"
                );
                false
            }
            Err(e) => {
                error!(
                    target: "chatwarden_core::escalation",
                    "failed to {what} {user_id}: {e}"
                );
                false
            }
        }
    }

    async fn append_audit(
        &self,
        user_id: &str,
        reason: &str,
        strike_delta: i64,
        strikes_after: u64,
        action: &Action,
        punishment_applied: bool,
    ) {
        let entry = AuditEntry {
            at: Utc::now(),
            user_id: user_id.to_string(),
            reason: reason.to_string(),
            strike_delta,
            strikes_after,
            action: action.describe(),
            punishment_applied,
            category: if punishment_applied {
                AuditCategory::Moderation
            } else {
                AuditCategory::Alert
            },
        };
        if let Err(e) = self.audit.append(&entry).await {
            warn!(target: "chatwarden_core::escalation", "audit append failed: {e:#}");
        }
    }

    async fn notify_user(
        &self,
        user_id: &str,
        reason: &str,
        strikes_after: u64,
        expiry: Option<DateTime<Utc>>,
    ) {
        let mut content = format!(
            "Your message violated the community content policy ({reason}). \
             You now have {strikes_after} active strike(s)."
        );
        if let Some(expiry) = expiry {
            content.push_str(&format!(" Your timeout ends at {}.", expiry.to_rfc3339()));
        }
        if let Err(e) = self.gateway.direct_message(user_id, &content).await {
            warn!(target: "chatwarden_core::escalation", "could not notify {user_id}: {e}");
        }
    }
}
