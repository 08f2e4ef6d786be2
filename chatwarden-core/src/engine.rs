// chatwarden-core/src/engine.rs
//! One owned engine object bundling the whole moderation pipeline.
//!
//! Handlers receive a shared [`ModerationEngine`] constructed once at
//! startup, rather than reaching for module-level state: matchers are
//! compiled exactly once, ledgers share one record store apiece, and the
//! graceful-shutdown path can flush everything that is still pending.
//!
//! License: MIT OR Apache-2.0

use std::sync::Arc;

use anyhow::{Context, Result};

use chatwarden_store::{KeyedBlobStore, RecordStore};

use crate::audit::AuditSink;
use crate::censor::{CensorEngine, CensorOptions};
use crate::errors::WardenError;
use crate::escalation::{Action, EscalationController, EvaluationContext};
use crate::gateway::PunishmentGateway;
use crate::ledger::{MuteLedger, StrikeLedger};
use crate::policy::ModerationPolicy;
use crate::records::{MuteRecord, StrikeRecord};
use crate::terms::TermList;
use crate::verdict::CensorVerdict;

/// The assembled moderation pipeline: normalizer + censor, ledgers,
/// escalation controller, and the stores underneath them.
pub struct ModerationEngine {
    censor: CensorEngine,
    controller: EscalationController,
    strikes: Arc<StrikeLedger>,
    mutes: Arc<MuteLedger>,
    strike_store: RecordStore<StrikeRecord>,
    mute_store: RecordStore<MuteRecord>,
}

impl ModerationEngine {
    /// Builds the engine: compiles the term matchers (once), wires the
    /// ledgers over the given durable medium, and validates the policy.
    pub fn new(
        policy: ModerationPolicy,
        terms: &TermList,
        blobs: Arc<dyn KeyedBlobStore>,
        gateway: Arc<dyn PunishmentGateway>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        policy.validate().context("Moderation policy failed validation")?;
        terms.validate().context("Forbidden-term list failed validation")?;

        let options = CensorOptions {
            max_scan_length: policy.max_scan_length,
            redaction_glyph: policy.redaction_glyph,
        };
        let censor = CensorEngine::with_options(terms, options)?;

        let strike_store: RecordStore<StrikeRecord> =
            RecordStore::new(Arc::clone(&blobs), policy.flush_debounce());
        let mute_store: RecordStore<MuteRecord> =
            RecordStore::new(blobs, policy.flush_debounce());

        let strikes = Arc::new(StrikeLedger::new(policy.clone(), strike_store.clone()));
        let mutes = Arc::new(MuteLedger::new(mute_store.clone()));
        let controller = EscalationController::new(
            policy,
            Arc::clone(&strikes),
            Arc::clone(&mutes),
            gateway,
            audit,
        );

        Ok(Self { censor, controller, strikes, mutes, strike_store, mute_store })
    }

    /// Full pipeline for one inbound message: censor, then escalate if a
    /// verdict was produced. Returns `None` for clean messages.
    pub async fn handle_message(
        &self,
        user_id: &str,
        text: &str,
        source_ref: &str,
    ) -> Result<Option<(CensorVerdict, Action)>, WardenError> {
        let Some(verdict) = self.censor.censor(text) else {
            return Ok(None);
        };

        let top_tier = verdict.matched_spans.iter().map(|s| s.tier).max().unwrap_or(0);
        let ctx = EvaluationContext {
            reason: format!(
                "prohibited language: {} match(es), highest tier {}",
                verdict.match_count(),
                top_tier
            ),
            source_ref: source_ref.to_string(),
        };
        let action = self.controller.evaluate(user_id, Some(&verdict), &ctx).await?;
        Ok(Some((verdict, action)))
    }

    pub fn censor(&self) -> &CensorEngine {
        &self.censor
    }

    pub fn controller(&self) -> &EscalationController {
        &self.controller
    }

    pub fn strikes(&self) -> &Arc<StrikeLedger> {
        &self.strikes
    }

    pub fn mutes(&self) -> &Arc<MuteLedger> {
        &self.mutes
    }

    /// Graceful shutdown: synchronously executes every pending flush so at
    /// most the debounce window of data is ever at risk.
    pub async fn shutdown(&self) -> Result<(), WardenError> {
        self.strike_store.flush_all().await?;
        self.mute_store.flush_all().await?;
        Ok(())
    }
}
