// chatwarden-core/tests/escalation_tests.rs
//! Integration tests for the escalation controller and the assembled engine:
//! threshold crossings, the ban rule, refused punishments, and the full
//! message-to-punishment pipeline.

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};

use chatwarden_core::{
    Action, AuditCategory, AuditEntry, AuditSink, CensorEngine, EscalationController,
    EvaluationContext, GatewayError, ModerationEngine, ModerationPolicy, MuteLedger,
    MuteRecord, PunishmentGateway, StrikeLedger, StrikeRecord, TermList,
};
use chatwarden_store::{MemoryBlobStore, RecordStore};

/// Records every platform call; optionally refuses punishments the way a
/// platform with missing permissions would.
#[derive(Default)]
struct RecordingGateway {
    deny_punishments: bool,
    timeouts: Mutex<Vec<(String, Duration, String)>>,
    bans: Mutex<Vec<(String, String)>>,
    dms: Mutex<Vec<(String, String)>>,
}

impl RecordingGateway {
    fn denying() -> Self {
        Self { deny_punishments: true, ..Self::default() }
    }
}

#[async_trait]
impl PunishmentGateway for RecordingGateway {
    async fn timeout(
        &self,
        user_id: &str,
        duration: Duration,
        reason: &str,
    ) -> Result<(), GatewayError> {
        if self.deny_punishments {
            return Err(GatewayError::PermissionDenied("missing moderate_members".into()));
        }
        self.timeouts.lock().unwrap().push((user_id.to_string(), duration, reason.to_string()));
        Ok(())
    }

    async fn ban(&self, user_id: &str, reason: &str) -> Result<(), GatewayError> {
        if self.deny_punishments {
            return Err(GatewayError::PermissionDenied("missing ban_members".into()));
        }
        self.bans.lock().unwrap().push((user_id.to_string(), reason.to_string()));
        Ok(())
    }

    async fn direct_message(&self, user_id: &str, content: &str) -> Result<(), GatewayError> {
        self.dms.lock().unwrap().push((user_id.to_string(), content.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink {
    entries: Mutex<Vec<AuditEntry>>,
}

#[async_trait]
impl AuditSink for RecordingSink {
    async fn append(&self, entry: &AuditEntry) -> Result<()> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

struct Harness {
    controller: EscalationController,
    strikes: Arc<StrikeLedger>,
    mutes: Arc<MuteLedger>,
    gateway: Arc<RecordingGateway>,
    sink: Arc<RecordingSink>,
}

fn harness_with(gateway: RecordingGateway) -> Harness {
    let blobs = Arc::new(MemoryBlobStore::new());
    let strike_store: RecordStore<StrikeRecord> =
        RecordStore::new(blobs.clone(), StdDuration::from_millis(20));
    let mute_store: RecordStore<MuteRecord> =
        RecordStore::new(blobs, StdDuration::from_millis(20));

    let policy = ModerationPolicy::default();
    let strikes = Arc::new(StrikeLedger::new(policy.clone(), strike_store));
    let mutes = Arc::new(MuteLedger::new(mute_store));
    let gateway = Arc::new(gateway);
    let sink = Arc::new(RecordingSink::default());

    let controller = EscalationController::new(
        policy,
        Arc::clone(&strikes),
        Arc::clone(&mutes),
        gateway.clone() as Arc<dyn PunishmentGateway>,
        sink.clone() as Arc<dyn AuditSink>,
    );
    Harness { controller, strikes, mutes, gateway, sink }
}

fn harness() -> Harness {
    harness_with(RecordingGateway::default())
}

fn ctx(reason: &str) -> EvaluationContext {
    EvaluationContext { reason: reason.to_string(), source_ref: "msg/1".to_string() }
}

fn scoring_verdict(score: u32) -> chatwarden_core::CensorVerdict {
    // Real verdicts come from the censor; build one from a message whose
    // score is known rather than assembling fields by hand.
    let engine = CensorEngine::new(&TermList::load_default().unwrap()).unwrap();
    let message = match score {
        0 => "damn".to_string(),
        n => vec!["shit"; n as usize].join(" and "),
    };
    let verdict = engine.censor(&message).unwrap();
    assert_eq!(verdict.strike_score, score);
    verdict
}

#[test_log::test(tokio::test)]
async fn no_verdict_is_a_strict_no_op() {
    let h = harness();
    let action = h.controller.evaluate("alice", None, &ctx("clean")).await.unwrap();
    assert_eq!(action, Action::None);
    assert!(h.sink.entries.lock().unwrap().is_empty());
    assert!(h.gateway.dms.lock().unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn strikes_below_the_threshold_punish_nothing() {
    let h = harness();
    let verdict = scoring_verdict(2);
    let action = h.controller.evaluate("alice", Some(&verdict), &ctx("swearing")).await.unwrap();

    assert_eq!(action, Action::None);
    assert_eq!(h.strikes.strike_count("alice").await.unwrap(), 2);
    assert!(h.gateway.timeouts.lock().unwrap().is_empty());

    // Still audited and still notified.
    let entries = h.sink.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].strike_delta, 2);
    assert!(entries[0].punishment_applied);
    assert_eq!(h.gateway.dms.lock().unwrap().len(), 1);
}

#[test_log::test(tokio::test)]
async fn crossing_the_first_threshold_issues_one_timeout() {
    let h = harness();
    let now = Utc::now();
    let verdict = scoring_verdict(3);

    let action =
        h.controller.evaluate_at("alice", Some(&verdict), &ctx("swearing"), now).await.unwrap();
    assert_eq!(action, Action::Timeout { duration: Duration::hours(4) });

    let timeouts = h.gateway.timeouts.lock().unwrap();
    assert_eq!(timeouts.len(), 1);
    assert_eq!(timeouts[0].0, "alice");
    assert_eq!(timeouts[0].1, Duration::hours(4));

    let mute = h.mutes.active_mute("alice", now).await.unwrap().unwrap();
    assert_eq!(mute.expires_at, now + Duration::hours(4));

    let entries = h.sink.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, "timeout:4h");
    assert_eq!(entries[0].strikes_after, 3);
}

#[test_log::test(tokio::test)]
async fn crossing_several_thresholds_at_once_sums_their_lengths() {
    let h = harness();
    let now = Utc::now();
    let verdict = scoring_verdict(9);

    let action =
        h.controller.evaluate_at("alice", Some(&verdict), &ctx("tirade"), now).await.unwrap();
    // 0 -> 3 mutes in one call: 4 + 12 + 24 hours, one timeout, no ban.
    assert_eq!(action, Action::Timeout { duration: Duration::hours(40) });
    assert!(h.gateway.bans.lock().unwrap().is_empty());

    // One mute record per crossed threshold, cumulative expiries.
    let history = h.mutes.history("alice").await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[2].expires_at, now + Duration::hours(40));
    let active = h.mutes.active_mute("alice", now).await.unwrap().unwrap();
    assert_eq!(active.expires_at, now + Duration::hours(40));
}

#[test_log::test(tokio::test)]
async fn a_user_already_at_the_mute_cap_is_banned_on_the_next_strike() {
    let h = harness();
    let now = Utc::now();

    // Seed the user to mute index 3 (the cap) without punishing.
    h.strikes.warn_at("alice", 9, "history", now).await.unwrap();

    let verdict = scoring_verdict(1);
    let action =
        h.controller.evaluate_at("alice", Some(&verdict), &ctx("again"), now).await.unwrap();

    assert_eq!(action, Action::Ban);
    let bans = h.gateway.bans.lock().unwrap();
    assert_eq!(bans.len(), 1);
    assert_eq!(bans[0].0, "alice");
    assert!(h.gateway.timeouts.lock().unwrap().is_empty());

    let entries = h.sink.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, "ban");
    assert_eq!(entries[0].category, AuditCategory::Moderation);
}

#[test_log::test(tokio::test)]
async fn blowing_past_the_cap_in_one_call_is_a_ban() {
    let h = harness();
    let now = Utc::now();
    let verdict = scoring_verdict(12);

    // 0 -> 4 mutes in one call lands past max_mutes = 3.
    let action =
        h.controller.evaluate_at("alice", Some(&verdict), &ctx("raid"), now).await.unwrap();
    assert_eq!(action, Action::Ban);
    assert!(h.gateway.timeouts.lock().unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn flag_only_verdicts_warn_verbally_without_strikes() {
    let h = harness();
    let verdict = scoring_verdict(0);

    let action = h.controller.evaluate("alice", Some(&verdict), &ctx("mild")).await.unwrap();
    assert_eq!(action, Action::VerbalWarning);
    assert_eq!(h.strikes.strike_count("alice").await.unwrap(), 0);

    let entries = h.sink.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].strike_delta, 0);
    assert_eq!(entries[0].action, "verbal_warning");
    assert_eq!(h.gateway.dms.lock().unwrap().len(), 1);
}

#[test_log::test(tokio::test)]
async fn a_flag_only_verdict_never_bans_a_user_at_the_cap() {
    let h = harness();
    let now = Utc::now();
    h.strikes.warn_at("alice", 9, "history", now).await.unwrap();

    let verdict = scoring_verdict(0);
    let action =
        h.controller.evaluate_at("alice", Some(&verdict), &ctx("mild"), now).await.unwrap();

    assert_eq!(action, Action::VerbalWarning);
    assert!(h.gateway.bans.lock().unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn refused_punishments_are_audited_as_alerts() {
    let h = harness_with(RecordingGateway::denying());
    let verdict = scoring_verdict(3);

    // The refusal does not fail the evaluation; strikes are already durable.
    let action = h.controller.evaluate("alice", Some(&verdict), &ctx("swearing")).await.unwrap();
    assert_eq!(action, Action::Timeout { duration: Duration::hours(4) });
    assert_eq!(h.strikes.strike_count("alice").await.unwrap(), 3);

    let entries = h.sink.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].punishment_applied);
    assert_eq!(entries[0].category, AuditCategory::Alert);
}

#[test_log::test(tokio::test)]
async fn engine_runs_the_full_pipeline_for_one_message() {
    let blobs = Arc::new(MemoryBlobStore::new());
    let gateway = Arc::new(RecordingGateway::default());
    let sink = Arc::new(RecordingSink::default());
    let engine = ModerationEngine::new(
        ModerationPolicy::default(),
        &TermList::load_default().unwrap(),
        blobs,
        gateway.clone(),
        sink.clone(),
    )
    .unwrap();

    // Clean traffic passes untouched.
    assert!(engine.handle_message("alice", "good morning all", "msg/1").await.unwrap().is_none());

    // One tier-2 and two tier-1 matches: 4 strikes, first threshold crossed.
    let (verdict, action) = engine
        .handle_message("alice", "fuck this shit and that shit", "msg/2")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(verdict.strike_score, 4);
    assert!(!verdict.redacted_text.contains("fuck"));
    assert_eq!(action, Action::Timeout { duration: Duration::hours(4) });

    assert_eq!(engine.strikes().strike_count("alice").await.unwrap(), 4);
    assert_eq!(engine.strikes().mute_count("alice").await.unwrap(), 1);
    assert_eq!(gateway.timeouts.lock().unwrap().len(), 1);
    assert_eq!(sink.entries.lock().unwrap().len(), 1);
    assert_eq!(gateway.dms.lock().unwrap().len(), 1);

    engine.shutdown().await.unwrap();
}
