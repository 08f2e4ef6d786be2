//! Durable per-user punishment ledgers.
//!
//! `StrikeLedger` owns the read-sweep-mutate-write sequence over the strike
//! collection. Expiry is checked opportunistically on access, not by a
//! background timer. Every mutation runs as one atomic transform inside the
//! record store, so near-simultaneous `warn` calls, whether for the same user
//! or different users, can never overwrite each other's records.
//!
//! License: MIT OR Apache-2.0

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use log::{debug, info};
use uuid::Uuid;

use chatwarden_store::RecordStore;

use crate::errors::WardenError;
use crate::policy::ModerationPolicy;
use crate::records::{MuteRecord, StrikeRecord};

/// Durable collection names. One blob holds the whole community's records.
pub const STRIKES_COLLECTION: &str = "strikes";
pub const MUTES_COLLECTION: &str = "mutes";

/// The net effect of one `warn` call.
///
/// `applied` may differ from `requested` when a removal was clamped to the
/// records that actually existed; `clamped` makes that case distinguishable
/// from a removal that got everything it asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarnOutcome {
    /// The strike delta that was requested.
    pub requested: i64,
    /// The net strike-count change actually applied.
    pub applied: i64,
    /// True when a removal asked for more strikes than the user had.
    pub clamped: bool,
    /// Active strike count for the user after the mutation.
    pub strikes_after: u64,
    /// Mute index before the mutation.
    pub mutes_before: u32,
    /// Mute index after the mutation.
    pub mutes_after: u32,
}

impl WarnOutcome {
    /// Whether this call crossed at least one mute threshold upward.
    pub fn crossed_threshold(&self) -> bool {
        self.mutes_after > self.mutes_before
    }
}

/// Append-only strike history with lazy expiry, backed by the record store.
pub struct StrikeLedger {
    policy: ModerationPolicy,
    store: RecordStore<StrikeRecord>,
}

impl StrikeLedger {
    pub fn new(policy: ModerationPolicy, store: RecordStore<StrikeRecord>) -> Self {
        Self { policy, store }
    }

    /// Applies a strike delta for a user and reports the outcome.
    ///
    /// Positive deltas append records expiring one policy window after
    /// issuance. Negative deltas pop the user's most-recently-issued active
    /// records (LIFO), clamped to however many exist. Either way the swept,
    /// updated collection is persisted through the record store.
    pub async fn warn(
        &self,
        user_id: &str,
        delta: i64,
        source_ref: &str,
    ) -> Result<WarnOutcome, WardenError> {
        self.warn_at(user_id, delta, source_ref, Utc::now()).await
    }

    /// Deterministic-time variant of [`warn`](Self::warn).
    pub async fn warn_at(
        &self,
        user_id: &str,
        delta: i64,
        source_ref: &str,
        now: DateTime<Utc>,
    ) -> Result<WarnOutcome, WardenError> {
        // The whole read-sweep-mutate-write sequence runs as one transform
        // under the store lock. Without this, two near-simultaneous
        // violations race on the cached collection and lose strikes.
        let outcome = self
            .store
            .update_collection(STRIKES_COLLECTION, |records| {
                let before_sweep = records.len();
                records.retain(|r| r.is_active(now));
                let swept = before_sweep - records.len();
                if swept > 0 {
                    debug!(target: "chatwarden_core::ledger", "swept {swept} expired strike record(s)");
                }

                let strikes_before = count_for(records, user_id);
                let mutes_before = self.policy.mute_index(strikes_before);

                let (applied, clamped) = if delta < 0 {
                    let requested = delta.unsigned_abs() as usize;
                    let removed = remove_most_recent(records, user_id, requested);
                    if removed < requested {
                        info!(
                            target: "chatwarden_core::ledger",
                            "unwarn for {user_id} clamped: removed {removed} of {requested} requested"
                        );
                    }
                    (-(removed as i64), removed < requested)
                } else {
                    for _ in 0..delta {
                        records.push(StrikeRecord::issue(
                            user_id,
                            now,
                            self.policy.expiry_window(),
                            source_ref,
                        ));
                    }
                    (delta, false)
                };

                let strikes_after = count_for(records, user_id);
                let mutes_after = self.policy.mute_index(strikes_after);

                let outcome = WarnOutcome {
                    requested: delta,
                    applied,
                    clamped,
                    strikes_after,
                    mutes_before,
                    mutes_after,
                };
                (outcome, applied != 0 || swept > 0)
            })
            .await?;
        Ok(outcome)
    }

    /// Administrative reversal: removes up to `count` of the user's most
    /// recent active strikes.
    pub async fn unwarn(
        &self,
        user_id: &str,
        count: u32,
        source_ref: &str,
    ) -> Result<WarnOutcome, WardenError> {
        self.warn(user_id, -i64::from(count), source_ref).await
    }

    /// Active strike count for a user, honoring expiry without mutating the
    /// stored collection.
    pub async fn strike_count(&self, user_id: &str) -> Result<u64, WardenError> {
        self.strike_count_at(user_id, Utc::now()).await
    }

    pub async fn strike_count_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, WardenError> {
        Ok(self
            .active_strikes_at(user_id, now)
            .await?
            .len() as u64)
    }

    /// The user's still-active strike records, for moderator inspection.
    pub async fn active_strikes_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<StrikeRecord>, WardenError> {
        let records = self.store.collection(STRIKES_COLLECTION).await?;
        Ok(records
            .into_iter()
            .filter(|r| r.user_id == user_id && r.is_active(now))
            .collect())
    }

    /// Current mute index for a user, always recomputed from active strikes.
    pub async fn mute_count(&self, user_id: &str) -> Result<u32, WardenError> {
        let strikes = self.strike_count(user_id).await?;
        Ok(self.policy.mute_index(strikes))
    }

}

fn count_for(records: &[StrikeRecord], user_id: &str) -> u64 {
    records.iter().filter(|r| r.user_id == user_id).count() as u64
}

/// Removes up to `limit` of the user's most-recently-issued records and
/// returns how many actually went. Stable sort keeps insertion order among
/// records issued in the same instant, so "most recent" includes the tail of
/// a same-call batch.
fn remove_most_recent(records: &mut Vec<StrikeRecord>, user_id: &str, limit: usize) -> usize {
    let mut owned: Vec<(usize, DateTime<Utc>, Uuid)> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.user_id == user_id)
        .map(|(i, r)| (i, r.issued_at, r.id))
        .collect();
    owned.sort_by_key(|(i, issued_at, _)| (*issued_at, *i));

    let take = limit.min(owned.len());
    let doomed: HashSet<Uuid> = owned.iter().rev().take(take).map(|(_, _, id)| *id).collect();
    records.retain(|r| !doomed.contains(&r.id));
    take
}

/// Durable mute history, written by the escalation controller whenever a
/// threshold is crossed and read back for moderation queries.
pub struct MuteLedger {
    store: RecordStore<MuteRecord>,
}

impl MuteLedger {
    pub fn new(store: RecordStore<MuteRecord>) -> Self {
        Self { store }
    }

    /// Appends one mute record, sweeping expired records of all users while
    /// the collection is in hand. Atomic under the store lock, like the
    /// strike mutations.
    pub async fn record(&self, mute: MuteRecord, now: DateTime<Utc>) -> Result<(), WardenError> {
        self.store
            .update_collection(MUTES_COLLECTION, |records| {
                records.retain(|r| r.is_active(now));
                records.push(mute);
                ((), true)
            })
            .await?;
        Ok(())
    }

    /// The user's currently active mute with the latest expiry, if any.
    pub async fn active_mute(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<MuteRecord>, WardenError> {
        let records = self.store.collection(MUTES_COLLECTION).await?;
        Ok(records
            .into_iter()
            .filter(|r| r.user_id == user_id && r.is_active(now))
            .max_by_key(|r| r.expires_at))
    }

    /// Every retained mute record for a user, oldest first.
    pub async fn history(&self, user_id: &str) -> Result<Vec<MuteRecord>, WardenError> {
        let records = self.store.collection(MUTES_COLLECTION).await?;
        let mut out: Vec<MuteRecord> =
            records.into_iter().filter(|r| r.user_id == user_id).collect();
        out.sort_by_key(|r| r.issued_at);
        Ok(out)
    }
}
