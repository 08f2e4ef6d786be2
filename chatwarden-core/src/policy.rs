//! Moderation policy configuration for `chatwarden-core`.
//!
//! Defines the static escalation parameters (expiry window, mute thresholds,
//! timeout table, ban cap) plus engine tuning knobs, with YAML loading and
//! validation that collects every problem into a single report.
//!
//! License: MIT OR Apache-2.0

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Duration;
use log::info;
use serde::{Deserialize, Serialize};

use crate::errors::WardenError;

/// Static configuration for the escalation state machine and its consumers.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ModerationPolicy {
    /// How long a strike stays active before expiring, in hours.
    pub expiry_window_hours: i64,
    /// Accumulated active strikes per mute threshold.
    pub warns_per_mute: u32,
    /// Timeout length for each successive mute, in hours. Must be
    /// non-decreasing and at least `max_mutes` long.
    pub mute_length_hours: Vec<i64>,
    /// Mute index at which further strikes become a ban.
    pub max_mutes: u32,
    /// Debounce delay for durable flushes, in milliseconds.
    pub flush_debounce_ms: u64,
    /// Censor scan cap, in characters.
    pub max_scan_length: usize,
    /// Glyph used when redacting matched text.
    pub redaction_glyph: char,
}

impl Default for ModerationPolicy {
    fn default() -> Self {
        Self {
            expiry_window_hours: 21 * 24,
            warns_per_mute: 3,
            mute_length_hours: vec![4, 12, 24],
            max_mutes: 3,
            flush_debounce_ms: 2000,
            max_scan_length: 2000,
            redaction_glyph: '█',
        }
    }
}

impl ModerationPolicy {
    /// Loads a policy from a YAML file and validates it.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading moderation policy from: {}", path.display());
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read policy file {}", path.display()))?;
        let policy: ModerationPolicy = serde_yml::from_str(&text)
            .with_context(|| format!("Failed to parse policy file {}", path.display()))?;
        policy.validate()?;
        Ok(policy)
    }

    /// Validates policy integrity, collecting all problems.
    pub fn validate(&self) -> Result<(), WardenError> {
        let mut errors = Vec::new();

        if self.expiry_window_hours <= 0 {
            errors.push("expiry_window_hours must be positive".to_string());
        }
        if self.warns_per_mute == 0 {
            errors.push("warns_per_mute must be at least 1".to_string());
        }
        if self.max_mutes == 0 {
            errors.push("max_mutes must be at least 1".to_string());
        }
        if self.mute_length_hours.is_empty() {
            errors.push("mute_length_hours must not be empty".to_string());
        }
        if self.mute_length_hours.len() < self.max_mutes as usize {
            errors.push(format!(
                "mute_length_hours needs at least {} entries to cover max_mutes",
                self.max_mutes
            ));
        }
        if self.mute_length_hours.windows(2).any(|w| w[1] < w[0]) {
            errors.push("mute_length_hours must be non-decreasing".to_string());
        }
        if self.mute_length_hours.iter().any(|h| *h <= 0) {
            errors.push("mute_length_hours entries must be positive".to_string());
        }
        if self.max_scan_length == 0 {
            errors.push("max_scan_length must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(WardenError::InvalidPolicy(errors.join("; ")))
        }
    }

    pub fn expiry_window(&self) -> Duration {
        Duration::hours(self.expiry_window_hours)
    }

    pub fn flush_debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.flush_debounce_ms)
    }

    /// Mute index implied by an active strike count.
    pub fn mute_index(&self, strike_count: u64) -> u32 {
        (strike_count / u64::from(self.warns_per_mute)) as u32
    }

    /// Total timeout for crossing from `previous` to `new` mute index:
    /// the sum of every crossed threshold's length, so several thresholds
    /// crossed in one call produce one combined timeout.
    pub fn timeout_for_crossing(&self, previous: u32, new: u32) -> Duration {
        let last = self.mute_length_hours.len().saturating_sub(1);
        let hours: i64 = (previous..new)
            .map(|i| self.mute_length_hours[(i as usize).min(last)])
            .sum();
        Duration::hours(hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_valid() {
        ModerationPolicy::default().validate().unwrap();
    }

    #[test]
    fn sums_crossed_thresholds() {
        let policy = ModerationPolicy::default();
        assert_eq!(policy.timeout_for_crossing(0, 1), Duration::hours(4));
        assert_eq!(policy.timeout_for_crossing(0, 3), Duration::hours(40));
        assert_eq!(policy.timeout_for_crossing(1, 3), Duration::hours(36));
    }

    #[test]
    fn rejects_decreasing_mute_table() {
        let policy = ModerationPolicy {
            mute_length_hours: vec![12, 4, 24],
            ..ModerationPolicy::default()
        };
        assert!(matches!(policy.validate(), Err(WardenError::InvalidPolicy(_))));
    }

    #[test]
    fn rejects_short_mute_table() {
        let policy = ModerationPolicy {
            mute_length_hours: vec![4],
            max_mutes: 3,
            ..ModerationPolicy::default()
        };
        assert!(policy.validate().is_err());
    }
}
