// chatwarden-core/src/verdict.rs
//! Core data structures for censor verdicts, plus content-safe debug logging
//! helpers: matched chat text is itself the offensive material, so it never
//! reaches the logs unless explicitly allowed.

use lazy_static::lazy_static;
use log::debug;
use serde::{Deserialize, Serialize};

lazy_static! {
    /// A static boolean initialized once to determine whether raw matched
    /// content is allowed in debug logs.
    static ref CONTENT_DEBUG_ALLOWED: bool = {
        std::env::var("CHATWARDEN_ALLOW_DEBUG_CONTENT")
            .map(|s| s.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    };
}

/// One matched span of forbidden text, as seen in the normalized input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedSpan {
    /// Severity tier of the term that matched.
    pub tier: u8,
    /// The matched text (normalized form).
    pub text: String,
}

/// The result of running the censor over one message. Produced per check and
/// never persisted; `None` at the call site means no term matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CensorVerdict {
    /// Every matched span, across all tiers, in ascending tier order.
    pub matched_spans: Vec<MatchedSpan>,
    /// Weighted strike score: Σ matches[tier] × weight[tier]. Zero means a
    /// flag-only (verbal warning) verdict.
    pub strike_score: u32,
    /// The normalized text with each match redacted down to its first
    /// character, safe to show without re-leaking the offending text.
    pub redacted_text: String,
}

impl CensorVerdict {
    pub fn match_count(&self) -> usize {
        self.matched_spans.len()
    }
}

/// Replacement rendering for matched content in logs.
pub fn redact_for_log(s: &str) -> String {
    const MAX_LEN: usize = 8;
    if s.len() <= MAX_LEN {
        "[MATCH]".to_string()
    } else {
        format!("[MATCH: {} chars]", s.len())
    }
}

fn loggable(content: &str) -> String {
    if *CONTENT_DEBUG_ALLOWED {
        content.to_string()
    } else {
        redact_for_log(content)
    }
}

pub fn log_censor_match_debug(module_path: &str, tier: u8, matched: &str) {
    debug!("{} Censor match: tier={}, text='{}'", module_path, tier, loggable(matched));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_for_log_short_string() {
        assert_eq!(redact_for_log("abc"), "[MATCH]".to_string());
    }

    #[test]
    fn test_redact_for_log_long_string() {
        assert_eq!(redact_for_log("123456789"), "[MATCH: 9 chars]".to_string());
    }
}
