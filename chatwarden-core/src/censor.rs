// chatwarden-core/src/censor.rs
//! The censor engine: applies compiled tier matchers to normalized text and
//! produces a redaction plus a weighted strike score.
//!
//! Safe under concurrent, repeated invocation: matching uses the regex
//! crate's stateless find-all primitive over shared, immutable compiled
//! matchers, so every call behaves as if starting fresh.
//!
//! License: MIT OR Apache-2.0

use std::borrow::Cow;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::compiler::{get_or_compile, CompiledPolicy};
use crate::normalize::normalize;
use crate::terms::TermList;
use crate::verdict::{log_censor_match_debug, CensorVerdict, MatchedSpan};

/// Tuning knobs for the censor. Defaults fit typical chat-message sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CensorOptions {
    /// Inputs are truncated to this many characters before matching, so a
    /// pathologically long message cannot stall the event loop.
    pub max_scan_length: usize,
    /// Matches keep their first character and replace the rest with this.
    pub redaction_glyph: char,
}

impl Default for CensorOptions {
    fn default() -> Self {
        Self { max_scan_length: 2000, redaction_glyph: '█' }
    }
}

/// Applies the compiled tier matchers to inbound text.
///
/// Construction compiles (or fetches from the process-wide cache) the
/// matchers once; the engine itself is immutable and cheap to share.
#[derive(Debug)]
pub struct CensorEngine {
    policy: Arc<CompiledPolicy>,
    options: CensorOptions,
}

impl CensorEngine {
    pub fn new(terms: &TermList) -> Result<Self> {
        Self::with_options(terms, CensorOptions::default())
    }

    pub fn with_options(terms: &TermList, options: CensorOptions) -> Result<Self> {
        let policy = get_or_compile(terms)
            .context("Failed to compile forbidden-term matchers for CensorEngine")?;
        Ok(Self { policy, options })
    }

    /// Checks one message. Returns `None` when no tier matched; otherwise a
    /// verdict carrying every matched span, the weighted strike score, and a
    /// redacted rendering of the normalized text.
    ///
    /// Matches from different tiers may overlap in source position; each
    /// still counts toward the score independently.
    pub fn censor(&self, text: &str) -> Option<CensorVerdict> {
        if text.trim().is_empty() {
            return None;
        }
        let capped = cap_chars(text, self.options.max_scan_length);
        let normalized = normalize(&capped);
        if normalized.is_empty() {
            return None;
        }

        // Byte offset of every char start, for mapping match ranges onto the
        // working copy of chars.
        let char_starts: Vec<usize> = normalized.char_indices().map(|(b, _)| b).collect();
        let mut working: Vec<char> = normalized.chars().collect();

        let mut spans = Vec::new();
        let mut strike_score: u32 = 0;

        for tier in &self.policy.tiers {
            let mut count: u32 = 0;
            // Matching always runs against the pristine normalized text, not
            // the partially redacted working copy, so tiers can overlap.
            for m in tier.regex.find_iter(&normalized) {
                count += 1;
                log_censor_match_debug(module_path!(), tier.tier, m.as_str());
                spans.push(MatchedSpan { tier: tier.tier, text: m.as_str().to_string() });

                let start = char_index(&char_starts, normalized.len(), m.start());
                let end = char_index(&char_starts, normalized.len(), m.end());
                for slot in working.iter_mut().take(end).skip(start + 1) {
                    *slot = self.options.redaction_glyph;
                }
            }
            strike_score += count * tier.weight;
        }

        if spans.is_empty() {
            None
        } else {
            Some(CensorVerdict {
                matched_spans: spans,
                strike_score,
                redacted_text: working.into_iter().collect(),
            })
        }
    }
}

fn cap_chars(text: &str, max: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max) {
        Some((byte, _)) => Cow::Owned(text[..byte].to_string()),
        None => Cow::Borrowed(text),
    }
}

fn char_index(char_starts: &[usize], text_len: usize, byte: usize) -> usize {
    if byte >= text_len {
        return char_starts.len();
    }
    // Match offsets from the regex crate always fall on char boundaries.
    char_starts.binary_search(&byte).unwrap_or_else(|i| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> CensorEngine {
        CensorEngine::new(&TermList::load_default().unwrap()).unwrap()
    }

    #[test]
    fn empty_input_yields_no_verdict() {
        let engine = engine();
        assert!(engine.censor("").is_none());
        assert!(engine.censor("   ").is_none());
    }

    #[test]
    fn clean_text_yields_no_verdict() {
        let engine = engine();
        assert!(engine.censor("what a lovely day in the server").is_none());
    }

    #[test]
    fn redaction_keeps_first_character_only() {
        let engine = engine();
        let verdict = engine.censor("shit happens").unwrap();
        assert_eq!(verdict.redacted_text, "s███ happens");
        assert_eq!(verdict.strike_score, 1);
    }

    #[test]
    fn tier_zero_matches_are_flagged_but_unweighted() {
        let engine = engine();
        let verdict = engine.censor("well damn").unwrap();
        assert_eq!(verdict.strike_score, 0);
        assert_eq!(verdict.match_count(), 1);
        assert_eq!(verdict.redacted_text, "well d███");
    }

    #[test]
    fn long_input_is_capped_before_matching() {
        let engine = engine();
        let mut text = "a".repeat(5000);
        text.push_str(" shit");
        // The offending word sits past the scan cap and is not evaluated.
        assert!(engine.censor(&text).is_none());
    }

    #[test]
    fn concurrent_invocations_are_independent() {
        let engine = std::sync::Arc::new(engine());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = std::sync::Arc::clone(&engine);
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    let v = engine.censor("shit and more shit").unwrap();
                    assert_eq!(v.match_count(), 2);
                    assert_eq!(v.strike_score, 2);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }
}
