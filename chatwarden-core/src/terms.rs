//! Forbidden-term list management for `chatwarden-core`.
//!
//! This module defines the data structures for tiered forbidden terms,
//! handles loading them from YAML (embedded defaults or an external file),
//! and owns the one pure decoder that inverts the source-hiding transform.
//! Cipher logic lives here and nowhere else: the pattern compiler and censor
//! only ever see decoded literals.
//!
//! License: MIT OR Apache-2.0

use std::collections::HashSet;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Maximum allowed length for a decoded term pattern.
pub const MAX_PATTERN_LENGTH: usize = 64;

/// A single forbidden term. `pattern` is stored in its encoded (ROT13) form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(default)]
pub struct ForbiddenTerm {
    /// ROT13-encoded literal pattern.
    pub pattern: String,
    /// If true, the compiled matcher wraps this term in word-boundary
    /// assertions so it only matches as a whole word.
    pub word_boundary: bool,
}

impl Default for ForbiddenTerm {
    fn default() -> Self {
        Self { pattern: String::new(), word_boundary: false }
    }
}

/// A severity class of forbidden terms. Higher tiers contribute more strike
/// weight per match; tier 0 is flag-only (weight 0).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct TermTier {
    pub tier: u8,
    pub weight: u32,
    pub terms: Vec<ForbiddenTerm>,
}

/// The full tiered forbidden-term list. Static for the process lifetime:
/// loaded and validated once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct TermList {
    pub tiers: Vec<TermTier>,
}

/// Inverts the source-hiding transform: ROT13 over ASCII letters, everything
/// else passed through.
pub fn decode_rot13(encoded: &str) -> String {
    encoded
        .chars()
        .map(|c| match c {
            'a'..='m' | 'A'..='M' => char::from(c as u8 + 13),
            'n'..='z' | 'N'..='Z' => char::from(c as u8 - 13),
            other => other,
        })
        .collect()
}

impl TermList {
    /// Loads the built-in term list from the embedded configuration.
    pub fn load_default() -> Result<Self> {
        debug!("Loading default forbidden terms from embedded string...");
        let default_yaml = include_str!("../config/default_terms.yaml");
        let list: TermList =
            serde_yml::from_str(default_yaml).context("Failed to parse default term list")?;
        list.validate()?;
        debug!("Loaded {} default tiers.", list.tiers.len());
        Ok(list)
    }

    /// Loads a term list from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading forbidden terms from: {}", path.display());
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read term list {}", path.display()))?;
        let list: TermList = serde_yml::from_str(&text)
            .with_context(|| format!("Failed to parse term list {}", path.display()))?;
        list.validate()?;
        info!("Loaded {} tiers from {}.", list.tiers.len(), path.display());
        Ok(list)
    }

    /// Validates structural integrity, collecting every problem into one
    /// report rather than failing on the first.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        let mut seen_tiers = HashSet::new();
        let mut last_tier: Option<u8> = None;

        if self.tiers.is_empty() {
            errors.push("term list has no tiers".to_string());
        }
        for tier in &self.tiers {
            if !seen_tiers.insert(tier.tier) {
                errors.push(format!("duplicate tier {}", tier.tier));
            }
            if let Some(prev) = last_tier {
                if tier.tier <= prev {
                    errors.push(format!(
                        "tier {} is out of order (tiers must be listed in ascending severity)",
                        tier.tier
                    ));
                }
            }
            last_tier = Some(tier.tier);

            if tier.tier == 0 && tier.weight != 0 {
                errors.push("tier 0 is flag-only and must have weight 0".to_string());
            }
            if tier.tier != 0 && tier.weight == 0 {
                errors.push(format!("tier {} has zero weight; use tier 0 for flag-only terms", tier.tier));
            }
            if tier.terms.is_empty() {
                errors.push(format!("tier {} has no terms", tier.tier));
            }
            for term in &tier.terms {
                let decoded = decode_rot13(&term.pattern);
                if decoded.is_empty() {
                    errors.push(format!("tier {} contains an empty pattern", tier.tier));
                } else if decoded.len() > MAX_PATTERN_LENGTH {
                    errors.push(format!(
                        "tier {}: pattern length ({}) exceeds maximum allowed ({})",
                        tier.tier,
                        decoded.len(),
                        MAX_PATTERN_LENGTH
                    ));
                } else if !decoded.chars().all(|c| c.is_ascii_lowercase() || c == ' ') {
                    errors.push(format!(
                        "tier {}: decoded patterns must be lowercase ASCII words",
                        tier.tier
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("Term list validation failed:\n{}", errors.join("\n")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rot13_is_an_involution() {
        for s in ["hello world", "nff", "Mixed Case", ""] {
            assert_eq!(decode_rot13(&decode_rot13(s)), s);
        }
    }

    #[test]
    fn default_list_loads_and_validates() {
        let list = TermList::load_default().unwrap();
        assert!(!list.tiers.is_empty());
        assert_eq!(list.tiers[0].tier, 0);
        assert_eq!(list.tiers[0].weight, 0);
        // No decoded literal leaks into the asset.
        for tier in &list.tiers {
            for term in &tier.terms {
                assert_ne!(term.pattern, decode_rot13(&term.pattern));
            }
        }
    }

    #[test]
    fn rejects_out_of_order_tiers() {
        let list = TermList {
            tiers: vec![
                TermTier { tier: 2, weight: 2, terms: vec![ForbiddenTerm { pattern: "nff".into(), word_boundary: false }] },
                TermTier { tier: 1, weight: 1, terms: vec![ForbiddenTerm { pattern: "nff".into(), word_boundary: false }] },
            ],
        };
        assert!(list.validate().is_err());
    }

    #[test]
    fn rejects_weighted_tier_zero() {
        let list = TermList {
            tiers: vec![TermTier {
                tier: 0,
                weight: 3,
                terms: vec![ForbiddenTerm { pattern: "nff".into(), word_boundary: false }],
            }],
        };
        assert!(list.validate().is_err());
    }
}
