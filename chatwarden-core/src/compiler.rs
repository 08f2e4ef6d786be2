//! compiler.rs - Manages the compilation and caching of tiered term matchers.
//!
//! This module converts a decoded [`TermList`] into a [`CompiledPolicy`]:
//! one combined, case-insensitive matcher per severity tier, with every
//! literal letter expanded into a homoglyph/leetspeak character class and
//! optional separator junk allowed between letters. Compilation runs once at
//! startup and the result is cached in a global, thread-safe map for the
//! process lifetime — the matchers sit on the hot path of every inbound
//! message and must never be rebuilt per message.
//!
//! License: MIT OR Apache-2.0

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

use anyhow::Result;
use lazy_static::lazy_static;
use log::debug;
use regex::{Regex, RegexBuilder};

use crate::errors::WardenError;
use crate::terms::{decode_rot13, TermList, MAX_PATTERN_LENGTH};

/// Separator junk tolerated between the letters of a term. Mirrors the
/// separator set the normalizer collapses, so obfuscations that survive
/// normalization (mixed into multi-letter words) are still caught here.
const SEPARATOR_RUN: &str = r#"[\s_.*~'"`\-]*"#;

/// Homoglyph/leetspeak variants for each ASCII letter. The plain letter is
/// always included; non-ASCII look-alikes are handled by the normalizer and
/// listed here only where they commonly survive copy-paste.
static HOMOGLYPHS: &[(char, &str)] = &[
    ('a', "a@4"),
    ('b', "b86"),
    ('c', "c(<"),
    ('e', "e3"),
    ('g', "g9"),
    ('h', "h#"),
    ('i', "i1!|l"),
    ('l', "l1|i"),
    ('o', "o0"),
    ('s', "s5$z"),
    ('t', "t7+"),
    ('u', "uv"),
    ('v', "vu"),
    ('x', "x×"),
    ('z', "z2s"),
];

lazy_static! {
    static ref HOMOGLYPH_MAP: HashMap<char, &'static str> =
        HOMOGLYPHS.iter().copied().collect();

    /// A thread-safe, global cache for compiled policies.
    /// The key is a hash of the `TermList`.
    static ref COMPILED_POLICY_CACHE: RwLock<HashMap<u64, Arc<CompiledPolicy>>> =
        RwLock::new(HashMap::new());
}

/// One compiled matcher for a severity tier.
#[derive(Debug)]
pub struct CompiledTier {
    /// Severity tier this matcher belongs to.
    pub tier: u8,
    /// Strike weight contributed per match. Zero for flag-only tiers.
    pub weight: u32,
    /// The combined, case-insensitive matcher for every term in the tier.
    pub regex: Regex,
}

/// All compiled tier matchers, in ascending severity order.
#[derive(Debug)]
pub struct CompiledPolicy {
    pub tiers: Vec<CompiledTier>,
}

/// Returns the homoglyph variants the compiler recognizes for a letter,
/// excluding the letter itself. Exposed so tests can enumerate every defined
/// substitution.
pub fn homoglyph_variants(letter: char) -> Vec<char> {
    HOMOGLYPH_MAP
        .get(&letter)
        .map(|v| v.chars().filter(|c| *c != letter).collect())
        .unwrap_or_default()
}

fn class_for(letter: char, word_chars_only: bool) -> String {
    match HOMOGLYPH_MAP.get(&letter) {
        Some(variants) => {
            let mut class = String::from("[");
            for c in variants.chars() {
                // Symbol variants next to a \b assertion would break the
                // boundary, so edge positions of whole-word terms only admit
                // alphanumeric look-alikes.
                if word_chars_only && !c.is_alphanumeric() {
                    continue;
                }
                // These sets contain no class metacharacters, but escape
                // defensively in case the table grows.
                if matches!(c, '\\' | ']' | '^' | '-') {
                    class.push('\\');
                }
                class.push(c);
            }
            class.push(']');
            class
        }
        None => regex::escape(&letter.to_string()),
    }
}

/// Expands a decoded literal pattern into its obfuscation-resistant form:
/// each letter becomes a homoglyph class, letters may be interleaved with
/// separator junk, and literal spaces match any whitespace run.
fn expand_pattern(decoded: &str, word_boundary: bool) -> String {
    let last = decoded.chars().count().saturating_sub(1);
    let units: Vec<String> = decoded
        .chars()
        .enumerate()
        .map(|(i, c)| {
            if c == ' ' {
                r"\s+".to_string()
            } else {
                class_for(c, word_boundary && (i == 0 || i == last))
            }
        })
        .collect();
    units.join(SEPARATOR_RUN)
}

/// Hashes the `TermList` to create a stable, unique key for the cache.
fn hash_terms(list: &TermList) -> u64 {
    let mut hasher = DefaultHasher::new();
    list.hash(&mut hasher);
    hasher.finish()
}

/// Compiles a decoded term list into per-tier matchers.
/// This is the low-level function that performs the actual regex compilation.
pub fn compile_terms(list: &TermList) -> Result<CompiledPolicy, WardenError> {
    debug!("Starting compilation of {} tiers.", list.tiers.len());

    let mut compiled_tiers = Vec::new();
    let mut compilation_errors = Vec::new();

    for tier in &list.tiers {
        let mut alternatives = Vec::new();
        for term in &tier.terms {
            let decoded = decode_rot13(&term.pattern);
            if decoded.len() > MAX_PATTERN_LENGTH {
                compilation_errors.push(WardenError::PatternLengthExceeded(
                    term.pattern.clone(),
                    decoded.len(),
                    MAX_PATTERN_LENGTH,
                ));
                continue;
            }
            let expanded = expand_pattern(&decoded, term.word_boundary);
            if term.word_boundary {
                alternatives.push(format!(r"\b(?:{expanded})\b"));
            } else {
                alternatives.push(expanded);
            }
        }

        let combined = format!("(?:{})", alternatives.join("|"));
        let regex_result = RegexBuilder::new(&combined)
            .case_insensitive(true)
            .size_limit(10 * (1 << 20)) // 10 MB limit for compiled regex
            .build();

        match regex_result {
            Ok(regex) => {
                debug!(
                    target: "chatwarden_core::compiler",
                    "Tier {} compiled successfully ({} terms).",
                    tier.tier,
                    tier.terms.len()
                );
                compiled_tiers.push(CompiledTier { tier: tier.tier, weight: tier.weight, regex });
            }
            Err(e) => {
                compilation_errors.push(WardenError::TierCompilation(tier.tier, e));
            }
        }
    }

    if !compilation_errors.is_empty() {
        let error_message = compilation_errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<String>>()
            .join("\n");
        Err(WardenError::Fatal(format!(
            "Failed to compile {} tier(s)/term(s):\n{}",
            compilation_errors.len(),
            error_message
        )))
    } else {
        debug!("Finished compiling tiers. Total compiled: {}.", compiled_tiers.len());
        Ok(CompiledPolicy { tiers: compiled_tiers })
    }
}

/// Gets a `CompiledPolicy` from the cache or compiles it if not found.
///
/// This is the public entry point for retrieving compiled matchers. It
/// returns an `Arc`, allowing cheap sharing across concurrent evaluations.
pub fn get_or_compile(list: &TermList) -> Result<Arc<CompiledPolicy>> {
    let cache_key = hash_terms(list);

    // Attempt to acquire a read lock first.
    {
        let cache = COMPILED_POLICY_CACHE.read().unwrap();
        if let Some(policy) = cache.get(&cache_key) {
            debug!("Serving compiled policy from cache for key: {}", &cache_key);
            return Ok(Arc::clone(policy));
        }
    } // Read lock is released here.

    debug!("Compiled policy not found in cache. Compiling now.");
    let compiled = compile_terms(list)?;
    let compiled_arc = Arc::new(compiled);

    COMPILED_POLICY_CACHE
        .write()
        .unwrap()
        .insert(cache_key, Arc::clone(&compiled_arc));

    debug!("Successfully compiled and cached policy for key: {}", &cache_key);
    Ok(compiled_arc)
}
