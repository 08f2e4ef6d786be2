// chatwarden-core/src/normalize.rs
//! Canonicalizes raw chat text before matching.
//!
//! Normalization is what makes the censor resistant to the cheap evasions:
//! Cyrillic/Greek/fullwidth look-alikes fold to their Latin equivalents,
//! diacritics and combining marks are stripped, zero-width characters are
//! dropped, and single letters spelled out with separators ("f-u-c-k",
//! "f u c k") are rejoined. Pure and deterministic, no I/O, and idempotent:
//! `normalize(normalize(s)) == normalize(s)`.
//!
//! License: MIT OR Apache-2.0

use std::collections::HashMap;

use lazy_static::lazy_static;

/// Characters that may be inserted between letters to defeat literal
/// matching. Kept in sync with the interleave class in the pattern compiler.
pub const SEPARATORS: &[char] = &[' ', '\t', '-', '_', '.', '*', '~', '\'', '`', '"'];

/// Look-alike fold table: lowercase confusable -> ASCII equivalent.
///
/// Keys are lowercase because folding runs after case folding. ASCII
/// leetspeak digits/symbols are deliberately absent here; those stay visible
/// to the compiled homoglyph classes instead.
static CONFUSABLE_PAIRS: &[(char, char)] = &[
    // Latin diacritics (precomposed forms).
    ('à', 'a'), ('á', 'a'), ('â', 'a'), ('ã', 'a'), ('ä', 'a'), ('å', 'a'),
    ('ā', 'a'), ('ă', 'a'), ('ą', 'a'),
    ('ç', 'c'), ('ć', 'c'), ('č', 'c'),
    ('è', 'e'), ('é', 'e'), ('ê', 'e'), ('ë', 'e'), ('ē', 'e'), ('ė', 'e'), ('ę', 'e'),
    ('ì', 'i'), ('í', 'i'), ('î', 'i'), ('ï', 'i'), ('ī', 'i'), ('į', 'i'), ('ı', 'i'),
    ('ñ', 'n'), ('ń', 'n'),
    ('ò', 'o'), ('ó', 'o'), ('ô', 'o'), ('õ', 'o'), ('ö', 'o'), ('ø', 'o'), ('ō', 'o'),
    ('ù', 'u'), ('ú', 'u'), ('û', 'u'), ('ü', 'u'), ('ū', 'u'),
    ('ý', 'y'), ('ÿ', 'y'),
    ('ś', 's'), ('š', 's'), ('ß', 's'),
    ('ź', 'z'), ('ż', 'z'), ('ž', 'z'),
    ('ď', 'd'), ('ğ', 'g'), ('ł', 'l'), ('ť', 't'),
    // Cyrillic look-alikes.
    ('а', 'a'), ('в', 'b'), ('е', 'e'), ('ё', 'e'), ('к', 'k'), ('м', 'm'),
    ('н', 'h'), ('о', 'o'), ('р', 'p'), ('с', 'c'), ('т', 't'), ('у', 'y'),
    ('х', 'x'), ('і', 'i'), ('ї', 'i'), ('ј', 'j'), ('ѕ', 's'), ('ԁ', 'd'),
    ('ԛ', 'q'), ('ԝ', 'w'),
    // Greek look-alikes.
    ('α', 'a'), ('β', 'b'), ('γ', 'y'), ('ε', 'e'), ('ι', 'i'), ('κ', 'k'),
    ('ν', 'v'), ('ο', 'o'), ('ρ', 'p'), ('σ', 's'), ('ς', 's'), ('τ', 't'),
    ('υ', 'u'), ('χ', 'x'), ('ω', 'w'),
];

lazy_static! {
    static ref CONFUSABLES: HashMap<char, char> = CONFUSABLE_PAIRS.iter().copied().collect();
}

fn is_zero_width(c: char) -> bool {
    matches!(c, '\u{200b}' | '\u{200c}' | '\u{200d}' | '\u{2060}' | '\u{feff}' | '\u{00ad}')
}

fn is_combining_mark(c: char) -> bool {
    ('\u{0300}'..='\u{036f}').contains(&c)
}

/// Folds fullwidth ASCII (U+FF01..U+FF5E) back onto the ASCII block.
fn fold_fullwidth(c: char) -> char {
    if ('\u{ff01}'..='\u{ff5e}').contains(&c) {
        let offset = c as u32 - 0xff01 + 0x21;
        char::from_u32(offset).unwrap_or(c)
    } else {
        c
    }
}

fn fold_char(c: char) -> Option<char> {
    if is_zero_width(c) || is_combining_mark(c) {
        return None;
    }
    let c = fold_fullwidth(c);
    Some(*CONFUSABLES.get(&c).unwrap_or(&c))
}

/// Canonicalizes `text` for matching.
///
/// The output is lowercase, confusable-folded, free of zero-width characters
/// and combining marks, with spelled-out single letters rejoined. Word
/// structure of ordinary prose is preserved so word-boundary terms still see
/// their boundaries.
pub fn normalize(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for c in text.to_lowercase().chars() {
        if let Some(f) = fold_char(c) {
            folded.push(f);
        }
    }
    let collapsed = collapse_spelled_out(&folded);
    collapsed.trim().to_string()
}

fn is_joinable(c: char) -> bool {
    c.is_alphabetic() || c.is_ascii_digit()
}

fn is_separator(c: char) -> bool {
    SEPARATORS.contains(&c)
}

#[derive(Debug, PartialEq)]
enum Segment {
    Joinable(String),
    Separator(String),
    Other(String),
}

fn segment(text: &str) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    for c in text.chars() {
        let kind = if is_joinable(c) {
            0
        } else if is_separator(c) {
            1
        } else {
            2
        };
        match (segments.last_mut(), kind) {
            (Some(Segment::Joinable(s)), 0) => s.push(c),
            (Some(Segment::Separator(s)), 1) => s.push(c),
            (Some(Segment::Other(s)), 2) => s.push(c),
            (_, 0) => segments.push(Segment::Joinable(c.to_string())),
            (_, 1) => segments.push(Segment::Separator(c.to_string())),
            (_, _) => segments.push(Segment::Other(c.to_string())),
        }
    }
    segments
}

/// Rejoins chains of isolated single letters: any run of length-1 joinable
/// segments separated purely by separator segments collapses to one word.
/// Multi-letter words are left alone, so "go to hell" keeps its spaces while
/// "h e l l" and "h-e-l-l" both become "hell".
fn collapse_spelled_out(text: &str) -> String {
    let segments = segment(text);
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    let is_single = |seg: &Segment| matches!(seg, Segment::Joinable(s) if s.chars().count() == 1);

    while i < segments.len() {
        if is_single(&segments[i]) {
            // Extend the chain as far as (separator, single-letter) pairs go.
            let mut end = i;
            while end + 2 < segments.len()
                && matches!(segments[end + 1], Segment::Separator(_))
                && is_single(&segments[end + 2])
            {
                end += 2;
            }
            if end > i {
                for seg in &segments[i..=end] {
                    if let Segment::Joinable(s) = seg {
                        out.push_str(s);
                    }
                }
                i = end + 1;
                continue;
            }
        }
        match &segments[i] {
            Segment::Joinable(s) | Segment::Separator(s) | Segment::Other(s) => out.push_str(s),
        }
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_is_idempotent() {
        let inputs = [
            "Hello, World!",
            "f-u-c-k",
            "ѕℏ ι т",
            "ＦＵＬＬＷＩＤＴＨ ｔｅｘｔ",
            "héllo wörld",
            "a b c d e",
            "",
            "   spaced   out   ",
            "emoji 😀 and digits 123",
        ];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn folds_cyrillic_and_greek_lookalikes() {
        assert_eq!(normalize("сукa"), "cyka");
        assert_eq!(normalize("ρоrn"), "porn");
        assert_eq!(normalize("ΑΒΓ"), "aby");
    }

    #[test]
    fn strips_diacritics_and_combining_marks() {
        assert_eq!(normalize("hèllô"), "hello");
        // 'e' followed by U+0301 combining acute.
        assert_eq!(normalize("he\u{0301}llo"), "hello");
    }

    #[test]
    fn drops_zero_width_characters() {
        assert_eq!(normalize("fu\u{200b}ck"), "fuck");
        assert_eq!(normalize("\u{feff}hi\u{200d}"), "hi");
    }

    #[test]
    fn folds_fullwidth_ascii() {
        assert_eq!(normalize("ｈｅｌｌｏ"), "hello");
        assert_eq!(normalize("１２３"), "123");
    }

    #[test]
    fn rejoins_spelled_out_letters() {
        assert_eq!(normalize("f u c k"), "fuck");
        assert_eq!(normalize("f-u-c-k"), "fuck");
        assert_eq!(normalize("s.h.i.t"), "shit");
        assert_eq!(normalize("s h 1 t"), "sh1t");
    }

    #[test]
    fn preserves_word_structure_of_prose() {
        assert_eq!(normalize("go to hell"), "go to hell");
        assert_eq!(normalize("what a day"), "what a day");
        assert_eq!(normalize("co-op game"), "co-op game");
    }

    #[test]
    fn lowercases_everything() {
        assert_eq!(normalize("LOUD Noises"), "loud noises");
    }
}
