//! Text normalization applied to query and candidate strings before scoring.
//!
//! `normalize` is the only transform the ranker depends on. ASCII folding is
//! opt-in through `MatchingConfig::fold_diacritics`.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Bracketed annotations: "(Radio Edit)", "[Live]", "{Demo}", with surrounding whitespace.
pub static ANNOTATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s*(?:\([^)]*?\)|\[[^\]]*?\]|\{[^}]*?\})\s*").unwrap()
});

/// Any whitespace run
pub static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Separators between credited artists in a displayed artist string.
/// Matches: &, /, ,, •, +, ×, vs, feat, ft
pub static ARTIST_SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*(?:[&/,•+×]|(?:\s+(?:vs\.?|feat\.?|ft\.?)\s+))\s*").unwrap()
});

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Check if a character is a Unicode combining mark (diacritical mark).
pub fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0xFE20..=0xFE2F)
}

/// Fold Unicode text to ASCII by applying NFKD decomposition and removing combining marks.
/// e.g., "Beyoncé" → "beyonce", "Кино" → "kino"
pub fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    any_ascii(&stripped).to_lowercase()
}

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// Strip bracketed annotations, collapse whitespace, trim.
/// e.g., "Blinding Lights (Radio Edit)" → "Blinding Lights"
pub fn normalize(text: &str) -> String {
    let stripped = ANNOTATION.replace_all(text, " ");
    WHITESPACE_RUN.replace_all(&stripped, " ").trim().to_string()
}

/// `normalize` for fields a provider may leave out; absent text is empty.
pub fn normalize_opt(text: Option<&str>) -> String {
    text.map(normalize).unwrap_or_default()
}

/// Split a displayed multi-artist string into its credited artists.
/// e.g., "Calvin Harris, Dua Lipa & Young Thug" → ["Calvin Harris", "Dua Lipa", "Young Thug"]
pub fn split_artists(artists: &str) -> Vec<String> {
    ARTIST_SEPARATOR
        .split(artists)
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
