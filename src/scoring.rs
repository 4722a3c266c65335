//! Similarity scoring for title/artist comparison.
//!
//! - Dice coefficient over character bigrams
//! - Weighted combination of title and artist similarity
//! - Default acceptance thresholds

use rustc_hash::FxHashMap;

// ============================================================================
// Score Thresholds
// ============================================================================

/// A candidate's title similarity must strictly exceed this to be ranked
pub const TITLE_THRESHOLD: f64 = 0.70;

/// A candidate's artist similarity must strictly exceed this to be ranked
pub const ARTIST_THRESHOLD: f64 = 0.70;

pub const TITLE_WEIGHT: f64 = 0.4;
pub const ARTIST_WEIGHT: f64 = 0.6;

// ============================================================================
// Bigram Similarity
// ============================================================================

/// Lower-case and drop every whitespace character.
fn strip(s: &str) -> Vec<char> {
    s.to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Dice coefficient over character bigrams (0.0 to 1.0).
///
/// Case and whitespace are ignored. Identical stripped strings score 1.0, even
/// when both are empty; otherwise a side shorter than two characters scores 0.0.
/// Bigrams are counted as a multiset, so "aaaa" vs "aa" shares one bigram, not three.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = strip(a);
    let b = strip(b);

    if a == b {
        return 1.0;
    }
    if a.len() < 2 || b.len() < 2 {
        return 0.0;
    }

    let mut bigrams: FxHashMap<(char, char), usize> = FxHashMap::default();
    for pair in a.windows(2) {
        *bigrams.entry((pair[0], pair[1])).or_insert(0) += 1;
    }

    let mut intersection = 0usize;
    for pair in b.windows(2) {
        if let Some(count) = bigrams.get_mut(&(pair[0], pair[1])) {
            if *count > 0 {
                *count -= 1;
                intersection += 1;
            }
        }
    }

    (2 * intersection) as f64 / (a.len() + b.len() - 2) as f64
}

// ============================================================================
// Combined Scoring
// ============================================================================

/// Artist agreement weighs more than title agreement: titles carry more
/// annotation noise than artist credits.
pub fn combined_score(title_sim: f64, artist_sim: f64) -> f64 {
    TITLE_WEIGHT * title_sim + ARTIST_WEIGHT * artist_sim
}

/// Both similarities must strictly exceed their thresholds.
pub fn passes_thresholds(
    title_sim: f64,
    artist_sim: f64,
    min_title: f64,
    min_artist: f64,
) -> bool {
    title_sim > min_title && artist_sim > min_artist
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_strings_score_one() {
        for s in ["Blinding Lights", "ab", "x", "The Weeknd", "Ünïcödé"] {
            assert_eq!(similarity(s, s), 1.0, "{s}");
        }
    }

    #[test]
    fn test_case_and_whitespace_ignored() {
        assert_eq!(similarity("Blinding Lights", "blindinglights"), 1.0);
        assert_eq!(similarity("THE  WEEKND", "the weeknd"), 1.0);
    }

    #[test]
    fn test_equality_checked_before_length() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("   ", ""), 1.0);
        assert_eq!(similarity("a", "a"), 1.0);
        assert_eq!(similarity("a", "b"), 0.0);
        assert_eq!(similarity("", "ab"), 0.0);
        assert_eq!(similarity("abc", "a"), 0.0);
    }

    #[test]
    fn test_known_value() {
        // ni ig gh ht vs na ac ch ht: one shared bigram
        assert!((similarity("night", "nacht") - 0.25).abs() < 1e-12);
        assert_eq!(similarity("ab", "ba"), 0.0);
    }

    #[test]
    fn test_bigram_multiset() {
        // "aaaa" has three "aa" bigrams, "aa" has one
        assert!((similarity("aaaa", "aa") - 0.5).abs() < 1e-12);
        assert!((similarity("aa", "aaaa") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_symmetric_and_bounded() {
        let pairs = [
            ("Blinding Lights", "Blinding Lights - Remix"),
            ("The Weeknd", "Weeknd"),
            ("Save Your Tears", "Save My Tears"),
            ("Daft Punk", "Punk Daft"),
        ];
        for (a, b) in pairs {
            let ab = similarity(a, b);
            let ba = similarity(b, a);
            assert!((ab - ba).abs() < 1e-12, "{a} / {b}");
            assert!((0.0..=1.0).contains(&ab));
        }
    }

    #[test]
    fn test_matches_reference_dice_on_ascii() {
        let pairs = [
            ("healed", "sealed"),
            ("blindinglights", "blindinglightsremix"),
            ("theweeknd", "weeknd"),
            ("abc", "xyz"),
        ];
        for (a, b) in pairs {
            assert!((similarity(a, b) - strsim::sorensen_dice(a, b)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_combined_score_weights() {
        assert!((combined_score(0.95, 0.97) - (0.4 * 0.95 + 0.6 * 0.97)).abs() < 1e-12);
        assert_eq!(combined_score(1.0, 1.0), 1.0);
        assert_eq!(combined_score(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_thresholds_are_strict() {
        assert!(!passes_thresholds(0.70, 0.9, TITLE_THRESHOLD, ARTIST_THRESHOLD));
        assert!(!passes_thresholds(0.9, 0.70, TITLE_THRESHOLD, ARTIST_THRESHOLD));
        assert!(passes_thresholds(0.7001, 0.7001, TITLE_THRESHOLD, ARTIST_THRESHOLD));
    }
}
