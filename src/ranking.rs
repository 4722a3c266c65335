//! Deterministic candidate ranking.
//!
//! Candidates must clear both similarity thresholds. Among survivors the highest
//! combined score wins; exact ties are broken by, in order:
//! 1. title vs. own album title similarity (the album named after the track is
//!    the original release, not a compilation)
//! 2. popularity (missing = 0)
//! 3. release date string (missing = "", sorts last)
//!
//! The sort is stable, so fully tied candidates keep their search order.

use std::cmp::Ordering;

use crate::config::MatchingConfig;
use crate::models::{Candidate, ScoredCandidate, TrackQuery};
use crate::normalize::{fold_to_ascii, normalize_opt};
use crate::scoring::{combined_score, passes_thresholds, similarity};

/// Normalize, then fold when the config asks for it.
pub fn prepare(config: &MatchingConfig, text: Option<&str>) -> String {
    let normalized = normalize_opt(text);
    if config.fold_diacritics {
        fold_to_ascii(&normalized)
    } else {
        normalized
    }
}

/// Score one candidate against an already prepared query.
pub fn score_candidate(
    config: &MatchingConfig,
    title_norm: &str,
    artists_norm: &str,
    candidate: &Candidate,
) -> ScoredCandidate {
    let title_sim = similarity(title_norm, &prepare(config, candidate.title.as_deref()));
    let artist_sim = similarity(artists_norm, &prepare(config, candidate.artist_name.as_deref()));
    ScoredCandidate {
        candidate: candidate.clone(),
        title_sim,
        artist_sim,
        combined_score: combined_score(title_sim, artist_sim),
        album_title_sim: None,
    }
}

pub fn is_accepted(config: &MatchingConfig, scored: &ScoredCandidate) -> bool {
    passes_thresholds(
        scored.title_sim,
        scored.artist_sim,
        config.min_title_similarity,
        config.min_artist_similarity,
    )
}

/// Similarity between a candidate's title and the title of the album it sits on.
fn album_title_similarity(config: &MatchingConfig, candidate: &Candidate) -> f64 {
    similarity(
        &prepare(config, candidate.title.as_deref()),
        &prepare(config, candidate.album_title.as_deref()),
    )
}

fn tie_break(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    let album_a = a.album_title_sim.unwrap_or(0.0);
    let album_b = b.album_title_sim.unwrap_or(0.0);
    album_b
        .total_cmp(&album_a)
        .then_with(|| {
            b.candidate
                .popularity_or_zero()
                .total_cmp(&a.candidate.popularity_or_zero())
        })
        .then_with(|| {
            b.candidate
                .release_date_str()
                .cmp(a.candidate.release_date_str())
        })
}

/// Rank with the default thresholds.
pub fn rank(query: &TrackQuery, candidates: &[Candidate]) -> Option<ScoredCandidate> {
    rank_with(&MatchingConfig::default(), query, candidates)
}

/// Pick the single best candidate, or `None` when nothing clears the thresholds.
pub fn rank_with(
    config: &MatchingConfig,
    query: &TrackQuery,
    candidates: &[Candidate],
) -> Option<ScoredCandidate> {
    let title_norm = prepare(config, Some(&query.title));
    let artists_norm = prepare(config, Some(&query.artists));

    let survivors: Vec<ScoredCandidate> = candidates
        .iter()
        .map(|c| score_candidate(config, &title_norm, &artists_norm, c))
        .filter(|s| is_accepted(config, s))
        .collect();

    let best_score = survivors
        .iter()
        .map(|s| s.combined_score)
        .fold(None, |best: Option<f64>, score| match best {
            Some(b) if b >= score => Some(b),
            _ => Some(score),
        })?;

    let mut tied: Vec<ScoredCandidate> = survivors
        .into_iter()
        .filter(|s| s.combined_score == best_score)
        .collect();

    log::debug!(
        "rank '{}' / '{}': {} of {} candidates tied at {:.4}",
        title_norm,
        artists_norm,
        tied.len(),
        candidates.len(),
        best_score
    );

    if tied.len() > 1 {
        for scored in tied.iter_mut() {
            scored.album_title_sim = Some(album_title_similarity(config, &scored.candidate));
        }
        tied.sort_by(tie_break);
    }

    tied.into_iter().next()
}
