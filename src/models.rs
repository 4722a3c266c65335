//! Core data models for track resolution.
//!
//! This module contains the query, candidate and result types shared by the
//! ranker, the AI disambiguator, the orchestrator and the batch writer.

use serde::{Deserialize, Serialize};

use crate::error::ResolveError;

// ============================================================================
// Input Models
// ============================================================================

/// Title and artist string as displayed on the page, unnormalized.
/// `artists` may credit several artists ("A, B").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackQuery {
    pub title: String,
    pub artists: String,
}

impl TrackQuery {
    pub fn new(title: impl Into<String>, artists: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artists: artists.into(),
        }
    }
}

/// Whether a catalog record is a single track or an album that still needs
/// reducing to a representative track before quality probing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    #[default]
    Track,
    Album,
}

/// One catalog record returned by the search provider.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: String,
    #[serde(default)]
    pub kind: CandidateKind,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist_name: Option<String>,
    #[serde(default)]
    pub album_title: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub popularity: Option<f64>,
    #[serde(default)]
    pub cover_url: Option<String>,
}

impl Candidate {
    pub fn title_str(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }

    pub fn artist_str(&self) -> &str {
        self.artist_name.as_deref().unwrap_or("")
    }

    /// Release date for ordering; missing sorts lowest.
    pub fn release_date_str(&self) -> &str {
        self.release_date.as_deref().unwrap_or("")
    }

    pub fn popularity_or_zero(&self) -> f64 {
        self.popularity.unwrap_or(0.0)
    }
}

// ============================================================================
// Scoring Models
// ============================================================================

/// Candidate with the similarity figures of one ranking pass.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub title_sim: f64,
    pub artist_sim: f64,
    pub combined_score: f64,
    /// Only computed when a tie on `combined_score` has to be broken.
    pub album_title_sim: Option<f64>,
}

// ============================================================================
// Quality Models
// ============================================================================

/// Audio encodings offered by the link provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QualityTier {
    /// Lossy MP3 at 320 kbit/s
    Mp3_320,
    /// Lossless FLAC
    Flac,
}

impl QualityTier {
    pub const ALL: [QualityTier; 2] = [QualityTier::Mp3_320, QualityTier::Flac];

    /// Numeric code the link provider expects in its `quality` parameter.
    pub fn code(self) -> u32 {
        match self {
            QualityTier::Mp3_320 => 5,
            QualityTier::Flac => 27,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            QualityTier::Mp3_320 => "mp3",
            QualityTier::Flac => "flac",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            QualityTier::Mp3_320 => "MP3 320",
            QualityTier::Flac => "FLAC",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityAvailability {
    pub mp3_320: bool,
    pub flac: bool,
}

impl QualityAvailability {
    pub fn has(&self, tier: QualityTier) -> bool {
        match tier {
            QualityTier::Mp3_320 => self.mp3_320,
            QualityTier::Flac => self.flac,
        }
    }

    /// Preferred tier for downloads: lossless when offered.
    pub fn best(&self) -> Option<QualityTier> {
        if self.flac {
            Some(QualityTier::Flac)
        } else if self.mp3_320 {
            Some(QualityTier::Mp3_320)
        } else {
            None
        }
    }
}

// ============================================================================
// Output Models
// ============================================================================

/// Successful resolution handed to the UI and download collaborators.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedTrack {
    /// Concrete track id (for album-typed matches, the representative track).
    pub track_id: String,
    pub candidate: Candidate,
    pub qualities: QualityAvailability,
    pub used_ai: bool,
    /// Ranker's combined score; `None` when the AI made the pick.
    pub confidence: Option<f64>,
}

/// "Match: 87%" for a combined score of 0.87.
pub fn confidence_label(score: f64) -> String {
    format!("Match: {}%", (score * 100.0).round() as i64)
}

/// Wire shape for the UI boundary: either a success record or
/// `{success:false, reason, error}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MatchResult {
    Success(MatchSuccess),
    Failure(MatchFailure),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSuccess {
    pub success: bool,
    pub track_id: String,
    pub found_title: String,
    pub found_artists: String,
    pub cover_url: Option<String>,
    pub qualities: QualityAvailability,
    #[serde(rename = "usedAI")]
    pub used_ai: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchFailure {
    pub success: bool,
    pub reason: String,
    pub error: String,
}

impl MatchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, MatchResult::Success(_))
    }
}

impl From<ResolvedTrack> for MatchResult {
    fn from(resolved: ResolvedTrack) -> Self {
        MatchResult::Success(MatchSuccess {
            success: true,
            found_title: resolved.candidate.title_str().to_string(),
            found_artists: resolved.candidate.artist_str().to_string(),
            cover_url: resolved.candidate.cover_url.clone(),
            track_id: resolved.track_id,
            qualities: resolved.qualities,
            used_ai: resolved.used_ai,
            confidence: resolved.confidence.map(confidence_label),
        })
    }
}

impl From<ResolveError> for MatchResult {
    fn from(err: ResolveError) -> Self {
        MatchResult::Failure(MatchFailure {
            success: false,
            reason: err.reason().to_string(),
            error: err.to_string(),
        })
    }
}

impl From<Result<ResolvedTrack, ResolveError>> for MatchResult {
    fn from(result: Result<ResolvedTrack, ResolveError>) -> Self {
        match result {
            Ok(resolved) => resolved.into(),
            Err(err) => err.into(),
        }
    }
}

// ============================================================================
// Statistics (Instrumentation)
// ============================================================================

/// Counters for a batch run, dumped as JSON at the end.
#[derive(Default, Debug, Clone, Serialize)]
pub struct BatchStats {
    pub total_queries: usize,
    pub matched: usize,
    pub matched_by_ai: usize,
    pub not_found: usize,
    pub errors: usize,
    pub cancelled: usize,

    // Quality availability among matches
    pub mp3_320_available: usize,
    pub flac_available: usize,
    pub no_quality_available: usize,

    pub elapsed_seconds: f64,
}

impl BatchStats {
    pub fn match_rate(&self) -> f64 {
        if self.total_queries == 0 {
            0.0
        } else {
            100.0 * self.matched as f64 / self.total_queries as f64
        }
    }

    pub fn record_match(&mut self, resolved: &ResolvedTrack) {
        self.matched += 1;
        if resolved.used_ai {
            self.matched_by_ai += 1;
        }
        if resolved.qualities.mp3_320 {
            self.mp3_320_available += 1;
        }
        if resolved.qualities.flac {
            self.flac_available += 1;
        }
        if resolved.qualities.best().is_none() {
            self.no_quality_available += 1;
        }
    }

    pub fn record_failure(&mut self, err: &ResolveError) {
        if err.is_not_found() {
            self.not_found += 1;
        } else {
            self.errors += 1;
        }
    }

    /// Log stats in JSON format
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            log::info!("[STATS:{}]\n{}", phase, json);
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Entry for the match_failures table of a batch run.
#[derive(Clone, Debug)]
pub struct MatchFailureEntry {
    pub query: TrackQuery,
    pub title_norm: String,
    pub artists_norm: String,
    pub reason: &'static str,
    pub error: String,
}
