//! Resolution orchestrator: one query in, one `ResolvedTrack` (or error) out.
//!
//! ```text
//! Searching ──► NotFound
//!     │
//!     ▼
//! Ranking ──► NeedsAi ──► NotFound
//!     │           │
//!     ▼           ▼
//! Matched ──► ProbingQualities ──► Done
//! ```
//!
//! Nothing is retried internally. A caller that got `not_found` may re-invoke
//! with `force_ai = true`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::ai::disambiguate_with_ai;
use crate::config::{Config, MatchingConfig};
use crate::error::{ResolveError, Result};
use crate::models::{Candidate, CandidateKind, ResolvedTrack, TrackQuery};
use crate::normalize::normalize;
use crate::providers::{
    AiProvider, CatalogProvider, GeminiClient, LinkProvider, QqdlClient, SearchProvider,
};
use crate::quality::probe_qualities;
use crate::ranking::rank_with;

/// Cooperative cancellation flag, checked before every network step.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Searching,
    Ranking,
    NeedsAi,
    Matched,
    ProbingQualities,
    Done,
}

/// Search text sent to the catalog: normalized title and artists.
pub fn search_text(query: &TrackQuery) -> String {
    format!("{} {}", normalize(&query.title), normalize(&query.artists))
        .trim()
        .to_string()
}

pub struct Resolver {
    search: Arc<dyn SearchProvider>,
    catalog: Arc<dyn CatalogProvider>,
    link: Arc<dyn LinkProvider>,
    ai: Option<Arc<dyn AiProvider>>,
    matching: MatchingConfig,
}

impl Resolver {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        catalog: Arc<dyn CatalogProvider>,
        link: Arc<dyn LinkProvider>,
        matching: MatchingConfig,
    ) -> Self {
        Self {
            search,
            catalog,
            link,
            ai: None,
            matching,
        }
    }

    /// Configure the AI provider. Its presence is what "credential configured" means.
    pub fn with_ai(mut self, ai: Arc<dyn AiProvider>) -> Self {
        self.ai = Some(ai);
        self
    }

    /// Wire the qqdl catalog and, when a key is present, the Gemini fallback.
    pub fn from_config(config: &Config) -> Self {
        let qqdl = Arc::new(QqdlClient::new(&config.catalog, &config.http));
        let resolver = Self::new(qqdl.clone(), qqdl.clone(), qqdl, config.matching);
        match GeminiClient::from_config(&config.ai, &config.http) {
            Some(gemini) => resolver.with_ai(Arc::new(gemini)),
            None => resolver,
        }
    }

    pub fn has_ai(&self) -> bool {
        self.ai.is_some()
    }

    pub fn link_provider(&self) -> Arc<dyn LinkProvider> {
        Arc::clone(&self.link)
    }

    pub fn resolve(&self, query: &TrackQuery, force_ai: bool) -> Result<ResolvedTrack> {
        self.run(query, force_ai, None)?
            .ok_or_else(|| ResolveError::NotFound("Resolution was cancelled".into()))
    }

    /// Like `resolve`, but returns `Ok(None)` once `cancel` fires.
    pub fn resolve_cancellable(
        &self,
        query: &TrackQuery,
        force_ai: bool,
        cancel: &CancelToken,
    ) -> Result<Option<ResolvedTrack>> {
        self.run(query, force_ai, Some(cancel))
    }

    fn run(
        &self,
        query: &TrackQuery,
        force_ai: bool,
        cancel: Option<&CancelToken>,
    ) -> Result<Option<ResolvedTrack>> {
        let cancelled = || cancel.is_some_and(CancelToken::is_cancelled);
        let enter = |stage: Stage| {
            log::debug!("'{}' / '{}': {:?}", query.title, query.artists, stage);
        };

        if force_ai && self.ai.is_none() {
            return Err(ResolveError::Configuration(
                "AI search was requested but no API key is configured".into(),
            ));
        }

        enter(Stage::Searching);
        if cancelled() {
            return Ok(None);
        }
        let text = search_text(query);
        let candidates = self.search.search(&text)?;
        if candidates.is_empty() {
            return Err(ResolveError::NotFound("Track not found".into()));
        }

        enter(Stage::Ranking);
        let ranked = if force_ai {
            None
        } else {
            rank_with(&self.matching, query, &candidates)
        };

        let (chosen, used_ai, confidence) = match ranked {
            Some(best) => {
                log::info!(
                    "Matched '{}' -> {} (score {:.3})",
                    query.title,
                    best.candidate.id,
                    best.combined_score
                );
                (best.candidate, false, Some(best.combined_score))
            }
            None if force_ai || self.ai.is_some() => {
                enter(Stage::NeedsAi);
                if cancelled() {
                    return Ok(None);
                }
                match disambiguate_with_ai(self.ai.as_deref(), query, &candidates)? {
                    Some(candidate) => (candidate, true, None),
                    None => {
                        return Err(ResolveError::NotFound(
                            "AI could not find a matching track".into(),
                        ))
                    }
                }
            }
            None => {
                return Err(ResolveError::NotFound(format!(
                    "No good match found among {} results",
                    candidates.len()
                )))
            }
        };

        enter(Stage::Matched);
        if cancelled() {
            return Ok(None);
        }
        let track_id = self.track_id_for(&chosen)?;

        enter(Stage::ProbingQualities);
        if cancelled() {
            return Ok(None);
        }
        let qualities = probe_qualities(self.link.as_ref(), &track_id);

        enter(Stage::Done);
        Ok(Some(ResolvedTrack {
            track_id,
            candidate: chosen,
            qualities,
            used_ai,
            confidence,
        }))
    }

    /// Albums are probed through their first track.
    fn track_id_for(&self, candidate: &Candidate) -> Result<String> {
        match candidate.kind {
            CandidateKind::Track => Ok(candidate.id.clone()),
            CandidateKind::Album => self
                .catalog
                .first_track_id(&candidate.id)?
                .ok_or_else(|| ResolveError::IdentifierResolution(candidate.id.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MatchResult, QualityAvailability, QualityTier};
    use crate::providers::AiRequest;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    // ── Fakes ────────────────────────────────────────────────────────────────

    #[derive(Default)]
    struct FakeCatalog {
        results: Vec<Candidate>,
        fail: bool,
        album_tracks: Vec<(String, String)>,
        searches: Mutex<Vec<String>>,
    }

    impl SearchProvider for FakeCatalog {
        fn search(&self, query: &str) -> Result<Vec<Candidate>> {
            self.searches.lock().unwrap().push(query.to_string());
            if self.fail {
                return Err(ResolveError::Network("search returned status 503".into()));
            }
            Ok(self.results.clone())
        }
    }

    impl CatalogProvider for FakeCatalog {
        fn first_track_id(&self, album_id: &str) -> Result<Option<String>> {
            Ok(self
                .album_tracks
                .iter()
                .find(|(album, _)| album == album_id)
                .map(|(_, track)| track.clone()))
        }
    }

    struct FakeLinks {
        flac: bool,
        probed: Mutex<Vec<(String, QualityTier)>>,
    }

    impl LinkProvider for FakeLinks {
        fn resolve_url(&self, track_id: &str, tier: QualityTier) -> Result<Option<String>> {
            self.probed.lock().unwrap().push((track_id.to_string(), tier));
            match tier {
                QualityTier::Mp3_320 => Ok(Some(format!("https://cdn/{track_id}.mp3"))),
                QualityTier::Flac if self.flac => Ok(Some(format!("https://cdn/{track_id}.flac"))),
                QualityTier::Flac => Ok(None),
            }
        }
    }

    struct FakeAi {
        reply: String,
        calls: AtomicUsize,
    }

    impl AiProvider for FakeAi {
        fn complete(&self, _request: &AiRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    struct Harness {
        catalog: Arc<FakeCatalog>,
        links: Arc<FakeLinks>,
        ai: Arc<FakeAi>,
    }

    impl Harness {
        fn new(results: Vec<Candidate>) -> Self {
            Self {
                catalog: Arc::new(FakeCatalog {
                    results,
                    ..Default::default()
                }),
                links: Arc::new(FakeLinks {
                    flac: true,
                    probed: Mutex::new(Vec::new()),
                }),
                ai: Arc::new(FakeAi {
                    reply: r#"{"matchFound": false, "bestMatchId": null}"#.into(),
                    calls: AtomicUsize::new(0),
                }),
            }
        }

        fn ai_reply(mut self, reply: &str) -> Self {
            self.ai = Arc::new(FakeAi {
                reply: reply.to_string(),
                calls: AtomicUsize::new(0),
            });
            self
        }

        fn resolver(&self, with_ai: bool) -> Resolver {
            let resolver = Resolver::new(
                self.catalog.clone(),
                self.catalog.clone(),
                self.links.clone(),
                MatchingConfig::default(),
            );
            if with_ai {
                resolver.with_ai(self.ai.clone())
            } else {
                resolver
            }
        }

        fn search_count(&self) -> usize {
            self.catalog.searches.lock().unwrap().len()
        }

        fn ai_calls(&self) -> usize {
            self.ai.calls.load(Ordering::SeqCst)
        }
    }

    fn candidate(id: &str, title: &str, artist: &str) -> Candidate {
        Candidate {
            id: id.to_string(),
            title: Some(title.to_string()),
            artist_name: Some(artist.to_string()),
            ..Default::default()
        }
    }

    fn blinding_lights() -> TrackQuery {
        TrackQuery::new("Blinding Lights (Radio Edit)", "The Weeknd")
    }

    // ── Scenarios ────────────────────────────────────────────────────────────

    #[test]
    fn test_scenario_a_ranker_match() {
        let h = Harness::new(vec![
            candidate("1", "Blinding Lights", "The Weeknd"),
            candidate("2", "Lights Down Low", "Weekend Crew"),
        ]);
        let resolved = h.resolver(true).resolve(&blinding_lights(), false).unwrap();

        assert_eq!(resolved.track_id, "1");
        assert!(!resolved.used_ai);
        assert_eq!(resolved.confidence, Some(1.0));
        assert_eq!(
            resolved.qualities,
            QualityAvailability {
                mp3_320: true,
                flac: true
            }
        );
        assert_eq!(
            h.catalog.searches.lock().unwrap().as_slice(),
            ["Blinding Lights The Weeknd"]
        );
        assert_eq!(h.ai_calls(), 0);
    }

    #[test]
    fn test_scenario_b_no_results_is_not_found() {
        let h = Harness::new(Vec::new());
        let err = h.resolver(true).resolve(&blinding_lights(), false).unwrap_err();
        assert_eq!(err.reason(), "not_found");

        let json = serde_json::to_value(MatchResult::from(err)).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["reason"], "not_found");
        assert_eq!(h.ai_calls(), 0);
    }

    #[test]
    fn test_scenario_c_automatic_ai_fallback() {
        let h = Harness::new(vec![
            candidate("41", "Blinding Lights - Chromatics Remix", "Chromatics"),
            candidate("42", "Blinding Lights", "Abel Tesfaye"),
        ])
        .ai_reply(r#"{"matchFound": true, "bestMatchId": "42"}"#);

        let resolved = h.resolver(true).resolve(&blinding_lights(), false).unwrap();
        assert_eq!(resolved.track_id, "42");
        assert!(resolved.used_ai);
        assert_eq!(resolved.confidence, None);
        assert_eq!(h.ai_calls(), 1);

        let json = serde_json::to_value(MatchResult::from(resolved)).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["usedAI"], true);
        assert_eq!(json["trackId"], "42");
    }

    #[test]
    fn test_scenario_d_forced_ai_without_credential() {
        let h = Harness::new(vec![candidate("1", "Blinding Lights", "The Weeknd")]);
        let err = h.resolver(false).resolve(&blinding_lights(), true).unwrap_err();
        assert!(matches!(err, ResolveError::Configuration(_)));
        assert_eq!(err.reason(), "error");
        assert!(h.search_count() <= 1);
        assert_eq!(h.ai_calls(), 0);
        assert!(h.links.probed.lock().unwrap().is_empty());
    }

    // ── Fallback policy ──────────────────────────────────────────────────────

    #[test]
    fn test_ranker_miss_without_credential_is_not_found() {
        let h = Harness::new(vec![candidate("1", "Something Else", "Other Artist")]);
        let err = h.resolver(false).resolve(&blinding_lights(), false).unwrap_err();
        assert!(err.is_not_found());
        assert!(h.links.probed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_forced_ai_skips_ranker_hit() {
        let h = Harness::new(vec![
            candidate("1", "Blinding Lights", "The Weeknd"),
            candidate("2", "Blinding Lights", "The Weeknd"),
        ])
        .ai_reply(r#"{"matchFound": true, "bestMatchId": 2}"#);
        let resolved = h.resolver(true).resolve(&blinding_lights(), true).unwrap();
        assert_eq!(resolved.track_id, "2");
        assert!(resolved.used_ai);
    }

    #[test]
    fn test_ai_declines_is_not_found() {
        let h = Harness::new(vec![candidate("1", "Something Else", "Other Artist")]);
        let err = h.resolver(true).resolve(&blinding_lights(), false).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(h.ai_calls(), 1);
    }

    #[test]
    fn test_ai_shape_error_is_terminal_error() {
        let h = Harness::new(vec![candidate("1", "Something Else", "Other Artist")])
            .ai_reply("I think it's the first one");
        let err = h.resolver(true).resolve(&blinding_lights(), false).unwrap_err();
        assert!(matches!(err, ResolveError::ResponseShape(_)));
        assert_eq!(err.reason(), "error");
    }

    #[test]
    fn test_search_failure_is_terminal_error() {
        let h = Harness {
            catalog: Arc::new(FakeCatalog {
                fail: true,
                ..Default::default()
            }),
            ..Harness::new(Vec::new())
        };
        let err = h.resolver(true).resolve(&blinding_lights(), false).unwrap_err();
        assert!(matches!(err, ResolveError::Network(_)));
        assert_eq!(h.ai_calls(), 0);
    }

    // ── Album reduction ──────────────────────────────────────────────────────

    fn album(id: &str, title: &str, artist: &str) -> Candidate {
        Candidate {
            kind: CandidateKind::Album,
            ..candidate(id, title, artist)
        }
    }

    #[test]
    fn test_album_match_probes_first_track() {
        let h = Harness {
            catalog: Arc::new(FakeCatalog {
                results: vec![album("alb-1", "Blinding Lights", "The Weeknd")],
                album_tracks: vec![("alb-1".into(), "trk-9".into())],
                ..Default::default()
            }),
            ..Harness::new(Vec::new())
        };
        let resolved = h.resolver(false).resolve(&blinding_lights(), false).unwrap();
        assert_eq!(resolved.track_id, "trk-9");
        assert_eq!(resolved.candidate.id, "alb-1");
        let probed = h.links.probed.lock().unwrap();
        assert_eq!(probed.len(), 2);
        assert!(probed.iter().all(|(id, _)| id == "trk-9"));
    }

    #[test]
    fn test_album_without_tracks_is_identifier_error() {
        let h = Harness {
            catalog: Arc::new(FakeCatalog {
                results: vec![album("alb-1", "Blinding Lights", "The Weeknd")],
                ..Default::default()
            }),
            ..Harness::new(Vec::new())
        };
        let err = h.resolver(false).resolve(&blinding_lights(), false).unwrap_err();
        assert!(matches!(err, ResolveError::IdentifierResolution(ref id) if id == "alb-1"));
        assert!(h.links.probed.lock().unwrap().is_empty());
    }

    // ── Cancellation ─────────────────────────────────────────────────────────

    #[test]
    fn test_cancelled_before_search_does_nothing() {
        let h = Harness::new(vec![candidate("1", "Blinding Lights", "The Weeknd")]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = h
            .resolver(true)
            .resolve_cancellable(&blinding_lights(), false, &cancel)
            .unwrap();
        assert!(outcome.is_none());
        assert_eq!(h.search_count(), 0);
    }

    #[test]
    fn test_uncancelled_token_resolves() {
        let h = Harness::new(vec![candidate("1", "Blinding Lights", "The Weeknd")]);
        let outcome = h
            .resolver(false)
            .resolve_cancellable(&blinding_lights(), false, &CancelToken::new())
            .unwrap();
        assert_eq!(outcome.unwrap().track_id, "1");
    }

    #[test]
    fn test_search_text_is_normalized() {
        assert_eq!(
            search_text(&TrackQuery::new("  Song [Live] ", "Artist (Band)")),
            "Song Artist"
        );
    }
}
