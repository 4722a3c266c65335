//! AI-assisted disambiguation when deterministic ranking finds nothing.
//!
//! Candidates are deduplicated on normalized title + artist (newest release
//! wins), embedded in a fixed prompt, and the model must answer with exactly
//! `{"matchFound": bool, "bestMatchId": id | null}`.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ResolveError, Result};
use crate::models::{Candidate, TrackQuery};
use crate::normalize::{normalize_opt, split_artists};
use crate::providers::{id_to_string, AiProvider, AiRequest};

/// Model answer contract.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiAnswer {
    pub match_found: bool,
    pub best_match_id: Value,
}

/// Candidate as presented to the model.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PromptCandidate<'a> {
    id: &'a str,
    title: &'a str,
    artist: &'a str,
    album: &'a str,
    release_date: &'a str,
}

fn dedup_key(candidate: &Candidate) -> String {
    let mut key = normalize_opt(candidate.title.as_deref());
    key.push_str(&normalize_opt(candidate.artist_name.as_deref()));
    key
}

/// Collapse candidates sharing normalized title + artist, keeping the one
/// with the greatest release date. First-seen order of keys is preserved.
pub fn dedup_candidates(candidates: &[Candidate]) -> Vec<Candidate> {
    let mut slots: FxHashMap<String, usize> = FxHashMap::default();
    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        match slots.get(&dedup_key(candidate)) {
            Some(&slot) => {
                if candidate.release_date_str() > kept[slot].release_date_str() {
                    kept[slot] = candidate.clone();
                }
            }
            None => {
                slots.insert(dedup_key(candidate), kept.len());
                kept.push(candidate.clone());
            }
        }
    }
    kept
}

/// Build the instruction sent to the model. Identical inputs give identical prompts.
pub fn build_prompt(query: &TrackQuery, candidates: &[Candidate]) -> String {
    let listed: Vec<PromptCandidate> = candidates
        .iter()
        .map(|c| PromptCandidate {
            id: &c.id,
            title: c.title_str(),
            artist: c.artist_str(),
            album: c.album_title.as_deref().unwrap_or(""),
            release_date: c.release_date_str(),
        })
        .collect();
    let candidates_json =
        serde_json::to_string_pretty(&listed).unwrap_or_else(|_| "[]".to_string());
    let artists_json = serde_json::to_string(&split_artists(&query.artists))
        .unwrap_or_else(|_| "[]".to_string());

    format!(
        "You are matching a song shown on a web page to a record in a music catalog.\n\
         \n\
         Original track:\n\
         - Title: {title}\n\
         - Artists: {artists}\n\
         - Individual artists: {artists_json}\n\
         \n\
         Catalog candidates (JSON):\n\
         {candidates_json}\n\
         \n\
         Rules:\n\
         1. Pick at most one candidate that is the same recording as the original track.\n\
         2. The title must refer to the same song; ignore annotations such as remaster, radio edit or live tags only when nothing better exists.\n\
         3. At least one of the original artists must correspond to the candidate's artist. The original may credit several artists; the candidate may credit only one of them.\n\
         4. If no candidate satisfies these rules, report that no match was found.\n\
         \n\
         Answer with a single JSON object and nothing else, no markdown and no explanation:\n\
         {{\"matchFound\": true or false, \"bestMatchId\": <candidate id> or null}}",
        title = query.title,
        artists = query.artists,
    )
}

/// Parse the model's text strictly: one JSON object of the agreed shape.
pub fn parse_answer(text: &str) -> Result<AiAnswer> {
    let value: Value = serde_json::from_str(text.trim())
        .map_err(|err| ResolveError::ResponseShape(format!("AI answer is not JSON: {err}")))?;
    if !value.is_object() {
        return Err(ResolveError::ResponseShape(
            "AI answer is not a JSON object".into(),
        ));
    }
    let answer: AiAnswer = serde_json::from_value(value)
        .map_err(|err| ResolveError::ResponseShape(format!("AI answer has wrong shape: {err}")))?;
    if !matches!(
        answer.best_match_id,
        Value::Null | Value::String(_) | Value::Number(_)
    ) {
        return Err(ResolveError::ResponseShape(format!(
            "bestMatchId must be an id or null, got {}",
            answer.best_match_id
        )));
    }
    Ok(answer)
}

/// Ids are equal as text, or as numbers when both sides parse (`42.0` == `"042"`).
fn ids_match(candidate_id: &str, wanted: &str) -> bool {
    let candidate_id = candidate_id.trim();
    if candidate_id == wanted {
        return true;
    }
    match (candidate_id.parse::<f64>(), wanted.parse::<f64>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Find the chosen id in the full (non-deduplicated) list; `42` matches `"42"`.
pub fn find_by_loose_id<'a>(candidates: &'a [Candidate], id: &Value) -> Option<&'a Candidate> {
    let wanted = id_to_string(id)?;
    candidates.iter().find(|c| ids_match(&c.id, &wanted))
}

/// Ask the model to choose among `candidates`.
///
/// `ai` is `None` when no credential is configured; that fails before any request.
pub fn disambiguate_with_ai(
    ai: Option<&dyn AiProvider>,
    query: &TrackQuery,
    candidates: &[Candidate],
) -> Result<Option<Candidate>> {
    let ai = ai.ok_or_else(|| {
        ResolveError::Configuration("AI fallback requires an API key".into())
    })?;

    let unique = dedup_candidates(candidates);
    log::info!(
        "AI disambiguation for '{}' / '{}': {} candidates ({} after dedup)",
        query.title,
        query.artists,
        candidates.len(),
        unique.len()
    );

    let request = AiRequest {
        prompt: build_prompt(query, &unique),
        temperature: 0.0,
    };
    let answer = parse_answer(&ai.complete(&request)?)?;

    if !answer.match_found {
        log::info!("AI found no match");
        return Ok(None);
    }

    let chosen = find_by_loose_id(candidates, &answer.best_match_id).cloned();
    if chosen.is_none() {
        log::warn!(
            "AI picked id {} which is not among the candidates",
            answer.best_match_id
        );
    }
    Ok(chosen)
}
