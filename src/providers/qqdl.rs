//! Catalog, album and link provider backed by the qqdl mirror API.
//!
//! Endpoints (relative to `catalog.base_url`):
//! - `/api/get-music?q=..&offset=..`           search (tracks and albums)
//! - `/api/get-album?album_id=..`              album tracklist
//! - `/api/download-music?track_id=..&quality=` direct media URL
//!
//! Every response is wrapped as `{ "success": bool, "data": ... }`.

use serde::Deserialize;

use crate::config::{CatalogConfig, HttpConfig, SearchKind};
use crate::error::{ResolveError, Result};
use crate::models::{Candidate, CandidateKind, QualityTier};
use crate::providers::{
    deserialize_id, deserialize_lenient_f64, CatalogProvider, LinkProvider, SearchProvider,
};

const USER_AGENT: &str = concat!("track-resolver/", env!("CARGO_PKG_VERSION"));

// ── API response types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiItems<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ApiSearchData {
    tracks: Option<ApiItems<ApiTrack>>,
    albums: Option<ApiItems<ApiAlbum>>,
}

#[derive(Debug, Deserialize)]
struct ApiNamed {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiImage {
    small: Option<String>,
    thumbnail: Option<String>,
}

impl ApiImage {
    fn url(&self) -> Option<String> {
        self.small.clone().or_else(|| self.thumbnail.clone())
    }
}

#[derive(Debug, Deserialize)]
struct ApiTrackAlbum {
    title: Option<String>,
    image: Option<ApiImage>,
    release_date_original: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    #[serde(deserialize_with = "deserialize_id")]
    id: String,
    title: Option<String>,
    performer: Option<ApiNamed>,
    artist: Option<ApiNamed>,
    album: Option<ApiTrackAlbum>,
    release_date_original: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_f64")]
    popularity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ApiAlbum {
    #[serde(deserialize_with = "deserialize_id")]
    id: String,
    title: Option<String>,
    artist: Option<ApiNamed>,
    image: Option<ApiImage>,
    release_date_original: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_f64")]
    popularity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ApiTrackRef {
    #[serde(deserialize_with = "deserialize_id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiAlbumData {
    tracks: Option<ApiItems<ApiTrackRef>>,
}

#[derive(Debug, Deserialize)]
struct ApiLinkData {
    url: Option<String>,
}

// ── Conversion ───────────────────────────────────────────────────────────────

impl From<ApiTrack> for Candidate {
    fn from(track: ApiTrack) -> Self {
        let (album_title, cover_url, album_date) = match track.album {
            Some(album) => (
                album.title,
                album.image.and_then(|i| i.url()),
                album.release_date_original,
            ),
            None => (None, None, None),
        };
        Candidate {
            id: track.id,
            kind: CandidateKind::Track,
            title: track.title,
            artist_name: track
                .performer
                .and_then(|p| p.name)
                .or_else(|| track.artist.and_then(|a| a.name)),
            album_title,
            release_date: track.release_date_original.or(album_date),
            popularity: track.popularity,
            cover_url,
        }
    }
}

impl From<ApiAlbum> for Candidate {
    fn from(album: ApiAlbum) -> Self {
        Candidate {
            id: album.id,
            kind: CandidateKind::Album,
            album_title: album.title.clone(),
            title: album.title,
            artist_name: album.artist.and_then(|a| a.name),
            release_date: album.release_date_original,
            popularity: album.popularity,
            cover_url: album.image.and_then(|i| i.url()),
        }
    }
}

// ── Response parsing ─────────────────────────────────────────────────────────

/// Parse a search body. `success: false` means "no results", not an error.
pub fn parse_search_response(body: &str, kind: SearchKind) -> Result<Vec<Candidate>> {
    let envelope: ApiEnvelope<ApiSearchData> = serde_json::from_str(body)?;
    if !envelope.success {
        return Ok(Vec::new());
    }
    let data = envelope
        .data
        .ok_or_else(|| ResolveError::ResponseShape("search response has no data".into()))?;

    let candidates = match kind {
        SearchKind::Track => data
            .tracks
            .map(|t| t.items.into_iter().map(Candidate::from).collect())
            .unwrap_or_default(),
        SearchKind::Album => data
            .albums
            .map(|a| a.items.into_iter().map(Candidate::from).collect())
            .unwrap_or_default(),
    };
    Ok(candidates)
}

pub fn parse_album_response(body: &str) -> Result<Option<String>> {
    let envelope: ApiEnvelope<ApiAlbumData> = serde_json::from_str(body)?;
    if !envelope.success {
        return Ok(None);
    }
    Ok(envelope
        .data
        .and_then(|d| d.tracks)
        .and_then(|t| t.items.into_iter().next())
        .map(|t| t.id))
}

pub fn parse_link_response(body: &str) -> Result<Option<String>> {
    let envelope: ApiEnvelope<ApiLinkData> = serde_json::from_str(body)?;
    if !envelope.success {
        return Ok(None);
    }
    Ok(envelope
        .data
        .and_then(|d| d.url)
        .filter(|url| !url.trim().is_empty()))
}

// ── Client ───────────────────────────────────────────────────────────────────

/// qqdl API client.
pub struct QqdlClient {
    base_url: String,
    search_kind: SearchKind,
    search_offset: u32,
    agent: ureq::Agent,
}

impl QqdlClient {
    pub fn new(catalog: &CatalogConfig, http: &HttpConfig) -> Self {
        Self {
            base_url: catalog.base_url.trim().trim_end_matches('/').to_string(),
            search_kind: catalog.search_kind,
            search_offset: catalog.search_offset,
            agent: ureq::AgentBuilder::new()
                .timeout(http.timeout())
                .user_agent(USER_AGENT)
                .build(),
        }
    }

    fn api_url(&self, method: &str, params: &[(&str, &str)]) -> String {
        let query: Vec<String> = params
            .iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
            .collect();
        format!("{}/api/{}?{}", self.base_url, method, query.join("&"))
    }

    fn get_text(&self, url: &str) -> Result<String> {
        self.agent
            .get(url)
            .call()?
            .into_string()
            .map_err(|err| ResolveError::Network(format!("failed to read response: {err}")))
    }
}

impl SearchProvider for QqdlClient {
    fn search(&self, query: &str) -> Result<Vec<Candidate>> {
        let offset = self.search_offset.to_string();
        let url = self.api_url("get-music", &[("q", query), ("offset", &offset)]);
        log::debug!("search: {}", url);
        parse_search_response(&self.get_text(&url)?, self.search_kind)
    }
}

impl CatalogProvider for QqdlClient {
    fn first_track_id(&self, album_id: &str) -> Result<Option<String>> {
        let url = self.api_url("get-album", &[("album_id", album_id)]);
        parse_album_response(&self.get_text(&url)?)
    }
}

impl LinkProvider for QqdlClient {
    fn resolve_url(&self, track_id: &str, tier: QualityTier) -> Result<Option<String>> {
        let quality = tier.code().to_string();
        let url = self.api_url(
            "download-music",
            &[("track_id", track_id), ("quality", &quality)],
        );
        parse_link_response(&self.get_text(&url)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_BODY: &str = r#"{
        "success": true,
        "data": {
            "tracks": { "items": [
                {
                    "id": 64868955,
                    "title": "Blinding Lights",
                    "performer": { "name": "The Weeknd" },
                    "album": {
                        "title": "After Hours",
                        "image": { "small": "https://img/small.jpg" },
                        "release_date_original": "2020-03-20"
                    },
                    "popularity": 97
                },
                { "id": "abc", "title": null }
            ]},
            "albums": { "items": [
                {
                    "id": "0060254789",
                    "title": "After Hours",
                    "artist": { "name": "The Weeknd" },
                    "image": { "thumbnail": "https://img/thumb.jpg" },
                    "release_date_original": "2020-03-20"
                }
            ]}
        }
    }"#;

    #[test]
    fn test_parse_track_search() {
        let candidates = parse_search_response(SEARCH_BODY, SearchKind::Track).unwrap();
        assert_eq!(candidates.len(), 2);
        let first = &candidates[0];
        assert_eq!(first.id, "64868955");
        assert_eq!(first.kind, CandidateKind::Track);
        assert_eq!(first.artist_str(), "The Weeknd");
        assert_eq!(first.album_title.as_deref(), Some("After Hours"));
        assert_eq!(first.release_date.as_deref(), Some("2020-03-20"));
        assert_eq!(first.popularity, Some(97.0));
        assert_eq!(first.cover_url.as_deref(), Some("https://img/small.jpg"));
        assert_eq!(candidates[1].title, None);
    }

    #[test]
    fn test_parse_album_search() {
        let candidates = parse_search_response(SEARCH_BODY, SearchKind::Album).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].kind, CandidateKind::Album);
        assert_eq!(candidates[0].id, "0060254789");
        assert_eq!(candidates[0].cover_url.as_deref(), Some("https://img/thumb.jpg"));
    }

    #[test]
    fn test_unsuccessful_search_is_empty() {
        let body = r#"{"success": false, "error": "rate limited"}"#;
        assert!(parse_search_response(body, SearchKind::Track).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_search_is_shape_error() {
        let err = parse_search_response("<html>", SearchKind::Track).unwrap_err();
        assert!(matches!(err, ResolveError::ResponseShape(_)));

        let err = parse_search_response(r#"{"success": true}"#, SearchKind::Track).unwrap_err();
        assert!(matches!(err, ResolveError::ResponseShape(_)));

        let body = r#"{"success": true, "data": {"tracks": {"items": [{"title": "no id"}]}}}"#;
        let err = parse_search_response(body, SearchKind::Track).unwrap_err();
        assert!(matches!(err, ResolveError::ResponseShape(_)));
    }

    #[test]
    fn test_parse_link() {
        let body = r#"{"success": true, "data": {"url": "https://cdn/track.flac"}}"#;
        assert_eq!(
            parse_link_response(body).unwrap().as_deref(),
            Some("https://cdn/track.flac")
        );
        assert_eq!(parse_link_response(r#"{"success": false}"#).unwrap(), None);
        assert_eq!(
            parse_link_response(r#"{"success": true, "data": {"url": ""}}"#).unwrap(),
            None
        );
    }

    #[test]
    fn test_parse_album_first_track() {
        let body = r#"{"success": true, "data": {"tracks": {"items": [{"id": 11}, {"id": 12}]}}}"#;
        assert_eq!(parse_album_response(body).unwrap().as_deref(), Some("11"));
        let empty = r#"{"success": true, "data": {"tracks": {"items": []}}}"#;
        assert_eq!(parse_album_response(empty).unwrap(), None);
    }

    #[test]
    fn test_missing_items_list_is_empty() {
        let body = r#"{"success": true, "data": {"tracks": {"total": 0}, "albums": {}}}"#;
        assert!(parse_search_response(body, SearchKind::Track).unwrap().is_empty());
        assert!(parse_search_response(body, SearchKind::Album).unwrap().is_empty());
        let album = r#"{"success": true, "data": {"tracks": {}}}"#;
        assert_eq!(parse_album_response(album).unwrap(), None);
    }

    #[test]
    fn test_api_url_encodes_query() {
        let client = QqdlClient::new(
            &CatalogConfig {
                base_url: "https://example.site/".into(),
                ..Default::default()
            },
            &HttpConfig::default(),
        );
        assert_eq!(
            client.api_url("get-music", &[("q", "AC/DC & Co"), ("offset", "0")]),
            "https://example.site/api/get-music?q=AC%2FDC%20%26%20Co&offset=0"
        );
    }
}
