//! Download collaborator: turns a resolved track id and tier into a file.
//!
//! The desired filename is decided when a download starts but only needed when
//! the body is written. `PendingNames` bridges the two: a name is inserted at
//! start and removed by the first (and only) read.

use anyhow::{bail, Context};
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::HttpConfig;
use crate::error::{ResolveError, Result};
use crate::models::{QualityTier, TrackQuery};
use crate::providers::LinkProvider;

/// Characters rejected by common filesystems.
static UNSAFE_FILENAME_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[\\/*?:"<>|]"#).unwrap());

/// "<stem>.<ext>" with filesystem-hostile characters replaced by `_`.
pub fn download_filename(stem: &str, tier: QualityTier) -> String {
    let name = format!("{}.{}", stem.trim(), tier.extension());
    UNSAFE_FILENAME_CHARS.replace_all(&name, "_").to_string()
}

/// Filename stem for a track: "<title> - <artists>".
pub fn filename_stem(title: &str, artists: &str) -> String {
    format!("{} - {}", title.trim(), artists.trim())
}

/// Stem for a download: an explicit name, else the strings as shown on the
/// page, not the catalog's spelling of them.
pub fn download_stem(query: &TrackQuery, name: Option<&str>) -> String {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => filename_stem(&query.title, &query.artists),
    }
}

// ============================================================================
// Pending Filename Table
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DownloadHandle(u64);

/// Handle -> desired filename, bounded by take-on-read.
#[derive(Debug, Default)]
pub struct PendingNames {
    names: Mutex<FxHashMap<DownloadHandle, String>>,
}

impl PendingNames {
    pub fn insert(&self, handle: DownloadHandle, name: String) {
        if let Ok(mut names) = self.names.lock() {
            names.insert(handle, name);
        }
    }

    /// Remove and return the name; a second call for the same handle yields `None`.
    pub fn take(&self, handle: DownloadHandle) -> Option<String> {
        self.names.lock().ok()?.remove(&handle)
    }

    pub fn len(&self) -> usize {
        self.names.lock().map(|n| n.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Downloader
// ============================================================================

/// A download whose URL is known and whose filename is parked in `PendingNames`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDownload {
    pub handle: DownloadHandle,
    pub url: String,
}

/// Per-read timeout, no overall deadline: FLAC bodies can take minutes.
fn download_agent(http: &HttpConfig) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(http.timeout())
        .timeout_read(http.timeout())
        .build()
}

pub struct Downloader {
    link: Arc<dyn LinkProvider>,
    agent: ureq::Agent,
    pending: PendingNames,
    next_handle: AtomicU64,
}

impl Downloader {
    pub fn new(link: Arc<dyn LinkProvider>, http: &HttpConfig) -> Self {
        Self {
            link,
            agent: download_agent(http),
            pending: PendingNames::default(),
            next_handle: AtomicU64::new(1),
        }
    }

    pub fn pending(&self) -> &PendingNames {
        &self.pending
    }

    /// Resolve the media URL and park the filename under a fresh handle.
    pub fn start(&self, track_id: &str, tier: QualityTier, stem: &str) -> Result<PendingDownload> {
        let url = self.link.resolve_url(track_id, tier)?.ok_or_else(|| {
            ResolveError::NotFound(format!(
                "Could not get a {} download link for track {}",
                tier.label(),
                track_id
            ))
        })?;
        let handle = DownloadHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let name = download_filename(stem, tier);
        log::info!("Download {:?} started, storing filename \"{}\"", handle, name);
        self.pending.insert(handle, name);
        Ok(PendingDownload { handle, url })
    }

    /// Fetch the body into `dir`, named by the parked filename.
    pub fn finish(&self, download: &PendingDownload, dir: &Path) -> anyhow::Result<PathBuf> {
        let Some(name) = self.pending.take(download.handle) else {
            bail!("No pending filename for download {:?}", download.handle);
        };
        let response = self
            .agent
            .get(&download.url)
            .call()
            .map_err(ResolveError::from)
            .context("Download request failed")?;
        save_to(dir, &name, &mut response.into_reader())
    }
}

/// First free path for `name` in `dir`: "a.mp3", "a (1).mp3", "a (2).mp3", ...
pub fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{ext}")),
        None => (name, String::new()),
    };
    (1..)
        .map(|n| dir.join(format!("{stem} ({n}){ext}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Stream `body` into a fresh file under `dir`.
pub fn save_to(dir: &Path, name: &str, body: &mut dyn Read) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = unique_path(dir, name);
    let mut file: File = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    io::copy(body, &mut file).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
