//! Batch resolution of a scraped tracklist into a SQLite file.
//!
//! Phases:
//! 1. Read the JSON array of queries
//! 2. Resolve every query on the rayon pool
//! 3. Write `resolutions` and `match_failures` in batched transactions

use anyhow::{Context, Result};
use rayon::prelude::*;
use rusqlite::{params, Connection};
use std::path::Path;
use std::time::Instant;

use crate::error::ResolveError;
use crate::models::{BatchStats, MatchFailureEntry, ResolvedTrack, TrackQuery};
use crate::normalize::normalize;
use crate::progress::{create_spinner, ResolveProgress};
use crate::resolver::{CancelToken, Resolver};
use crate::safety::validate_output_path;

const WRITE_BATCH_SIZE: usize = 1000;
const LOG_INTERVAL: u64 = 25;

/// Everything a batch run produced, in input order.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub resolutions: Vec<(TrackQuery, ResolvedTrack)>,
    pub failures: Vec<MatchFailureEntry>,
    pub stats: BatchStats,
}

pub fn parse_queries(json: &str) -> Result<Vec<TrackQuery>> {
    serde_json::from_str(json).context("Input must be a JSON array of {title, artists}")
}

pub fn read_queries(path: &Path) -> Result<Vec<TrackQuery>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_queries(&json)
}

fn failure_entry(query: &TrackQuery, err: &ResolveError) -> MatchFailureEntry {
    MatchFailureEntry {
        query: query.clone(),
        title_norm: normalize(&query.title),
        artists_norm: normalize(&query.artists),
        reason: err.reason(),
        error: err.to_string(),
    }
}

/// Resolve all queries in parallel. Queries still pending when `cancel`
/// fires are counted as cancelled and written nowhere.
pub fn resolve_all(
    resolver: &Resolver,
    queries: &[TrackQuery],
    force_ai: bool,
    cancel: &CancelToken,
) -> BatchOutcome {
    let start = Instant::now();
    let progress = ResolveProgress::new(queries.len() as u64, LOG_INTERVAL);

    let results: Vec<_> = queries
        .par_iter()
        .map(|query| {
            let result = resolver.resolve_cancellable(query, force_ai, cancel);
            progress.record(matches!(result, Ok(Some(_))));
            (query, result)
        })
        .collect();

    let mut outcome = BatchOutcome::default();
    outcome.stats.total_queries = queries.len();

    for (query, result) in results {
        match result {
            Ok(Some(resolved)) => {
                outcome.stats.record_match(&resolved);
                outcome.resolutions.push((query.clone(), resolved));
            }
            Ok(None) => outcome.stats.cancelled += 1,
            Err(err) => {
                log::debug!("'{}' / '{}' failed: {}", query.title, query.artists, err);
                outcome.stats.record_failure(&err);
                outcome.failures.push(failure_entry(query, &err));
            }
        }
    }

    outcome.stats.elapsed_seconds = start.elapsed().as_secs_f64();
    progress.finish(start.elapsed());
    outcome
}

pub fn write_output(conn: &mut Connection, outcome: &BatchOutcome) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;

        CREATE TABLE IF NOT EXISTS resolutions (
            id INTEGER PRIMARY KEY,
            query_title TEXT NOT NULL,
            query_artists TEXT NOT NULL,
            track_id TEXT NOT NULL,
            found_title TEXT NOT NULL,
            found_artists TEXT NOT NULL,
            album_title TEXT,
            release_date TEXT,
            cover_url TEXT,
            has_mp3_320 INTEGER NOT NULL,
            has_flac INTEGER NOT NULL,
            used_ai INTEGER NOT NULL,
            confidence REAL
        );

        CREATE TABLE IF NOT EXISTS match_failures (
            id INTEGER PRIMARY KEY,
            query_title TEXT NOT NULL,
            query_artists TEXT NOT NULL,
            title_norm TEXT NOT NULL,
            artists_norm TEXT NOT NULL,
            reason TEXT NOT NULL,
            error TEXT NOT NULL
        );",
    )?;

    let spinner = create_spinner("Writing results");

    for chunk in outcome.resolutions.chunks(WRITE_BATCH_SIZE) {
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO resolutions (query_title, query_artists, track_id, found_title,
                     found_artists, album_title, release_date, cover_url, has_mp3_320, has_flac, used_ai, confidence)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for (query, resolved) in chunk {
                let c = &resolved.candidate;
                stmt.execute(params![
                    query.title,
                    query.artists,
                    resolved.track_id,
                    c.title_str(),
                    c.artist_str(),
                    c.album_title,
                    c.release_date,
                    c.cover_url,
                    resolved.qualities.mp3_320,
                    resolved.qualities.flac,
                    resolved.used_ai,
                    resolved.confidence,
                ])?;
            }
        }
        tx.commit()?;
    }

    for chunk in outcome.failures.chunks(WRITE_BATCH_SIZE) {
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO match_failures (query_title, query_artists, title_norm, artists_norm, reason, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for entry in chunk {
                stmt.execute(params![
                    entry.query.title,
                    entry.query.artists,
                    entry.title_norm,
                    entry.artists_norm,
                    entry.reason,
                    entry.error,
                ])?;
            }
        }
        tx.commit()?;
    }

    spinner.finish_with_message(format!(
        "Wrote {} resolutions, {} failures",
        outcome.resolutions.len(),
        outcome.failures.len()
    ));
    Ok(())
}

/// Read `input`, resolve it, and replace `output` with the results.
pub fn run_batch(
    resolver: &Resolver,
    input: &Path,
    output: &Path,
    force_ai: bool,
    cancel: &CancelToken,
) -> Result<BatchStats> {
    validate_output_path(output, "resolved", &[input])?;

    let queries = read_queries(input)?;
    log::info!("Read {} queries from {}", queries.len(), input.display());

    let outcome = resolve_all(resolver, &queries, force_ai, cancel);

    if output.exists() {
        std::fs::remove_file(output).context("Failed to remove existing output file")?;
    }
    let mut conn = Connection::open(output).context("Failed to create output database")?;
    write_output(&mut conn, &outcome)?;

    outcome.stats.log_phase("batch");
    Ok(outcome.stats)
}
