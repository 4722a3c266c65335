//! Explain a ranking decision for an offline fixture
//! Usage: cargo run --release --bin explain-rank -- <fixture.json> [--config path]
//!
//! Fixture: {"query": {"title", "artists"}, "candidates": [{"id", "title", "artistName", ...}]}

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

use track_resolver::config::Config;
use track_resolver::models::{Candidate, TrackQuery};
use track_resolver::ranking::{is_accepted, prepare, rank_with, score_candidate};

#[derive(Parser)]
#[command(name = "explain-rank")]
#[command(about = "Print every scored candidate and the ranker's pick")]
struct Args {
    fixture: PathBuf,

    /// Read [matching] thresholds from this config file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Deserialize)]
struct Fixture {
    query: TrackQuery,
    candidates: Vec<Candidate>,
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let cut: String = s.chars().take(width.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::default(),
    };
    let matching = config.matching;

    let json = std::fs::read_to_string(&args.fixture)
        .with_context(|| format!("Failed to read {}", args.fixture.display()))?;
    let fixture: Fixture = serde_json::from_str(&json).context("Invalid fixture")?;

    let title_norm = prepare(&matching, Some(&fixture.query.title));
    let artists_norm = prepare(&matching, Some(&fixture.query.artists));

    println!("Query: '{}' by '{}'", fixture.query.title, fixture.query.artists);
    println!("Normalized: '{}' / '{}'", title_norm, artists_norm);
    println!(
        "Thresholds: title > {:.2}, artist > {:.2}\n",
        matching.min_title_similarity, matching.min_artist_similarity
    );
    println!(
        "{:<12} {:<32} {:<24} {:>6} {:>6} {:>6}  VERDICT",
        "ID", "TITLE", "ARTIST", "T.SIM", "A.SIM", "SCORE"
    );
    println!("{:-<104}", "");

    for candidate in &fixture.candidates {
        let scored = score_candidate(&matching, &title_norm, &artists_norm, candidate);
        println!(
            "{:<12} {:<32} {:<24} {:>6.3} {:>6.3} {:>6.3}  {}",
            truncate(&candidate.id, 12),
            truncate(candidate.title_str(), 32),
            truncate(candidate.artist_str(), 24),
            scored.title_sim,
            scored.artist_sim,
            scored.combined_score,
            if is_accepted(&matching, &scored) {
                "pass"
            } else {
                "reject"
            }
        );
    }

    println!();
    match rank_with(&matching, &fixture.query, &fixture.candidates) {
        Some(best) => {
            println!(
                "Pick: {} '{}' by '{}' (score {:.3})",
                best.candidate.id,
                best.candidate.title_str(),
                best.candidate.artist_str(),
                best.combined_score
            );
            if let Some(album_sim) = best.album_title_sim {
                println!("  decided by tie-break, album title similarity {:.3}", album_sim);
            }
        }
        None => println!("Pick: none (AI fallback would run if configured)"),
    }

    Ok(())
}
