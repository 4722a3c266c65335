use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Instant;

use track_resolver::batch::run_batch;
use track_resolver::config::Config;
use track_resolver::download::{download_stem, Downloader};
use track_resolver::models::{confidence_label, MatchResult, QualityTier, ResolvedTrack, TrackQuery};
use track_resolver::progress::{create_spinner, format_duration, set_log_only};
use track_resolver::providers::{GeminiClient, KeyStatus};
use track_resolver::resolver::{CancelToken, Resolver};

#[derive(Parser)]
#[command(name = "track-resolver")]
#[command(about = "Resolve page-scraped track titles to downloadable catalog tracks")]
struct Args {
    /// Config file (default: ~/.config/track-resolver/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// AI API key, overrides config and GEMINI_API_KEY
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Hide progress bars and log periodic progress lines instead
    #[arg(long, global = true)]
    log_only: bool,

    /// Log ranking decisions and pipeline stages
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a single track
    Resolve {
        title: String,
        artists: String,

        /// Skip the ranker and let the AI choose
        #[arg(long)]
        force_ai: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve a JSON tracklist into a SQLite file
    Batch {
        input: PathBuf,

        /// Output path, must contain "resolved"
        output: PathBuf,

        #[arg(long, default_value = "0")]
        workers: usize,

        #[arg(long)]
        force_ai: bool,

        /// Write batch statistics as JSON
        #[arg(long)]
        stats: Option<PathBuf>,
    },

    /// Validate the configured AI API key
    CheckKey,

    /// Resolve a track and download it
    Download {
        title: String,
        artists: String,

        #[arg(long, value_enum, default_value = "flac")]
        quality: QualityArg,

        #[arg(long, default_value = ".")]
        dir: PathBuf,

        #[arg(long)]
        force_ai: bool,

        /// Filename stem (default: "<title> - <artists>" as given)
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum QualityArg {
    Mp3,
    Flac,
}

impl From<QualityArg> for QualityTier {
    fn from(arg: QualityArg) -> Self {
        match arg {
            QualityArg::Mp3 => QualityTier::Mp3_320,
            QualityArg::Flac => QualityTier::Flac,
        }
    }
}

fn init_logging(verbose: bool) {
    let mut clog = colog::default_builder();
    clog.filter(
        None,
        if verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        },
    );
    clog.init();
}

fn print_resolved(resolved: &ResolvedTrack) {
    let qualities: Vec<&str> = QualityTier::ALL
        .iter()
        .filter(|tier| resolved.qualities.has(**tier))
        .map(|tier| tier.label())
        .collect();

    println!("{:=<60}", "");
    println!("  Track ID: {}", resolved.track_id);
    println!("  Title:    {}", resolved.candidate.title_str());
    println!("  Artists:  {}", resolved.candidate.artist_str());
    if let Some(album) = &resolved.candidate.album_title {
        println!("  Album:    {}", album);
    }
    if qualities.is_empty() {
        println!("  Quality:  none available");
    } else {
        println!("  Quality:  {}", qualities.join(", "));
    }
    match resolved.confidence {
        Some(score) => println!("  {}", confidence_label(score)),
        None if resolved.used_ai => println!("  (matched by AI)"),
        None => {}
    }
    println!("{:=<60}", "");
}

fn resolve_cmd(resolver: &Resolver, query: TrackQuery, force_ai: bool, json: bool) -> Result<()> {
    let result = resolver.resolve(&query, force_ai);

    if json {
        let out: MatchResult = result.into();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    match result {
        Ok(resolved) => print_resolved(&resolved),
        Err(err) if err.is_not_found() && !force_ai && resolver.has_ai() => {
            println!("{}", err);
            println!("Retry with --force-ai to let the AI search.");
        }
        Err(err) => return Err(err).context("Resolution failed"),
    }
    Ok(())
}

fn batch_cmd(
    resolver: &Resolver,
    input: PathBuf,
    output: PathBuf,
    workers: usize,
    force_ai: bool,
    stats_path: Option<PathBuf>,
) -> Result<()> {
    if workers > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build_global()
            .context("Failed to set thread pool size")?;
    }

    let start = Instant::now();
    let stats = run_batch(resolver, &input, &output, force_ai, &CancelToken::new())?;

    println!("\n{:=<60}", "");
    println!("Batch complete!");
    println!("  Queries:   {}", stats.total_queries);
    println!("  Matched:   {} ({:.1}%)", stats.matched, stats.match_rate());
    println!("  By AI:     {}", stats.matched_by_ai);
    println!("  Not found: {}", stats.not_found);
    println!("  Errors:    {}", stats.errors);
    println!("  Elapsed:   {}", format_duration(start.elapsed()));
    println!("{:=<60}", "");

    if let Some(path) = stats_path {
        stats
            .write_to_file(&path)
            .with_context(|| format!("Failed to write stats to {}", path.display()))?;
    }
    Ok(())
}

fn check_key_cmd(config: &Config) -> Result<()> {
    let Some(client) = GeminiClient::from_config(&config.ai, &config.http) else {
        bail!("No API key configured (set [ai].api_key, GEMINI_API_KEY or --api-key)");
    };

    let spinner = create_spinner("Checking API key");
    let status = client.check_key().context("Key check request failed")?;
    spinner.finish_and_clear();

    match status {
        KeyStatus::Valid => println!("API key is valid."),
        KeyStatus::Invalid => {
            bail!("API key is invalid, or the service is not available in your region")
        }
        KeyStatus::Rejected(code) => bail!("Key check failed with HTTP status {}", code),
    }
    Ok(())
}

fn download_cmd(
    resolver: &Resolver,
    config: &Config,
    query: TrackQuery,
    tier: QualityTier,
    dir: PathBuf,
    force_ai: bool,
    name: Option<String>,
) -> Result<()> {
    let resolved = resolver
        .resolve(&query, force_ai)
        .context("Resolution failed")?;
    print_resolved(&resolved);

    if !resolved.qualities.has(tier) {
        bail!("{} is not available for this track", tier.label());
    }

    let downloader = Downloader::new(resolver.link_provider(), &config.http);
    let stem = download_stem(&query, name.as_deref());
    let pending = downloader.start(&resolved.track_id, tier, &stem)?;

    let spinner = create_spinner("Downloading");
    let path = downloader.finish(&pending, &dir)?;
    spinner.finish_with_message(format!("Saved {}", path.display()));
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    set_log_only(args.log_only);

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(key) = args.api_key {
        config.ai.api_key = Some(key);
    }

    let resolver = Resolver::from_config(&config);

    match args.command {
        Command::Resolve {
            title,
            artists,
            force_ai,
            json,
        } => resolve_cmd(&resolver, TrackQuery::new(title, artists), force_ai, json),
        Command::Batch {
            input,
            output,
            workers,
            force_ai,
            stats,
        } => batch_cmd(&resolver, input, output, workers, force_ai, stats),
        Command::Download {
            title,
            artists,
            quality,
            dir,
            force_ai,
            name,
        } => download_cmd(
            &resolver,
            &config,
            TrackQuery::new(title, artists),
            quality.into(),
            dir,
            force_ai,
            name,
        ),
        Command::CheckKey => check_key_cmd(&config),
    }
}
