//! Progress reporting for batch resolution.
//!
//! Interactive runs get an indicatif bar whose message tracks the running
//! match count. With `--log-only` the bar is hidden and the same numbers are
//! logged every `interval` tracks, which stays readable under `tail -f`.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

static LOG_ONLY: AtomicBool = AtomicBool::new(false);

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed)
}

pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// "850ms", "12.3s" or "4m 30s".
pub fn format_duration(d: Duration) -> String {
    match d.as_secs() {
        0 => format!("{}ms", d.as_millis()),
        1..=59 => format!("{:.1}s", d.as_secs_f64()),
        secs => format!("{}m {:02}s", secs / 60, secs % 60),
    }
}

fn hidden_unless_interactive(pb: ProgressBar, style: impl FnOnce() -> ProgressStyle) -> ProgressBar {
    if is_log_only() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        pb.set_style(style());
    }
    pb
}

/// Spinner for the single-shot steps: writing tables, checking a key, downloading.
pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = hidden_unless_interactive(ProgressBar::new_spinner(), || {
        ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    });
    if !is_log_only() {
        pb.enable_steady_tick(Duration::from_millis(100));
    }
    pb.set_message(msg.to_string());
    pb
}

// ============================================================================
// Resolve Phase
// ============================================================================

/// Shared across the rayon workers resolving a tracklist.
pub struct ResolveProgress {
    bar: ProgressBar,
    total: u64,
    interval: u64,
    done: AtomicU64,
    matched: AtomicU64,
}

impl ResolveProgress {
    pub fn new(total: u64, interval: u64) -> Self {
        let bar = hidden_unless_interactive(ProgressBar::new(total), || {
            ProgressStyle::with_template(
                "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} tracks ({per_sec}, ETA: {eta})",
            )
            .map(|style| style.progress_chars("=> "))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
        });
        bar.set_message("Resolving (0 matched)");
        Self {
            bar,
            total,
            interval,
            done: AtomicU64::new(0),
            matched: AtomicU64::new(0),
        }
    }

    /// Count one finished query.
    pub fn record(&self, matched: bool) {
        let matched = if matched {
            self.matched.fetch_add(1, Ordering::Relaxed) + 1
        } else {
            self.matched.load(Ordering::Relaxed)
        };
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;

        self.bar.inc(1);
        self.bar.set_message(format!("Resolving ({matched} matched)"));

        if is_log_only() && self.on_interval(done) {
            log::info!("[resolve] {}", self.summary(done, matched));
        }
    }

    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    pub fn matched(&self) -> u64 {
        self.matched.load(Ordering::Relaxed)
    }

    pub fn finish(&self, elapsed: Duration) {
        self.bar.finish_with_message(format!(
            "Resolved {}/{} tracks in {}",
            self.matched(),
            self.total,
            format_duration(elapsed)
        ));
    }

    fn on_interval(&self, done: u64) -> bool {
        done == self.total || (self.interval > 0 && done % self.interval == 0)
    }

    fn summary(&self, done: u64, matched: u64) -> String {
        let pct = if self.total == 0 {
            100.0
        } else {
            100.0 * done as f64 / self.total as f64
        };
        format!("{}/{} ({:.1}%), {} matched", done, self.total, pct, matched)
    }
}
