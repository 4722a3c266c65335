//! Track resolution library - shared modules for all binaries.

pub mod ai;
pub mod batch;
pub mod config;
pub mod download;
pub mod error;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod providers;
pub mod quality;
pub mod ranking;
pub mod resolver;
pub mod safety;
pub mod scoring;

pub use error::{ResolveError, Result};
pub use models::{Candidate, MatchResult, QualityTier, ResolvedTrack, TrackQuery};
pub use resolver::{CancelToken, Resolver};
