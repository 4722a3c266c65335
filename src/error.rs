//! Error taxonomy for the resolution pipeline.
//!
//! Every variant is terminal for the current invocation. Quality probes are the
//! one place where errors are swallowed (see `quality.rs`).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ResolveError>;

#[derive(Debug, Error)]
pub enum ResolveError {
    /// A provider request failed, timed out or returned a non-success status.
    #[error("network error: {0}")]
    Network(String),

    /// A provider answered with something that does not match its schema.
    #[error("unexpected response shape: {0}")]
    ResponseShape(String),

    /// No candidates, none cleared the thresholds, or the AI declined to pick.
    #[error("{0}")]
    NotFound(String),

    /// AI fallback requested without a configured credential.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An album-typed match could not be reduced to a concrete track id.
    #[error("could not resolve a track id for album {0}")]
    IdentifierResolution(String),
}

impl ResolveError {
    /// Reason code surfaced to callers. Only `not_found` invites a manual AI retry.
    pub fn reason(&self) -> &'static str {
        match self {
            ResolveError::NotFound(_) => "not_found",
            _ => "error",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ResolveError::NotFound(_))
    }
}

impl From<ureq::Error> for ResolveError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, response) => ResolveError::Network(format!(
                "{} returned status {}",
                response.get_url(),
                code
            )),
            ureq::Error::Transport(transport) => ResolveError::Network(transport.to_string()),
        }
    }
}

impl From<serde_json::Error> for ResolveError {
    fn from(err: serde_json::Error) -> Self {
        ResolveError::ResponseShape(err.to_string())
    }
}
