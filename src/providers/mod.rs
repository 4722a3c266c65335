//! Provider seams consumed by the resolution pipeline.
//!
//! The orchestrator only sees these traits; `qqdl` and `gemini` hold the HTTP
//! implementations and tests substitute in-memory fakes.

pub mod gemini;
pub mod qqdl;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::Result;
use crate::models::{Candidate, QualityTier};

pub use gemini::{GeminiClient, KeyStatus};
pub use qqdl::QqdlClient;

/// Free-text catalog search.
pub trait SearchProvider: Send + Sync {
    fn search(&self, query: &str) -> Result<Vec<Candidate>>;
}

/// Reduces an album record to one of its tracks.
pub trait CatalogProvider: Send + Sync {
    fn first_track_id(&self, album_id: &str) -> Result<Option<String>>;
}

/// Direct media URL for a track in a given quality, if the tier exists.
pub trait LinkProvider: Send + Sync {
    fn resolve_url(&self, track_id: &str, tier: QualityTier) -> Result<Option<String>>;
}

/// Deterministic completion request sent to the language model.
#[derive(Clone, Debug, PartialEq)]
pub struct AiRequest {
    pub prompt: String,
    pub temperature: f32,
}

/// Language model that answers a prompt with text.
pub trait AiProvider: Send + Sync {
    fn complete(&self, request: &AiRequest) -> Result<String>;
}

// ============================================================================
// Identifier Helpers
// ============================================================================

/// Catalog ids arrive as JSON strings or numbers; both compare as text.
pub fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    id_to_string(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("expected string or number id, got {value}")))
}

/// Numbers (or numeric strings) become `Some`; anything else is treated as absent.
pub(crate) fn deserialize_lenient_f64<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_to_string() {
        assert_eq!(id_to_string(&json!(42)), Some("42".to_string()));
        assert_eq!(id_to_string(&json!(" 42 ")), Some("42".to_string()));
        assert_eq!(id_to_string(&json!(null)), None);
        assert_eq!(id_to_string(&json!(true)), None);
    }

    #[derive(Deserialize)]
    struct Probe {
        #[serde(deserialize_with = "deserialize_id")]
        id: String,
        #[serde(default, deserialize_with = "deserialize_lenient_f64")]
        popularity: Option<f64>,
    }

    #[test]
    fn test_lenient_deserializers() {
        let p: Probe = serde_json::from_value(json!({"id": 7, "popularity": "12.5"})).unwrap();
        assert_eq!(p.id, "7");
        assert_eq!(p.popularity, Some(12.5));

        let p: Probe = serde_json::from_value(json!({"id": "x1", "popularity": [1]})).unwrap();
        assert_eq!(p.popularity, None);

        let p: Probe = serde_json::from_value(json!({"id": "x2"})).unwrap();
        assert_eq!(p.popularity, None);

        assert!(serde_json::from_value::<Probe>(json!({"id": null})).is_err());
    }
}
