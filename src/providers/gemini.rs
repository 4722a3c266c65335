//! Gemini `generateContent` client used as the AI provider.

use serde::Deserialize;
use serde_json::json;

use crate::config::{AiConfig, HttpConfig};
use crate::error::{ResolveError, Result};
use crate::providers::{AiProvider, AiRequest};

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<GenerateCandidate>,
}

#[derive(Debug, Deserialize)]
struct GenerateCandidate {
    content: Option<GenerateContent>,
}

#[derive(Debug, Deserialize)]
struct GenerateContent {
    #[serde(default)]
    parts: Vec<GeneratePart>,
}

#[derive(Debug, Deserialize)]
struct GeneratePart {
    text: Option<String>,
}

/// Pull the answer text out of a `generateContent` response body.
pub fn extract_text(body: &str) -> Result<String> {
    let response: GenerateResponse = serde_json::from_str(body)?;
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().find_map(|p| p.text))
        .ok_or_else(|| ResolveError::ResponseShape("AI response contains no text part".into()))
}

/// Outcome of validating an API key against the model listing endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    Valid,
    /// 403: wrong key, or the service is not reachable from this region
    Invalid,
    Rejected(u16),
}

pub struct GeminiClient {
    api_key: String,
    model: String,
    endpoint: String,
    agent: ureq::Agent,
}

impl GeminiClient {
    /// Returns `None` when no credential is configured.
    pub fn from_config(ai: &AiConfig, http: &HttpConfig) -> Option<Self> {
        let api_key = ai.credential()?.to_string();
        Some(Self {
            api_key,
            model: ai.model.clone(),
            endpoint: ai.endpoint.trim().trim_end_matches('/').to_string(),
            agent: ureq::AgentBuilder::new().timeout(http.timeout()).build(),
        })
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.endpoint,
            self.model,
            urlencoding::encode(&self.api_key)
        )
    }

    /// Check the key by listing models.
    pub fn check_key(&self) -> Result<KeyStatus> {
        let url = format!(
            "{}/models?key={}",
            self.endpoint,
            urlencoding::encode(&self.api_key)
        );
        match self.agent.get(&url).call() {
            Ok(_) => Ok(KeyStatus::Valid),
            Err(ureq::Error::Status(403, _)) => Ok(KeyStatus::Invalid),
            Err(ureq::Error::Status(code, _)) => Ok(KeyStatus::Rejected(code)),
            Err(err) => Err(err.into()),
        }
    }
}

impl AiProvider for GeminiClient {
    fn complete(&self, request: &AiRequest) -> Result<String> {
        let payload = json!({
            "contents": [{ "parts": [{ "text": request.prompt }] }],
            "generationConfig": {
                "temperature": request.temperature,
                "responseMimeType": "application/json",
            },
        });
        let body = self
            .agent
            .post(&self.generate_url())
            .set("Content-Type", "application/json")
            .send_json(payload)?
            .into_string()
            .map_err(|err| ResolveError::Network(format!("failed to read AI response: {err}")))?;
        extract_text(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text() {
        let body = r#"{
            "candidates": [{
                "content": { "parts": [{ "text": "{\"matchFound\": true, \"bestMatchId\": 42}" }] },
                "finishReason": "STOP"
            }]
        }"#;
        assert_eq!(
            extract_text(body).unwrap(),
            r#"{"matchFound": true, "bestMatchId": 42}"#
        );
    }

    #[test]
    fn test_extract_text_missing_parts() {
        for body in [
            r#"{"candidates": []}"#,
            r#"{"candidates": [{"finishReason": "SAFETY"}]}"#,
            r#"{"candidates": [{"content": {"parts": [{}]}}]}"#,
        ] {
            assert!(matches!(
                extract_text(body).unwrap_err(),
                ResolveError::ResponseShape(_)
            ));
        }
    }

    #[test]
    fn test_no_client_without_credential() {
        assert!(GeminiClient::from_config(&AiConfig::default(), &HttpConfig::default()).is_none());
        let ai = AiConfig {
            api_key: Some("k/ey".into()),
            ..Default::default()
        };
        let client = GeminiClient::from_config(&ai, &HttpConfig::default()).unwrap();
        assert_eq!(
            client.generate_url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent?key=k%2Fey"
        );
    }
}
