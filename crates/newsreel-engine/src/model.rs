//! Hosted model client for text and vision calls.
//!
//! Both the query/analysis generator and the visual validator go through
//! this client. Requests demand strict JSON output; replies are cleaned of
//! markdown fences before decoding. Each call walks a model fallback list
//! so a single overloaded model does not fail the segment.

use base64::Engine as _;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};

/// Default API base; overridable for tests and proxies.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Text models tried in order.
const TEXT_MODELS: &[&str] = &["gemini-2.5-flash", "gemini-2.5-flash-lite", "gemini-2.5-pro"];

/// Vision-capable models tried in order.
const VISION_MODELS: &[&str] = &["gemini-2.5-flash", "gemini-2.5-pro"];

/// Hosted model API client.
#[derive(Clone)]
pub struct ModelClient {
    api_key: String,
    base_url: String,
    client: Client,
}

/// Model API request.
#[derive(Debug, Serialize)]
struct ModelRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,

    #[serde(rename = "inlineData", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

/// Model API response.
#[derive(Debug, Deserialize)]
struct ModelResponse {
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: String,
}

impl ModelClient {
    /// Create a client from the environment.
    pub fn from_env() -> EngineResult<Self> {
        let api_key = std::env::var("NEWSREEL_MODEL_API_KEY")
            .map_err(|_| EngineError::config_error("NEWSREEL_MODEL_API_KEY not set"))?;
        let base_url =
            std::env::var("NEWSREEL_MODEL_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());

        Ok(Self::new(api_key, base_url))
    }

    /// Create a client with an explicit key and API base.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Single text-generation call; decodes the strict-JSON reply into `T`.
    pub async fn generate<T: DeserializeOwned>(&self, prompt: &str) -> EngineResult<T> {
        self.generate_with_parts(
            TEXT_MODELS,
            vec![Part {
                text: Some(prompt.to_string()),
                inline_data: None,
            }],
        )
        .await
    }

    /// Single vision call over a PNG screenshot plus a text prompt.
    pub async fn generate_vision<T: DeserializeOwned>(
        &self,
        prompt: &str,
        image_png: &[u8],
    ) -> EngineResult<T> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image_png);
        self.generate_with_parts(
            VISION_MODELS,
            vec![
                Part {
                    text: Some(prompt.to_string()),
                    inline_data: None,
                },
                Part {
                    text: None,
                    inline_data: Some(InlineData {
                        mime_type: "image/png".to_string(),
                        data: encoded,
                    }),
                },
            ],
        )
        .await
    }

    async fn generate_with_parts<T: DeserializeOwned>(
        &self,
        models: &[&str],
        parts: Vec<Part>,
    ) -> EngineResult<T> {
        let request = ModelRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };

        let mut last_error = None;

        for model in models {
            match self.call_model(model, &request).await {
                Ok(value) => {
                    info!(model = %model, "Model call succeeded");
                    return Ok(value);
                }
                Err(e) => {
                    warn!(model = %model, error = %e, "Model call failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| EngineError::model_failed("All models failed")))
    }

    async fn call_model<T: DeserializeOwned>(
        &self,
        model: &str,
        request: &ModelRequest,
    ) -> EngineResult<T> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| EngineError::model_failed(format!("Model API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(EngineError::model_failed(format!(
                "Model API returned {}: {}",
                status, error_text
            )));
        }

        let model_response: ModelResponse = response
            .json()
            .await
            .map_err(|e| EngineError::model_failed(format!("Failed to parse API envelope: {}", e)))?;

        let text = model_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .ok_or_else(|| EngineError::model_failed("No content in model response"))?;

        serde_json::from_str(strip_markdown_fences(text))
            .map_err(|e| EngineError::model_failed(format!("Failed to parse model JSON: {}", e)))
    }
}

/// Strip a surrounding markdown code fence from a model reply.
pub fn strip_markdown_fences(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);
    text.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_strip_markdown_fences() {
        assert_eq!(strip_markdown_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_markdown_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_markdown_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_markdown_fences("  {\"a\":1}  "), "{\"a\":1}");
    }

    fn model_reply(body: &str) -> serde_json::Value {
        serde_json::json!({
            "candidates": [
                { "content": { "parts": [ { "text": body } ] } }
            ]
        })
    }

    #[derive(Debug, Deserialize)]
    struct Probe {
        answer: u32,
    }

    #[tokio::test]
    async fn test_generate_decodes_fenced_json() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path_regex(r"^/v1beta/models/.+:generateContent$"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(model_reply("```json\n{\"answer\": 7}\n```")),
            )
            .mount(&server)
            .await;

        let client = ModelClient::new("test-key", server.uri());
        let probe: Probe = client.generate("what is the answer").await.unwrap();
        assert_eq!(probe.answer, 7);
    }

    #[tokio::test]
    async fn test_generate_falls_back_across_models() {
        let server = MockServer::start().await;

        // First model overloaded, the rest succeed.
        Mock::given(method("POST"))
            .and(path_regex(r"^/v1beta/models/gemini-2\.5-flash:generateContent$"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/v1beta/models/.+:generateContent$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(model_reply("{\"answer\": 3}")))
            .mount(&server)
            .await;

        let client = ModelClient::new("test-key", server.uri());
        let probe: Probe = client.generate("fall back please").await.unwrap();
        assert_eq!(probe.answer, 3);
    }

    #[tokio::test]
    async fn test_generate_surfaces_unparseable_reply() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path_regex(r"^/v1beta/models/.+:generateContent$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(model_reply("not json at all")))
            .mount(&server)
            .await;

        let client = ModelClient::new("test-key", server.uri());
        let result: EngineResult<Probe> = client.generate("bad reply").await;
        assert!(result.is_err());
    }
}
