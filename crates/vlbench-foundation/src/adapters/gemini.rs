//! Gemini generateContent adapter
//!
//! The answer is the concatenation of the first candidate's text parts.
//! A candidate without parts yields [`EMPTY_RESPONSE`]; a response without
//! candidates (the prompt was filtered) yields [`BLOCKED_RESPONSE`]. Both are
//! answers, not errors.

use super::{HostedConfig, send_json};
use super::vision::encode_image;
use async_trait::async_trait;
use serde::Deserialize;
use vlbench_kernel::{BackendKind, GenerationError, Generator, ImageRef};

pub const EMPTY_RESPONSE: &str = "empty response";
pub const BLOCKED_RESPONSE: &str = "Blocked by the safety filter.";

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

impl GeminiResponse {
    fn into_answer(self) -> String {
        match self.candidates.into_iter().next() {
            None => BLOCKED_RESPONSE.to_string(),
            Some(candidate) if candidate.content.parts.is_empty() => EMPTY_RESPONSE.to_string(),
            Some(candidate) => candidate
                .content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect(),
        }
    }
}

/// Answers through `POST {base_url}/v1beta/models/{model}:generateContent`
pub struct GeminiAdapter {
    client: reqwest::Client,
    config: HostedConfig,
}

impl GeminiAdapter {
    pub fn new(client: reqwest::Client, config: HostedConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl Generator for GeminiAdapter {
    fn adapter_name(&self) -> &str {
        "GeminiResponseGenerator"
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::HostedApi
    }

    async fn generate_response(
        &self,
        question: &str,
        image: &ImageRef,
    ) -> Result<String, GenerationError> {
        let encoded = encode_image(image).await?;
        let body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {"text": question},
                    {"inline_data": {"mime_type": encoded.mime_type, "data": encoded.data}},
                ],
            }],
            "generationConfig": {
                "temperature": self.config.temperature,
                "maxOutputTokens": self.config.max_tokens,
            },
        });
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url(),
            self.config.model
        );

        let parsed: GeminiResponse = send_json(
            self.client
                .post(&url)
                .query(&[("key", self.config.api_key.as_str())])
                .json(&body),
        )
        .await?;

        Ok(parsed.into_answer())
    }
}
