//! Anthropic messages adapter
//!
//! Text block plus a base64 image block; the answer is the first text block.
//! Images whose base64 form would exceed the API's 5 MB image limit are
//! rejected before any request is sent.

use super::{HostedConfig, send_json};
use super::vision::EncodedImage;
use async_trait::async_trait;
use serde::Deserialize;
use vlbench_kernel::{BackendKind, GenerationError, Generator, ImageRef, RemoteApiError};

/// `anthropic-version` header value
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Largest image file accepted, so that its base64 form stays under 5 MB
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024 * 3 / 4;

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

/// Messages response body, shared with the code-generation backend
#[derive(Debug, Deserialize)]
pub(crate) struct MessageResponse {
    content: Vec<ContentBlock>,
}

impl MessageResponse {
    /// Text of the first text block
    pub(crate) fn into_text(self) -> Option<String> {
        self.content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
    }
}

/// Answers through `POST {base_url}/v1/messages`
pub struct ClaudeAdapter {
    client: reqwest::Client,
    config: HostedConfig,
}

impl ClaudeAdapter {
    pub fn new(client: reqwest::Client, config: HostedConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl Generator for ClaudeAdapter {
    fn adapter_name(&self) -> &str {
        "ClaudeResponseGenerator"
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::HostedApi
    }

    async fn generate_response(
        &self,
        question: &str,
        image: &ImageRef,
    ) -> Result<String, GenerationError> {
        let bytes = image.read().await?;
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(GenerationError::InvalidInput(format!(
                "image {} is {} bytes; Anthropic accepts at most {} bytes (5 MB once base64-encoded)",
                image,
                bytes.len(),
                MAX_IMAGE_BYTES
            )));
        }
        let encoded = EncodedImage::from_bytes(&bytes);
        let body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": question},
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": encoded.mime_type,
                            "data": encoded.data,
                        },
                    },
                ],
            }],
        });
        let url = format!("{}/v1/messages", self.config.base_url());

        let parsed: MessageResponse = send_json(
            self.client
                .post(&url)
                .header("x-api-key", &self.config.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body),
        )
        .await?;

        parsed.into_text().ok_or_else(|| {
            RemoteApiError::UnexpectedResponse("response has no text block".to_string()).into()
        })
    }
}
