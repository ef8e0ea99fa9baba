//! OpenAI chat-completions adapter
//!
//! One user message with a text part and an `image_url` part carrying the
//! image as a data URL.

use super::{HostedConfig, send_json};
use super::vision::encode_image;
use async_trait::async_trait;
use serde::Deserialize;
use vlbench_kernel::{BackendKind, GenerationError, Generator, ImageRef, RemoteApiError};

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Chat-completions response body, shared with the code-generation backend
#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

impl ChatCompletionResponse {
    /// Content of the first choice
    pub(crate) fn into_content(self) -> Option<String> {
        self.choices.into_iter().next().and_then(|c| c.message.content)
    }
}

/// Answers through `POST {base_url}/v1/chat/completions`
pub struct OpenAiAdapter {
    client: reqwest::Client,
    config: HostedConfig,
}

impl OpenAiAdapter {
    pub fn new(client: reqwest::Client, config: HostedConfig) -> Self {
        Self { client, config }
    }

    fn request_body(&self, question: &str, data_url: String) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": question},
                    {"type": "image_url", "image_url": {"url": data_url}},
                ],
            }],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        })
    }
}

#[async_trait]
impl Generator for OpenAiAdapter {
    fn adapter_name(&self) -> &str {
        "OpenAIResponseGenerator"
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
        let body = self.request_body(question, encoded.data_url());
        let url = format!("{}/v1/chat/completions", self.config.base_url());

        let parsed: ChatCompletionResponse = send_json(
            self.client
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(&body),
        )
        .await?;

        parsed.into_content().ok_or_else(|| {
            RemoteApiError::UnexpectedResponse("response has no message content".to_string()).into()
        })
    }
}
