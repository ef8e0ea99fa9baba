//! Code-generation backends
//!
//! Two are supported, selected by `model.codegen_backend`:
//! `gpt-4` (OpenAI chat completions) and `claude-3-opus` (Anthropic
//! messages). Both take one prompt and return the raw response text.

use crate::adapters::anthropic::{ANTHROPIC_VERSION, MessageResponse};
use crate::adapters::openai::ChatCompletionResponse;
use crate::adapters::send_json;
use crate::context::RunContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};
use vlbench_kernel::DispatchError;

/// System prompt sent with every OpenAI code-generation request
pub const CODEGEN_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that generates code based on given requirements.";

const OPENAI_MODEL: &str = "gpt-4";
const ANTHROPIC_MODEL: &str = "claude-3-opus-20240229";
const CODEGEN_MAX_TOKENS: u32 = 4096;
const CODEGEN_TEMPERATURE: f32 = 0.7;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Which code-generation backend synthesis uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CodeGenBackendKind {
    #[default]
    #[serde(rename = "gpt-4")]
    Gpt4,
    #[serde(rename = "claude-3-opus")]
    ClaudeOpus,
}

impl CodeGenBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeGenBackendKind::Gpt4 => "gpt-4",
            CodeGenBackendKind::ClaudeOpus => "claude-3-opus",
        }
    }
}

impl fmt::Display for CodeGenBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodeGenBackendKind {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gpt-4" => Ok(CodeGenBackendKind::Gpt4),
            "claude-3-opus" => Ok(CodeGenBackendKind::ClaudeOpus),
            other => Err(DispatchError::SynthesisBackend(format!(
                "unsupported code generation backend '{}'",
                other
            ))),
        }
    }
}

/// Turns a synthesis prompt into raw response text
#[async_trait]
pub trait CodeGenBackend: Send + Sync {
    fn kind(&self) -> CodeGenBackendKind;

    async fn generate(&self, prompt: &str) -> Result<String, DispatchError>;
}

fn backend_error(kind: CodeGenBackendKind, err: impl fmt::Display) -> DispatchError {
    DispatchError::SynthesisBackend(format!("{}: {}", kind, err))
}

// ============================================================================
// OpenAI
// ============================================================================

/// `gpt-4` through chat completions
pub struct OpenAiCodeGen {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiCodeGen {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl CodeGenBackend for OpenAiCodeGen {
    fn kind(&self) -> CodeGenBackendKind {
        CodeGenBackendKind::Gpt4
    }

    async fn generate(&self, prompt: &str) -> Result<String, DispatchError> {
        let body = serde_json::json!({
            "model": OPENAI_MODEL,
            "messages": [
                {"role": "system", "content": CODEGEN_SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
            "max_tokens": CODEGEN_MAX_TOKENS,
            "temperature": CODEGEN_TEMPERATURE,
        });
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        debug!(%url, prompt_bytes = prompt.len(), "requesting adapter code");

        let parsed: ChatCompletionResponse = send_json(
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body),
        )
        .await
        .map_err(|e| backend_error(self.kind(), e))?;

        parsed
            .into_content()
            .ok_or_else(|| backend_error(self.kind(), "response has no message content"))
    }
}

// ============================================================================
// Anthropic
// ============================================================================

/// `claude-3-opus` through the messages API
pub struct AnthropicCodeGen {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicCodeGen {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: ANTHROPIC_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl CodeGenBackend for AnthropicCodeGen {
    fn kind(&self) -> CodeGenBackendKind {
        CodeGenBackendKind::ClaudeOpus
    }

    async fn generate(&self, prompt: &str) -> Result<String, DispatchError> {
        let body = serde_json::json!({
            "model": ANTHROPIC_MODEL,
            "max_tokens": CODEGEN_MAX_TOKENS,
            "temperature": CODEGEN_TEMPERATURE,
            "messages": [{"role": "user", "content": prompt}],
        });
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        debug!(%url, prompt_bytes = prompt.len(), "requesting adapter code");

        let parsed: MessageResponse = send_json(
            self.client
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body),
        )
        .await
        .map_err(|e| backend_error(self.kind(), e))?;

        parsed
            .into_text()
            .map(|text| text.trim().to_string())
            .ok_or_else(|| backend_error(self.kind(), "response has no text block"))
    }
}

/// Backend for `kind`, with its key resolved from the run's credentials
pub fn backend_for(
    kind: CodeGenBackendKind,
    ctx: &RunContext,
) -> Result<Arc<dyn CodeGenBackend>, DispatchError> {
    let client = ctx
        .http_client()
        .map_err(|e| backend_error(kind, format!("failed to build HTTP client: {}", e)))?;

    info!(backend = %kind, "using code generation backend");
    match kind {
        CodeGenBackendKind::Gpt4 => {
            let key = ctx.credentials().resolve("OPENAI_API_KEY").ok_or_else(|| {
                DispatchError::SynthesisBackend("OpenAI API key is not available.".to_string())
            })?;
            Ok(Arc::new(OpenAiCodeGen::new(client, key)))
        }
        CodeGenBackendKind::ClaudeOpus => {
            let key = ctx.credentials().resolve("ANTHROPIC_API_KEY").ok_or_else(|| {
                DispatchError::SynthesisBackend("Anthropic API key is not available.".to_string())
            })?;
            Ok(Arc::new(AnthropicCodeGen::new(client, key)))
        }
    }
}
