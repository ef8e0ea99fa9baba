//! Built-in adapters
//!
//! - Hosted APIs: [`openai`], [`anthropic`], [`gemini`], always behind the
//!   retry wrapper
//! - Local checkpoints: [`local`], through the run's checkpoint runtime

pub mod anthropic;
pub mod gemini;
pub mod local;
pub mod openai;
pub mod vision;

use crate::context::RunContext;
use crate::registry::{AdapterRecipe, AdapterSpec, CheckpointFamily, HostedProvider};
use crate::retry::RetryingGenerator;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info};
use vlbench_kernel::checkpoint::CheckpointRequest;
use vlbench_kernel::{DispatchError, Generator, ModelIdentifier, RemoteApiError};

pub use anthropic::ClaudeAdapter;
pub use gemini::GeminiAdapter;
pub use local::CheckpointAdapter;
pub use openai::OpenAiAdapter;

/// Settings shared by the hosted adapters
#[derive(Debug, Clone)]
pub struct HostedConfig {
    pub api_key: String,
    pub base_url: String,
    /// Model name sent to the provider
    pub model: String,
    /// Output token limit, taken from `max_length`
    pub max_tokens: u32,
    pub temperature: f32,
}

impl HostedConfig {
    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// Send a request and decode a JSON body, classifying failures
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, RemoteApiError> {
    let resp = request.send().await.map_err(map_transport_error)?;

    let status = resp.status();
    let text = resp.text().await.map_err(map_transport_error)?;

    if !status.is_success() {
        return Err(RemoteApiError::from_status(status.as_u16(), text));
    }

    serde_json::from_str(&text).map_err(|e| RemoteApiError::UnexpectedResponse(e.to_string()))
}

fn map_transport_error(err: reqwest::Error) -> RemoteApiError {
    if err.is_timeout() {
        RemoteApiError::Transport(format!("timeout: {}", err))
    } else {
        RemoteApiError::Transport(err.to_string())
    }
}

/// Construct the generator a registry entry describes
pub async fn construct(
    spec: &AdapterSpec,
    ctx: &RunContext,
) -> Result<Arc<dyn Generator>, DispatchError> {
    match &spec.recipe {
        AdapterRecipe::Hosted {
            provider,
            remote_model,
            credential,
            base_url,
        } => {
            let api_key = ctx.credentials().resolve(credential).ok_or_else(|| {
                DispatchError::construction(
                    &spec.identifier,
                    format!("credential {} is not set", credential),
                )
            })?;
            let generation = ctx.generation();
            let config = HostedConfig {
                api_key,
                base_url: base_url
                    .clone()
                    .unwrap_or_else(|| provider.default_base_url().to_string()),
                model: remote_model.clone(),
                max_tokens: generation.max_length,
                temperature: generation.temperature,
            };
            construct_hosted(&spec.identifier, *provider, config, ctx)
        }
        AdapterRecipe::Local { family, device } => {
            let device = device.clone().unwrap_or_else(|| ctx.config().device.clone());
            construct_local(&spec.identifier, *family, device, ctx).await
        }
    }
}

fn construct_hosted(
    identifier: &ModelIdentifier,
    provider: HostedProvider,
    config: HostedConfig,
    ctx: &RunContext,
) -> Result<Arc<dyn Generator>, DispatchError> {
    let client = ctx
        .http_client()
        .map_err(|e| DispatchError::AdapterConstruction {
            identifier: identifier.clone(),
            reason: "failed to build HTTP client".to_string(),
            source: Some(Box::new(e)),
        })?;

    debug!(%identifier, %provider, model = %config.model, "constructing hosted adapter");
    let inner: Arc<dyn Generator> = match provider {
        HostedProvider::OpenAi => Arc::new(OpenAiAdapter::new(client, config)),
        HostedProvider::Anthropic => Arc::new(ClaudeAdapter::new(client, config)),
        HostedProvider::Gemini => Arc::new(GeminiAdapter::new(client, config)),
    };

    Ok(Arc::new(RetryingGenerator::new(inner, ctx.retry_wrapper())))
}

async fn construct_local(
    identifier: &ModelIdentifier,
    family: CheckpointFamily,
    device: String,
    ctx: &RunContext,
) -> Result<Arc<dyn Generator>, DispatchError> {
    let loader = ctx.checkpoint_loader().cloned().ok_or_else(|| {
        DispatchError::construction(identifier, "no checkpoint runtime is configured")
    })?;

    let request = CheckpointRequest {
        model_path: identifier.as_str().to_string(),
        device,
        dtype: ctx.config().torch_dtype.clone(),
        trust_remote_code: family.trust_remote_code(),
    };
    info!(%identifier, device = %request.device, "loading checkpoint");

    let checkpoint = tokio::task::spawn_blocking(move || loader.load(&request))
        .await
        .map_err(|e| DispatchError::AdapterConstruction {
            identifier: identifier.clone(),
            reason: "checkpoint loading task failed".to_string(),
            source: Some(Box::new(e)),
        })?
        .map_err(|e| DispatchError::AdapterConstruction {
            identifier: identifier.clone(),
            reason: "checkpoint failed to load".to_string(),
            source: Some(e),
        })?;

    let adapter = CheckpointAdapter::new(family, checkpoint, ctx.generation()).map_err(|e| {
        DispatchError::AdapterConstruction {
            identifier: identifier.clone(),
            reason: "invalid generation parameters".to_string(),
            source: Some(Box::new(e)),
        }
    })?;
    Ok(Arc::new(adapter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::context::Credentials;
    use vlbench_kernel::BackendKind;

    #[tokio::test]
    async fn missing_credential_is_construction_error() {
        let spec = AdapterSpec::hosted("openai/gpt-4o", HostedProvider::OpenAi);
        let ctx = RunContext::new(RunConfig::for_model("openai/gpt-4o"))
            .with_credentials(Credentials::default().with("OPENAI_API_KEY", ""));
        let err = construct(&spec, &ctx).await.err().unwrap();
        assert!(matches!(err, DispatchError::AdapterConstruction { ref reason, .. } if reason.contains("OPENAI_API_KEY")));
    }

    #[tokio::test]
    async fn hosted_adapters_are_retry_wrapped() {
        let spec = AdapterSpec::hosted("google/gemini-1.5-pro", HostedProvider::Gemini);
        let ctx = RunContext::new(RunConfig::for_model("google/gemini-1.5-pro"))
            .with_credentials(Credentials::default().with("GEMINI_API_KEY", "k"));
        let generator = construct(&spec, &ctx).await.unwrap();
        assert_eq!(generator.adapter_name(), "GeminiResponseGenerator");
        assert_eq!(generator.backend_kind(), BackendKind::HostedApi);
    }

    #[tokio::test]
    async fn local_without_runtime_is_construction_error() {
        let spec = AdapterSpec::local("Qwen/Qwen-VL-Chat", CheckpointFamily::QwenVlChat);
        let ctx = RunContext::new(RunConfig::for_model("Qwen/Qwen-VL-Chat"));
        let err = construct(&spec, &ctx).await.err().unwrap();
        assert!(matches!(err, DispatchError::AdapterConstruction { .. }));
    }
}
