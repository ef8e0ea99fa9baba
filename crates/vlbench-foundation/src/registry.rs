//! Adapter Registry: known model identifiers and how to construct them
//!
//! The table is built once per process and never mutated while a run is in
//! progress. Lookup is by exact, case-sensitive identifier.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use vlbench_kernel::{BackendKind, ModelIdentifier};

/// Hosted API providers with a built-in adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostedProvider {
    OpenAi,
    Anthropic,
    Gemini,
}

impl HostedProvider {
    /// Environment variable holding the provider's API key
    pub fn credential_env(&self) -> &'static str {
        match self {
            HostedProvider::OpenAi => "OPENAI_API_KEY",
            HostedProvider::Anthropic => "ANTHROPIC_API_KEY",
            HostedProvider::Gemini => "GEMINI_API_KEY",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            HostedProvider::OpenAi => "https://api.openai.com",
            HostedProvider::Anthropic => "https://api.anthropic.com",
            HostedProvider::Gemini => "https://generativelanguage.googleapis.com",
        }
    }

    pub fn adapter_name(&self) -> &'static str {
        match self {
            HostedProvider::OpenAi => "OpenAIResponseGenerator",
            HostedProvider::Anthropic => "ClaudeResponseGenerator",
            HostedProvider::Gemini => "GeminiResponseGenerator",
        }
    }
}

impl fmt::Display for HostedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostedProvider::OpenAi => write!(f, "openai"),
            HostedProvider::Anthropic => write!(f, "anthropic"),
            HostedProvider::Gemini => write!(f, "gemini"),
        }
    }
}

/// Prompt/post-processing families of local checkpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointFamily {
    HeronType1,
    JapaneseStableVlm,
    QwenVlChat,
    Llava,
    EvoVlm,
    LlavaCalm2,
    Phi3Vision,
}

impl CheckpointFamily {
    pub fn adapter_name(&self) -> &'static str {
        match self {
            CheckpointFamily::HeronType1 => "HeronType1ResponseGenerator",
            CheckpointFamily::JapaneseStableVlm => "JapaneseStableVLMResponseGenerator",
            CheckpointFamily::QwenVlChat => "QwenVLChatResponseGenerator",
            CheckpointFamily::Llava => "LLaVAResponseGenerator",
            CheckpointFamily::EvoVlm => "EvoVLMResponseGenerator",
            CheckpointFamily::LlavaCalm2 => "LLaVACALM2ResponseGenerator",
            CheckpointFamily::Phi3Vision => "Phi3Vision128KInstructResponseGenerator",
        }
    }

    /// Whether checkpoint-provided code has to run during loading
    pub fn trust_remote_code(&self) -> bool {
        matches!(
            self,
            CheckpointFamily::JapaneseStableVlm
                | CheckpointFamily::QwenVlChat
                | CheckpointFamily::Phi3Vision
        )
    }
}

/// How to construct the adapter for one identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdapterRecipe {
    Hosted {
        provider: HostedProvider,
        /// Model name sent to the provider
        remote_model: String,
        /// Environment variable the credential is read from
        credential: String,
        /// Overrides the provider's default endpoint
        base_url: Option<String>,
    },
    Local {
        family: CheckpointFamily,
        /// Overrides the run's device
        device: Option<String>,
    },
}

/// Immutable registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterSpec {
    pub identifier: ModelIdentifier,
    pub recipe: AdapterRecipe,
}

impl AdapterSpec {
    /// Hosted entry whose remote model name is the identifier's name part
    pub fn hosted(identifier: impl Into<ModelIdentifier>, provider: HostedProvider) -> Self {
        let identifier = identifier.into();
        let remote_model = identifier.name().to_string();
        Self {
            identifier,
            recipe: AdapterRecipe::Hosted {
                provider,
                remote_model,
                credential: provider.credential_env().to_string(),
                base_url: None,
            },
        }
    }

    pub fn local(identifier: impl Into<ModelIdentifier>, family: CheckpointFamily) -> Self {
        Self {
            identifier: identifier.into(),
            recipe: AdapterRecipe::Local {
                family,
                device: None,
            },
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        if let AdapterRecipe::Hosted { base_url, .. } = &mut self.recipe {
            *base_url = Some(url.into());
        }
        self
    }

    pub fn with_remote_model(mut self, model: impl Into<String>) -> Self {
        if let AdapterRecipe::Hosted { remote_model, .. } = &mut self.recipe {
            *remote_model = model.into();
        }
        self
    }

    pub fn backend_kind(&self) -> BackendKind {
        match self.recipe {
            AdapterRecipe::Hosted { .. } => BackendKind::HostedApi,
            AdapterRecipe::Local { .. } => BackendKind::LocalCheckpoint,
        }
    }

    pub fn adapter_name(&self) -> &'static str {
        match &self.recipe {
            AdapterRecipe::Hosted { provider, .. } => provider.adapter_name(),
            AdapterRecipe::Local { family, .. } => family.adapter_name(),
        }
    }
}

const HOSTED_MODELS: &[(&str, HostedProvider)] = &[
    ("openai/gpt-4-turbo-2024-04-09", HostedProvider::OpenAi),
    ("openai/gpt-4o", HostedProvider::OpenAi),
    ("anthropic/claude-3-opus-20240229", HostedProvider::Anthropic),
    ("anthropic/claude-3-5-sonnet-20240620", HostedProvider::Anthropic),
    ("google/gemini-1.5-pro", HostedProvider::Gemini),
    ("google/gemini-1.0-pro-vision-latest", HostedProvider::Gemini),
];

const LOCAL_MODELS: &[(&str, CheckpointFamily)] = &[
    ("turing-motors/heron-chat-git-ja-stablelm-base-7b-v1", CheckpointFamily::HeronType1),
    ("turing-motors/heron-chat-blip-ja-stablelm-base-7b-v1-llava-620k", CheckpointFamily::HeronType1),
    ("turing-motors/heron-chat-blip-ja-stablelm-base-7b-v1", CheckpointFamily::HeronType1),
    ("turing-motors/heron-chat-blip-ja-stablelm-base-7b-v0", CheckpointFamily::HeronType1),
    ("stabilityai/japanese-stable-vlm", CheckpointFamily::JapaneseStableVlm),
    ("Qwen/Qwen-VL-Chat", CheckpointFamily::QwenVlChat),
    ("liuhaotian/llava-v1.6-vicuna-7b", CheckpointFamily::Llava),
    ("liuhaotian/llava-v1.6-vicuna-13b", CheckpointFamily::Llava),
    ("liuhaotian/llava-v1.6-mistral-7b", CheckpointFamily::Llava),
    ("liuhaotian/llava-v1.6-34b", CheckpointFamily::Llava),
    ("liuhaotian/llava-v1.5-7b", CheckpointFamily::Llava),
    ("liuhaotian/llava-v1.5-13b", CheckpointFamily::Llava),
    ("liuhaotian/llava-v1.5-7b-lora", CheckpointFamily::Llava),
    ("liuhaotian/llava-v1.5-13b-lora", CheckpointFamily::Llava),
    ("SakanaAI/EvoVLM-JP-v1-7B", CheckpointFamily::EvoVlm),
    ("cyberagent/llava-calm2-siglip", CheckpointFamily::LlavaCalm2),
    ("microsoft/Phi-3-vision-128k-instruct", CheckpointFamily::Phi3Vision),
];

/// Registry of model adapters
#[derive(Debug, Clone, Default)]
pub struct AdapterRegistry {
    specs: BTreeMap<ModelIdentifier, AdapterSpec>,
}

impl AdapterRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in hosted and local entry
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for (id, provider) in HOSTED_MODELS {
            registry.register(AdapterSpec::hosted(*id, *provider));
        }
        for (id, family) in LOCAL_MODELS {
            registry.register(AdapterSpec::local(*id, *family));
        }
        registry
    }

    /// Built-in registry plus the run's configured hosted model.
    ///
    /// With an `api` provider configured, the configured identifier is served
    /// by that provider and sent to it verbatim.
    pub fn for_run(api: Option<HostedProvider>, identifier: &ModelIdentifier) -> Self {
        let mut registry = Self::builtin();
        if let Some(provider) = api {
            registry.register(
                AdapterSpec::hosted(identifier.clone(), provider)
                    .with_remote_model(identifier.as_str()),
            );
        }
        registry
    }

    /// Register a spec, replacing any entry with the same identifier
    pub fn register(&mut self, spec: AdapterSpec) {
        self.specs.insert(spec.identifier.clone(), spec);
    }

    pub fn get(&self, identifier: &ModelIdentifier) -> Option<&AdapterSpec> {
        self.specs.get(identifier)
    }

    pub fn contains(&self, identifier: &ModelIdentifier) -> bool {
        self.specs.contains_key(identifier)
    }

    /// Entries in identifier order
    pub fn specs(&self) -> impl Iterator<Item = &AdapterSpec> {
        self.specs.values()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_covers_every_family() {
        let registry = AdapterRegistry::builtin();
        assert_eq!(registry.len(), HOSTED_MODELS.len() + LOCAL_MODELS.len());

        let heron = registry
            .get(&ModelIdentifier::new("turing-motors/heron-chat-blip-ja-stablelm-base-7b-v0"))
            .unwrap();
        assert_eq!(heron.backend_kind(), BackendKind::LocalCheckpoint);
        assert_eq!(heron.adapter_name(), "HeronType1ResponseGenerator");

        let gpt = registry.get(&ModelIdentifier::new("openai/gpt-4o")).unwrap();
        assert_eq!(gpt.backend_kind(), BackendKind::HostedApi);
        assert!(matches!(
            &gpt.recipe,
            AdapterRecipe::Hosted { remote_model, credential, .. }
                if remote_model == "gpt-4o" && credential == "OPENAI_API_KEY"
        ));
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let registry = AdapterRegistry::builtin();
        assert!(registry.contains(&ModelIdentifier::new("Qwen/Qwen-VL-Chat")));
        assert!(!registry.contains(&ModelIdentifier::new("qwen/qwen-vl-chat")));
    }

    #[test]
    fn configured_api_registers_model_verbatim() {
        let id = ModelIdentifier::new("gpt-4o-mini");
        let registry = AdapterRegistry::for_run(Some(HostedProvider::OpenAi), &id);
        let spec = registry.get(&id).unwrap();
        assert!(matches!(
            &spec.recipe,
            AdapterRecipe::Hosted { provider: HostedProvider::OpenAi, remote_model, .. }
                if remote_model == "gpt-4o-mini"
        ));
    }

    #[test]
    fn provider_names_round_trip_through_serde() {
        let p: HostedProvider = serde_json::from_str("\"gemini\"").unwrap();
        assert_eq!(p, HostedProvider::Gemini);
        assert_eq!(p.to_string(), "gemini");
    }
}
