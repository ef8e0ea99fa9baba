//! Model card sources

use async_trait::async_trait;
use hf_hub::api::tokio::ApiBuilder;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;
use vlbench_kernel::{DispatchError, ModelIdentifier};

/// File holding a repository's model card
pub const MODEL_CARD_FILE: &str = "README.md";

/// Supplies the free-text description of a model
#[async_trait]
pub trait ModelCardSource: Send + Sync {
    async fn fetch(&self, identifier: &ModelIdentifier) -> Result<String, DispatchError>;
}

/// Model cards from the Hugging Face hub
#[derive(Debug, Clone, Default)]
pub struct HuggingFaceModelCards {
    token: Option<String>,
    cache_dir: Option<PathBuf>,
}

impl HuggingFaceModelCards {
    /// Uses `HF_TOKEN` when it is set
    pub fn from_env() -> Self {
        Self {
            token: std::env::var("HF_TOKEN").ok().filter(|t| !t.is_empty()),
            cache_dir: None,
        }
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl ModelCardSource for HuggingFaceModelCards {
    async fn fetch(&self, identifier: &ModelIdentifier) -> Result<String, DispatchError> {
        let card_error = |reason: String| DispatchError::ModelCard {
            identifier: identifier.clone(),
            reason,
        };

        let mut builder = ApiBuilder::new().with_token(self.token.clone());
        if let Some(dir) = &self.cache_dir {
            builder = builder.with_cache_dir(dir.clone());
        }
        let api = builder.build().map_err(|e| card_error(e.to_string()))?;

        let path = api
            .model(identifier.as_str().to_string())
            .get(MODEL_CARD_FILE)
            .await
            .map_err(|e| card_error(e.to_string()))?;
        debug!(%identifier, path = %path.display(), "model card downloaded");

        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| card_error(format!("{}: {}", path.display(), e)))
    }
}

/// Fixed cards keyed by identifier
#[derive(Debug, Clone, Default)]
pub struct StaticModelCards {
    cards: HashMap<ModelIdentifier, String>,
}

impl StaticModelCards {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, identifier: impl Into<ModelIdentifier>, card: impl Into<String>) -> Self {
        self.cards.insert(identifier.into(), card.into());
        self
    }
}

#[async_trait]
impl ModelCardSource for StaticModelCards {
    async fn fetch(&self, identifier: &ModelIdentifier) -> Result<String, DispatchError> {
        self.cards
            .get(identifier)
            .cloned()
            .ok_or_else(|| DispatchError::ModelCard {
                identifier: identifier.clone(),
                reason: "no model card available".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_cards() {
        let cards = StaticModelCards::new().with("vendor/new-model", "# New model");
        let card = cards.fetch(&ModelIdentifier::new("vendor/new-model")).await.unwrap();
        assert_eq!(card, "# New model");

        let err = cards.fetch(&ModelIdentifier::new("vendor/other")).await.unwrap_err();
        assert!(err.is_synthesis_failure());
    }
}
