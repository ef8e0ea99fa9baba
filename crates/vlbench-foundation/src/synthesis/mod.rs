//! Adapter synthesis
//!
//! model card → prompt → code generation → source extraction → naming.
//! The result is a [`SynthesisArtifact`] in [`ApprovalStatus::Pending`];
//! nothing is written or executed here.

pub mod codegen;
pub mod extract;
pub mod model_card;
pub mod prompt;

use codegen::CodeGenBackend;
use model_card::ModelCardSource;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use vlbench_kernel::{DispatchError, ModelIdentifier};

pub use extract::MARKER;

/// Where an artifact is in the approval flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
}

/// Candidate adapter source produced by synthesis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisArtifact {
    pub identifier: ModelIdentifier,
    /// Everything after the marker line
    pub source: String,
    /// The single declared `*ResponseGenerator` constructor
    pub class_name: String,
    /// Name the unit is persisted under
    pub unit: String,
    pub status: ApprovalStatus,
}

impl SynthesisArtifact {
    pub fn pending(identifier: &ModelIdentifier, source: String, class_name: String) -> Self {
        Self {
            unit: identifier.unit_name(),
            identifier: identifier.clone(),
            source,
            class_name,
            status: ApprovalStatus::Pending,
        }
    }
}

/// Produces candidate adapters for unknown identifiers
pub struct SynthesisPipeline {
    model_cards: Arc<dyn ModelCardSource>,
    codegen: Arc<dyn CodeGenBackend>,
}

impl SynthesisPipeline {
    pub fn new(model_cards: Arc<dyn ModelCardSource>, codegen: Arc<dyn CodeGenBackend>) -> Self {
        Self { model_cards, codegen }
    }

    #[instrument(skip(self), fields(backend = %self.codegen.kind()))]
    pub async fn synthesize(
        &self,
        identifier: &ModelIdentifier,
    ) -> Result<SynthesisArtifact, DispatchError> {
        let card = self.model_cards.fetch(identifier).await?;
        debug!(card_bytes = card.len(), "model card fetched");

        let prompt = prompt::build_prompt(identifier, &card);
        let response = self.codegen.generate(&prompt).await?;
        debug!(response_bytes = response.len(), "code generation finished");

        let source = extract::extract_source(&response, identifier)?;
        let class_name = extract::derive_class_name(&source, identifier)?;
        info!(%class_name, unit = %identifier.unit_name(), "adapter synthesized, awaiting approval");

        Ok(SynthesisArtifact::pending(identifier, source, class_name))
    }
}
