//! Identifier → generator resolution
//!
//! 1. an active instance for the identifier is reused
//! 2. a registry entry is constructed directly
//! 3. otherwise, with synthesis enabled: a previously approved unit is
//!    reloaded, or a new adapter is synthesized, approved, loaded, recorded
//!    and instantiated
//! 4. otherwise [`DispatchError::UnknownModel`]
//!
//! Synthesized adapters run under the same retry wrapper as hosted ones, so
//! a transient failure inside the script is retried with the run's policy.
//! A unit whose artifact cannot be recorded is discarded again.

use crate::adapters;
use crate::approval::{ApprovalGate, Operator};
use crate::artifact::{ArtifactStore, LocalArtifactStore};
use crate::context::RunContext;
use crate::loader::{AdapterFactory, DynamicLoader, HttpScriptHost};
use crate::registry::AdapterRegistry;
use crate::retry::RetryingGenerator;
use crate::synthesis::SynthesisPipeline;
use crate::synthesis::codegen::{self, CodeGenBackend};
use crate::synthesis::model_card::{HuggingFaceModelCards, ModelCardSource};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use vlbench_extra::ScriptHost;
use vlbench_kernel::{DispatchError, Generator, ModelIdentifier};

/// Source of this module, shown to the code generator
pub const DISPATCH_HARNESS_SOURCE: &str = include_str!("dispatcher.rs");

/// Resolves model identifiers to generators
pub struct Dispatcher {
    ctx: RunContext,
    registry: AdapterRegistry,
    synthesis_enabled: bool,
    model_cards: Arc<dyn ModelCardSource>,
    codegen: Option<Arc<dyn CodeGenBackend>>,
    gate: ApprovalGate,
    loader: DynamicLoader,
    artifacts: Arc<dyn ArtifactStore>,
    active: tokio::sync::Mutex<HashMap<ModelIdentifier, Arc<dyn Generator>>>,
    class_names: parking_lot::Mutex<HashMap<ModelIdentifier, String>>,
}

impl Dispatcher {
    pub fn builder(ctx: RunContext) -> DispatcherBuilder {
        DispatcherBuilder::new(ctx)
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Constructor name recorded for an identifier after approval
    pub fn class_name_for(&self, identifier: &ModelIdentifier) -> Option<String> {
        self.class_names.lock().get(identifier).cloned().or_else(|| {
            let model = &self.ctx.config().model;
            (model.identifier() == *identifier)
                .then(|| model.class_name.clone())
                .flatten()
        })
    }

    /// Generator for `identifier`
    ///
    /// Resolution is serialized, so the operator is asked at most once per
    /// identifier per dispatcher.
    #[instrument(skip_all, fields(%identifier))]
    pub async fn resolve(
        &self,
        identifier: &ModelIdentifier,
    ) -> Result<Arc<dyn Generator>, DispatchError> {
        let mut active = self.active.lock().await;
        if let Some(generator) = active.get(identifier) {
            debug!("reusing active adapter");
            return Ok(generator.clone());
        }

        let generator = self.build(identifier).await?;
        info!(
            adapter = generator.adapter_name(),
            backend = %generator.backend_kind(),
            "adapter ready"
        );
        active.insert(identifier.clone(), generator.clone());
        Ok(generator)
    }

    async fn build(&self, identifier: &ModelIdentifier) -> Result<Arc<dyn Generator>, DispatchError> {
        if let Some(spec) = self.registry.get(identifier) {
            debug!(adapter = spec.adapter_name(), "registry hit");
            return adapters::construct(spec, &self.ctx).await;
        }

        if !self.synthesis_enabled {
            return Err(DispatchError::UnknownModel(identifier.clone()));
        }

        if let Some(generator) = self.reload_persisted(identifier).await? {
            return Ok(generator);
        }
        self.synthesize(identifier).await
    }

    async fn reload_persisted(
        &self,
        identifier: &ModelIdentifier,
    ) -> Result<Option<Arc<dyn Generator>>, DispatchError> {
        let Some(class_name) = self.class_name_for(identifier) else {
            return Ok(None);
        };
        let unit = identifier.unit_name();
        if !tokio::fs::try_exists(self.loader.unit_path(&unit)).await? {
            return Ok(None);
        }

        info!(%unit, %class_name, "loading previously approved adapter");
        let factory = match self.loader.factory(&unit) {
            Some(factory) => factory,
            None => self.loader.load_persisted(&unit, &class_name).await?,
        };
        self.instantiate(&factory, identifier).await.map(Some)
    }

    async fn synthesize(
        &self,
        identifier: &ModelIdentifier,
    ) -> Result<Arc<dyn Generator>, DispatchError> {
        info!("no adapter registered, synthesizing one");
        let codegen = match &self.codegen {
            Some(codegen) => codegen.clone(),
            None => codegen::backend_for(self.ctx.config().model.codegen_backend, &self.ctx)?,
        };
        let pipeline = SynthesisPipeline::new(self.model_cards.clone(), codegen);

        let artifact = pipeline.synthesize(identifier).await?;
        let approved = self.gate.review(artifact).await?;
        let recorded = approved.artifact().clone();

        let factory = self.loader.load(approved).await?;
        if let Err(err) = self.artifacts.record(&recorded).await {
            warn!(unit = %recorded.unit, %err, "artifact not recorded, discarding unit");
            self.loader.discard(&recorded.unit).await?;
            return Err(err);
        }
        self.class_names
            .lock()
            .insert(identifier.clone(), factory.class_name().to_string());

        self.instantiate(&factory, identifier).await
    }

    async fn instantiate(
        &self,
        factory: &AdapterFactory,
        identifier: &ModelIdentifier,
    ) -> Result<Arc<dyn Generator>, DispatchError> {
        let generator = factory
            .instantiate(self.ctx.adapter_arguments(identifier))
            .await?;
        Ok(Arc::new(RetryingGenerator::new(generator, self.ctx.retry_wrapper())))
    }
}

/// Builder for [`Dispatcher`]; everything not set comes from the run config
pub struct DispatcherBuilder {
    ctx: RunContext,
    registry: Option<AdapterRegistry>,
    model_cards: Option<Arc<dyn ModelCardSource>>,
    codegen: Option<Arc<dyn CodeGenBackend>>,
    operator: Option<Arc<dyn Operator>>,
    artifacts: Option<Arc<dyn ArtifactStore>>,
    script_host: Option<Arc<dyn ScriptHost>>,
}

impl DispatcherBuilder {
    pub fn new(ctx: RunContext) -> Self {
        Self {
            ctx,
            registry: None,
            model_cards: None,
            codegen: None,
            operator: None,
            artifacts: None,
            script_host: None,
        }
    }

    pub fn with_registry(mut self, registry: AdapterRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_model_cards(mut self, model_cards: Arc<dyn ModelCardSource>) -> Self {
        self.model_cards = Some(model_cards);
        self
    }

    pub fn with_codegen(mut self, codegen: Arc<dyn CodeGenBackend>) -> Self {
        self.codegen = Some(codegen);
        self
    }

    pub fn with_operator(mut self, operator: Arc<dyn Operator>) -> Self {
        self.operator = Some(operator);
        self
    }

    pub fn with_artifact_store(mut self, artifacts: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    pub fn with_script_host(mut self, host: Arc<dyn ScriptHost>) -> Self {
        self.script_host = Some(host);
        self
    }

    pub fn build(self) -> Result<Dispatcher, DispatchError> {
        let config = self.ctx.config();
        let registry = self
            .registry
            .unwrap_or_else(|| AdapterRegistry::for_run(config.api, &config.identifier()));

        let script_host = match self.script_host {
            Some(host) => host,
            None => {
                let client = self.ctx.http_client().map_err(std::io::Error::other)?;
                Arc::new(HttpScriptHost::new(client))
            }
        };
        let loader = DynamicLoader::with_host(config.paths.adapter_dir.clone(), script_host);

        let artifacts = self
            .artifacts
            .unwrap_or_else(|| Arc::new(LocalArtifactStore::new(config.paths.artifact_dir.clone())));
        let model_cards = self
            .model_cards
            .unwrap_or_else(|| Arc::new(HuggingFaceModelCards::from_env()));
        let gate = ApprovalGate::new(config.model.skip_approval, self.operator);

        Ok(Dispatcher {
            synthesis_enabled: config.model.automatic_adapter_generation,
            registry,
            model_cards,
            codegen: self.codegen,
            gate,
            loader,
            artifacts,
            active: tokio::sync::Mutex::new(HashMap::new()),
            class_names: parking_lot::Mutex::new(HashMap::new()),
            ctx: self.ctx,
        })
    }
}
