//! Dynamic loading of approved adapter units
//!
//! An approved source is compiled and checked for its constructor and
//! `generate_response` before anything touches the disk. Only a unit that
//! passes is written to `<adapter_dir>/<unit>.rhai` and registered as an
//! [`AdapterFactory`] under its unit name. Script calls run on the blocking
//! pool; the host bridges back to the runtime for HTTP.

use crate::adapters::send_json;
use crate::adapters::vision::{detect_mime_type, encode_file};
use crate::approval::ApprovedArtifact;
use crate::synthesis::ApprovalStatus;
use crate::synthesis::extract::constructor_names;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rhai::Dynamic;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use vlbench_extra::{CompiledScript, RhaiError, RhaiScriptEngine, ScriptHost, ScriptSecurityConfig};
use vlbench_kernel::{BackendKind, DispatchError, GenerationError, Generator, ImageRef};

/// Extension of persisted units
pub const UNIT_EXTENSION: &str = "rhai";

/// Method every adapter script implements
pub const GENERATE_FUNCTION: &str = "generate_response";

/// [`ScriptHost`] backed by reqwest and the filesystem
pub struct HttpScriptHost {
    client: reqwest::Client,
}

impl HttpScriptHost {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl ScriptHost for HttpScriptHost {
    fn http_post_json(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, String> {
        // Called from the blocking pool, which keeps the runtime context.
        let handle = tokio::runtime::Handle::try_current().map_err(|e| e.to_string())?;

        let mut request = self.client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        debug!(%url, "script HTTP request");
        handle
            .block_on(send_json::<serde_json::Value>(request))
            .map_err(|e| e.to_string())
    }

    fn read_image_base64(&self, path: &Path) -> Result<String, String> {
        encode_file(path)
            .map(|encoded| encoded.data)
            .map_err(|e| format!("{}: {}", path.display(), e))
    }

    fn image_mime_type(&self, path: &Path) -> Result<String, String> {
        std::fs::read(path)
            .map(|bytes| detect_mime_type(&bytes).to_string())
            .map_err(|e| format!("{}: {}", path.display(), e))
    }
}

fn load_error(unit: &str, err: impl std::fmt::Display) -> DispatchError {
    DispatchError::AdapterLoad {
        unit: unit.to_string(),
        reason: err.to_string(),
    }
}

/// Builds adapter instances from one loaded unit
pub struct AdapterFactory {
    class_name: String,
    script: Arc<CompiledScript>,
    engine: Arc<RhaiScriptEngine>,
}

impl AdapterFactory {
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn unit(&self) -> &str {
        &self.script.unit
    }

    /// Run the constructor with `arguments` and wrap the resulting state
    pub async fn instantiate(
        &self,
        arguments: serde_json::Value,
    ) -> Result<Arc<dyn Generator>, DispatchError> {
        let engine = self.engine.clone();
        let script = self.script.clone();
        let class_name = self.class_name.clone();

        let state = tokio::task::spawn_blocking(move || {
            engine.construct(&script, &class_name, &arguments)
        })
        .await
        .map_err(|e| load_error(self.unit(), e))?
        .map_err(|e| load_error(self.unit(), format!("{} failed: {}", self.class_name, e)))?;

        info!(unit = %self.unit(), class_name = %self.class_name, "adapter instantiated");
        Ok(Arc::new(ScriptedGenerator {
            class_name: self.class_name.clone(),
            engine: self.engine.clone(),
            script: self.script.clone(),
            state: Arc::new(Mutex::new(state)),
        }))
    }
}

/// Generator backed by a loaded script and its constructed state
pub struct ScriptedGenerator {
    class_name: String,
    engine: Arc<RhaiScriptEngine>,
    script: Arc<CompiledScript>,
    state: Arc<Mutex<Dynamic>>,
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn adapter_name(&self) -> &str {
        &self.class_name
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::Synthesized
    }

    async fn generate_response(
        &self,
        question: &str,
        image: &ImageRef,
    ) -> Result<String, GenerationError> {
        let engine = self.engine.clone();
        let script = self.script.clone();
        let state = self.state.clone();
        let args = vec![
            Dynamic::from(question.to_string()),
            Dynamic::from(image.path().to_string_lossy().into_owned()),
        ];

        let answer = tokio::task::spawn_blocking(move || {
            let mut state = state.lock();
            engine.call_method(&script, &mut state, GENERATE_FUNCTION, args)
        })
        .await
        .map_err(|e| GenerationError::runtime_with_source("adapter task failed", e))?
        .map_err(|e: RhaiError| {
            GenerationError::runtime_with_source(format!("{} failed", self.class_name), e)
        })?;

        answer.into_string().map_err(|type_name| {
            GenerationError::runtime(format!(
                "{}.{} returned {} instead of a string",
                self.class_name, GENERATE_FUNCTION, type_name
            ))
        })
    }
}

/// Persists approved units and keeps their factories
pub struct DynamicLoader {
    adapter_dir: PathBuf,
    engine: Arc<RhaiScriptEngine>,
    factories: RwLock<HashMap<String, Arc<AdapterFactory>>>,
}

impl DynamicLoader {
    pub fn new(adapter_dir: impl Into<PathBuf>, engine: Arc<RhaiScriptEngine>) -> Self {
        Self {
            adapter_dir: adapter_dir.into(),
            engine,
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Loader whose scripts may use the network and read images through `host`
    pub fn with_host(adapter_dir: impl Into<PathBuf>, host: Arc<dyn ScriptHost>) -> Self {
        let engine = RhaiScriptEngine::new(ScriptSecurityConfig::approved_adapter(), host);
        Self::new(adapter_dir, Arc::new(engine))
    }

    pub fn adapter_dir(&self) -> &Path {
        &self.adapter_dir
    }

    /// File a unit is persisted to
    pub fn unit_path(&self, unit: &str) -> PathBuf {
        self.adapter_dir.join(format!("{}.{}", unit, UNIT_EXTENSION))
    }

    pub fn factory(&self, unit: &str) -> Option<Arc<AdapterFactory>> {
        self.factories.read().get(unit).cloned()
    }

    /// Validate, persist and register an approved artifact
    ///
    /// Nothing is written unless the source compiles and declares the
    /// expected functions.
    pub async fn load(&self, approved: ApprovedArtifact) -> Result<Arc<AdapterFactory>, DispatchError> {
        let artifact = approved.into_inner();
        if artifact.status != ApprovalStatus::Approved {
            return Err(DispatchError::NotApproved(artifact.unit));
        }

        let script = self
            .engine
            .compile(&artifact.unit, &artifact.source)
            .map_err(|e| load_error(&artifact.unit, e))?;
        validate(&script, &artifact.class_name)?;

        tokio::fs::create_dir_all(&self.adapter_dir).await?;
        let path = self.unit_path(&artifact.unit);
        tokio::fs::write(&path, &artifact.source).await?;
        info!(unit = %artifact.unit, path = %path.display(), "adapter unit written");

        Ok(self.register(script, &artifact.class_name))
    }

    /// Load a unit that already exists on disk
    pub async fn load_persisted(
        &self,
        unit: &str,
        class_name: &str,
    ) -> Result<Arc<AdapterFactory>, DispatchError> {
        let path = self.unit_path(unit);
        let script = self
            .engine
            .load_from_file(&path)
            .await
            .map_err(|e| load_error(unit, e))?;
        validate(&script, class_name)?;

        Ok(self.register(script, class_name))
    }

    /// Forget a unit and remove its file
    pub async fn discard(&self, unit: &str) -> Result<(), DispatchError> {
        self.factories.write().remove(unit);
        match tokio::fs::remove_file(self.unit_path(unit)).await {
            Ok(()) => {
                info!(unit, "adapter unit discarded");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn register(&self, script: CompiledScript, class_name: &str) -> Arc<AdapterFactory> {
        let unit = script.unit.clone();
        let factory = Arc::new(AdapterFactory {
            class_name: class_name.to_string(),
            script: Arc::new(script),
            engine: self.engine.clone(),
        });
        self.factories.write().insert(unit.clone(), factory.clone());
        debug!(%unit, class_name, "adapter factory registered");
        factory
    }
}

/// Exactly one constructor, named `class_name`, plus `generate_response/2`
fn validate(script: &CompiledScript, class_name: &str) -> Result<(), DispatchError> {
    let functions = script.functions();
    let declared = constructor_names(functions.iter().map(|f| f.name.as_str()));
    if declared.len() != 1 || declared[0] != class_name {
        return Err(load_error(
            &script.unit,
            format!("expected exactly one constructor {}, found {:?}", class_name, declared),
        ));
    }
    script
        .require_function(class_name, 1)
        .and_then(|_| script.require_function(GENERATE_FUNCTION, 2))
        .map_err(|e| load_error(&script.unit, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::{ApprovalGate, ScriptedOperator};
    use crate::synthesis::SynthesisArtifact;
    use crate::synthesis::prompt::REFERENCE_ADAPTER_SOURCE;
    use vlbench_extra::DeniedHost;
    use vlbench_kernel::ModelIdentifier;

    const COUNTER_ADAPTER: &str = r#"
fn CounterResponseGenerator(ctx) {
    #{ prefix: ctx.identifier, calls: 0 }
}

fn generate_response(question, image_path) {
    this.calls += 1;
    `${this.prefix}#${this.calls}: ${question}`
}
"#;

    fn loader(dir: &Path) -> DynamicLoader {
        DynamicLoader::with_host(dir, Arc::new(DeniedHost))
    }

    async fn approve(source: &str, class_name: &str) -> ApprovedArtifact {
        let artifact = SynthesisArtifact::pending(
            &ModelIdentifier::new("vendor/counter"),
            source.to_string(),
            class_name.to_string(),
        );
        ApprovalGate::new(false, Some(Arc::new(ScriptedOperator::new("y"))))
            .review(artifact)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn approved_unit_is_written_and_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader(dir.path());

        let factory = loader
            .load(approve(COUNTER_ADAPTER, "CounterResponseGenerator").await)
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("adapter_vendor_counter.rhai")).unwrap(),
            COUNTER_ADAPTER
        );
        assert!(loader.factory("adapter_vendor_counter").is_some());

        let generator = factory
            .instantiate(serde_json::json!({"identifier": "counter"}))
            .await
            .unwrap();
        assert_eq!(generator.adapter_name(), "CounterResponseGenerator");
        assert_eq!(generator.backend_kind(), BackendKind::Synthesized);

        let image = ImageRef::new("img.png");
        assert_eq!(generator.generate_response("a", &image).await.unwrap(), "counter#1: a");
        assert_eq!(generator.generate_response("b", &image).await.unwrap(), "counter#2: b");
    }

    #[tokio::test]
    async fn missing_generate_function_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let source = "fn FooResponseGenerator(ctx) { #{} }\n";
        let err = loader(dir.path())
            .load(approve(source, "FooResponseGenerator").await)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DispatchError::AdapterLoad { ref reason, .. } if reason.contains("generate_response")));
    }

    #[tokio::test]
    async fn rejected_units_are_never_written() {
        let dir = tempfile::tempdir().unwrap();
        let adapter_dir = dir.path().join("generated_adapters");
        let loader = loader(&adapter_dir);

        for source in [
            "fn FooResponseGenerator(ctx) { #{ \n",
            "fn FooResponseGenerator(ctx) { #{} }\n",
        ] {
            let err = loader
                .load(approve(source, "FooResponseGenerator").await)
                .await
                .err()
                .unwrap();
            assert!(matches!(err, DispatchError::AdapterLoad { .. }));
        }
        assert!(!adapter_dir.exists());
        assert!(loader.factory("adapter_vendor_counter").is_none());
    }

    #[tokio::test]
    async fn discard_removes_unit_and_factory() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader(dir.path());
        loader
            .load(approve(COUNTER_ADAPTER, "CounterResponseGenerator").await)
            .await
            .unwrap();

        loader.discard("adapter_vendor_counter").await.unwrap();
        assert!(!loader.unit_path("adapter_vendor_counter").exists());
        assert!(loader.factory("adapter_vendor_counter").is_none());
        loader.discard("adapter_vendor_counter").await.unwrap();
    }

    #[tokio::test]
    async fn constructor_in_comment_is_ignored_by_validation() {
        let dir = tempfile::tempdir().unwrap();
        let source = format!("// fn OldResponseGenerator(ctx) was replaced\n{}", COUNTER_ADAPTER);
        let factory = loader(dir.path())
            .load(approve(&source, "CounterResponseGenerator").await)
            .await
            .unwrap();
        assert_eq!(factory.class_name(), "CounterResponseGenerator");
    }

    #[tokio::test]
    async fn non_string_answer_is_runtime_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = "fn FooResponseGenerator(ctx) { #{} }\nfn generate_response(q, p) { 42 }\n";
        let factory = loader(dir.path())
            .load(approve(source, "FooResponseGenerator").await)
            .await
            .unwrap();
        let generator = factory.instantiate(serde_json::json!({})).await.unwrap();
        let err = generator
            .generate_response("q", &ImageRef::new("img.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Runtime { .. }));
    }

    #[tokio::test]
    async fn reference_adapter_loads() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader(dir.path());
        std::fs::write(loader.unit_path("adapter_reference"), REFERENCE_ADAPTER_SOURCE).unwrap();
        let factory = loader
            .load_persisted("adapter_reference", "OpenAIResponseGenerator")
            .await
            .unwrap();
        assert_eq!(factory.class_name(), "OpenAIResponseGenerator");
    }

    #[tokio::test]
    async fn image_helpers_read_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixel.png");
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        std::fs::write(&path, png).unwrap();

        let host = HttpScriptHost::new(reqwest::Client::new());
        assert_eq!(host.image_mime_type(&path).unwrap(), "image/png");
        assert!(!host.read_image_base64(&path).unwrap().is_empty());
        assert!(host.read_image_base64(&dir.path().join("missing.png")).is_err());
    }
}
