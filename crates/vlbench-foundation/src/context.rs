//! Per-run context
//!
//! Built once per run and handed to every component that needs configuration,
//! credentials or runtime services. Nothing here is process-global.

use crate::config::RunConfig;
use crate::retry::RetryWrapper;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use vlbench_kernel::checkpoint::CheckpointLoader;
use vlbench_kernel::retry::{Sleeper, TokioSleeper};
use vlbench_kernel::{GenerationConfig, ModelIdentifier};

/// Timeout of a single HTTP request to a hosted backend
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Resolves credential references (environment variable names) to secrets
#[derive(Clone, Default)]
pub struct Credentials {
    overrides: HashMap<String, String>,
}

impl Credentials {
    /// Read everything from the process environment
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Fixed value for one reference, taking precedence over the environment
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(name.into(), value.into());
        self
    }

    /// Secret for a reference; empty values count as missing
    pub fn resolve(&self, name: &str) -> Option<String> {
        self.overrides
            .get(name)
            .cloned()
            .or_else(|| std::env::var(name).ok())
            .filter(|v| !v.trim().is_empty())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.overrides.keys().collect();
        names.sort();
        f.debug_struct("Credentials")
            .field("overrides", &names)
            .finish()
    }
}

/// Everything one run shares between components
#[derive(Clone)]
pub struct RunContext {
    config: Arc<RunConfig>,
    generation: Arc<GenerationConfig>,
    credentials: Credentials,
    checkpoint_loader: Option<Arc<dyn CheckpointLoader>>,
    sleeper: Arc<dyn Sleeper>,
    http_timeout: Duration,
}

impl RunContext {
    pub fn new(config: RunConfig) -> Self {
        let generation = Arc::new(config.generation.args.clone());
        Self {
            config: Arc::new(config),
            generation,
            credentials: Credentials::from_env(),
            checkpoint_loader: None,
            sleeper: Arc::new(TokioSleeper),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_checkpoint_loader(mut self, loader: Arc<dyn CheckpointLoader>) -> Self {
        self.checkpoint_loader = Some(loader);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Shared, read-only generation parameters
    pub fn generation(&self) -> Arc<GenerationConfig> {
        self.generation.clone()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn checkpoint_loader(&self) -> Option<&Arc<dyn CheckpointLoader>> {
        self.checkpoint_loader.as_ref()
    }

    /// Retry wrapper with the run's policy and sleeper
    pub fn retry_wrapper(&self) -> RetryWrapper {
        RetryWrapper::new(self.config.retry, self.sleeper.clone())
    }

    /// HTTP client for hosted backends
    pub fn http_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder().timeout(self.http_timeout).build()
    }

    /// Argument handed to a synthesized adapter's constructor
    pub fn adapter_arguments(&self, identifier: &ModelIdentifier) -> serde_json::Value {
        serde_json::json!({
            "identifier": identifier.as_str(),
            "model_path": identifier.as_str(),
            "device": self.config.device,
            "torch_dtype": self.config.torch_dtype,
            "generation": self.generation.to_json(),
        })
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("model", &self.config.model.pretrained_model_name_or_path)
            .field("credentials", &self.credentials)
            .field("checkpoint_loader", &self.checkpoint_loader.is_some())
            .field("http_timeout", &self.http_timeout)
            .finish_non_exhaustive()
    }
}
