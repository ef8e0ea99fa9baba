//! Run configuration
//!
//! One file per run, in any format the kernel loader understands. Values can
//! reference environment variables (`${VAR}`) and be overridden with
//! `VLBENCH_`-prefixed variables, e.g. `VLBENCH_MODEL__SKIP_APPROVAL=true`.

use crate::registry::HostedProvider;
use crate::synthesis::codegen::CodeGenBackendKind;
use error_stack::{Report, ResultExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vlbench_kernel::config::{self as loader, ConfigFormat};
use vlbench_kernel::{GenerationConfig, KernelError, KernelResult, ModelIdentifier, RetryPolicy};

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "VLBENCH";

/// `model:` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSection {
    /// Model identifier or checkpoint path
    pub pretrained_model_name_or_path: String,
    /// Synthesize an adapter when the identifier is not in the registry
    #[serde(default)]
    pub automatic_adapter_generation: bool,
    /// Pre-approve generated code
    #[serde(default)]
    pub skip_approval: bool,
    /// Code-generation backend used for synthesis
    #[serde(default)]
    pub codegen_backend: CodeGenBackendKind,
    /// Constructor name of a previously approved unit
    #[serde(default)]
    pub class_name: Option<String>,
}

impl ModelSection {
    pub fn identifier(&self) -> ModelIdentifier {
        ModelIdentifier::new(self.pretrained_model_name_or_path.clone())
    }
}

/// `generation:` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationSection {
    #[serde(default)]
    pub args: GenerationConfig,
}

/// `paths:` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsSection {
    /// Where approved units are written
    #[serde(default = "default_adapter_dir")]
    pub adapter_dir: PathBuf,
    /// Root of the versioned artifact store
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
}

fn default_adapter_dir() -> PathBuf {
    PathBuf::from("generated_adapters")
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_device() -> String {
    "cuda:0".to_string()
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            adapter_dir: default_adapter_dir(),
            artifact_dir: default_artifact_dir(),
        }
    }
}

/// Complete run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub model: ModelSection,
    /// Hosted provider the configured model is served by
    #[serde(default)]
    pub api: Option<HostedProvider>,
    /// Weight precision for local checkpoints
    #[serde(default)]
    pub torch_dtype: Option<String>,
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default)]
    pub generation: GenerationSection,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub paths: PathsSection,
}

impl RunConfig {
    /// Minimal configuration for one model, everything else defaulted
    pub fn for_model(identifier: impl Into<String>) -> Self {
        Self {
            model: ModelSection {
                pretrained_model_name_or_path: identifier.into(),
                automatic_adapter_generation: false,
                skip_approval: false,
                codegen_backend: CodeGenBackendKind::default(),
                class_name: None,
            },
            api: None,
            torch_dtype: None,
            device: default_device(),
            generation: GenerationSection::default(),
            retry: RetryPolicy::default(),
            paths: PathsSection::default(),
        }
    }

    /// Load from a file, applying `VLBENCH_` overrides
    pub fn load(path: &Path) -> KernelResult<Self> {
        let config: RunConfig = loader::load_with_env(path, ENV_PREFIX)
            .map_err(|e| Report::new(KernelError::from(e)))
            .attach(format!("loading run config from {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a string in the given format
    pub fn from_str(content: &str, format: ConfigFormat) -> KernelResult<Self> {
        let config: RunConfig = loader::from_str(content, format)
            .map_err(|e| Report::new(KernelError::from(e)))
            .attach("parsing run config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> KernelResult<()> {
        self.generation
            .args
            .validate()
            .map_err(|e| Report::new(KernelError::from(e)))
            .attach("validating generation.args")?;
        self.generation
            .args
            .eos_token_ids()
            .map_err(|e| Report::new(KernelError::from(e)))
            .attach("validating generation.args.eos_token_id_list")?;
        if self.model.pretrained_model_name_or_path.trim().is_empty() {
            return Err(Report::new(KernelError::Internal(
                "model.pretrained_model_name_or_path is empty".to_string(),
            )));
        }
        Ok(())
    }

    pub fn identifier(&self) -> ModelIdentifier {
        self.model.identifier()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
model:
  pretrained_model_name_or_path: "vendor/new-model"
  automatic_adapter_generation: true
  skip_approval: false
  codegen_backend: "claude-3-opus"
api: null
device: "cuda:1"
generation:
  args:
    max_length: 128
    temperature: 0.0
    do_sample: false
    no_repeat_ngram_size: 0
    eos_token_id_list: "[2, 13]"
retry:
  max_attempts: 3
  delay_secs: 2
paths:
  adapter_dir: "out/adapters"
"#;

    #[test]
    fn parses_full_yaml() {
        let cfg = RunConfig::from_str(YAML, ConfigFormat::Yaml).unwrap();
        assert_eq!(cfg.identifier().as_str(), "vendor/new-model");
        assert!(cfg.model.automatic_adapter_generation);
        assert_eq!(cfg.model.codegen_backend, CodeGenBackendKind::ClaudeOpus);
        assert_eq!(cfg.device, "cuda:1");
        assert_eq!(cfg.generation.args.max_length, 128);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.paths.adapter_dir, PathBuf::from("out/adapters"));
        assert_eq!(cfg.paths.artifact_dir, PathBuf::from("artifacts"));
    }

    #[test]
    fn defaults_for_missing_sections() {
        let cfg = RunConfig::from_str(
            "model:\n  pretrained_model_name_or_path: openai/gpt-4o\n",
            ConfigFormat::Yaml,
        )
        .unwrap();
        assert_eq!(cfg, RunConfig::for_model("openai/gpt-4o"));
    }

    #[test]
    fn rejects_unknown_codegen_backend() {
        let yaml = "model:\n  pretrained_model_name_or_path: a/b\n  codegen_backend: llama\n";
        assert!(RunConfig::from_str(yaml, ConfigFormat::Yaml).is_err());
    }

    #[test]
    fn rejects_bad_token_list() {
        let yaml = "model:\n  pretrained_model_name_or_path: a/b\ngeneration:\n  args:\n    max_length: 8\n    eos_token_id_list: \"[a]\"\n";
        let err = RunConfig::from_str(yaml, ConfigFormat::Yaml).unwrap_err();
        assert!(format!("{:?}", err).contains("eos_token_id_list"));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        std::fs::write(&path, YAML).unwrap();
        let cfg = RunConfig::load(&path).unwrap();
        assert_eq!(cfg.retry.delay, std::time::Duration::from_secs(2));
    }
}
