//! Generator Interface
//! 生成器接口
//!
//! 所有后端适配器（托管 API、本地检查点、合成脚本）都必须实现此 trait
//! Every backend adapter (hosted API, local checkpoint, synthesized script)
//! implements this trait.

use crate::error::GenerationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Source text of this module, handed to the code-generation backend as the
/// contract a synthesized adapter has to honour.
pub const GENERATOR_CONTRACT_SOURCE: &str = include_str!("generator.rs");

/// Suffix every adapter (class) name ends with
pub const ADAPTER_NAME_SUFFIX: &str = "ResponseGenerator";

/// 图像引用
/// Reference to the image a question is asked about
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(PathBuf);

impl ImageRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Read the raw image bytes
    pub async fn read(&self) -> Result<Vec<u8>, GenerationError> {
        tokio::fs::read(&self.0).await.map_err(|e| {
            GenerationError::InvalidInput(format!("cannot read image {}: {}", self.0.display(), e))
        })
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// 后端类型
/// Kind of backend behind a generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Hosted API reached over the network
    HostedApi,
    /// Locally loaded model checkpoint
    LocalCheckpoint,
    /// Adapter synthesized at runtime and loaded after approval
    Synthesized,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::HostedApi => write!(f, "hosted-api"),
            BackendKind::LocalCheckpoint => write!(f, "local-checkpoint"),
            BackendKind::Synthesized => write!(f, "synthesized"),
        }
    }
}

/// 生成器 trait
/// Generator trait
///
/// # 示例
/// # Example
///
/// ```rust,ignore
/// use vlbench_kernel::{Generator, ImageRef, GenerationError, BackendKind};
///
/// struct EchoResponseGenerator;
///
/// #[async_trait::async_trait]
/// impl Generator for EchoResponseGenerator {
///     fn adapter_name(&self) -> &str {
///         "EchoResponseGenerator"
///     }
///
///     fn backend_kind(&self) -> BackendKind {
///         BackendKind::LocalCheckpoint
///     }
///
///     async fn generate_response(
///         &self,
///         question: &str,
///         _image: &ImageRef,
///     ) -> Result<String, GenerationError> {
///         Ok(question.to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait Generator: Send + Sync {
    /// 适配器名称，以 `ResponseGenerator` 结尾
    /// Adapter (class) name, ending in `ResponseGenerator`
    fn adapter_name(&self) -> &str;

    /// 后端类型
    /// Backend kind
    fn backend_kind(&self) -> BackendKind;

    /// 回答关于图像的问题
    /// Answer a question about an image.
    ///
    /// Per-call resources are released before this returns, on success and
    /// on error alike. Partial output is never returned on error.
    async fn generate_response(
        &self,
        question: &str,
        image: &ImageRef,
    ) -> Result<String, GenerationError>;
}
