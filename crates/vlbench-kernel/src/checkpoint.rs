//! Local checkpoint runtime seam
//!
//! Loading weights, tokenizing and decoding belong to an external runtime.
//! Adapters only format prompts and post-process text; they reach the runtime
//! through [`CheckpointLoader`] and [`LoadedCheckpoint`].
//!
//! Per-call scratch (input tensors, pixel buffers) is staged with
//! [`LoadedCheckpoint::stage`] and held by a [`ScratchGuard`], which releases
//! it when dropped: on normal return, on error and on panic unwinding.

use crate::error::{BoxError, GenerationError};
use crate::generator::ImageRef;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Request to load a checkpoint onto a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRequest {
    /// Checkpoint path or hub id
    pub model_path: String,
    /// Device reference, e.g. `cuda:0`
    pub device: String,
    /// Weight precision (`bf16`, `fp16`, `fp32`, `int8`)
    pub dtype: Option<String>,
    /// Whether checkpoint-provided code may run during loading
    pub trust_remote_code: bool,
}

/// One turn of a chat-formatted prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Prompt in the shape the checkpoint expects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptInput {
    /// Fully formatted text
    Text(String),
    /// Turns rendered with the checkpoint's own chat template
    Chat {
        turns: Vec<ChatTurn>,
        add_generation_prompt: bool,
    },
}

/// Everything staged for one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedInput {
    pub prompt: PromptInput,
    pub image: ImageRef,
}

/// How the output length is bounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LengthLimit {
    /// Bound on prompt plus generated tokens
    Total(u32),
    /// Bound on generated tokens only
    NewTokens(u32),
}

/// Decoding parameters for one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeParams {
    pub length: LengthLimit,
    pub temperature: f32,
    pub do_sample: bool,
    pub no_repeat_ngram_size: u32,
    /// Extra stop token ids, on top of the checkpoint's own
    pub stop_token_ids: Vec<i64>,
    pub min_length: Option<u32>,
    pub top_p: Option<f32>,
    /// Drop the prompt tokens from the decoded text
    pub strip_prompt: bool,
}

/// Handle to staged per-call scratch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScratchId(pub u64);

/// Special token ids a checkpoint exposes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecialTokens {
    pub pad: Option<i64>,
    pub eos: Option<i64>,
    pub newline: Option<i64>,
}

/// A checkpoint resident on its device.
///
/// Owns device memory for its whole lifetime. Calls are never concurrent.
pub trait LoadedCheckpoint: Send + Sync {
    /// Allocate per-call scratch for the given input
    fn stage(&self, input: &StagedInput) -> Result<ScratchId, GenerationError>;

    /// Decode from staged scratch
    fn decode(&self, scratch: ScratchId, params: &DecodeParams) -> Result<String, GenerationError>;

    /// Free per-call scratch and return cached device memory
    fn release(&self, scratch: ScratchId);

    fn special_tokens(&self) -> SpecialTokens {
        SpecialTokens::default()
    }
}

/// Loads checkpoints for the local adapters
pub trait CheckpointLoader: Send + Sync {
    fn load(&self, request: &CheckpointRequest) -> Result<Arc<dyn LoadedCheckpoint>, BoxError>;
}

/// Scoped ownership of staged scratch
pub struct ScratchGuard<'a> {
    checkpoint: &'a dyn LoadedCheckpoint,
    id: ScratchId,
}

impl<'a> ScratchGuard<'a> {
    /// Stage input; the returned guard releases it on drop
    pub fn stage(
        checkpoint: &'a dyn LoadedCheckpoint,
        input: &StagedInput,
    ) -> Result<Self, GenerationError> {
        let id = checkpoint.stage(input)?;
        Ok(Self { checkpoint, id })
    }

    pub fn id(&self) -> ScratchId {
        self.id
    }

    pub fn decode(&self, params: &DecodeParams) -> Result<String, GenerationError> {
        self.checkpoint.decode(self.id, params)
    }
}

impl Drop for ScratchGuard<'_> {
    fn drop(&mut self) {
        tracing::trace!(scratch = self.id.0, "releasing per-call scratch");
        self.checkpoint.release(self.id);
    }
}
