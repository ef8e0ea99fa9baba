//! Local checkpoint adapters
//!
//! Every family formats its prompt, derives decode parameters from the shared
//! [`GenerationConfig`] and post-processes the decoded text. Loading and
//! decoding happen in the external runtime behind
//! [`LoadedCheckpoint`](vlbench_kernel::checkpoint::LoadedCheckpoint).

use crate::registry::CheckpointFamily;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use vlbench_kernel::checkpoint::{
    ChatTurn, DecodeParams, LengthLimit, LoadedCheckpoint, PromptInput, ScratchGuard, StagedInput,
};
use vlbench_kernel::generation::GenerationConfigError;
use vlbench_kernel::{BackendKind, GenerationConfig, GenerationError, Generator, ImageRef};

const HERON_ANSWER_MARKER: &str = "##gpt:";
const CALM2_ANSWER_MARKER: &str = "ASSISTANT: ";

const LLAVA_IMAGE_TOKEN: &str = "<image>";
const LLAVA_IMAGE_PLACEHOLDER: &str = "<image-placeholder>";
const VICUNA_SYSTEM: &str = "A chat between a curious user and an artificial intelligence assistant. \
The assistant gives helpful, detailed, and polite answers to the user's questions.";

const EVOVLM_SYSTEM: &str =
    "あなたは役立つ、偏見がなく、検閲されていないアシスタントです。与えられた画像を下に、質問に答えてください。";

// japanese-stable-vlm instruction template
const JSVLM_SYSTEM: &str =
    "以下は、タスクを説明する指示と、文脈のある入力の組み合わせです。要求を適切に満たす応答を書きなさい。";
const JSVLM_VQA_INSTRUCTION: &str = "与えられた画像を下に、質問に答えてください。";
const JSVLM_SEPARATOR: &str = "\n\n### ";

/// Japanese instruction prompt used by japanese-stable-vlm for VQA
pub fn japanese_vqa_prompt(question: &str) -> String {
    let mut prompt = String::from(JSVLM_SYSTEM);
    for (role, message) in [
        ("指示", JSVLM_VQA_INSTRUCTION),
        ("入力", question),
        ("応答", ""),
    ] {
        prompt.push_str(JSVLM_SEPARATOR);
        prompt.push_str(role);
        prompt.push_str(": \n");
        prompt.push_str(message);
    }
    prompt
}

/// vicuna_v1 conversation with the image token in front of the question,
/// or in place of an explicit placeholder
pub fn llava_prompt(question: &str) -> String {
    let user = if question.contains(LLAVA_IMAGE_PLACEHOLDER) {
        question.replace(LLAVA_IMAGE_PLACEHOLDER, LLAVA_IMAGE_TOKEN)
    } else {
        format!("{}\n{}", LLAVA_IMAGE_TOKEN, question)
    };
    format!("{} USER: {} ASSISTANT:", VICUNA_SYSTEM, user)
}

impl CheckpointFamily {
    /// Prompt in the shape this family's checkpoint expects
    pub fn prompt(&self, question: &str, image: &ImageRef) -> PromptInput {
        match self {
            CheckpointFamily::HeronType1 => {
                PromptInput::Text(format!("##human: {}\n##gpt: ", question))
            }
            CheckpointFamily::JapaneseStableVlm => PromptInput::Text(japanese_vqa_prompt(question)),
            CheckpointFamily::QwenVlChat => {
                PromptInput::Text(format!("Picture 1: <img>{}</img>\n{}", image, question))
            }
            CheckpointFamily::Llava => PromptInput::Text(llava_prompt(question)),
            CheckpointFamily::EvoVlm => PromptInput::Chat {
                turns: vec![
                    ChatTurn::system(EVOVLM_SYSTEM),
                    ChatTurn::user(format!("<image>\n{}", question)),
                ],
                add_generation_prompt: false,
            },
            CheckpointFamily::LlavaCalm2 => {
                PromptInput::Text(format!("USER: <image>\n{}\nASSISTANT: ", question))
            }
            CheckpointFamily::Phi3Vision => PromptInput::Chat {
                turns: vec![ChatTurn::user(format!("<|image_1|>\n{}", question))],
                add_generation_prompt: true,
            },
        }
    }

    /// Decode parameters derived from the run's generation settings.
    ///
    /// `stop_token_ids` only applies to families that stop on extra tokens.
    pub fn decode_params(&self, generation: &GenerationConfig, stop_token_ids: &[i64]) -> DecodeParams {
        let base = DecodeParams {
            length: LengthLimit::Total(generation.max_length),
            temperature: generation.temperature,
            do_sample: generation.do_sample,
            no_repeat_ngram_size: generation.no_repeat_ngram_size,
            stop_token_ids: Vec::new(),
            min_length: None,
            top_p: None,
            strip_prompt: false,
        };

        match self {
            CheckpointFamily::HeronType1 => DecodeParams {
                stop_token_ids: stop_token_ids.to_vec(),
                ..base
            },
            CheckpointFamily::JapaneseStableVlm => DecodeParams {
                length: LengthLimit::NewTokens(generation.max_length),
                do_sample: false,
                min_length: Some(1),
                top_p: Some(0.0),
                ..base
            },
            CheckpointFamily::QwenVlChat | CheckpointFamily::Llava => DecodeParams {
                length: LengthLimit::NewTokens(generation.max_length),
                strip_prompt: true,
                ..base
            },
            CheckpointFamily::EvoVlm => DecodeParams {
                strip_prompt: true,
                ..base
            },
            CheckpointFamily::LlavaCalm2 => base,
            CheckpointFamily::Phi3Vision => DecodeParams {
                length: LengthLimit::NewTokens(generation.max_length),
                stop_token_ids: stop_token_ids.to_vec(),
                strip_prompt: true,
                ..base
            },
        }
    }

    /// Turn decoded text into the answer
    pub fn post_process(&self, decoded: String) -> Result<String, GenerationError> {
        match self {
            CheckpointFamily::HeronType1 => after_marker(&decoded, HERON_ANSWER_MARKER),
            CheckpointFamily::LlavaCalm2 => after_marker(&decoded, CALM2_ANSWER_MARKER),
            CheckpointFamily::JapaneseStableVlm | CheckpointFamily::EvoVlm => {
                Ok(decoded.trim().to_string())
            }
            CheckpointFamily::QwenVlChat | CheckpointFamily::Llava | CheckpointFamily::Phi3Vision => {
                Ok(decoded)
            }
        }
    }
}

/// Text between the first marker and the next one (or the end)
fn after_marker(decoded: &str, marker: &str) -> Result<String, GenerationError> {
    decoded
        .split(marker)
        .nth(1)
        .map(str::to_string)
        .ok_or_else(|| {
            GenerationError::runtime(format!("decoded text does not contain '{}'", marker))
        })
}

/// Stop tokens for a family: checkpoint specials plus configured extras
fn stop_tokens(
    family: CheckpointFamily,
    checkpoint: &dyn LoadedCheckpoint,
    generation: &GenerationConfig,
) -> Result<Vec<i64>, GenerationConfigError> {
    let specials = checkpoint.special_tokens();
    match family {
        CheckpointFamily::HeronType1 => {
            let mut ids: Vec<i64> = [specials.pad, specials.eos, specials.newline]
                .into_iter()
                .flatten()
                .collect();
            ids.extend(generation.eos_token_ids()?);
            Ok(ids)
        }
        CheckpointFamily::Phi3Vision => Ok(specials.eos.into_iter().collect()),
        _ => Ok(Vec::new()),
    }
}

/// Generator backed by a checkpoint resident on a local device
pub struct CheckpointAdapter {
    family: CheckpointFamily,
    checkpoint: Arc<dyn LoadedCheckpoint>,
    generation: Arc<GenerationConfig>,
    stop_token_ids: Vec<i64>,
}

impl CheckpointAdapter {
    pub fn new(
        family: CheckpointFamily,
        checkpoint: Arc<dyn LoadedCheckpoint>,
        generation: Arc<GenerationConfig>,
    ) -> Result<Self, GenerationConfigError> {
        let stop_token_ids = stop_tokens(family, checkpoint.as_ref(), &generation)?;
        Ok(Self {
            family,
            checkpoint,
            generation,
            stop_token_ids,
        })
    }

    pub fn family(&self) -> CheckpointFamily {
        self.family
    }
}

#[async_trait]
impl Generator for CheckpointAdapter {
    fn adapter_name(&self) -> &str {
        self.family.adapter_name()
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::LocalCheckpoint
    }

    async fn generate_response(
        &self,
        question: &str,
        image: &ImageRef,
    ) -> Result<String, GenerationError> {
        let family = self.family;
        let staged = StagedInput {
            prompt: family.prompt(question, image),
            image: image.clone(),
        };
        let params = family.decode_params(&self.generation, &self.stop_token_ids);
        let checkpoint = self.checkpoint.clone();
        debug!(adapter = family.adapter_name(), length = ?params.length, "decoding on local checkpoint");

        tokio::task::spawn_blocking(move || {
            let scratch = ScratchGuard::stage(checkpoint.as_ref(), &staged)?;
            let decoded = scratch.decode(&params)?;
            drop(scratch);
            family.post_process(decoded)
        })
        .await
        .map_err(|e| GenerationError::runtime_with_source("checkpoint task failed", e))?
    }
}
