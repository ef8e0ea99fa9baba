//! Offline batch runner
//!
//! Question file and answer file are both JSON lines. Questions are answered
//! one after another with a single generator.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};
use vlbench_kernel::{GenerationError, Generator, ImageRef, ModelIdentifier};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BatchError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid question on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize answer: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("question {question_id} failed: {source}")]
    Generation {
        question_id: serde_json::Value,
        #[source]
        source: GenerationError,
    },
}

/// One line of the question file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Passed through unchanged (number or string)
    pub question_id: serde_json::Value,
    pub text: String,
    /// Image file name, relative to the image directory
    pub image: String,
    #[serde(default)]
    pub image_category: Option<String>,
}

/// One line of the answer file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: serde_json::Value,
    pub images: Vec<String>,
    pub image_category: Option<String>,
    pub prompt: String,
    pub answer_id: String,
    pub model_id: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub text: String,
}

impl AnswerRecord {
    pub fn new(question: &Question, model_id: &ModelIdentifier, answer: String) -> Self {
        Self {
            question_id: question.question_id.clone(),
            images: vec![question.image.clone()],
            image_category: question.image_category.clone(),
            prompt: question.text.clone(),
            answer_id: String::new(),
            model_id: model_id.to_string(),
            metadata: serde_json::Map::new(),
            text: answer,
        }
    }
}

/// Counts from one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub answered: usize,
}

/// Parse a question file, skipping blank lines
pub async fn read_questions(path: &Path) -> Result<Vec<Question>, BatchError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| BatchError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|source| BatchError::Parse { line: i + 1, source })
        })
        .collect()
}

/// Answers a question file with one generator
pub struct BatchRunner {
    generator: Arc<dyn Generator>,
    model_id: ModelIdentifier,
    image_dir: PathBuf,
}

impl BatchRunner {
    pub fn new(
        generator: Arc<dyn Generator>,
        model_id: ModelIdentifier,
        image_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            generator,
            model_id,
            image_dir: image_dir.into(),
        }
    }

    /// Answer every question in `questions`, writing records to `output`
    #[instrument(skip_all, fields(model = %self.model_id))]
    pub async fn run(&self, questions: &Path, output: &Path) -> Result<BatchSummary, BatchError> {
        let questions = read_questions(questions).await?;
        info!(count = questions.len(), "questions loaded");

        let io_error = |source| BatchError::Io {
            path: output.to_path_buf(),
            source,
        };
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let mut file = tokio::fs::File::create(output).await.map_err(io_error)?;

        for (i, question) in questions.iter().enumerate() {
            let image = ImageRef::new(self.image_dir.join(&question.image));
            let answer = self
                .generator
                .generate_response(&question.text, &image)
                .await
                .map_err(|source| BatchError::Generation {
                    question_id: question.question_id.clone(),
                    source,
                })?;

            let mut line = serde_json::to_string(&AnswerRecord::new(question, &self.model_id, answer))?;
            line.push('\n');
            file.write_all(line.as_bytes()).await.map_err(io_error)?;
            info!(
                question_id = %question.question_id,
                progress = format!("{}/{}", i + 1, questions.len()),
                "answered"
            );
        }
        file.flush().await.map_err(io_error)?;

        Ok(BatchSummary {
            answered: questions.len(),
        })
    }
}
