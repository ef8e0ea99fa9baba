//! Canned code-generation backend.
//!
//! [`MockCodeGen`] returns one fixed response and records every prompt, so
//! tests can drive the synthesis path without a network call.

use async_trait::async_trait;
use parking_lot::Mutex;
use vlbench_foundation::synthesis::MARKER;
use vlbench_foundation::synthesis::codegen::{CodeGenBackend, CodeGenBackendKind};
use vlbench_kernel::DispatchError;

/// Adapter script that answers with a fixed string
pub const FOO_ADAPTER: &str = r#"
fn FooResponseGenerator(ctx) {
    #{ model: ctx.identifier, device: ctx.device }
}

fn generate_response(question, image_path) {
    `foo answer to ${question} (${this.model} on ${this.device})`
}
"#;

pub struct MockCodeGen {
    response: String,
    prompts: Mutex<Vec<String>>,
}

impl MockCodeGen {
    pub fn responding(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Response with a short preamble, the marker line and `source`
    pub fn with_source(source: &str) -> Self {
        Self::responding(format!("Here is the adapter.\n{}\n{}", MARKER, source))
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().last().cloned()
    }
}

#[async_trait]
impl CodeGenBackend for MockCodeGen {
    fn kind(&self) -> CodeGenBackendKind {
        CodeGenBackendKind::Gpt4
    }

    async fn generate(&self, prompt: &str) -> Result<String, DispatchError> {
        self.prompts.lock().push(prompt.to_string());
        Ok(self.response.clone())
    }
}
