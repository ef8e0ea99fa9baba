//! Operator approval of generated code
//!
//! Only [`ApprovalGate::review`] can produce an [`ApprovedArtifact`], and the
//! loader only accepts that type, so nothing generated is persisted or run
//! without passing through here.

use crate::synthesis::{ApprovalStatus, SynthesisArtifact};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{info, warn};
use vlbench_kernel::DispatchError;

/// Question put to the operator
pub const APPROVAL_QUESTION: &str = "Are you sure you want to execute the generated code? (y/n)";

/// Whoever decides whether generated code may run
#[async_trait]
pub trait Operator: Send + Sync {
    /// Show `artifact` and return the raw answer
    async fn ask(&self, artifact: &SynthesisArtifact) -> std::io::Result<String>;
}

/// `y` or `Y` after trimming; everything else denies
pub fn is_affirmative(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("y")
}

/// A synthesized artifact the operator (or configuration) approved
#[derive(Debug)]
pub struct ApprovedArtifact(SynthesisArtifact);

impl ApprovedArtifact {
    pub fn artifact(&self) -> &SynthesisArtifact {
        &self.0
    }

    pub fn into_inner(self) -> SynthesisArtifact {
        self.0
    }
}

/// Gate between synthesis and the loader
#[derive(Clone)]
pub struct ApprovalGate {
    skip_approval: bool,
    operator: Option<Arc<dyn Operator>>,
}

impl ApprovalGate {
    pub fn new(skip_approval: bool, operator: Option<Arc<dyn Operator>>) -> Self {
        Self {
            skip_approval,
            operator,
        }
    }

    /// Approve or deny one artifact. The operator is asked at most once.
    pub async fn review(
        &self,
        mut artifact: SynthesisArtifact,
    ) -> Result<ApprovedArtifact, DispatchError> {
        if self.skip_approval {
            info!(unit = %artifact.unit, "generated code pre-approved by configuration");
            artifact.status = ApprovalStatus::Approved;
            return Ok(ApprovedArtifact(artifact));
        }

        let answer = match &self.operator {
            Some(operator) => match operator.ask(&artifact).await {
                Ok(answer) => answer,
                Err(e) => {
                    warn!(unit = %artifact.unit, error = %e, "failed to read operator answer");
                    String::new()
                }
            },
            None => {
                warn!(unit = %artifact.unit, "no operator available to approve generated code");
                String::new()
            }
        };

        if is_affirmative(&answer) {
            info!(unit = %artifact.unit, class_name = %artifact.class_name, "generated code approved");
            artifact.status = ApprovalStatus::Approved;
            Ok(ApprovedArtifact(artifact))
        } else {
            artifact.status = ApprovalStatus::Denied;
            warn!(unit = %artifact.unit, "generated code denied; nothing will be written or run");
            Err(DispatchError::ApprovalDenied(artifact.identifier))
        }
    }
}

/// Operator with a fixed answer that counts how often it was asked
pub struct ScriptedOperator {
    answer: String,
    asked: AtomicU32,
}

impl ScriptedOperator {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            asked: AtomicU32::new(0),
        }
    }

    pub fn times_asked(&self) -> u32 {
        self.asked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Operator for ScriptedOperator {
    async fn ask(&self, _artifact: &SynthesisArtifact) -> std::io::Result<String> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.clone())
    }
}
