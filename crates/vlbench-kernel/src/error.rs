//! Error taxonomy for dispatch and generation.
//!
//! Two families reach callers:
//! - [`GenerationError`] from `generate_response`, with [`RemoteApiError`]
//!   for hosted backends. The retry wrapper hands these back unchanged once
//!   attempts are exhausted, so callers can still match on the variant.
//! - [`DispatchError`] from resolving a model identifier. None of these are
//!   retried.
//!
//! [`KernelError`] / [`KernelResult`] cover configuration loading and carry
//! context through [`error_stack::Report`].

use crate::identifier::ModelIdentifier;
use thiserror::Error;

/// Boxed error used to carry an original cause across a component boundary
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure reported by a hosted API
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoteApiError {
    #[error("authentication failed (HTTP {status}): {message}")]
    Authentication { status: u16, message: String },

    #[error("rate limited (HTTP {status}): {message}")]
    RateLimit { status: u16, message: String },

    #[error("malformed request (HTTP {status}): {message}")]
    MalformedRequest { status: u16, message: String },

    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl RemoteApiError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => RemoteApiError::Authentication { status, message },
            429 => RemoteApiError::RateLimit { status, message },
            400 | 404 | 413 | 422 => RemoteApiError::MalformedRequest { status, message },
            _ => RemoteApiError::Server { status, message },
        }
    }
}

/// Failure of a single `generate_response` call
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GenerationError {
    /// A hosted backend rejected or failed the request
    #[error("remote API error: {0}")]
    RemoteApi(#[from] RemoteApiError),

    /// The backend failed during inference
    #[error("generation runtime error: {message}")]
    Runtime {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The question or image could not be prepared for the backend
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl GenerationError {
    pub fn runtime(message: impl Into<String>) -> Self {
        GenerationError::Runtime {
            message: message.into(),
            source: None,
        }
    }

    pub fn runtime_with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        GenerationError::Runtime {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Failure of `resolve(identifier)`
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DispatchError {
    /// Not in the registry and synthesis is disabled
    #[error("unknown model '{0}': not in the adapter registry and automatic synthesis is disabled")]
    UnknownModel(ModelIdentifier),

    /// Backend construction failed (credential, weights, runtime)
    #[error("failed to construct adapter for '{identifier}': {reason}")]
    AdapterConstruction {
        identifier: ModelIdentifier,
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The synthesis response did not contain the marker line
    #[error("synthesis response for '{identifier}' does not contain the marker line '{marker}'")]
    SynthesisExtraction {
        identifier: ModelIdentifier,
        marker: String,
    },

    /// Zero or several names follow the naming convention
    #[error(
        "synthesized source for '{identifier}' must declare exactly one name ending in '{suffix}', found {found:?}"
    )]
    SynthesisNaming {
        identifier: ModelIdentifier,
        suffix: String,
        found: Vec<String>,
    },

    /// The operator declined to run the generated code
    #[error("execution of the generated adapter for '{0}' was denied by the operator")]
    ApprovalDenied(ModelIdentifier),

    /// The code-generation backend could not produce a response
    #[error("code generation backend failed: {0}")]
    SynthesisBackend(String),

    /// The model card could not be fetched
    #[error("failed to fetch model card for '{identifier}': {reason}")]
    ModelCard {
        identifier: ModelIdentifier,
        reason: String,
    },

    /// The approved unit could not be loaded or instantiated
    #[error("failed to load adapter unit '{unit}': {reason}")]
    AdapterLoad { unit: String, reason: String },

    /// An artifact was handed to the loader without approval
    #[error("adapter unit '{0}' has not been approved")]
    NotApproved(String),

    /// Versioned artifact recording failed
    #[error("artifact store error: {0}")]
    ArtifactStore(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatchError {
    pub fn construction(identifier: &ModelIdentifier, reason: impl Into<String>) -> Self {
        DispatchError::AdapterConstruction {
            identifier: identifier.clone(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Whether the failure came out of the synthesis/approval path
    pub fn is_synthesis_failure(&self) -> bool {
        matches!(
            self,
            DispatchError::SynthesisExtraction { .. }
                | DispatchError::SynthesisNaming { .. }
                | DispatchError::ApprovalDenied(_)
                | DispatchError::SynthesisBackend(_)
                | DispatchError::ModelCard { .. }
        )
    }
}

/// Crate-level error for configuration handling
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KernelError {
    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Invalid generation parameters: {0}")]
    Generation(#[from] crate::generation::GenerationConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

/// Convenience result alias using [`error_stack::Report`].
pub type KernelResult<T> = Result<T, error_stack::Report<KernelError>>;

#[cfg(test)]
mod tests {
    use super::*;
    use error_stack::{Report, ResultExt};

    #[test]
    fn classifies_http_statuses() {
        assert!(matches!(
            RemoteApiError::from_status(401, "bad key"),
            RemoteApiError::Authentication { status: 401, .. }
        ));
        assert!(matches!(
            RemoteApiError::from_status(429, "slow down"),
            RemoteApiError::RateLimit { .. }
        ));
        assert!(matches!(
            RemoteApiError::from_status(422, "bad body"),
            RemoteApiError::MalformedRequest { .. }
        ));
        assert!(matches!(
            RemoteApiError::from_status(503, "down"),
            RemoteApiError::Server { .. }
        ));
    }

    #[test]
    fn generation_error_keeps_cause() {
        use std::error::Error as _;
        let io = std::io::Error::other("device lost");
        let err = GenerationError::runtime_with_source("decode failed", io);
        assert_eq!(err.source().unwrap().to_string(), "device lost");
    }

    #[test]
    fn synthesis_failures_are_flagged() {
        let id = ModelIdentifier::new("vendor/new-model");
        assert!(DispatchError::ApprovalDenied(id.clone()).is_synthesis_failure());
        assert!(!DispatchError::UnknownModel(id).is_synthesis_failure());
    }

    #[test]
    fn report_carries_context() {
        let result: KernelResult<()> =
            Err(Report::new(KernelError::Internal("root cause".into())))
                .attach("while loading run config");

        let display = format!("{:?}", result.unwrap_err());
        assert!(display.contains("root cause"));
        assert!(display.contains("while loading run config"));
    }
}
