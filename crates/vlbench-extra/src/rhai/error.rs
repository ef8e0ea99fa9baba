//! Typed errors for the Rhai scripting subsystem.

use thiserror::Error;

/// Errors that can occur in the Rhai scripting subsystem.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RhaiError {
    /// Script compilation failed.
    #[error("Compile error: {0}")]
    CompileError(String),

    /// Script execution failed at runtime.
    #[error("Execution error: {0}")]
    ExecutionError(String),

    /// An I/O error (e.g. reading a script file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The script does not have the expected shape.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A requested function was not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Convenience result alias for the Rhai subsystem.
pub type RhaiResult<T> = Result<T, RhaiError>;

impl From<serde_json::Error> for RhaiError {
    fn from(err: serde_json::Error) -> Self {
        RhaiError::Serialization(err.to_string())
    }
}

impl From<Box<rhai::EvalAltResult>> for RhaiError {
    fn from(err: Box<rhai::EvalAltResult>) -> Self {
        RhaiError::ExecutionError(err.to_string())
    }
}
