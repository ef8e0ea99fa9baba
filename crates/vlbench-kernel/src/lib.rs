//! vlbench kernel
//!
//! Contracts shared by every layer of the dispatch subsystem:
//! - [`generator::Generator`]: the uniform `generate_response` contract
//! - [`identifier::ModelIdentifier`]: registry and synthesis cache key
//! - [`generation::GenerationConfig`]: run-wide, read-only decoding parameters
//! - [`retry::RetryPolicy`]: fixed-attempt, fixed-delay retry contract
//! - [`checkpoint`]: the seam to local model runtimes and scoped scratch release
//! - [`error`]: the error taxonomy surfaced to callers

// generator contract
pub mod generator;
pub use generator::*;

// identifiers
pub mod identifier;
pub use identifier::ModelIdentifier;

// generation parameters
pub mod generation;
pub use generation::GenerationConfig;

// retry policy
pub mod retry;
pub use retry::RetryPolicy;

// local checkpoint runtime seam
pub mod checkpoint;

// config loader
pub mod config;

// error module
pub mod error;
pub use error::*;
