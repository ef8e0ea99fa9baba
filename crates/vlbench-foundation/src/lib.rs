//! vlbench Foundation
//!
//! Turns a model identifier into a ready [`Generator`](vlbench_kernel::Generator):
//!
//! - [`registry`]: built-in table of known models and how to construct them
//! - [`dispatcher`]: resolves identifiers, synthesizing adapters on a miss
//! - [`synthesis`]: model card + contract sources → code generation → extraction
//! - [`approval`]: human confirmation before generated code is persisted or run
//! - [`loader`]: persists approved units and instantiates them through a factory table
//! - [`artifact`]: versioned record of every approved unit
//! - [`retry`]: bounded fixed-delay retry around hosted calls
//! - [`adapters`]: hosted-API and local-checkpoint generators
//! - [`batch`]: offline question file → answer file runner

pub mod adapters;
pub mod approval;
pub mod artifact;
pub mod batch;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod loader;
pub mod registry;
pub mod retry;
pub mod synthesis;

pub use approval::{ApprovalGate, Operator};
pub use config::RunConfig;
pub use context::{Credentials, RunContext};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use registry::{AdapterRegistry, AdapterSpec};
pub use retry::{RetryWrapper, RetryingGenerator};
