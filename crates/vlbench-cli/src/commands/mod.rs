//! Command implementations

pub mod models;
pub mod resolve;
pub mod run;

use crate::error::CliError;
use crate::operator::TerminalOperator;
use std::path::Path;
use std::sync::Arc;
use vlbench_foundation::{Dispatcher, RunConfig, RunContext};

/// Load and validate the run configuration
pub fn load_config(path: &Path) -> Result<RunConfig, CliError> {
    if !path.exists() {
        return Err(CliError::ConfigError(format!(
            "config file not found: {}",
            path.display()
        )));
    }
    RunConfig::load(path).map_err(|report| CliError::ConfigError(format!("{report:?}")))
}

/// Dispatcher for a run, approving through the terminal
pub fn dispatcher(config: RunConfig) -> Result<Dispatcher, CliError> {
    let dispatcher = Dispatcher::builder(RunContext::new(config))
        .with_operator(Arc::new(TerminalOperator))
        .build()?;
    Ok(dispatcher)
}
