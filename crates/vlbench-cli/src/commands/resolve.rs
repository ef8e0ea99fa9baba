//! `vlbench resolve` command implementation

use super::{dispatcher, load_config};
use crate::error::CliError;
use colored::Colorize;
use std::path::Path;
use vlbench_kernel::ModelIdentifier;

/// Execute the `vlbench resolve` command
pub async fn run(config_path: &Path, identifier: Option<&str>) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let identifier = identifier
        .map(ModelIdentifier::from)
        .unwrap_or_else(|| config.identifier());

    let dispatcher = dispatcher(config)?;
    let generator = dispatcher.resolve(&identifier).await?;

    println!(
        "{} {} → {} ({})",
        "✓".green(),
        identifier.to_string().cyan(),
        generator.adapter_name().bold(),
        generator.backend_kind()
    );
    if let Some(class_name) = dispatcher.class_name_for(&identifier) {
        println!(
            "  Set {} in the config to reuse this adapter without synthesizing again.",
            format!("model.class_name: {}", class_name).yellow()
        );
    }
    Ok(())
}
