//! `vlbench run` command implementation

use super::{dispatcher, load_config};
use crate::error::CliError;
use colored::Colorize;
use std::path::Path;
use tracing::info;
use vlbench_foundation::batch::BatchRunner;

/// Execute the `vlbench run` command
pub async fn run(
    config_path: &Path,
    questions: &Path,
    images: &Path,
    output: &Path,
) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let identifier = config.identifier();
    info!(model = %identifier, "starting batch run");

    let dispatcher = dispatcher(config)?;
    let generator = dispatcher.resolve(&identifier).await?;

    let runner = BatchRunner::new(generator, identifier, images);
    let summary = runner.run(questions, output).await?;

    println!(
        "{} Answered {} questions, written to {}",
        "✓".green(),
        summary.answered.to_string().yellow(),
        output.display().to_string().cyan()
    );
    Ok(())
}
