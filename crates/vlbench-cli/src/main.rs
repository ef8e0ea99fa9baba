//! vlbench CLI - resolve, synthesize and run vision-language model adapters

mod cli;
mod commands;
mod error;
mod operator;

use clap::Parser;
use cli::{Cli, Commands};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let rt = tokio::runtime::Runtime::new()?;
    if let Err(e) = rt.block_on(run_command_async(cli)) {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run_command_async(cli: Cli) -> Result<(), error::CliError> {
    match cli.command {
        Commands::Run {
            questions,
            images,
            output,
        } => {
            commands::run::run(&cli.config, &questions, &images, &output).await?;
        }

        Commands::Resolve { identifier } => {
            commands::resolve::run(&cli.config, identifier.as_deref()).await?;
        }

        Commands::Models { json } => {
            commands::models::run(json)?;
        }
    }

    Ok(())
}
