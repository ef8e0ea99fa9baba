//! CLI command definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// vlbench - evaluate vision-language models through generated or built-in adapters
#[derive(Parser, Debug)]
#[command(name = "vlbench")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Run configuration file
    #[arg(short = 'c', long, global = true, env = "VLBENCH_CONFIG", default_value = "config.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer a question file with the configured model
    Run {
        /// Question file (JSON lines)
        #[arg(short, long)]
        questions: PathBuf,

        /// Directory the question images are relative to
        #[arg(short, long)]
        images: PathBuf,

        /// Answer file to write (JSON lines)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Resolve a model identifier to an adapter, synthesizing one if enabled
    Resolve {
        /// Model identifier; defaults to the configured model
        identifier: Option<String>,
    },

    /// List the built-in adapter registry
    Models {
        /// Print as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}
