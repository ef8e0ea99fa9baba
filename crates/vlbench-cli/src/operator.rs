//! Terminal approval of generated adapters

use async_trait::async_trait;
use colored::Colorize;
use dialoguer::Input;
use dialoguer::theme::ColorfulTheme;
use vlbench_foundation::Operator;
use vlbench_foundation::approval::APPROVAL_QUESTION;
use vlbench_foundation::synthesis::SynthesisArtifact;

/// Shows the generated source on stdout and reads the answer from the terminal
pub struct TerminalOperator;

fn print_artifact(artifact: &SynthesisArtifact) {
    println!();
    println!(
        "{} {} ({})",
        "Generated adapter for".bold(),
        artifact.identifier.to_string().cyan(),
        artifact.class_name.yellow()
    );
    println!("{}", "─".repeat(72).dimmed());
    println!("{}", artifact.source);
    println!("{}", "─".repeat(72).dimmed());
}

#[async_trait]
impl Operator for TerminalOperator {
    async fn ask(&self, artifact: &SynthesisArtifact) -> std::io::Result<String> {
        print_artifact(artifact);

        tokio::task::spawn_blocking(|| {
            Input::<String>::with_theme(&ColorfulTheme::default())
                .with_prompt(APPROVAL_QUESTION)
                .allow_empty(true)
                .interact_text()
                .map_err(std::io::Error::other)
        })
        .await
        .map_err(std::io::Error::other)?
    }
}
