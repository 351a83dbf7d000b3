//! riskflow CLI: requirements-to-risk-report analysis workflow.
//!
//! Uploads a requirements document to the analysis backend, lets the user
//! refine and approve the extracted features, then requests a security
//! risk report.

mod commands;
mod repl;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
