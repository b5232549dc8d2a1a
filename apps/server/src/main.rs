//! LearnPath: adaptive learning path service.
//!
//! Builds concept graphs from documentation URLs, finds weighted learning
//! paths through them, and tracks learner mastery. Runs as an HTTP service
//! or as one-shot CLI commands.

mod commands;
mod routes;

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
