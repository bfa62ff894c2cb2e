//! callsync CLI: CRM list members → meeting transcripts → webhook.
//!
//! Resolves each list member's owner, finds the meeting they shared, and
//! delivers its plain-text transcript downstream.

mod commands;

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
