//! capwatch CLI: competitor capability-change crawler.
//!
//! Watches competitor release notes and product docs, detects changed
//! sections, classifies them and records capability events.

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
