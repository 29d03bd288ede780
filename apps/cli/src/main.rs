//! convoreplay CLI: load, inspect and prefetch recorded agent conversations.
//!
//! Accepts local files, plain URLs, gists and repository tree URLs, and
//! prints the normalized message sequence plus any discovered context files.

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
