//! docs2md CLI: consolidate documentation into a single Markdown file.
//!
//! Walks a directory, a repository checkout, or a crawled site, and writes
//! one document with a table of contents, copied assets and a run manifest.

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
