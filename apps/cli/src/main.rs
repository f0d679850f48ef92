//! Paperboy CLI: today's newspaper as an EPUB.
//!
//! Discovers the front page's articles, fetches their readable text, and
//! bundles them into one e-book with a section per topic.

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
