//! Snapvault CLI — image ingestion and similarity search.
//!
//! Runs the fetch and index pipeline daemons and answers ad-hoc text
//! queries against the vector index.

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
