//! kgpipe CLI: knowledge-graph pipeline runs, corpus collection, and
//! dataset promotion.
//!
//! Every pipeline execution gets its own run directory with logs, GraphRAG
//! workspace, and results.

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
