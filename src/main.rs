//! Weft - a template-driven static site compiler.

mod build;
mod cli;
mod config;
mod expr;
mod format;
mod logger;
mod resolve;
mod site;
mod xml;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = match &cli.output {
        Some(output) => cli.root.join(output),
        None => cli.root.join(config::OUTPUT_DIR),
    };

    match cli.command {
        Commands::Build => build::build(&cli.root, &output).await,
        Commands::Check => build::check(&cli.root, &output).await,
    }
}
