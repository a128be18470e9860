//! Command-line interface definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Weft template-driven site compiler CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Site root directory containing config.xml
    #[arg(short, long, default_value = "./")]
    pub root: PathBuf,

    /// Output directory (relative to the site root)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Deletes the output directory if there is one and compiles the site
    Build,

    /// Loads the config and reports what it declares, compiling nothing
    Check,
}
