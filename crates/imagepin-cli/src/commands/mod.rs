//! CLI commands and argument parsing.

pub mod resolve;
pub mod tags;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// imagepin - resolve image tags and version patterns to pinned references
#[derive(Parser)]
#[command(name = "imagepin")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file (YAML); defaults to `<config dir>/imagepin/config.yaml`
    /// when that file exists
    #[arg(short, long, global = true, env = "IMAGEPIN_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Resolve image references to digests or highest matching tags
    Resolve(resolve::ResolveArgs),

    /// List the tags of a repository
    Tags(tags::TagsArgs),

    /// Print version information
    Version,
}
