//! Command-line interface definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Incremental static site builder for Elm layouts
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Print a line per rendered page and every external command
    #[arg(short, long)]
    pub verbose: bool,

    /// Site root containing config.json
    #[arg(short, long, default_value = "./")]
    pub root: PathBuf,

    /// subcommands; `build` when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Wipe the output directory and build the site once
    Build {
        /// Include posts dated in the future
        #[arg(short, long)]
        drafts: bool,
    },

    /// Build, then rebuild incrementally whenever sources change
    Watch {
        /// Include posts dated in the future
        #[arg(short, long)]
        drafts: bool,
    },
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or(Commands::Build { drafts: false })
    }
}
