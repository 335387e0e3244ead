//! Quire - an incremental static site builder for Elm layouts.

mod build;
mod cache;
mod cli;
mod compiler;
mod config;
mod content;
mod error;
mod generator;
mod output;
mod render;
mod site;
mod utils;
mod watch;

use anyhow::Result;
use build::run_pass;
use cache::ContentCache;
use clap::Parser;
use cli::{Cli, Commands};
use config::SiteConfig;
use render::RenderPool;
use std::process::ExitCode;
use utils::log::set_verbose;
use watch::watch_site;

fn main() -> ExitCode {
    let cli = Cli::parse();
    set_verbose(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log!("error"; "{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    // Sizes the render pool; every pass reads the config again
    let config = SiteConfig::load(&cli.root)?;
    let pool = RenderPool::new(config.worker_count())?;
    verbose!("build"; "render pool: {} workers", pool.workers());

    match cli.command() {
        Commands::Build { drafts } => {
            let report = run_pass(&config.root, &pool, &ContentCache::default(), drafts, false)?;
            log!("build"; "done, rendered {} pages", report.rendered);
            Ok(())
        }
        Commands::Watch { drafts } => watch_site(&config.root, &pool, drafts),
    }
}
