//! Writer: persists a finished pass to the output tree.
//!
//! # Order
//!
//! ```text
//! prepare_output ──► write_pages ──► duplicate_pages ──► write_feeds ──► post_process ──► copy_resources
//! (wipe, keep .git)   (parallel)      (`copy` map)       (rss/atom/json)   (shell commands)   (_resources)
//! ```

use crate::{
    config::SiteConfig,
    generator::feed::write_feeds,
    log,
    site::{RenderedPage, SitePlan},
    utils::{
        exec::exec_shell,
        fs::{copy_path, empty_dir_except},
    },
};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::{
    borrow::Cow,
    fs,
    path::{Path, PathBuf},
};

/// Version-control marker kept across an output wipe
const GIT_MARKER: &str = ".git";

/// Write every output of `plan`, then run the post-write steps.
pub fn write_site(config: &SiteConfig, plan: &SitePlan, keep_output: bool) -> Result<()> {
    prepare_output(&config.output_dir, keep_output)?;
    let written = write_pages(plan.outputs(), config.minify)?;
    log!("build"; "wrote {written} pages");

    duplicate_pages(config)?;
    write_feeds(config, plan)?;
    post_process(config);
    copy_resources(config)
}

/// `.../index` → `.../index.html`, anything else → `.../index.html` below it.
pub fn html_path(output_path: &Path) -> PathBuf {
    if output_path.file_name().is_some_and(|name| name == "index") {
        let mut path = output_path.as_os_str().to_owned();
        path.push(".html");
        PathBuf::from(path)
    } else {
        output_path.join("index.html")
    }
}

/// Empty the output directory unless `keep` is set.
///
/// A `.git` file (a worktree pointer) is restored byte for byte after the
/// wipe; a `.git` directory is left in place.
pub fn prepare_output(dir: &Path, keep: bool) -> Result<()> {
    if keep {
        return fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()));
    }

    let marker = dir.join(GIT_MARKER);
    let saved = if marker.is_file() {
        Some(fs::read(&marker).with_context(|| format!("Failed to read {}", marker.display()))?)
    } else {
        None
    };
    let keep: &[&str] = if marker.is_dir() { &[GIT_MARKER] } else { &[] };

    log!("build"; "cleaning {}", dir.display());
    empty_dir_except(dir, keep)?;

    if let Some(bytes) = saved {
        fs::write(&marker, bytes).with_context(|| format!("Failed to restore {}", marker.display()))?;
    }
    Ok(())
}

/// Write rendered pages in parallel. Returns how many were written.
pub fn write_pages<'a>(pages: impl Iterator<Item = &'a RenderedPage>, minify: bool) -> Result<usize> {
    let pages: Vec<_> = pages.collect();

    pages.par_iter().try_for_each(|rendered| {
        let output_path = rendered.page.output_path();
        let html = rendered
            .html
            .as_deref()
            .with_context(|| format!("{} has not been rendered", output_path.display()))?;

        let path = html_path(output_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, &*minify_html(html.as_bytes(), minify))
            .with_context(|| format!("Failed to write {}", path.display()))
    })?;

    Ok(pages.len())
}

fn minify_html(html: &[u8], enabled: bool) -> Cow<'_, [u8]> {
    if !enabled {
        return Cow::Borrowed(html);
    }

    let mut cfg = minify_html::Cfg::new();
    cfg.keep_closing_tags = true;
    cfg.keep_html_and_head_opening_tags = true;
    cfg.keep_comments = false;
    cfg.minify_css = true;
    cfg.minify_js = true;
    cfg.remove_bangs = true;
    cfg.remove_processing_instructions = true;
    Cow::Owned(minify_html::minify(html, &cfg))
}

/// Copy output paths per the `copy` map (source → destination).
pub fn duplicate_pages(config: &SiteConfig) -> Result<()> {
    for (source, destination) in &config.copy {
        let from = config.output_dir.join(source);
        let to = config.output_dir.join(destination);
        if !from.exists() {
            anyhow::bail!("Cannot copy `{source}` to `{destination}`: `{source}` was not generated");
        }
        copy_path(&from, &to)?;
    }
    Ok(())
}

/// Run `postProcess` commands from the site root; failures only warn.
pub fn post_process(config: &SiteConfig) {
    for command in &config.post_process {
        log!("build"; "$ {command}");
        match exec_shell(&config.root, command) {
            Ok(status) if status.success() => {}
            Ok(status) => log!("warn"; "`{command}` exited with {status}"),
            Err(err) => log!("warn"; "{err:#}"),
        }
    }
}

/// Merge the resources directory into the output root.
pub fn copy_resources(config: &SiteConfig) -> Result<()> {
    if config.resources_dir.is_dir() {
        copy_path(&config.resources_dir, &config.output_dir)?;
    }
    Ok(())
}
