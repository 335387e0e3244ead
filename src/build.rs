//! Build pass orchestration.
//!
//! # Architecture
//!
//! ```text
//! build_site()
//!     │
//!     ├── Sources::locate() ──► content files under pages/ and posts/
//!     │
//!     ├── plan_site() ──► records, seeded from the previous pass's cache
//!     │
//!     ├── required_layouts() + LayoutCompiler::compile()
//!     │       (once, skipped when no record needs a layout)
//!     │
//!     ├── RenderPool::render() ──► only records without HTML
//!     │
//!     ├── write_site() ──► pages, copies, feeds, post-processing, resources
//!     │
//!     └── ContentCache::from_plan() ──► seed for the next pass
//! ```

use crate::{
    cache::ContentCache,
    compiler::{ElmCompiler, LayoutCompiler, required_layouts},
    config::SiteConfig,
    content::Sources,
    log,
    output::write_site,
    render::{NodeRenderer, PageRenderer, RenderPool},
    site::{BuildOptions, plan_site},
};
use anyhow::Result;
use std::path::Path;

/// External tools a pass hands work to.
pub struct Toolchain<'a> {
    pub compiler: &'a dyn LayoutCompiler,
    pub renderer: &'a dyn PageRenderer,
    pub pool: &'a RenderPool,
}

/// Outcome of a successful pass.
#[derive(Debug)]
pub struct BuildReport {
    /// Records of this pass; seeds the next one
    pub cache: ContentCache,
    /// Records that went through the renderer
    pub rendered: usize,
}

/// Run one pass with the default toolchain, reading `config.json` afresh.
pub fn run_pass(
    root: &Path,
    pool: &RenderPool,
    cache: &ContentCache,
    include_drafts: bool,
    keep_output: bool,
) -> Result<BuildReport> {
    let config = SiteConfig::load(root)?;
    let renderer = NodeRenderer::new(&config)?;
    let tools = Toolchain {
        compiler: &ElmCompiler,
        renderer: &renderer,
        pool,
    };
    build_site(&config, &tools, cache, &BuildOptions::new(include_drafts, keep_output))
}

/// Build the site once. Nothing is written unless every record rendered.
pub fn build_site(
    config: &SiteConfig,
    tools: &Toolchain,
    cache: &ContentCache,
    options: &BuildOptions,
) -> Result<BuildReport> {
    let sources = Sources::locate(config)?;
    log!("build"; "found {} sources", sources.len());

    let mut plan = plan_site(config, &sources, cache, options)?;

    let layouts = required_layouts(&plan);
    let rendered = if layouts.is_empty() {
        0
    } else {
        let names: Vec<_> = layouts.iter().map(|layout| layout.name()).collect();
        log!("compile"; "{}", names.join(", "));
        let compiled = tools.compiler.compile(config, &layouts)?;
        tools.pool.render(tools.renderer, &compiled, &mut plan)?
    };

    write_site(config, &plan, options.keep_output)?;

    Ok(BuildReport {
        cache: ContentCache::from_plan(plan),
        rendered,
    })
}
