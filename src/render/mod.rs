//! Render Pool: turns records into HTML in parallel.
//!
//! The pool is created once and reused by every pass. Records that already
//! carry HTML are skipped; the first failure aborts the pass.

pub mod node;

use crate::{
    compiler::CompiledLayouts,
    error::{BuildError, BuildResult},
    site::{SitePage, SitePlan},
    utils::log::Progress,
    verbose,
};
use anyhow::{Context, Result};
use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};
use std::path::PathBuf;

pub use node::NodeRenderer;

/// Result of rendering one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Html(String),
    /// The layout reported a problem with the record
    Failure { path: PathBuf, message: String },
}

/// Renders a record with the compiled layouts.
///
/// `Err` means the renderer itself could not run; a layout that rejects its
/// input reports [`RenderOutcome::Failure`].
pub trait PageRenderer: Sync {
    fn render(&self, layouts: &CompiledLayouts, page: &SitePage) -> BuildResult<RenderOutcome>;
}

pub struct RenderPool {
    pool: ThreadPool,
}

impl RenderPool {
    pub fn new(workers: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("quire-render-{i}"))
            .build()
            .context("Failed to create render pool")?;
        Ok(Self { pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Render every output record without HTML. Returns how many were rendered.
    pub fn render(
        &self,
        renderer: &dyn PageRenderer,
        layouts: &CompiledLayouts,
        plan: &mut SitePlan,
    ) -> BuildResult<usize> {
        let mut pending: Vec<_> = plan
            .outputs_mut()
            .filter(|rendered| rendered.html.is_none())
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }

        // Every pending record needs its layout compiled
        if let Some(missing) = pending.iter().find(|r| !layouts.layouts.contains(&r.page.layout())) {
            return Err(BuildError::Render {
                path: missing.page.display_path().to_path_buf(),
                message: format!("layout `{}` was not compiled", missing.page.layout().name()),
            });
        }

        let count = pending.len();
        let progress = Progress::new("render", count);

        let result = self.pool.install(|| {
            pending.par_iter_mut().try_for_each(|rendered| {
                verbose!("render"; "{}", rendered.page.output_path().display());
                match renderer.render(layouts, &rendered.page)? {
                    RenderOutcome::Html(html) => {
                        rendered.html = Some(html);
                        progress.inc();
                        Ok(())
                    }
                    RenderOutcome::Failure { path, message } => {
                        Err(BuildError::Render { path, message })
                    }
                }
            })
        });

        progress.finish();
        result.map(|()| count)
    }
}
