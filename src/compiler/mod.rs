//! Layout compilation.
//!
//! Each pass compiles exactly the layouts its records use, once, before any
//! render starts. The resulting script is shared by every render of the pass.
//!
//! ```text
//! SitePlan ──► required_layouts() ──► LayoutCompiler::compile() ──► CompiledLayouts
//!                 {Page, Post, ...}        elm make --optimize           layouts.js
//! ```

use crate::{
    config::SiteConfig,
    error::{BuildError, BuildResult},
    log,
    site::{Layout, SitePlan},
    utils::exec::{exec_inherited, resolve_tool},
    verbose,
};
use std::{collections::BTreeSet, ffi::OsString, fs, path::PathBuf};

/// File name of the compiled layouts inside the artifact directory
const SCRIPT_NAME: &str = "layouts.js";

/// Layouts used by the records of a pass, plus `Tag` whenever a post exists.
pub fn required_layouts(plan: &SitePlan) -> BTreeSet<Layout> {
    let mut layouts: BTreeSet<Layout> = plan.outputs().map(|rendered| rendered.page.layout()).collect();
    if plan.has_posts() {
        layouts.insert(Layout::Tag);
    }
    layouts
}

/// Opaque product of a compile, valid for one pass.
#[derive(Debug, Clone)]
pub struct CompiledLayouts {
    pub script: PathBuf,
    pub layouts: BTreeSet<Layout>,
}

pub trait LayoutCompiler: Sync {
    fn compile(&self, config: &SiteConfig, layouts: &BTreeSet<Layout>) -> BuildResult<CompiledLayouts>;
}

/// Compiles layouts with `elm make`.
///
/// The compiler shares the terminal, so its diagnostics reach the user
/// directly and [`BuildError::Compile`] carries no text.
#[derive(Debug, Default, Clone, Copy)]
pub struct ElmCompiler;

impl LayoutCompiler for ElmCompiler {
    fn compile(&self, config: &SiteConfig, layouts: &BTreeSet<Layout>) -> BuildResult<CompiledLayouts> {
        let elm = resolve_tool(&config.elm_command())?;

        let artifact_dir = config.artifact_dir();
        fs::create_dir_all(&artifact_dir).map_err(|err| BuildError::io(&artifact_dir, err))?;
        let script = artifact_dir.join(SCRIPT_NAME);

        let mut args: Vec<OsString> = vec!["make".into()];
        args.extend(
            layouts
                .iter()
                .map(|layout| layout.source(&config.layouts_dir).into_os_string()),
        );
        args.extend([
            OsString::from("--optimize"),
            OsString::from("--output"),
            script.clone().into_os_string(),
        ]);

        let command_line: Vec<_> = args.iter().map(|arg| arg.to_string_lossy()).collect();
        verbose!("compile"; "$ {} {}", elm.display(), command_line.join(" "));

        let status = exec_inherited(&config.root, &[elm.into_os_string()], &args).map_err(|err| {
            log!("error"; "{err:#}");
            BuildError::Compile
        })?;
        if !status.success() {
            return Err(BuildError::Compile);
        }

        Ok(CompiledLayouts {
            script,
            layouts: layouts.clone(),
        })
    }
}
