//! Renderer backed by a Node.js harness running the compiled layouts in jsdom.
//!
//! Layouts signal a bad record by rendering a document titled `error` whose
//! first body element carries the message in its first attribute. This
//! module is the only place that knows about that convention.

use super::{PageRenderer, RenderOutcome};
use crate::{
    compiler::CompiledLayouts,
    config::SiteConfig,
    error::{BuildError, BuildResult},
    exec,
    site::SitePage,
    utils::exec::resolve_tool,
};
use regex::Regex;
use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};

const HARNESS: &str = include_str!("harness.js");
const HARNESS_NAME: &str = "harness.js";

/// Elm refuses to emit `<script>` elements, so layouts spell them this way.
const SCRIPT_ALIAS: &str = "citatsmle-script";

pub struct NodeRenderer {
    command: Vec<OsString>,
    harness: PathBuf,
    root: PathBuf,
}

impl NodeRenderer {
    /// Resolve the renderer command and install the harness next to the
    /// compiled layouts.
    pub fn new(config: &SiteConfig) -> BuildResult<Self> {
        let Some((program, args)) = config.renderer.split_first() else {
            return Err(BuildError::Validation(
                "`renderer` must have at least one element".into(),
            ));
        };

        let mut command = vec![resolve_tool(program)?.into_os_string()];
        command.extend(args.iter().map(OsString::from));

        let artifact_dir = config.artifact_dir();
        fs::create_dir_all(&artifact_dir).map_err(|err| BuildError::io(&artifact_dir, err))?;
        let harness = artifact_dir.join(HARNESS_NAME);
        fs::write(&harness, HARNESS).map_err(|err| BuildError::io(&harness, err))?;

        Ok(Self {
            command,
            harness,
            root: config.root.clone(),
        })
    }
}

impl PageRenderer for NodeRenderer {
    fn render(&self, layouts: &CompiledLayouts, page: &SitePage) -> BuildResult<RenderOutcome> {
        let path = page.display_path();
        let render_error = |message: String| BuildError::Render {
            path: path.to_path_buf(),
            message,
        };

        let flags = serde_json::to_vec(&page.flags()).map_err(|err| render_error(err.to_string()))?;
        let output = exec!(
            stdin=&flags;
            &self.root;
            &self.command;
            &self.harness, &layouts.script, page.layout().name()
        )
        .map_err(|err| render_error(format!("{err:#}")))?;

        Ok(interpret(&String::from_utf8_lossy(&output.stdout), path))
    }
}

/// Turn a serialized document into an outcome.
pub fn interpret(document: &str, path: &Path) -> RenderOutcome {
    static ERROR_TITLE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)<title>\s*error\s*</title>").unwrap());
    static FIRST_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"(?s)<body[^>]*>\s*<[A-Za-z][\w-]*\s+[^\s=>]+\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .unwrap()
    });
    static BODY: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)<body[^>]*>(.*)</body>").unwrap());

    if ERROR_TITLE.is_match(document) {
        let message = FIRST_ATTRIBUTE
            .captures(document)
            .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
            .map(|m| unescape_html(m.as_str()))
            .unwrap_or_else(|| "layout reported an error without a message".to_owned());
        return RenderOutcome::Failure {
            path: path.to_path_buf(),
            message,
        };
    }

    let body = BODY
        .captures(document)
        .and_then(|caps| caps.get(1))
        .map_or("", |m| m.as_str());
    RenderOutcome::Html(format!("<!doctype html>{}", body.replace(SCRIPT_ALIAS, "script")))
}

fn unescape_html(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpret_success() {
        let document = "<!DOCTYPE html><html><head><title>Hi</title></head><body><div><citatsmle-script src=\"a.js\"></citatsmle-script></div></body></html>";
        assert_eq!(
            interpret(document, Path::new("a.md")),
            RenderOutcome::Html("<!doctype html><div><script src=\"a.js\"></script></div>".into())
        );
    }

    #[test]
    fn test_interpret_error_sentinel() {
        let document = "<html><head><title>error</title></head><body><div data-error=\"Missing &quot;title&quot; &amp; more\"></div></body></html>";
        assert_eq!(
            interpret(document, Path::new("_posts/2020-01-01-a.md")),
            RenderOutcome::Failure {
                path: PathBuf::from("_posts/2020-01-01-a.md"),
                message: "Missing \"title\" & more".into(),
            }
        );
    }

    #[test]
    fn test_interpret_error_without_attribute() {
        let outcome = interpret(
            "<html><head><title>error</title></head><body><div></div></body></html>",
            Path::new("a.md"),
        );
        assert!(matches!(outcome, RenderOutcome::Failure { .. }));
    }

    #[test]
    fn test_interpret_empty_document() {
        assert_eq!(
            interpret("", Path::new("a.md")),
            RenderOutcome::Html("<!doctype html>".into())
        );
    }

    #[test]
    fn test_unescape_html() {
        assert_eq!(unescape_html("&lt;b&gt; &amp;amp;"), "<b> &amp;");
    }

    #[test]
    fn test_missing_renderer() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = SiteConfig::default().with_root(dir.path());
        config.renderer = vec!["quire-missing-node".into()];
        assert!(matches!(
            NodeRenderer::new(&config),
            Err(BuildError::ToolNotFound { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_render_through_command() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = SiteConfig::default().with_root(dir.path());
        // Ignore the harness and emit a fixed document
        config.renderer = vec![
            "sh".into(),
            "-c".into(),
            "cat >/dev/null; echo '<html><body><p>ok</p></body></html>'".into(),
        ];
        let renderer = NodeRenderer::new(&config).unwrap();
        assert!(config.artifact_dir().join(HARNESS_NAME).is_file());

        let page = SitePage::Page(crate::site::PageConfig {
            record: crate::content::ContentRecord::from_source(
                Path::new("a.md"),
                std::time::SystemTime::UNIX_EPOCH,
                "",
            ),
            output_path: PathBuf::from("/out/a"),
            site_title: String::new(),
        });
        let layouts = CompiledLayouts {
            script: PathBuf::from("layouts.js"),
            layouts: Default::default(),
        };
        assert_eq!(
            renderer.render(&layouts, &page).unwrap(),
            RenderOutcome::Html("<!doctype html><p>ok</p>".into())
        );
    }
}
