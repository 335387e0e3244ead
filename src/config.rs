//! Site configuration management.
//!
//! Handles loading, parsing, and validating the `config.json` file. The file
//! is re-read at the start of every build pass.

use crate::error::{BuildError, BuildResult};
use crate::log;
use crate::utils::fs::normalize_path;
use educe::Educe;
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{MAIN_SEPARATOR, Path, PathBuf},
};

/// Default values for serde deserialization
pub mod config_defaults {
    use std::path::PathBuf;

    pub fn output_dir() -> PathBuf {
        "_site".into()
    }
    pub fn layouts_dir() -> PathBuf {
        "_layouts".into()
    }
    pub fn pages_dir() -> PathBuf {
        "_pages".into()
    }
    pub fn posts_dir() -> PathBuf {
        "_posts".into()
    }
    pub fn resources_dir() -> PathBuf {
        "_resources".into()
    }
    pub fn renderer() -> Vec<String> {
        vec!["node".into()]
    }
    pub fn debounce_ms() -> u64 {
        100
    }
    pub fn elm() -> String {
        "elm".into()
    }

    pub mod feed {
        pub fn kind() -> super::super::FeedKind {
            super::super::FeedKind::Rss
        }
    }
}

/// Feed serialization format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    #[default]
    Rss,
    Atom,
    Json,
}

impl FeedKind {
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Rss => "rss.xml",
            Self::Atom => "atom.xml",
            Self::Json => "feed.json",
        }
    }
}

/// `feed.author` object
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedAuthor {
    #[serde(default)]
    pub name: String,
    pub email: Option<String>,
    pub link: Option<String>,
}

/// `feed` object in config.json
#[derive(Debug, Clone, Educe, Deserialize)]
#[educe(Default)]
pub struct FeedConfig {
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: String,

    /// Feed id; falls back to `link`
    pub id: Option<String>,

    /// Site URL, e.g.: "https://example.com"
    #[serde(default)]
    pub link: String,

    pub author: Option<FeedAuthor>,

    pub copyright: Option<String>,

    pub language: Option<String>,

    #[serde(rename = "type", default = "config_defaults::feed::kind")]
    #[educe(Default = config_defaults::feed::kind())]
    pub kind: FeedKind,

    /// Unrecognised feed options, reported when the config loads
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl FeedConfig {
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.link)
    }

    /// Derive the feed of one section: title, id and link gain `/<section>`.
    pub fn for_section(&self, section: &str) -> Self {
        let mut feed = self.clone();
        feed.title = format!("{}/{section}", self.title);
        feed.id = Some(format!("{}/{section}", self.id()));
        feed.link = format!("{}/{section}", self.link);
        feed
    }
}

/// Root configuration structure representing config.json
#[derive(Debug, Clone, Educe, Deserialize)]
#[educe(Default)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    /// Site root, all other paths are resolved against it
    #[serde(skip)]
    #[educe(Default = PathBuf::from("./"))]
    pub root: PathBuf,

    /// Path of the file this config was read from
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default = "config_defaults::output_dir")]
    #[educe(Default = config_defaults::output_dir())]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub site_title: String,

    /// Tag allow-list; empty disables validation. Lowercased on load.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Path to the `elm` executable
    #[serde(default)]
    pub elm: Option<String>,

    /// Output-relative source path → destination path
    #[serde(default)]
    pub copy: BTreeMap<String, String>,

    #[serde(default)]
    pub feed: Option<FeedConfig>,

    /// Shell commands run after the output is written
    #[serde(default)]
    pub post_process: Vec<String>,

    #[serde(default = "config_defaults::layouts_dir")]
    #[educe(Default = config_defaults::layouts_dir())]
    pub layouts_dir: PathBuf,

    #[serde(default = "config_defaults::pages_dir")]
    #[educe(Default = config_defaults::pages_dir())]
    pub pages_dir: PathBuf,

    #[serde(default = "config_defaults::posts_dir")]
    #[educe(Default = config_defaults::posts_dir())]
    pub posts_dir: PathBuf,

    #[serde(default = "config_defaults::resources_dir")]
    #[educe(Default = config_defaults::resources_dir())]
    pub resources_dir: PathBuf,

    /// Command that executes the render harness
    #[serde(default = "config_defaults::renderer")]
    #[educe(Default = config_defaults::renderer())]
    pub renderer: Vec<String>,

    /// Render pool size; defaults to available parallelism
    #[serde(default)]
    pub workers: Option<usize>,

    #[serde(default = "config_defaults::debounce_ms")]
    #[educe(Default = config_defaults::debounce_ms())]
    pub debounce_ms: u64,

    #[serde(default)]
    pub minify: bool,

    /// Unrecognised top-level keys, reported when the config loads
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl SiteConfig {
    pub const FILE_NAME: &'static str = "config.json";

    /// Parse configuration from a JSON string.
    ///
    /// Paths stay relative until [`SiteConfig::with_root`] is applied.
    pub fn from_str(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    /// Load `config.json` from the site root and resolve all paths.
    pub fn load(root: &Path) -> BuildResult<Self> {
        let path = root.join(Self::FILE_NAME);
        if !path.is_file() {
            return Err(BuildError::ConfigMissing(path));
        }

        let content = fs::read_to_string(&path).map_err(|err| BuildError::io(&path, err))?;
        let config = Self::from_str(&content).map_err(|err| BuildError::Config(path, err))?;
        let config = config.with_root(root);
        config.validate()?;
        for key in config.unknown_keys() {
            log!("warn"; "ignoring unknown key `{key}` in {}", Self::FILE_NAME);
        }
        Ok(config)
    }

    /// Resolve every configured path against `root`.
    pub fn with_root(mut self, root: &Path) -> Self {
        let root = normalize_path(root);

        self.config_path = root.join(Self::FILE_NAME);
        self.output_dir = root.join(&self.output_dir);
        self.layouts_dir = root.join(&self.layouts_dir);
        self.pages_dir = root.join(&self.pages_dir);
        self.posts_dir = root.join(&self.posts_dir);
        self.resources_dir = root.join(&self.resources_dir);
        self.tags = self.tags.iter().map(|t| t.to_lowercase()).collect();
        self.root = root;
        self
    }

    pub fn validate(&self) -> BuildResult<()> {
        if self.renderer.is_empty() {
            return Err(BuildError::Validation(
                "`renderer` must have at least one element".into(),
            ));
        }
        if self.workers == Some(0) {
            return Err(BuildError::Validation("`workers` must be at least 1".into()));
        }
        if self.output_dir == self.root {
            return Err(BuildError::Validation(
                "`outputDir` must not be the site root".into(),
            ));
        }
        Ok(())
    }

    /// The `elm` command to run: the configured override (with `~` expanded,
    /// relative paths resolved against the root) or `elm` from `PATH`.
    pub fn elm_command(&self) -> String {
        let Some(elm) = &self.elm else {
            return config_defaults::elm();
        };

        let expanded = shellexpand::tilde(elm).into_owned();
        let path = Path::new(&expanded);
        if path.is_relative() && (expanded.contains(MAIN_SEPARATOR) || expanded.contains('/')) {
            self.root.join(path).to_string_lossy().into_owned()
        } else {
            expanded
        }
    }

    /// Keys kept in `extra` that no part of the build reads, feed keys
    /// prefixed with `feed.`.
    pub fn unknown_keys(&self) -> Vec<String> {
        let feed = self.feed.iter().flat_map(|feed| feed.extra.keys());
        self.extra
            .keys()
            .cloned()
            .chain(feed.map(|key| format!("feed.{key}")))
            .collect()
    }

    /// Files outside the content roots whose change invalidates every record.
    pub fn site_files(&self) -> [PathBuf; 2] {
        [self.config_path.clone(), self.root.join("elm.json")]
    }

    /// Directory holding build artifacts (compiled layouts, render harness).
    pub fn artifact_dir(&self) -> PathBuf {
        self.root.join("elm-stuff").join("quire")
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(4, |n| n.get())
        })
    }
}
