//! Content sources: discovery, front matter and excerpts.
//!
//! A [`ContentRecord`] is the parsed, immutable view of one source file. A new
//! version of the file produces a new record.

pub mod excerpt;
pub mod front_matter;
pub mod locate;

use crate::error::{BuildError, BuildResult};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

pub use locate::Sources;

/// Source markup of a content file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Format {
    #[serde(rename = "md")]
    Markdown,
    #[serde(rename = "emu")]
    ElmMarkup,
}

impl Format {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "md" => Some(Self::Markdown),
            "emu" => Some(Self::ElmMarkup),
            _ => None,
        }
    }

    pub const fn extension(self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::ElmMarkup => "emu",
        }
    }

    /// Flag name under which the body is handed to layouts.
    pub const fn body_key(self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::ElmMarkup => "content",
        }
    }
}

/// Front matter with the keys the builder interprets pulled out.
///
/// Every other key is kept in `extra` and passed to layouts untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub description: Option<String>,
    /// Name of another page whose body this page displays
    pub content_source: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl Attributes {
    /// Later duplicates of a key win.
    pub fn from_pairs(pairs: front_matter::Pairs) -> Self {
        let mut attributes = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "title" => attributes.title = Some(front_matter::unquote(&value).to_owned()),
                "tags" => attributes.tags = front_matter::parse_tags(&value),
                "description" => attributes.description = Some(value),
                "contentSource" => attributes.content_source = Some(value),
                _ => {
                    attributes.extra.insert(key, value);
                }
            }
        }
        attributes
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentRecord {
    pub attributes: Attributes,
    /// Content without the front matter (the whole file for elm-markup)
    pub body: String,
    pub excerpt: String,
    pub source_path: PathBuf,
    pub modified: SystemTime,
    pub format: Format,
}

impl ContentRecord {
    /// Build a record from file contents already in memory.
    pub fn from_source(source_path: &Path, modified: SystemTime, contents: &str) -> Self {
        let format = Format::from_path(source_path).unwrap_or(Format::Markdown);
        let (pairs, body, excerpt) = match format {
            Format::Markdown => {
                let (pairs, body) = front_matter::split_markdown(contents);
                (pairs, body.to_owned(), excerpt::excerpt(body))
            }
            Format::ElmMarkup => (
                front_matter::parse_elm_markup(contents),
                contents.to_owned(),
                String::new(),
            ),
        };

        Self {
            attributes: Attributes::from_pairs(pairs),
            body,
            excerpt,
            source_path: source_path.to_path_buf(),
            modified,
            format,
        }
    }

    /// Take body and excerpt from another record, keeping these attributes.
    pub fn transclude(&mut self, other: Self) {
        self.body = other.body;
        self.excerpt = other.excerpt;
    }
}

/// Modification time of the file a path resolves to (symlinks followed).
pub fn modified_time(path: &Path) -> BuildResult<SystemTime> {
    let parse_error = |source| BuildError::Parse {
        path: path.to_path_buf(),
        source,
    };
    let real = fs::canonicalize(path).map_err(parse_error)?;
    fs::metadata(&real)
        .and_then(|meta| meta.modified())
        .map_err(parse_error)
}

/// Read and parse one content file.
pub fn parse(path: &Path) -> BuildResult<ContentRecord> {
    let modified = modified_time(path)?;
    let contents = fs::read_to_string(path).map_err(|source| BuildError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(ContentRecord::from_source(path, modified, &contents))
}
