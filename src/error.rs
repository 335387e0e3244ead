//! Build error taxonomy.
//!
//! Every stage of a build pass reports failures through [`BuildError`].
//! A failure aborts the current pass; watch mode logs it and keeps running.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(
        "Couldn't find `{}`. Is this a new project? Create a site config before building.",
        .0.display()
    )]
    ConfigMissing(PathBuf),

    #[error("Config file `{}` is malformed", .0.display())]
    Config(PathBuf, #[source] serde_json::Error),

    #[error("Config validation error: {0}")]
    Validation(String),

    #[error("Error in {}: cannot read source file", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error in {}:\n{reason}", path.display())]
    InvalidPostName { path: PathBuf, reason: String },

    #[error("{0}")]
    TagValidation(String),

    /// The compiler already printed its diagnostics to the terminal.
    #[error("layout compilation failed (see compiler output above)")]
    Compile,

    #[error("`{tool}` not found. Please install it first or set its path in config.json")]
    ToolNotFound { tool: String },

    #[error("Error in {}:\n{message}", path.display())]
    Render { path: PathBuf, message: String },

    #[error("IO error at `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BuildError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;
