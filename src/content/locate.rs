//! Content discovery.

use super::Format;
use crate::config::SiteConfig;
use crate::error::{BuildError, BuildResult};
use crate::utils::fs::walk_files;
use std::{
    io,
    path::{Path, PathBuf},
};

/// Every content source of one pass, each list sorted by path.
#[derive(Debug, Default, Clone)]
pub struct Sources {
    pub pages: Vec<PathBuf>,
    pub posts: Vec<PathBuf>,
}

impl Sources {
    /// Find every content file. An entry that cannot be reached, such as
    /// a dangling link, fails the pass.
    pub fn locate(config: &SiteConfig) -> BuildResult<Self> {
        Ok(Self {
            pages: content_files(&config.pages_dir)?,
            posts: content_files(&config.posts_dir)?,
        })
    }

    pub fn len(&self) -> usize {
        self.pages.len() + self.posts.len()
    }
}

fn content_files(dir: &Path) -> BuildResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in walk_files(dir) {
        match entry {
            Ok(path) if Format::from_path(&path).is_some() => files.push(path),
            Ok(_) => {}
            Err(err) => {
                let path = err.path().unwrap_or(dir).to_path_buf();
                return Err(BuildError::Parse {
                    path,
                    source: io::Error::from(err),
                });
            }
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_locate_filters_extensions() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("_pages/docs")).unwrap();
        fs::create_dir_all(root.join("_posts/blog")).unwrap();
        fs::write(root.join("_pages/about.md"), "").unwrap();
        fs::write(root.join("_pages/docs/intro.emu"), "").unwrap();
        fs::write(root.join("_pages/notes.txt"), "").unwrap();
        fs::write(root.join("_posts/blog/2020-01-01-a.md"), "").unwrap();
        fs::write(root.join("_posts/blog/index.md"), "").unwrap();

        let config = SiteConfig::default().with_root(root);
        let sources = Sources::locate(&config).unwrap();

        assert_eq!(
            sources.pages,
            vec![config.pages_dir.join("about.md"), config.pages_dir.join("docs/intro.emu")]
        );
        assert_eq!(
            sources.posts,
            vec![
                config.posts_dir.join("blog/2020-01-01-a.md"),
                config.posts_dir.join("blog/index.md")
            ]
        );
        assert_eq!(sources.len(), 4);
    }

    #[test]
    fn test_locate_missing_dirs() {
        let dir = TempDir::new().unwrap();
        let config = SiteConfig::default().with_root(dir.path());
        assert_eq!(Sources::locate(&config).unwrap().len(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_locate_dangling_link_fails() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("_posts")).unwrap();
        fs::write(root.join("_posts/2020-01-01-ok.md"), "").unwrap();
        std::os::unix::fs::symlink(root.join("missing.md"), root.join("_posts/2020-01-02-link.md"))
            .unwrap();

        let config = SiteConfig::default().with_root(root);
        match Sources::locate(&config) {
            Err(BuildError::Parse { path, .. }) => {
                assert!(path.ends_with("_posts/2020-01-02-link.md"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
