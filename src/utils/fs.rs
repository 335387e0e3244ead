//! Filesystem helpers shared by the locator, writer and watcher.

use anyhow::{Context, Result};
use std::{
    env,
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Files to ignore during directory traversal
const IGNORED_FILES: &[&str] = &[".DS_Store"];

/// Collect all files from a directory recursively, sorted by path.
///
/// A missing directory yields an empty list; unreadable entries are skipped.
pub fn collect_all_files(dir: &Path) -> Vec<PathBuf> {
    walk_files(dir).filter_map(|entry| entry.ok()).collect()
}

/// Walk the files below `dir` in path order, symlinks followed.
///
/// Entries that cannot be reached, such as dangling links, are yielded as
/// errors.
pub fn walk_files(dir: &Path) -> impl Iterator<Item = walkdir::Result<PathBuf>> {
    WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter(|entry| match entry {
            Ok(e) => e.file_type().is_file() && !is_ignored(e.file_name()),
            Err(_) => true,
        })
        .map(|entry| entry.map(walkdir::DirEntry::into_path))
}

fn is_ignored(name: &OsStr) -> bool {
    name.to_str().is_some_and(|name| IGNORED_FILES.contains(&name))
}

/// Normalize a path to absolute form for reliable comparison.
///
/// Watcher events carry absolute paths, so configured roots are
/// canonicalized before they are compared against them.
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
        }
    })
}

/// Copy a file, or a directory tree merged into `dst`.
pub fn copy_path(src: &Path, dst: &Path) -> Result<()> {
    if src.is_file() {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::copy(src, dst)
            .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
        return Ok(());
    }

    for file in collect_all_files(src) {
        let relative = file.strip_prefix(src)?;
        copy_path(&file, &dst.join(relative))?;
    }
    Ok(())
}

/// Remove everything inside `dir` except the entries named in `keep`.
///
/// Creates `dir` when it does not exist.
pub fn empty_dir_except(dir: &Path, keep: &[&str]) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        return Ok(());
    }

    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let entry = entry?;
        if keep.iter().any(|name| entry.file_name() == *name) {
            continue;
        }
        let path = entry.path();
        let removed = if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_collect_all_files_sorted() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("b/2.md"), "").unwrap();
        fs::write(dir.path().join("a.md"), "").unwrap();
        fs::write(dir.path().join(".DS_Store"), "").unwrap();

        let files = collect_all_files(dir.path());
        assert_eq!(files, vec![dir.path().join("a.md"), dir.path().join("b/2.md")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_files_reports_dangling_link() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), "").unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone.md"), dir.path().join("b.md")).unwrap();

        let entries: Vec<_> = walk_files(dir.path()).collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].as_ref().unwrap(), &dir.path().join("a.md"));
        let err = entries[1].as_ref().unwrap_err();
        assert_eq!(err.path(), Some(dir.path().join("b.md").as_path()));

        assert_eq!(collect_all_files(dir.path()), vec![dir.path().join("a.md")]);
    }

    #[test]
    fn test_collect_missing_dir() {
        assert!(collect_all_files(Path::new("/nonexistent/quire/dir")).is_empty());
    }

    #[test]
    fn test_copy_path_dir_merges() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("css")).unwrap();
        fs::write(src.join("css/site.css"), "body{}").unwrap();
        let dst = dir.path().join("dst");
        fs::create_dir_all(&dst).unwrap();
        fs::write(dst.join("keep.html"), "x").unwrap();

        copy_path(&src, &dst).unwrap();
        assert_eq!(fs::read_to_string(dst.join("css/site.css")).unwrap(), "body{}");
        assert!(dst.join("keep.html").exists());
    }

    #[test]
    fn test_empty_dir_except() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("posts")).unwrap();
        fs::write(dir.path().join("posts/index.html"), "").unwrap();
        fs::write(dir.path().join("index.html"), "").unwrap();
        fs::write(dir.path().join(".git"), "gitdir: ../repo").unwrap();

        empty_dir_except(dir.path(), &[".git"]).unwrap();
        let left: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(left, vec![std::ffi::OsString::from(".git")]);
    }
}
