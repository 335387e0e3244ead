//! In-memory record cache carried between build passes.
//!
//! The cache is rebuilt wholesale from the records of a finished pass, so
//! entries of deleted sources disappear on their own.

use crate::site::{RenderedPage, SitePage, SitePlan};
use rustc_hash::FxHashMap;
use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub page: RenderedPage,
    /// Source mtime observed when the record was parsed
    pub modified: SystemTime,
}

impl CacheEntry {
    pub fn is_index(&self) -> bool {
        self.page.page.is_index()
    }

    /// Whether the body comes from another source via `contentSource`.
    pub fn transcludes(&self) -> bool {
        self.page
            .page
            .record()
            .is_some_and(|record| record.attributes.content_source.is_some())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContentCache {
    entries: FxHashMap<PathBuf, CacheEntry>,
    tags: FxHashMap<String, RenderedPage>,
}

impl ContentCache {
    /// Capture every record of a finished pass, drafts included.
    pub fn from_plan(plan: SitePlan) -> Self {
        let SitePlan {
            pages,
            posts,
            drafts,
            tags,
        } = plan;

        let entries = pages
            .into_iter()
            .chain(posts)
            .chain(drafts)
            .filter_map(|page| {
                let record = page.page.record()?;
                let key = record.source_path.clone();
                let modified = record.modified;
                Some((key, CacheEntry { page, modified }))
            })
            .collect();

        let tags = tags
            .into_iter()
            .filter_map(|page| {
                let SitePage::Tag(tag) = &page.page else {
                    return None;
                };
                let key = tag.tag.clone();
                Some((key, page))
            })
            .collect();

        Self { entries, tags }
    }

    pub fn entry(&self, path: &Path) -> Option<&CacheEntry> {
        self.entries.get(path)
    }

    pub fn tag(&self, tag: &str) -> Option<&RenderedPage> {
        self.tags.get(tag)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whether a source must be parsed again.
///
/// True without an entry, when the file is strictly newer than the entry, when
/// the entry is an index (its posts may have changed), or when it transcludes
/// another source (that file may have changed).
pub fn should_recompute(modified: SystemTime, entry: Option<&CacheEntry>) -> bool {
    match entry {
        None => true,
        Some(entry) => modified > entry.modified || entry.is_index() || entry.transcludes(),
    }
}
