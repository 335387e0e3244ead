//! Page, post and tag records handed to layouts.
//!
//! Every record resolves to exactly one [`Layout`] and one output path. The
//! JSON flags a layout receives are produced by [`SitePage::flags`].

pub mod builder;
pub mod tags;

use crate::content::ContentRecord;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::{
    fmt,
    path::{Path, PathBuf},
};

pub use builder::{BuildOptions, SitePlan, plan_site};

/// Elm module a record is rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Layout {
    Page,
    Post,
    Posts,
    Tag,
}

impl Layout {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Page => "Page",
            Self::Post => "Post",
            Self::Posts => "Posts",
            Self::Tag => "Tag",
        }
    }

    /// `<layoutsDir>/<Layout>.elm`
    pub fn source(self, layouts_dir: &Path) -> PathBuf {
        layouts_dir.join(format!("{}.elm", self.name()))
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `"<title> | <site title>"`, or whichever of the two is non-empty.
pub fn append_title(title: Option<&str>, site_title: &str) -> String {
    match title.filter(|t| !t.is_empty()) {
        Some(title) if !site_title.is_empty() => format!("{title} | {site_title}"),
        Some(title) => title.to_owned(),
        None => site_title.to_owned(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageConfig {
    pub record: ContentRecord,
    pub output_path: PathBuf,
    pub site_title: String,
}

/// What the file name of a post resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum PostKind {
    Dated {
        date: NaiveDate,
        slug: String,
        /// Output-relative URL path, e.g. `posts/blog/2020-01-01-hello`
        link: String,
    },
    /// `index.md` of a section; `posts` is filled once every post is known.
    Index { posts: Vec<PostConfig> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostConfig {
    pub record: ContentRecord,
    pub output_path: PathBuf,
    pub site_title: String,
    /// Last directory below the posts root; empty at the root
    pub section: String,
    pub tags: Vec<String>,
    pub kind: PostKind,
}

impl PostConfig {
    pub fn is_index(&self) -> bool {
        matches!(self.kind, PostKind::Index { .. })
    }

    pub fn date(&self) -> Option<NaiveDate> {
        match &self.kind {
            PostKind::Dated { date, .. } => Some(*date),
            PostKind::Index { .. } => None,
        }
    }

    pub fn link(&self) -> Option<&str> {
        match &self.kind {
            PostKind::Dated { link, .. } => Some(link),
            PostKind::Index { .. } => None,
        }
    }

    pub fn layout(&self) -> Layout {
        if self.is_index() { Layout::Posts } else { Layout::Post }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.to_lowercase();
        self.tags.iter().any(|t| t.to_lowercase() == tag)
    }

    pub fn title(&self) -> &str {
        self.record.attributes.title.as_deref().unwrap_or_default()
    }

    /// Description, or the excerpt when none is given.
    pub fn summary(&self) -> &str {
        self.record
            .attributes
            .description
            .as_deref()
            .unwrap_or(&self.record.excerpt)
    }

    fn flags(&self) -> Value {
        let mut flags = record_flags(&self.record, &self.output_path, &self.site_title, self.layout());
        flags.insert("section".into(), json!(self.section));
        flags.insert("isIndex".into(), json!(self.is_index()));
        flags.insert("tags".into(), json!(self.tags));

        match &self.kind {
            PostKind::Dated { date, slug, link } => {
                flags.insert("date".into(), json!(date.format("%Y-%m-%d").to_string()));
                flags.insert("slug".into(), json!(slug));
                flags.insert("link".into(), json!(link));
            }
            PostKind::Index { posts } => {
                let posts: Vec<Value> = posts.iter().map(Self::flags).collect();
                flags.insert("posts".into(), Value::Array(posts));
            }
        }

        merge_extra(flags, &self.record)
    }
}

/// Synthetic listing of the posts carrying one tag.
#[derive(Debug, Clone, PartialEq)]
pub struct TagPageConfig {
    pub tag: String,
    pub output_path: PathBuf,
    pub site_title: String,
    pub posts: Vec<PostConfig>,
}

impl TagPageConfig {
    pub fn title(&self) -> String {
        format!("Tag: {}", self.tag)
    }

    fn flags(&self) -> Value {
        json!({
            "layout": Layout::Tag,
            "tag": self.tag,
            "title": self.title(),
            "siteTitle": self.site_title,
            "outputPath": self.output_path,
            "section": "",
            "markdown": "",
            "posts": self.posts.iter().map(PostConfig::flags).collect::<Vec<_>>(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SitePage {
    Page(PageConfig),
    Post(PostConfig),
    Tag(TagPageConfig),
}

impl SitePage {
    pub fn layout(&self) -> Layout {
        match self {
            Self::Page(_) => Layout::Page,
            Self::Post(post) => post.layout(),
            Self::Tag(_) => Layout::Tag,
        }
    }

    pub fn output_path(&self) -> &Path {
        match self {
            Self::Page(page) => &page.output_path,
            Self::Post(post) => &post.output_path,
            Self::Tag(tag) => &tag.output_path,
        }
    }

    /// The parsed source; tag pages have none.
    pub fn record(&self) -> Option<&ContentRecord> {
        match self {
            Self::Page(page) => Some(&page.record),
            Self::Post(post) => Some(&post.record),
            Self::Tag(_) => None,
        }
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.record().map(|record| record.source_path.as_path())
    }

    pub fn is_index(&self) -> bool {
        self.as_post().is_some_and(PostConfig::is_index)
    }

    /// Path named in diagnostics: the source file, or the output of a tag page.
    pub fn display_path(&self) -> &Path {
        self.source_path().unwrap_or_else(|| self.output_path())
    }

    pub fn as_post(&self) -> Option<&PostConfig> {
        match self {
            Self::Post(post) => Some(post),
            _ => None,
        }
    }

    /// JSON flags passed to the layout's `init`.
    pub fn flags(&self) -> Value {
        match self {
            Self::Page(page) => {
                let flags =
                    record_flags(&page.record, &page.output_path, &page.site_title, Layout::Page);
                merge_extra(flags, &page.record)
            }
            Self::Post(post) => post.flags(),
            Self::Tag(tag) => tag.flags(),
        }
    }
}

/// A record together with its HTML. `html` present means no render is needed.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    pub page: SitePage,
    pub html: Option<String>,
}

impl RenderedPage {
    pub fn new(page: SitePage) -> Self {
        Self { page, html: None }
    }

    /// Keep the HTML of `cached` if it was rendered from the same record.
    pub fn reuse(page: SitePage, cached: Option<&RenderedPage>) -> Self {
        let html = cached
            .filter(|cached| cached.page == page)
            .and_then(|cached| cached.html.clone());
        Self { page, html }
    }
}

// ============================================================================
// Flags
// ============================================================================

fn record_flags(
    record: &ContentRecord,
    output_path: &Path,
    site_title: &str,
    layout: Layout,
) -> Map<String, Value> {
    let attributes = &record.attributes;
    let mut flags = Map::new();

    if let Some(title) = &attributes.title {
        flags.insert("title".into(), json!(title));
    }
    if let Some(description) = &attributes.description {
        flags.insert("description".into(), json!(description));
    }
    if let Some(source) = &attributes.content_source {
        flags.insert("contentSource".into(), json!(source));
    }
    flags.insert("excerpt".into(), json!(record.excerpt));
    flags.insert("inputPath".into(), json!(record.source_path));
    flags.insert("outputPath".into(), json!(output_path));
    flags.insert("siteTitle".into(), json!(site_title));
    flags.insert("layout".into(), json!(layout));
    flags.insert("format".into(), json!(record.format));
    flags.insert(record.format.body_key().into(), json!(record.body));
    flags
}

/// Add front-matter keys that do not shadow a known field.
fn merge_extra(mut flags: Map<String, Value>, record: &ContentRecord) -> Value {
    for (key, value) in &record.attributes.extra {
        if !flags.contains_key(key) {
            flags.insert(key.clone(), json!(value));
        }
    }
    Value::Object(flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn record(path: &str, source: &str) -> ContentRecord {
        ContentRecord::from_source(Path::new(path), SystemTime::UNIX_EPOCH, source)
    }

    fn post(path: &str, source: &str, date: &str) -> PostConfig {
        PostConfig {
            record: record(path, source),
            output_path: PathBuf::from("/out/posts/2020-01-01-a"),
            site_title: "A | Site".into(),
            section: String::new(),
            tags: vec!["tech".into()],
            kind: PostKind::Dated {
                date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
                slug: "a".into(),
                link: "posts/2020-01-01-a".into(),
            },
        }
    }

    #[test]
    fn test_append_title() {
        assert_eq!(append_title(Some("About"), "Site"), "About | Site");
        assert_eq!(append_title(Some("About"), ""), "About");
        assert_eq!(append_title(None, "Site"), "Site");
        assert_eq!(append_title(Some(""), "Site"), "Site");
    }

    #[test]
    fn test_layout_source() {
        assert_eq!(Layout::Posts.source(Path::new("_layouts")), PathBuf::from("_layouts/Posts.elm"));
        assert_eq!(Layout::Tag.to_string(), "Tag");
    }

    #[test]
    fn test_page_flags() {
        let page = SitePage::Page(PageConfig {
            record: record(
                "_pages/about.md",
                "---\ntitle: About\nlayout: Fancy\nauthor: Ann\n---\nHello",
            ),
            output_path: PathBuf::from("/out/about"),
            site_title: "About | Site".into(),
        });

        let flags = page.flags();
        assert_eq!(flags["title"], "About");
        assert_eq!(flags["markdown"], "Hello");
        assert_eq!(flags["format"], "md");
        assert_eq!(flags["outputPath"], "/out/about");
        assert_eq!(flags["author"], "Ann");
        // A front-matter key never shadows a known field
        assert_eq!(flags["layout"], "Page");
        assert!(flags.get("description").is_none());
    }

    #[test]
    fn test_post_flags() {
        let post = post("_posts/2020-01-01-a.md", "---\ntitle: A\n---\nBody", "2020-01-01");
        let flags = SitePage::Post(post.clone()).flags();
        assert_eq!(flags["layout"], "Post");
        assert_eq!(flags["date"], "2020-01-01");
        assert_eq!(flags["slug"], "a");
        assert_eq!(flags["link"], "posts/2020-01-01-a");
        assert_eq!(flags["isIndex"], false);
        assert_eq!(flags["tags"], json!(["tech"]));

        let index = PostConfig {
            kind: PostKind::Index { posts: vec![post] },
            ..self::post("_posts/index.md", "", "2020-01-01")
        };
        let flags = SitePage::Post(index).flags();
        assert_eq!(flags["layout"], "Posts");
        assert_eq!(flags["isIndex"], true);
        assert_eq!(flags["posts"][0]["slug"], "a");
        assert!(flags.get("date").is_none());
    }

    #[test]
    fn test_tag_flags() {
        let tag = SitePage::Tag(TagPageConfig {
            tag: "tech".into(),
            output_path: PathBuf::from("/out/tags/tech"),
            site_title: "Tag: tech | Site".into(),
            posts: vec![post("_posts/2020-01-01-a.md", "Body", "2020-01-01")],
        });
        let flags = tag.flags();
        assert_eq!(flags["title"], "Tag: tech");
        assert_eq!(flags["layout"], "Tag");
        assert_eq!(flags["posts"].as_array().unwrap().len(), 1);
        assert_eq!(tag.display_path(), Path::new("/out/tags/tech"));
    }

    #[test]
    fn test_reuse_requires_equal_record() {
        let page = SitePage::Post(post("_posts/2020-01-01-a.md", "Body", "2020-01-01"));
        let cached = RenderedPage {
            page: page.clone(),
            html: Some("<p>cached</p>".into()),
        };
        assert_eq!(RenderedPage::reuse(page, Some(&cached)).html.as_deref(), Some("<p>cached</p>"));

        let changed = SitePage::Post(post("_posts/2020-01-01-a.md", "Edited", "2020-01-01"));
        assert!(RenderedPage::reuse(changed, Some(&cached)).html.is_none());
    }
}
