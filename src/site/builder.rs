//! Config Builder: turns content sources into the records of one pass.
//!
//! Cached records are reused when their source did not change (see
//! [`should_recompute`]). Post indexes and tag pages are rebuilt on every pass
//! and keep their cached HTML only when their member list is unchanged.

use super::{
    PageConfig, PostConfig, PostKind, RenderedPage, SitePage, append_title, tags::tag_pages,
};
use crate::{
    cache::{ContentCache, should_recompute},
    config::SiteConfig,
    content::{self, ContentRecord, Sources},
    error::{BuildError, BuildResult},
};
use chrono::{Local, NaiveDate};
use rayon::prelude::*;
use std::path::{Component, Path, PathBuf};

/// File stem of a section index
const INDEX_STEM: &str = "index";

/// Length of the `YYYY-MM-DD` token leading a post file name
const DATE_LEN: usize = 10;

const TAG_HINT: &str =
    "Hint: a tag can be declared in the site-wide tag allow-list (`tags` in config.json)";

#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    /// Keep posts dated after `today`
    pub include_drafts: bool,
    /// Write over the existing output tree instead of wiping it
    pub keep_output: bool,
    pub today: NaiveDate,
}

impl BuildOptions {
    pub fn new(include_drafts: bool, keep_output: bool) -> Self {
        Self {
            include_drafts,
            keep_output,
            today: Local::now().date_naive(),
        }
    }
}

/// Records of one pass, in output order.
#[derive(Debug, Default, Clone)]
pub struct SitePlan {
    pub pages: Vec<RenderedPage>,
    /// Published posts and every section index
    pub posts: Vec<RenderedPage>,
    /// Posts held back by the draft filter; cached but not written
    pub drafts: Vec<RenderedPage>,
    pub tags: Vec<RenderedPage>,
}

impl SitePlan {
    /// Every record that is written to the output tree.
    pub fn outputs(&self) -> impl Iterator<Item = &RenderedPage> {
        self.pages.iter().chain(&self.posts).chain(&self.tags)
    }

    pub fn outputs_mut(&mut self) -> impl Iterator<Item = &mut RenderedPage> {
        self.pages
            .iter_mut()
            .chain(&mut self.posts)
            .chain(&mut self.tags)
    }

    /// Published non-index posts, in path order.
    pub fn published_posts(&self) -> impl Iterator<Item = &PostConfig> {
        self.posts
            .iter()
            .filter_map(|rendered| rendered.page.as_post())
            .filter(|post| !post.is_index())
    }

    pub fn has_posts(&self) -> bool {
        !self.posts.is_empty()
    }
}

/// Produce the records of one pass from the located sources.
pub fn plan_site(
    config: &SiteConfig,
    sources: &Sources,
    cache: &ContentCache,
    options: &BuildOptions,
) -> BuildResult<SitePlan> {
    let pages = plan_pages(config, &sources.pages, cache)?;
    let posts = plan_posts(config, &sources.posts, cache)?;

    let (kept, drafts): (Vec<_>, Vec<_>) = posts
        .into_iter()
        .partition(|rendered| options.include_drafts || is_published(&rendered.page, options.today));

    // Indexes aggregate only what survived the draft filter
    let published: Vec<PostConfig> = kept
        .iter()
        .filter_map(|rendered| rendered.page.as_post())
        .filter(|post| !post.is_index())
        .cloned()
        .collect();

    let posts: Vec<RenderedPage> = kept
        .into_iter()
        .map(|rendered| aggregate_index(rendered, &published, cache))
        .collect();
    let tags = tag_pages(config, &published, cache);

    Ok(SitePlan {
        pages,
        posts,
        drafts,
        tags,
    })
}

// ============================================================================
// Pages
// ============================================================================

fn plan_pages(
    config: &SiteConfig,
    paths: &[PathBuf],
    cache: &ContentCache,
) -> BuildResult<Vec<RenderedPage>> {
    let results: Vec<_> = paths
        .par_iter()
        .map(|path| {
            let cached = cache.entry(path);
            let modified = content::modified_time(path)?;
            match cached {
                Some(entry) if !should_recompute(modified, cached) => Ok(entry.page.clone()),
                _ => {
                    let page = page_config(config, content::parse(path)?)?;
                    Ok(RenderedPage::reuse(
                        SitePage::Page(page),
                        cached.map(|entry| &entry.page),
                    ))
                }
            }
        })
        .collect();

    // First failure in path order
    results.into_iter().collect()
}

fn page_config(config: &SiteConfig, mut record: ContentRecord) -> BuildResult<PageConfig> {
    if let Some(source) = &record.attributes.content_source {
        let other = config
            .pages_dir
            .join(format!("{source}.{}", record.format.extension()));
        record.transclude(content::parse(&other)?);
    }

    let relative = relative_to(&record.source_path, &config.pages_dir).with_extension("");
    Ok(PageConfig {
        output_path: config.output_dir.join(relative),
        site_title: append_title(record.attributes.title.as_deref(), &config.site_title),
        record,
    })
}

// ============================================================================
// Posts
// ============================================================================

/// Posts with undeclared tags, and those tags.
type UndeclaredTags = Vec<(PathBuf, Vec<String>)>;

fn plan_posts(
    config: &SiteConfig,
    paths: &[PathBuf],
    cache: &ContentCache,
) -> BuildResult<Vec<RenderedPage>> {
    let results: Vec<BuildResult<(RenderedPage, Vec<String>)>> = paths
        .par_iter()
        .map(|path| {
            let cached = cache.entry(path);
            let modified = content::modified_time(path)?;
            match cached {
                Some(entry) if !should_recompute(modified, cached) => {
                    Ok((entry.page.clone(), Vec::new()))
                }
                _ => {
                    let record = content::parse(path)?;
                    let undeclared = undeclared_tags(&record.attributes.tags, &config.tags);
                    let post = post_config(config, record)?;
                    // Indexes are compared once their posts are aggregated
                    let rendered = if post.is_index() {
                        RenderedPage::new(SitePage::Post(post))
                    } else {
                        RenderedPage::reuse(SitePage::Post(post), cached.map(|entry| &entry.page))
                    };
                    Ok((rendered, undeclared))
                }
            }
        })
        .collect();

    let mut posts = Vec::with_capacity(results.len());
    let mut undeclared: UndeclaredTags = Vec::new();
    for result in results {
        let (rendered, tags) = result?;
        if !tags.is_empty() {
            let path = rendered.page.display_path().to_path_buf();
            undeclared.push((path, tags));
        }
        posts.push(rendered);
    }

    if undeclared.is_empty() {
        Ok(posts)
    } else {
        Err(tag_validation_error(config, &undeclared))
    }
}

fn post_config(config: &SiteConfig, record: ContentRecord) -> BuildResult<PostConfig> {
    let path = record.source_path.clone();
    let relative = relative_to(&path, &config.posts_dir);
    let dir = relative.parent().unwrap_or(Path::new(""));

    let section = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let url_dir = url_path(&posts_prefix(&config.posts_dir), dir);

    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let (kind, output_path) = if stem == INDEX_STEM {
        let output_path = config.output_dir.join(&url_dir);
        (PostKind::Index { posts: Vec::new() }, output_path)
    } else {
        let (date, token, slug) = parse_post_name(&stem).map_err(|reason| {
            BuildError::InvalidPostName {
                path: path.clone(),
                reason,
            }
        })?;
        let link = format!("{url_dir}/{token}-{slug}");
        let output_path = config.output_dir.join(&link);
        (PostKind::Dated { date, slug, link }, output_path)
    };

    Ok(PostConfig {
        tags: post_tags(&record.attributes.tags, &section),
        site_title: append_title(record.attributes.title.as_deref(), &config.site_title),
        output_path,
        section,
        kind,
        record,
    })
}

/// Split `YYYY-MM-DD-slug` (or `YYYY-MM-DD_slug`) into date, date token and slug.
fn parse_post_name(stem: &str) -> Result<(NaiveDate, &str, String), String> {
    let expected = "post file names must look like YYYY-MM-DD-slug";

    let token = stem
        .get(..DATE_LEN)
        .filter(|token| is_date_token(token))
        .ok_or_else(|| format!("`{stem}` does not start with a YYYY-MM-DD date; {expected}"))?;
    let date = NaiveDate::parse_from_str(token, "%Y-%m-%d")
        .map_err(|err| format!("`{token}` is not a valid date ({err}); {expected}"))?;

    let rest = &stem[DATE_LEN..];
    let slug = rest
        .strip_prefix('-')
        .or_else(|| rest.strip_prefix('_'))
        .ok_or_else(|| format!("the date in `{stem}` must be followed by `-` or `_`; {expected}"))?;
    if slug.is_empty() {
        return Err(format!("`{stem}` has an empty slug; {expected}"));
    }

    Ok((date, token, slug.to_owned()))
}

fn is_date_token(token: &str) -> bool {
    token.bytes().enumerate().all(|(i, b)| match i {
        4 | 7 => b == b'-',
        _ => b.is_ascii_digit(),
    })
}

/// Front-matter tags plus the section, deduplicated case-insensitively.
fn post_tags(tags: &[String], section: &str) -> Vec<String> {
    let section = Some(section).filter(|s| !s.is_empty());
    let mut result: Vec<String> = Vec::with_capacity(tags.len() + 1);

    for tag in tags.iter().map(String::as_str).chain(section) {
        let lower = tag.to_lowercase();
        if !result.iter().any(|t| t.to_lowercase() == lower) {
            result.push(tag.to_owned());
        }
    }
    result
}

/// Tags missing from a non-empty allow-list, lowercased and deduplicated.
fn undeclared_tags(tags: &[String], allowed: &[String]) -> Vec<String> {
    if allowed.is_empty() {
        return Vec::new();
    }

    let mut undeclared: Vec<String> = Vec::new();
    for tag in tags.iter().map(|t| t.to_lowercase()) {
        if !allowed.contains(&tag) && !undeclared.contains(&tag) {
            undeclared.push(tag);
        }
    }
    undeclared
}

fn tag_validation_error(config: &SiteConfig, undeclared: &UndeclaredTags) -> BuildError {
    let mut message = String::from("Undeclared tags found:\n");
    for (path, tags) in undeclared {
        let path = path.strip_prefix(&config.root).unwrap_or(path);
        message.push_str(&format!("  {}: [{}]\n", path.display(), tags.join(", ")));
    }
    message.push_str(TAG_HINT);
    BuildError::TagValidation(message)
}

fn is_published(page: &SitePage, today: NaiveDate) -> bool {
    page.as_post()
        .is_none_or(|post| post.date().is_none_or(|date| date <= today))
}

/// Fill a section index with its posts; every section for the root index.
fn aggregate_index(
    rendered: RenderedPage,
    published: &[PostConfig],
    cache: &ContentCache,
) -> RenderedPage {
    match rendered.page {
        SitePage::Post(mut post) if post.is_index() => {
            let members = published
                .iter()
                .filter(|p| post.section.is_empty() || p.section == post.section)
                .cloned()
                .collect();
            post.kind = PostKind::Index { posts: members };

            let cached = cache.entry(&post.record.source_path).map(|entry| &entry.page);
            RenderedPage::reuse(SitePage::Post(post), cached)
        }
        page => RenderedPage {
            page,
            html: rendered.html,
        },
    }
}

// ============================================================================
// Paths
// ============================================================================

fn relative_to(path: &Path, base: &Path) -> PathBuf {
    path.strip_prefix(base).unwrap_or(path).to_path_buf()
}

/// Name of the posts directory with a leading underscore dropped.
fn posts_prefix(posts_dir: &Path) -> String {
    let name = posts_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "posts".to_owned());
    name.strip_prefix('_').map(str::to_owned).unwrap_or(name)
}

/// `prefix/a/b` with forward slashes regardless of platform.
fn url_path(prefix: &str, dir: &Path) -> String {
    dir.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .fold(prefix.to_owned(), |mut url, part| {
            url.push('/');
            url.push_str(&part);
            url
        })
}
