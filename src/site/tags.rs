//! Synthetic tag pages, one per distinct tag.

use super::{PostConfig, RenderedPage, SitePage, TagPageConfig, append_title};
use crate::{cache::ContentCache, config::SiteConfig};

/// Distinct tags across `posts`, compared case-insensitively.
///
/// The first spelling seen wins, in post order.
pub fn distinct_tags(posts: &[PostConfig]) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in posts.iter().flat_map(|post| &post.tags) {
        let lower = tag.to_lowercase();
        if !tags.iter().any(|t| t.to_lowercase() == lower) {
            tags.push(tag.clone());
        }
    }
    tags
}

/// Build the tag pages of `posts` (published, non-index).
pub fn tag_pages(config: &SiteConfig, posts: &[PostConfig], cache: &ContentCache) -> Vec<RenderedPage> {
    distinct_tags(posts)
        .into_iter()
        .map(|tag| {
            let page = TagPageConfig {
                output_path: config.output_dir.join("tags").join(&tag),
                site_title: append_title(Some(format!("Tag: {tag}").as_str()), &config.site_title),
                posts: posts.iter().filter(|post| post.has_tag(&tag)).cloned().collect(),
                tag,
            };
            let cached = cache.tag(&page.tag);
            RenderedPage::reuse(SitePage::Tag(page), cached)
        })
        .collect()
}
