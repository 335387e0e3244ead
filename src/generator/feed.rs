//! Feed generation.
//!
//! Writes the main feed over every published post and one feed per section
//! (posts tagged with the section name). The format follows `feed.type`:
//!
//! | type   | file        | format            |
//! |--------|-------------|-------------------|
//! | `rss`  | `rss.xml`   | RSS 2.0           |
//! | `atom` | `atom.xml`  | Atom 1.0          |
//! | `json` | `feed.json` | JSON Feed 1.1     |

use crate::{
    config::{FeedAuthor, FeedConfig, FeedKind, SiteConfig},
    log,
    site::{PostConfig, SitePlan},
};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveTime, Utc};
use rss::{ChannelBuilder, GuidBuilder, ItemBuilder};
use serde_json::json;
use std::{fs, path::Path};

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const JSON_FEED_VERSION: &str = "https://jsonfeed.org/version/1.1";
const GENERATOR: &str = "quire";

// ============================================================================
// Public API
// ============================================================================

/// Write the main and per-section feeds when `feed` is configured.
pub fn write_feeds(config: &SiteConfig, plan: &SitePlan) -> Result<()> {
    let Some(feed) = &config.feed else {
        return Ok(());
    };

    let mut posts: Vec<&PostConfig> = plan.published_posts().collect();
    // Newest first; equal dates keep path order
    posts.sort_by(|a, b| b.date().cmp(&a.date()));

    write_feed(&config.output_dir, feed, &feed.link, &posts)?;

    for section in sections(&posts) {
        let section_posts: Vec<&PostConfig> =
            posts.iter().copied().filter(|post| post.has_tag(&section)).collect();
        write_feed(
            &config.output_dir.join(&section),
            &feed.for_section(&section),
            &feed.link,
            &section_posts,
        )?;
    }
    Ok(())
}

// ============================================================================
// Feed Entries
// ============================================================================

/// One feed item, independent of the output format.
struct Entry<'a> {
    title: &'a str,
    /// Absolute URL; doubles as the item id
    url: String,
    summary: &'a str,
    published: DateTime<Utc>,
}

impl<'a> Entry<'a> {
    fn from_post(post: &'a PostConfig, site_link: &str) -> Option<Self> {
        Some(Self {
            title: post.title(),
            url: format!("{}/{}", site_link.trim_end_matches('/'), post.link()?),
            summary: post.summary(),
            published: post.date()?.and_time(NaiveTime::MIN).and_utc(),
        })
    }
}

fn sections(posts: &[&PostConfig]) -> Vec<String> {
    let mut sections: Vec<String> = Vec::new();
    for post in posts {
        if !post.section.is_empty() && !sections.contains(&post.section) {
            sections.push(post.section.clone());
        }
    }
    sections.sort();
    sections
}

fn write_feed(dir: &Path, feed: &FeedConfig, site_link: &str, posts: &[&PostConfig]) -> Result<()> {
    let entries: Vec<Entry> = posts
        .iter()
        .filter_map(|post| Entry::from_post(post, site_link))
        .collect();

    let content = match feed.kind {
        FeedKind::Rss => rss_feed(feed, &entries),
        FeedKind::Atom => atom_feed(feed, &entries),
        FeedKind::Json => json_feed(feed, &entries)?,
    };

    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(feed.kind.file_name());
    fs::write(&path, content).with_context(|| format!("Failed to write feed to {}", path.display()))?;

    log!("feed"; "{}", path.display());
    Ok(())
}

// ============================================================================
// Formats
// ============================================================================

fn rss_feed(feed: &FeedConfig, entries: &[Entry]) -> String {
    let author = feed.author.as_ref().map(rss_author);
    let items: Vec<_> = entries
        .iter()
        .map(|entry| {
            ItemBuilder::default()
                .title(entry.title.to_owned())
                .link(entry.url.clone())
                .guid(
                    GuidBuilder::default()
                        .permalink(true)
                        .value(entry.url.clone())
                        .build(),
                )
                .description(entry.summary.to_owned())
                .pub_date(entry.published.to_rfc2822())
                .author(author.clone())
                .build()
        })
        .collect();

    ChannelBuilder::default()
        .title(feed.title.clone())
        .link(feed.link.clone())
        .description(feed.description.clone())
        .language(feed.language.clone())
        .copyright(feed.copyright.clone())
        .generator(GENERATOR.to_owned())
        .items(items)
        .build()
        .to_string()
}

/// RSS wants `email (name)`; fall back to whichever part exists.
fn rss_author(author: &FeedAuthor) -> String {
    match &author.email {
        Some(email) if author.name.is_empty() => email.clone(),
        Some(email) => format!("{email} ({})", author.name),
        None => author.name.clone(),
    }
}

fn atom_feed(feed: &FeedConfig, entries: &[Entry]) -> String {
    let updated = entries
        .iter()
        .map(|entry| entry.published)
        .max()
        .unwrap_or_default();
    let author = feed.author.as_ref().map(atom_author).unwrap_or_default();

    let mut xml = String::with_capacity(4096);
    xml.push_str(r#"<?xml version="1.0" encoding="utf-8"?>"#);
    xml.push('\n');
    xml.push_str(&format!(r#"<feed xmlns="{ATOM_NS}">"#));
    xml.push('\n');
    xml.push_str(&format!("  <id>{}</id>\n", escape_xml(feed.id())));
    xml.push_str(&format!("  <title>{}</title>\n", escape_xml(&feed.title)));
    xml.push_str(&format!("  <updated>{}</updated>\n", updated.to_rfc3339()));
    xml.push_str(&format!("  <generator>{GENERATOR}</generator>\n"));
    xml.push_str(&format!(r#"  <link rel="alternate" href="{}"/>"#, escape_xml(&feed.link)));
    xml.push('\n');
    if !feed.description.is_empty() {
        xml.push_str(&format!("  <subtitle>{}</subtitle>\n", escape_xml(&feed.description)));
    }
    if let Some(copyright) = &feed.copyright {
        xml.push_str(&format!("  <rights>{}</rights>\n", escape_xml(copyright)));
    }
    xml.push_str(&author);

    for entry in entries {
        let url = escape_xml(&entry.url);
        xml.push_str("  <entry>\n");
        xml.push_str(&format!("    <title type=\"html\">{}</title>\n", escape_xml(entry.title)));
        xml.push_str(&format!("    <id>{url}</id>\n"));
        xml.push_str(&format!(r#"    <link href="{url}"/>"#));
        xml.push('\n');
        xml.push_str(&format!("    <updated>{}</updated>\n", entry.published.to_rfc3339()));
        xml.push_str(&format!("    <summary type=\"html\">{}</summary>\n", escape_xml(entry.summary)));
        xml.push_str("  </entry>\n");
    }

    xml.push_str("</feed>\n");
    xml
}

fn atom_author(author: &FeedAuthor) -> String {
    let mut xml = String::from("  <author>\n");
    xml.push_str(&format!("    <name>{}</name>\n", escape_xml(&author.name)));
    if let Some(email) = &author.email {
        xml.push_str(&format!("    <email>{}</email>\n", escape_xml(email)));
    }
    if let Some(link) = &author.link {
        xml.push_str(&format!("    <uri>{}</uri>\n", escape_xml(link)));
    }
    xml.push_str("  </author>\n");
    xml
}

fn json_feed(feed: &FeedConfig, entries: &[Entry]) -> Result<String> {
    let authors: Vec<_> = feed
        .author
        .iter()
        .map(|author| json!({ "name": author.name, "url": author.link }))
        .collect();
    let items: Vec<_> = entries
        .iter()
        .map(|entry| {
            json!({
                "id": entry.url,
                "url": entry.url,
                "title": entry.title,
                "summary": entry.summary,
                "content_text": entry.summary,
                "date_published": entry.published.to_rfc3339(),
            })
        })
        .collect();

    let document = json!({
        "version": JSON_FEED_VERSION,
        "title": feed.title,
        "home_page_url": feed.link,
        "feed_url": format!("{}/{}", feed.link.trim_end_matches('/'), FeedKind::Json.file_name()),
        "description": feed.description,
        "language": feed.language,
        "authors": authors,
        "items": items,
    });
    serde_json::to_string_pretty(&document).context("Failed to serialize JSON feed")
}

/// Escape special XML characters.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
