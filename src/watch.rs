//! File system watcher driving incremental rebuilds.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Event Loop                              │
//! │                                                              │
//! │  ┌──────────┐    ┌───────────┐    ┌───────────────────────┐  │
//! │  │ notify   │───▶│ Debouncer │───▶│ WatchSession          │  │
//! │  │ events   │    │ (quiet    │    │   handle_batch()      │  │
//! │  └──────────┘    │  interval)│    │   Idle → Building →   │  │
//! │                  └───────────┘    │   Idle | ErrorIdle    │  │
//! │                                   └───────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Events that arrive while a pass runs wait in the channel and form the
//! next batch.

use crate::{
    build::{BuildReport, run_pass},
    cache::ContentCache,
    config::SiteConfig,
    log,
    render::RenderPool,
};
use anyhow::{Context, Result};
use notify::{
    Event, EventKind, RecursiveMode, Watcher,
    event::{ModifyKind, RenameMode},
};
use std::{
    fmt, mem,
    path::{Path, PathBuf},
    sync::mpsc::{self, RecvTimeoutError},
    time::{Duration, Instant},
};

/// How long to block on the channel while nothing is pending
const IDLE_WAIT: Duration = Duration::from_secs(60);

// =============================================================================
// Events
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Updated,
    Deleted,
}

impl ChangeKind {
    fn from_event(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                Some(Self::Added)
            }
            EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                Some(Self::Deleted)
            }
            EventKind::Modify(_) => Some(Self::Updated),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

/// One change to a watched path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

impl FsEvent {
    /// Split a notify event into per-path changes, dropping editor artifacts.
    pub fn from_notify(event: Event) -> Vec<Self> {
        let Some(kind) = ChangeKind::from_event(&event.kind) else {
            return Vec::new();
        };
        event
            .paths
            .into_iter()
            .filter(|path| !is_temp_file(path))
            .map(|path| Self { kind, path })
            .collect()
    }
}

impl fmt::Display for FsEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.path.display(), self.kind.as_str())
    }
}

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "swp" | "swo" | "swx" | "tmp" | "bak")
        || name.ends_with('~')
        || name.starts_with('.')
}

// =============================================================================
// Debounce
// =============================================================================

/// Collects items until none arrives for the quiet interval.
///
/// Every push re-arms the deadline; time is passed in so the caller decides
/// what "now" is.
#[derive(Debug)]
pub struct Debouncer<T> {
    pending: Vec<T>,
    deadline: Option<Instant>,
    quiet: Duration,
}

impl<T> Debouncer<T> {
    pub fn new(quiet: Duration) -> Self {
        Self {
            pending: Vec::new(),
            deadline: None,
            quiet,
        }
    }

    pub fn push(&mut self, item: T, now: Instant) {
        self.pending.push(item);
        self.deadline = Some(now + self.quiet);
    }

    /// How long the caller may block before the batch is due.
    pub fn timeout(&self, now: Instant) -> Duration {
        self.deadline
            .map_or(IDLE_WAIT, |deadline| deadline.saturating_duration_since(now))
    }

    /// Take the batch once the quiet interval has passed.
    pub fn poll(&mut self, now: Instant) -> Option<Vec<T>> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                Some(mem::take(&mut self.pending))
            }
            _ => None,
        }
    }
}

// =============================================================================
// Session
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Building,
    /// The last pass failed; the next batch retries
    ErrorIdle,
}

/// State carried across watch passes.
pub struct WatchSession {
    /// Paths whose change invalidates every cached record
    layouts_dir: PathBuf,
    site_files: [PathBuf; 2],
    cache: ContentCache,
    state: WatchState,
    /// Set once a pass has rebuilt the output tree from scratch
    wiped: bool,
}

impl WatchSession {
    pub fn new(config: &SiteConfig) -> Self {
        Self {
            layouts_dir: config.layouts_dir.clone(),
            site_files: config.site_files(),
            cache: ContentCache::default(),
            state: WatchState::Idle,
            wiped: false,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Whether `events` touch layouts or site-wide files.
    pub fn invalidates_cache(&self, events: &[FsEvent]) -> bool {
        events.iter().any(|event| {
            event.path.starts_with(&self.layouts_dir) || self.site_files.contains(&event.path)
        })
    }

    /// Run one pass for `events`.
    ///
    /// The cache is replaced only when the pass succeeds. A batch touching
    /// layouts or site files drops it before the pass, whatever the outcome.
    /// `pass` is told to keep the output tree once a pass has succeeded; until
    /// then stale pages from earlier runs are wiped.
    pub fn handle_batch<F>(&mut self, events: &[FsEvent], pass: F) -> Result<()>
    where
        F: FnOnce(&ContentCache, bool) -> Result<BuildReport>,
    {
        for event in events {
            log!("watch"; "{event}");
        }
        if self.invalidates_cache(events) && !self.cache.is_empty() {
            log!("watch"; "layouts or site config changed, rebuilding everything");
            self.cache = ContentCache::default();
        }

        self.state = WatchState::Building;
        match pass(&self.cache, self.wiped) {
            Ok(report) => {
                self.cache = report.cache;
                self.wiped = true;
                self.state = WatchState::Idle;
                Ok(())
            }
            Err(err) => {
                self.state = WatchState::ErrorIdle;
                Err(err)
            }
        }
    }
}

// =============================================================================
// Watcher Setup
// =============================================================================

/// Roots that exist: directories recursively, files on their own.
fn watched_paths(config: &SiteConfig) -> Vec<(PathBuf, RecursiveMode)> {
    let dirs = [
        &config.layouts_dir,
        &config.pages_dir,
        &config.posts_dir,
        &config.resources_dir,
    ]
    .into_iter()
    .filter(|dir| dir.is_dir())
    .map(|dir| (dir.clone(), RecursiveMode::Recursive));

    let files = config
        .site_files()
        .into_iter()
        .filter(|file| file.is_file())
        .map(|file| (file, RecursiveMode::NonRecursive));

    dirs.chain(files).collect()
}

fn rel_path<'a>(path: &'a Path, root: &Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}

fn run_batch(session: &mut WatchSession, events: &[FsEvent], root: &Path, pool: &RenderPool, drafts: bool) {
    if let Err(err) = session.handle_batch(events, |cache, keep_output| {
        run_pass(root, pool, cache, drafts, keep_output)
    }) {
        log!("error"; "{err:#}");
    }
    match session.state() {
        WatchState::ErrorIdle => log!("watch"; "build failed, waiting for changes"),
        _ => log!("watch"; "{} records cached, waiting for changes", session.cache().len()),
    }
    eprintln!(); // Blank line between passes
}

// =============================================================================
// Public API
// =============================================================================

/// Build once, then rebuild on every debounced batch of changes until ctrl-c.
pub fn watch_site(root: &Path, pool: &RenderPool, include_drafts: bool) -> Result<()> {
    let config = SiteConfig::load(root)?;

    ctrlc::set_handler(|| {
        log!("watch"; "stopped");
        std::process::exit(0);
    })
    .context("Failed to set Ctrl+C handler")?;

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;
    for (path, mode) in watched_paths(&config) {
        watcher
            .watch(&path, mode)
            .with_context(|| format!("Failed to watch {}", path.display()))?;
        log!("watch"; "{}", rel_path(&path, &config.root).display());
    }

    let mut session = WatchSession::new(&config);
    run_batch(&mut session, &[], &config.root, pool, include_drafts);

    let mut debouncer = Debouncer::new(Duration::from_millis(config.debounce_ms));
    loop {
        match rx.recv_timeout(debouncer.timeout(Instant::now())) {
            Ok(Ok(event)) => {
                let now = Instant::now();
                for change in FsEvent::from_notify(event) {
                    debouncer.push(change, now);
                }
            }
            Ok(Err(err)) => log!("watch"; "error: {err}"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if let Some(batch) = debouncer.poll(Instant::now()) {
            run_batch(&mut session, &batch, &config.root, pool, include_drafts);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentRecord;
    use crate::output::prepare_output;
    use crate::site::{PageConfig, RenderedPage, SitePage, SitePlan};
    use notify::event::{AccessKind, CreateKind, DataChange, RemoveKind};
    use std::time::SystemTime;

    fn event(kind: ChangeKind, path: &str) -> FsEvent {
        FsEvent {
            kind,
            path: PathBuf::from(path),
        }
    }

    fn session() -> WatchSession {
        WatchSession::new(&SiteConfig::default().with_root(Path::new("/site")))
    }

    /// A report whose cache holds `pages` records.
    fn report(pages: usize) -> BuildReport {
        let pages = (0..pages)
            .map(|i| {
                let path = PathBuf::from(format!("/site/_pages/{i}.md"));
                RenderedPage::new(SitePage::Page(PageConfig {
                    record: ContentRecord::from_source(&path, SystemTime::UNIX_EPOCH, ""),
                    output_path: PathBuf::from(format!("/site/_site/{i}")),
                    site_title: String::new(),
                }))
            })
            .collect();
        BuildReport {
            cache: ContentCache::from_plan(SitePlan {
                pages,
                ..SitePlan::default()
            }),
            rendered: 0,
        }
    }

    #[test]
    fn test_is_temp_file() {
        assert!(is_temp_file(Path::new("_posts/.2020-01-01-a.md.swp")));
        assert!(is_temp_file(Path::new("_posts/a.md~")));
        assert!(is_temp_file(Path::new("_pages/.DS_Store")));
        assert!(!is_temp_file(Path::new("_posts/2020-01-01-a.md")));
    }

    #[test]
    fn test_from_notify() {
        let created = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/site/_posts/a.md"))
            .add_path(PathBuf::from("/site/_posts/.a.md.swp"));
        assert_eq!(
            FsEvent::from_notify(created),
            vec![event(ChangeKind::Added, "/site/_posts/a.md")]
        );

        let modified = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(PathBuf::from("/site/_posts/a.md"));
        assert_eq!(FsEvent::from_notify(modified)[0].kind, ChangeKind::Updated);

        let removed = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("/site/_posts/a.md"));
        assert_eq!(FsEvent::from_notify(removed)[0].kind, ChangeKind::Deleted);

        let access = Event::new(EventKind::Access(AccessKind::Any))
            .add_path(PathBuf::from("/site/_posts/a.md"));
        assert!(FsEvent::from_notify(access).is_empty());
    }

    #[test]
    fn test_event_display() {
        assert_eq!(
            event(ChangeKind::Deleted, "_posts/a.md").to_string(),
            format!("{} deleted", Path::new("_posts/a.md").display())
        );
    }

    #[test]
    fn test_debouncer_coalesces_burst() {
        let start = Instant::now();
        let quiet = Duration::from_millis(100);
        let mut debouncer = Debouncer::new(quiet);
        assert_eq!(debouncer.timeout(start), IDLE_WAIT);

        for i in 0..5u64 {
            let now = start + Duration::from_millis(i * 20);
            debouncer.push(i, now);
            assert!(debouncer.poll(now).is_none());
        }

        // Last push at 80ms re-armed the deadline to 180ms
        let last = start + Duration::from_millis(80);
        assert_eq!(debouncer.timeout(last), quiet);
        assert!(debouncer.poll(start + Duration::from_millis(179)).is_none());
        assert_eq!(
            debouncer.poll(start + Duration::from_millis(180)),
            Some(vec![0, 1, 2, 3, 4])
        );
        assert!(debouncer.poll(start + Duration::from_secs(1)).is_none());
        assert_eq!(debouncer.timeout(start), IDLE_WAIT);
    }

    #[test]
    fn test_burst_runs_one_pass() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        let changes = [
            event(ChangeKind::Added, "/site/_posts/2020-01-01-a.md"),
            event(ChangeKind::Updated, "/site/_posts/2020-01-01-a.md"),
            event(ChangeKind::Updated, "/site/_pages/about.md"),
            event(ChangeKind::Deleted, "/site/_posts/2019-12-31-old.md"),
            event(ChangeKind::Added, "/site/_resources/logo.svg"),
        ];
        for (i, change) in changes.iter().enumerate() {
            debouncer.push(change.clone(), start + Duration::from_millis(i as u64 * 30));
        }

        let mut session = session();
        let mut passes = 0;
        let mut batches = Vec::new();
        for ms in (0..500).step_by(10) {
            if let Some(batch) = debouncer.poll(start + Duration::from_millis(ms)) {
                session
                    .handle_batch(&batch, |_, _| {
                        passes += 1;
                        Ok(report(1))
                    })
                    .unwrap();
                batches.push(batch);
            }
        }

        assert_eq!(passes, 1);
        assert_eq!(batches, vec![changes.to_vec()]);
        let lines: Vec<_> = batches[0].iter().map(ToString::to_string).collect();
        let path = |p: &str| Path::new(p).display().to_string();
        assert_eq!(
            lines,
            vec![
                format!("{} added", path("/site/_posts/2020-01-01-a.md")),
                format!("{} updated", path("/site/_posts/2020-01-01-a.md")),
                format!("{} updated", path("/site/_pages/about.md")),
                format!("{} deleted", path("/site/_posts/2019-12-31-old.md")),
                format!("{} added", path("/site/_resources/logo.svg")),
            ]
        );
    }

    #[test]
    fn test_output_wiped_until_first_success() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("_site");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("deleted-post.html"), "stale").unwrap();

        let write_pass = |keep_output: bool| -> Result<BuildReport> {
            prepare_output(&out, keep_output)?;
            std::fs::write(out.join("index.html"), "fresh")?;
            Ok(report(1))
        };

        let mut session = session();
        let result = session.handle_batch(&[], |_, keep_output| {
            assert!(!keep_output);
            Err(anyhow::anyhow!("compile failed"))
        });
        assert!(result.is_err());
        assert!(out.join("deleted-post.html").exists());

        // Initial build that succeeds: the stale page is gone
        session
            .handle_batch(&[], |_, keep_output| {
                assert!(!keep_output);
                write_pass(keep_output)
            })
            .unwrap();
        assert!(!out.join("deleted-post.html").exists());
        assert!(out.join("index.html").is_file());

        // Later passes keep the tree
        std::fs::write(out.join("extra.html"), "kept").unwrap();
        let posts = [event(ChangeKind::Updated, "/site/_posts/a.md")];
        session
            .handle_batch(&posts, |_, keep_output| {
                assert!(keep_output);
                write_pass(keep_output)
            })
            .unwrap();
        assert!(out.join("extra.html").exists());
    }

    #[test]
    fn test_invalidates_cache() {
        let session = session();
        assert!(session.invalidates_cache(&[event(ChangeKind::Updated, "/site/_layouts/Post.elm")]));
        assert!(session.invalidates_cache(&[event(ChangeKind::Updated, "/site/config.json")]));
        assert!(session.invalidates_cache(&[event(ChangeKind::Updated, "/site/elm.json")]));
        assert!(!session.invalidates_cache(&[event(ChangeKind::Updated, "/site/_posts/a.md")]));
    }

    #[test]
    fn test_failed_pass_keeps_cache() {
        let mut session = session();
        session.handle_batch(&[], |_, _| Ok(report(1))).unwrap();
        assert_eq!(session.state(), WatchState::Idle);
        assert_eq!(session.cache().len(), 1);

        let posts = [event(ChangeKind::Updated, "/site/_posts/a.md")];
        let result = session.handle_batch(&posts, |cache, _| {
            assert_eq!(cache.len(), 1);
            Err(anyhow::anyhow!("render failed"))
        });
        assert!(result.is_err());
        assert_eq!(session.state(), WatchState::ErrorIdle);
        assert_eq!(session.cache().len(), 1);

        session.handle_batch(&posts, |_, _| Ok(report(2))).unwrap();
        assert_eq!(session.state(), WatchState::Idle);
        assert_eq!(session.cache().len(), 2);
    }

    #[test]
    fn test_layout_change_seeds_empty_cache() {
        let mut session = session();
        session.handle_batch(&[], |_, _| Ok(report(1))).unwrap();

        let layouts = [event(ChangeKind::Updated, "/site/_layouts/Page.elm")];
        let result = session.handle_batch(&layouts, |cache, _| {
            assert!(cache.is_empty());
            Err(anyhow::anyhow!("compile failed"))
        });
        assert!(result.is_err());
        assert!(session.cache().is_empty());
    }

    #[test]
    fn test_watched_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("_posts")).unwrap();
        std::fs::write(dir.path().join("config.json"), "{}").unwrap();
        let config = SiteConfig::default().with_root(dir.path());

        let paths: Vec<_> = watched_paths(&config).into_iter().map(|(path, _)| path).collect();
        assert_eq!(paths, vec![config.posts_dir.clone(), config.config_path.clone()]);
    }
}
