//! Logging utilities with colored output and progress bars.
//!
//! This module provides:
//! - `log!` macro for formatted terminal output with colored prefixes
//! - `verbose!` macro for per-file detail, printed only with `--verbose`
//! - `Progress` for the render stage
//!
//! # Example
//!
//! ```ignore
//! log!("build"; "compiling {} layouts", count);
//! verbose!("render"; "generating {}", path.display());
//!
//! let progress = Progress::new("render", 100);
//! progress.inc();
//! progress.finish();
//! ```

use colored::{ColoredString, Colorize};
use crossterm::{
    execute,
    terminal::{Clear, ClearType, size},
};
use std::{
    io::{IsTerminal, Write, stdout},
    sync::{
        Mutex, OnceLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

/// Cached terminal width (fetched once on first use)
static TERMINAL_WIDTH: OnceLock<u16> = OnceLock::new();

/// Set once from the CLI `--verbose` flag.
static VERBOSE: AtomicBool = AtomicBool::new(false);

// Bar line: "[render] [████░░░░] 42/100"

const MIN_BAR_WIDTH: usize = 10;
const MAX_BAR_WIDTH: usize = 40;

/// `[module] ` around a module name
#[inline]
const fn calc_prefix_len(module_len: usize) -> usize {
    module_len + 3
}

/// Get terminal width, cached after first call.
/// Falls back to 120 columns if detection fails.
fn get_terminal_width() -> u16 {
    *TERMINAL_WIDTH.get_or_init(|| size().map(|(w, _)| w).unwrap_or(120))
}

pub fn set_verbose(enabled: bool) {
    VERBOSE.store(enabled, Ordering::Relaxed);
}

#[inline]
pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

// ============================================================================
// Log Macros
// ============================================================================

/// Log a message with a colored module prefix.
///
/// # Usage
/// ```ignore
/// log!("module"; "message with {} formatting", args);
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::utils::log::log($module, &format!($($arg)*))
    }};
}

/// Like `log!`, but only printed when verbose output is enabled.
#[macro_export]
macro_rules! verbose {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::utils::log::is_verbose() {
            $crate::utils::log::log($module, &format!($($arg)*))
        }
    }};
}

// ============================================================================
// Progress
// ============================================================================

/// Single-line progress bar redrawn in place.
///
/// Silent when stdout is not a terminal or verbose output is on.
pub struct Progress {
    module: &'static str,
    total: usize,
    done: AtomicUsize,
    draw: Mutex<()>,
    enabled: bool,
}

impl Progress {
    pub fn new(module: &'static str, total: usize) -> Self {
        Self {
            module,
            total,
            done: AtomicUsize::new(0),
            draw: Mutex::new(()),
            enabled: stdout().is_terminal() && !is_verbose(),
        }
    }

    /// Count one finished item. Safe to call from worker threads.
    pub fn inc(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if self.enabled {
            self.redraw(done);
        }
    }

    fn redraw(&self, done: usize) {
        let _guard = self.draw.lock().ok();
        let count = format!("{done}/{}", self.total);
        let line = format!("{} {} {count}", colorize_prefix(self.module, self.module), self.bar(done, count.len()));

        let mut stdout = stdout().lock();
        execute!(stdout, Clear(ClearType::CurrentLine)).ok();
        write!(stdout, "\r{line}").ok();
        stdout.flush().ok();
    }

    fn bar(&self, done: usize, count_len: usize) -> String {
        let overhead = calc_prefix_len(self.module.len()) + count_len + 3;
        let width = (get_terminal_width() as usize)
            .saturating_sub(overhead)
            .clamp(MIN_BAR_WIDTH, MAX_BAR_WIDTH);
        let filled = if self.total == 0 { width } else { done.min(self.total) * width / self.total };
        format!("[{}{}]", "█".repeat(filled), "░".repeat(width - filled))
    }

    /// Erase the bar so the next log line starts clean.
    pub fn finish(&self) {
        if !self.enabled {
            return;
        }
        let _guard = self.draw.lock().ok();
        let mut stdout = stdout().lock();
        execute!(stdout, Clear(ClearType::CurrentLine)).ok();
        write!(stdout, "\r").ok();
        stdout.flush().ok();
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Log a message with a colored module prefix.
///
/// Single-line messages are truncated to the terminal width; multi-line
/// messages (error reports) are printed in full.
pub fn log(module: &str, message: &str) {
    let module_lower = module.to_ascii_lowercase();
    let prefix = colorize_prefix(module, &module_lower);
    let width = get_terminal_width() as usize;

    let max_msg_len = width.saturating_sub(calc_prefix_len(module.len()));
    let message = if message.contains('\n') {
        message
    } else {
        truncate_str(message, max_msg_len)
    };

    let mut stdout = stdout().lock();
    writeln!(stdout, "{prefix} {message}").ok();
    stdout.flush().ok();
}

#[inline]
fn colorize_prefix(module: &str, module_lower: &str) -> ColoredString {
    let prefix = format!("[{module}]");
    match module_lower {
        "watch" => prefix.bright_green().bold(),
        "error" => prefix.bright_red().bold(),
        "render" | "compile" => prefix.bright_blue().bold(),
        _ => prefix.bright_yellow().bold(),
    }
}

/// Truncate a string to fit within max_len bytes on a char boundary.
#[inline]
fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
