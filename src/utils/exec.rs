//! External command execution utilities.
//!
//! Provides the `exec!` macro and helpers for running the layout compiler,
//! the renderer and post-process shell commands.

use crate::error::{BuildError, BuildResult};
use crate::log;
use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use std::{
    ffi::OsString,
    io::Write,
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Output, Stdio},
    sync::OnceLock,
    thread,
};

// ============================================================================
// Macros
// ============================================================================

/// Run an external command with arguments, feeding `input` to its stdin.
///
/// # Examples
/// ```ignore
/// let output = exec!(stdin=flags.as_bytes(); root; &renderer; harness, script, "Page")?;
/// ```
#[macro_export]
macro_rules! exec {
    (stdin=$input:expr; $root:expr; $cmd:expr; $($arg:expr),* $(,)?) => {
        $crate::utils::exec::exec(
            $root,
            &$crate::utils::exec::internal::to_cmd_vec($cmd),
            &$crate::utils::exec::internal::filter_args(&[$($crate::utils::exec::internal::to_os($arg)),*]),
            $input,
        )
    };
}

// ============================================================================
// Argument Conversion
// ============================================================================

#[doc(hidden)]
pub mod internal {
    use std::ffi::OsString;

    #[inline]
    pub fn to_os<S: Into<OsString>>(s: S) -> OsString {
        s.into()
    }

    pub trait ToCmd {
        fn to_cmd(self) -> Vec<OsString>;
    }

    impl<const N: usize> ToCmd for &[&str; N] {
        #[inline]
        fn to_cmd(self) -> Vec<OsString> {
            self.iter().map(OsString::from).collect()
        }
    }

    impl ToCmd for &Vec<String> {
        #[inline]
        fn to_cmd(self) -> Vec<OsString> {
            self.iter().map(OsString::from).collect()
        }
    }

    impl ToCmd for &Vec<OsString> {
        #[inline]
        fn to_cmd(self) -> Vec<OsString> {
            self.clone()
        }
    }

    #[inline]
    pub fn to_cmd_vec<C: ToCmd>(cmd: C) -> Vec<OsString> {
        cmd.to_cmd()
    }

    /// Filter out empty args.
    #[inline]
    pub fn filter_args(args: &[OsString]) -> Vec<OsString> {
        args.iter().filter(|a| !a.is_empty()).cloned().collect()
    }
}

// ============================================================================
// Command Execution
// ============================================================================

/// Execute a command, feeding `input` to its stdin, and capture its output.
///
/// Stdin is written from a scoped thread so a child that streams output
/// while still reading cannot deadlock on a full pipe.
///
/// # Errors
/// Returns error if the command cannot be spawned or exits non-zero.
pub fn exec(root: &Path, cmd: &[OsString], args: &[OsString], input: &[u8]) -> Result<Output> {
    let (name, mut command) = prepare(root, cmd, args)?;

    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to spawn `{name}`"))?;

    let mut stdin = child.stdin.take().context("Failed to acquire stdin")?;
    let output = thread::scope(|scope| {
        let writer = scope.spawn(move || stdin.write_all(input));
        let output = child.wait_with_output();
        // A child that exits without reading stdin closes the pipe early; its
        // exit status decides the outcome, not the broken pipe.
        let _ = writer.join();
        output
    })
    .with_context(|| format!("Failed to wait for `{name}`"))?;

    log_output(&name, &output, &EMPTY_FILTER)?;
    Ok(output)
}

/// Execute a command sharing this process's stdio and return its exit status.
pub fn exec_inherited(root: &Path, cmd: &[OsString], args: &[OsString]) -> Result<ExitStatus> {
    let (name, mut command) = prepare(root, cmd, args)?;
    command
        .status()
        .with_context(|| format!("Failed to execute `{name}`"))
}

/// Run a command line through the platform shell from `root`.
pub fn exec_shell(root: &Path, command_line: &str) -> Result<ExitStatus> {
    let (shell, flag) = if cfg!(windows) { ("cmd", "/C") } else { ("sh", "-c") };
    Command::new(shell)
        .arg(flag)
        .arg(command_line)
        .current_dir(root)
        .status()
        .with_context(|| format!("Failed to run `{command_line}`"))
}

/// Locate an executable, either a bare name looked up on `PATH` or a path.
pub fn resolve_tool(tool: &str) -> BuildResult<PathBuf> {
    which::which(tool).map_err(|_| BuildError::ToolNotFound {
        tool: tool.to_owned(),
    })
}

fn prepare(root: &Path, cmd: &[OsString], args: &[OsString]) -> Result<(String, Command)> {
    let name = cmd
        .first()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("Empty command"))?
        .to_owned();

    let mut command = Command::new(&cmd[0]);
    command.args(&cmd[1..]).args(args).current_dir(root);

    Ok((name, command))
}

// ============================================================================
// Output Filtering
// ============================================================================

fn strip_ansi(s: &str) -> std::borrow::Cow<'_, str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());
    re.replace_all(s, "")
}

/// Filter rule for skipping output lines by prefix.
pub struct FilterRule {
    pub skip_prefixes: &'static [&'static str],
}

impl FilterRule {
    pub const fn new(skip_prefixes: &'static [&'static str]) -> Self {
        Self { skip_prefixes }
    }

    fn should_skip(&self, output: &str) -> bool {
        output.is_empty() || self.skip_prefixes.iter().any(|p| output.starts_with(p))
    }

    fn log(&self, name: &str, output: &str) {
        let lines: Vec<_> = output
            .lines()
            .filter(|line| !self.should_skip(strip_ansi(line).trim()))
            .collect();

        if !lines.is_empty() {
            log!(name; "{}", lines.join("\n"));
        }
    }
}

/// Stdout filter: skip HTML and JSON output.
const STDOUT_FILTER: FilterRule = FilterRule::new(&["<!DOCTYPE", "<!doctype", "{"]);

/// Empty filter (no skipping).
pub const EMPTY_FILTER: FilterRule = FilterRule::new(&[]);

fn log_output(name: &str, output: &Output, filter: &FilterRule) -> Result<()> {
    if !output.status.success() {
        bail!(format_error(name, output));
    }

    // On success, only log stderr (warnings) to reduce noise
    let stderr = String::from_utf8_lossy(&output.stderr);
    filter.log(name, stderr.trim());

    Ok(())
}

fn format_error(name: &str, output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);

    let mut msg = format!("Command `{name}` failed with {}", output.status);
    let stderr = strip_ansi(stderr.trim()).into_owned();
    if !stderr.is_empty() {
        msg.push('\n');
        msg.push_str(&stderr);
    }

    let stdout_trimmed = stdout.trim();
    if !stdout_trimmed.is_empty() && !STDOUT_FILTER.should_skip(stdout_trimmed) {
        msg.push_str("\nStdout:\n");
        msg.push_str(stdout_trimmed);
    }
    msg
}
