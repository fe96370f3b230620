//! Trace comparison.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use shlex::Shlex;
use tracing::{debug, warn};

use crate::{JudgeError, JudgeResult};

/// Comparison tool used when none is configured.
pub const DEFAULT_DIFF_TOOL: &str = if cfg!(windows) { "fc" } else { "diff" };

/// How strictly two traces must agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffMode {
    /// Any difference fails
    #[default]
    Exact,
    /// One trace may stop early, as long as it agrees up to that point
    Prefix,
}

/// Compares a candidate trace (`out`) against a reference trace (`ans`).
#[derive(Debug, Clone)]
pub struct Differ {
    command: Vec<String>,
    mode: DiffMode,
    keep_output_files: bool,
}

impl Default for Differ {
    fn default() -> Self {
        Differ {
            command: vec![DEFAULT_DIFF_TOOL.to_string()],
            mode: DiffMode::Exact,
            keep_output_files: false,
        }
    }
}

impl Differ {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different comparison command, given as a shell-quoted line
    /// (e.g. `"fc /b"`). The two paths are appended.
    pub fn with_command(mut self, command_line: &str) -> JudgeResult<Self> {
        let parts: Vec<String> = Shlex::new(command_line).collect();
        if parts.is_empty() {
            return Err(JudgeError::Config("empty diff command".into()));
        }
        self.command = parts;
        Ok(self)
    }

    pub fn with_mode(mut self, mode: DiffMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn keep_output_files(mut self, keep: bool) -> Self {
        self.keep_output_files = keep;
        self
    }

    pub fn mode(&self) -> DiffMode {
        self.mode
    }

    /// Compare the two trace files.
    ///
    /// On mismatch the tool's output goes to `log_path` (default
    /// `<out>.diff`) and both traces are kept for inspection. On a match both
    /// traces are removed unless the differ was told to keep them.
    pub fn compare(&self, out: &Path, ans: &Path, log_path: Option<&Path>) -> JudgeResult<()> {
        let output = Command::new(&self.command[0])
            .args(&self.command[1..])
            .arg(out)
            .arg(ans)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| JudgeError::ProcessExit {
                tool: self.command[0].clone(),
                code: None,
                hint: Some(format!("failed to run diff tool: {e}")),
            })?;

        if !output.status.success() {
            if self.mode == DiffMode::Prefix && prefix_match(out, ans)? {
                debug!(out = %out.display(), ans = %ans.display(), "accepted as prefix match");
            } else {
                let log = log_path.map(Path::to_path_buf).unwrap_or_else(|| {
                    let mut p = out.as_os_str().to_owned();
                    p.push(".diff");
                    PathBuf::from(p)
                });
                let mut body = output.stdout;
                body.push(b'\n');
                body.extend_from_slice(&output.stderr);
                std::fs::write(&log, body).map_err(|e| JudgeError::io(&log, e))?;
                return Err(JudgeError::InconsistentResults {
                    out: out.to_path_buf(),
                    ans: ans.to_path_buf(),
                    log,
                });
            }
        }

        if !self.keep_output_files {
            remove_trace(out)?;
            if ans != out {
                remove_trace(ans)?;
            }
        }
        Ok(())
    }
}

fn remove_trace(path: &Path) -> JudgeResult<()> {
    std::fs::remove_file(path).map_err(|e| JudgeError::io(path, e))
}

/// True when, after stripping trailing whitespace, one file is a prefix of
/// the other.
pub fn prefix_match(out: &Path, ans: &Path) -> JudgeResult<bool> {
    let a = std::fs::read(out).map_err(|e| JudgeError::io(out, e))?;
    let b = std::fs::read(ans).map_err(|e| JudgeError::io(ans, e))?;
    let a = String::from_utf8_lossy(&a);
    let b = String::from_utf8_lossy(&b);
    let (a, b) = (a.trim_end(), b.trim_end());
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() && !long.is_empty() {
        let empty = if a.is_empty() { out } else { ans };
        warn!("{} is empty, accepted as a prefix", empty.display());
    }
    Ok(long.starts_with(short))
}
