//! Resolving input patterns into test cases.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{JudgeError, JudgeResult};

/// One program to verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub path: PathBuf,
    /// Base name of `path`; the scheduler may extend it to keep it unique
    pub identifier: String,
}

impl TestCase {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let identifier = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        TestCase { path, identifier }
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Expand glob `patterns` into cases.
///
/// A directory (whether named directly or matched by a pattern) expands to
/// every `*.asm` file below it. Paths in `blocklist` are dropped and reported
/// to `on_omit`. A pattern that matches nothing is kept as a literal path so a
/// typo surfaces as a failing case rather than silently vanishing.
pub fn resolve_paths<S, B>(
    patterns: &[S],
    blocklist: &[B],
    mut on_omit: impl FnMut(&Path),
) -> JudgeResult<Vec<TestCase>>
where
    S: AsRef<str>,
    B: AsRef<Path>,
{
    let banned: HashSet<PathBuf> = blocklist.iter().map(|p| absolute(p.as_ref())).collect();
    let mut matched = Vec::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let paths = glob::glob(pattern)
            .map_err(|e| JudgeError::Config(format!("bad case pattern {pattern:?}: {e}")))?;
        let before = matched.len();
        for entry in paths {
            match entry {
                Ok(p) => matched.push(p),
                Err(e) => debug!("skipping unreadable match: {e}"),
            }
        }
        if matched.len() == before {
            matched.push(PathBuf::from(pattern));
        }
    }

    let mut cases = Vec::new();
    let mut push = |path: PathBuf| {
        if banned.contains(&absolute(&path)) {
            on_omit(&path);
        } else {
            cases.push(TestCase::new(path));
        }
    };
    for path in matched {
        if path.is_dir() {
            let pattern = path.join("**").join("*.asm");
            let pattern = pattern.to_string_lossy();
            let found = glob::glob(&pattern)
                .map_err(|e| JudgeError::Config(format!("bad case directory {}: {e}", path.display())))?;
            for p in found.flatten() {
                push(p);
            }
        } else {
            push(path);
        }
    }
    Ok(cases)
}
