//! Cache of programs that already passed.
//!
//! Stored as a plain JSON array of paths so it can be edited by hand.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use tracing::{debug, warn};

use crate::{JudgeError, JudgeResult};

#[derive(Debug)]
pub struct PassCache {
    path: PathBuf,
    entries: Mutex<Vec<String>>,
    changed: AtomicBool,
}

impl PassCache {
    /// Load the cache at `path`. A missing or unreadable file starts an empty
    /// cache.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<Vec<String>>(&text).unwrap_or_else(|e| {
                warn!("ignoring malformed pass cache {}: {e}", path.display());
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };
        debug!(path = %path.display(), entries = entries.len(), "loaded pass cache");
        PassCache { path, entries: Mutex::new(entries), changed: AtomicBool::new(false) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|e| e == entry)
    }

    pub fn append(&self, entry: impl Into<String>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.into());
        self.changed.store(true, Ordering::SeqCst);
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the cache back if anything was appended since the last save.
    pub fn save(&self) -> JudgeResult<()> {
        if !self.changed.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let entries = self.entries();
        let mut buf = Vec::new();
        let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
        entries
            .serialize(&mut ser)
            .map_err(|e| JudgeError::Config(format!("failed to serialize pass cache: {e}")))?;
        super::ensure_parent(&self.path)?;
        std::fs::write(&self.path, buf).map_err(|e| JudgeError::io(&self.path, e))?;
        debug!(path = %self.path.display(), entries = entries.len(), "saved pass cache");
        Ok(())
    }
}
