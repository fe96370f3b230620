//! Storage layer: the pass cache and the per-case run log.

pub mod csv;
pub mod jsonl;
pub mod passes;
pub mod schema;

use std::path::Path;

use crate::{JudgeError, JudgeResult};

pub use csv::{CSV_HEADERS, CsvExporter};
pub use jsonl::JsonlWriter;
pub use passes::PassCache;
pub use schema::{CaseRecord, SCHEMA_VERSION, new_run_id};

/// Create the directory `path` will be written into.
pub(crate) fn ensure_parent(path: &Path) -> JudgeResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|e| JudgeError::io(parent, e))
        }
        _ => Ok(()),
    }
}
