//! JSON Lines run log: one `CaseRecord` per line, appended as cases finish.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::{JudgeError, JudgeResult};

use super::ensure_parent;
use super::schema::{CaseRecord, SCHEMA_VERSION};

/// Appends case records to a log shared by every run.
#[derive(Debug, Clone)]
pub struct JsonlWriter {
    path: PathBuf,
}

impl JsonlWriter {
    /// The file is created on first append.
    pub fn new(path: impl AsRef<Path>) -> Self {
        JsonlWriter { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. Records of another schema version are refused so a
    /// log never mixes layouts.
    pub fn append(&self, record: &CaseRecord) -> JudgeResult<()> {
        if record.schema_version != SCHEMA_VERSION {
            return Err(JudgeError::Config(format!(
                "record has schema v{}, log expects v{SCHEMA_VERSION}",
                record.schema_version
            )));
        }
        ensure_parent(&self.path)?;

        let mut line = serde_json::to_string(record)
            .map_err(|e| JudgeError::Config(format!("cannot encode record for {}: {e}", record.program)))?;
        line.push('\n');
        // single write per record; workers append concurrently
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(line.as_bytes()))
            .map_err(|e| JudgeError::io(&self.path, e))
    }

    /// Non-blank lines with their 0-based line numbers. A line that cannot be
    /// read is an error naming its line number, not the end of the log.
    fn lines(&self) -> JudgeResult<impl Iterator<Item = JudgeResult<(usize, String)>> + '_> {
        let file = std::fs::File::open(&self.path).map_err(|e| JudgeError::io(&self.path, e))?;
        Ok(BufReader::new(file).lines().enumerate().filter_map(|(index, line)| match line {
            Ok(l) if l.trim().is_empty() => None,
            Ok(l) => Some(Ok((index, l))),
            Err(e) => Some(Err(JudgeError::io(
                &self.path,
                std::io::Error::new(e.kind(), format!("line {}: {e}", index + 1)),
            ))),
        }))
    }

    /// Every record in the log, or only those of `run_id`.
    pub fn read_all(&self, run_id: Option<&str>) -> JudgeResult<Vec<CaseRecord>> {
        let mut records = Vec::new();
        for line in self.lines()? {
            let (index, line) = line?;
            let record: CaseRecord = serde_json::from_str(&line).map_err(|e| {
                JudgeError::Config(format!("{} line {}: {e}", self.path.display(), index + 1))
            })?;
            if run_id.is_none_or(|id| record.run_id == id) {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Number of records, 0 before the first append.
    pub fn count(&self) -> JudgeResult<usize> {
        if !self.path.exists() {
            return Ok(0);
        }
        self.lines()?.try_fold(0, |n, line| line.map(|_| n + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Outcome;

    fn record(run_id: &str, program: &str) -> CaseRecord {
        CaseRecord {
            schema_version: SCHEMA_VERSION,
            run_id: run_id.into(),
            timestamp: "2026-01-01T00:00:00Z".into(),
            candidate: "Logisim".into(),
            program: program.into(),
            identifier: None,
            outcome: Outcome::Passed,
            attempts: 1,
            elapsed_ms: 5,
        }
    }

    #[test]
    fn test_other_schema_refused() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlWriter::new(dir.path().join("runs.jsonl"));
        let mut r = record("r1", "a.asm");
        r.schema_version = 999;
        let err = log.append(&r).unwrap_err();
        assert!(err.to_string().contains("schema v999"));
        assert_eq!(log.count().unwrap(), 0);
    }

    #[test]
    fn test_filter_by_run() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlWriter::new(dir.path().join("logs").join("runs.jsonl"));
        assert_eq!(log.count().unwrap(), 0);
        log.append(&record("r1", "a.asm")).unwrap();
        log.append(&record("r2", "b.asm")).unwrap();
        log.append(&record("r1", "c.asm")).unwrap();

        assert_eq!(log.count().unwrap(), 3);
        assert_eq!(log.read_all(None).unwrap().len(), 3);
        let programs: Vec<_> = log.read_all(Some("r1")).unwrap().into_iter().map(|r| r.program).collect();
        assert_eq!(programs, ["a.asm", "c.asm"]);
    }

    #[test]
    fn test_corrupt_line_named() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.jsonl");
        let log = JsonlWriter::new(&path);
        log.append(&record("r1", "a.asm")).unwrap();
        std::fs::OpenOptions::new().append(true).open(&path).unwrap().write_all(b"{oops\n").unwrap();
        let err = log.read_all(None).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_unreadable_line_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.jsonl");
        let log = JsonlWriter::new(&path);
        log.append(&record("r1", "a.asm")).unwrap();
        std::fs::OpenOptions::new().append(true).open(&path).unwrap().write_all(b"\xff\xfe\n").unwrap();
        log.append(&record("r1", "c.asm")).unwrap();

        let err = log.read_all(None).unwrap_err();
        assert!(matches!(err, JudgeError::Io { .. }));
        assert!(err.to_string().contains("line 2"), "{err}");
        assert!(log.count().is_err());
    }
}
