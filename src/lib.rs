pub mod cases;
pub mod config;
pub mod decode_cmd;
pub mod diff;
pub mod engine;
pub mod image;
pub mod judge_cmd;
pub mod process;
pub mod run_cmd;
pub mod storage;
pub mod trace;

use std::path::PathBuf;

use thiserror::Error;

/// Every way a case (or the harness around it) can fail.
///
/// The first group are verification failures: they are caught per case by the
/// scheduler and turned into an outcome. The last group are defects of the
/// harness itself and propagate to the caller.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("invalid output ({reason}): {line}")]
    Decode { line: String, reason: String },

    #[error("{tool} reported {message}")]
    ToolReported { tool: String, message: String },

    #[error("{tool} found nothing to dump: {message}")]
    SegmentNotFound { tool: String, message: String },

    #[error("{message} in {}", path.display())]
    Structural { path: PathBuf, message: String },

    #[error("too many instructions ({count}) for rom addr width {addr_width}")]
    Capacity { count: usize, addr_width: u32 },

    #[error("{tool} timed out after {secs} secs{}", render_sink(sink))]
    Timeout {
        tool: String,
        secs: f64,
        sink: Option<PathBuf>,
        permitted: bool,
    },

    #[error("{tool} subprocess returned {}{}", render_code(*code), render_hint(hint))]
    ProcessExit {
        tool: String,
        code: Option<i32>,
        hint: Option<String>,
    },

    #[error("output differs, see {}, {}, and {} for diff logs", out.display(), ans.display(), log.display())]
    InconsistentResults {
        out: PathBuf,
        ans: PathBuf,
        log: PathBuf,
    },

    #[error("identifier {identifier} still collides after hash and random suffixes")]
    NamingConflict { identifier: String },

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Config(String),

    #[error("worker {worker} panicked: {message}")]
    WorkerPanicked { worker: usize, message: String },
}

pub type JudgeResult<T> = Result<T, JudgeError>;

impl JudgeError {
    /// Short kind name printed next to a failing case.
    pub fn kind(&self) -> &'static str {
        match self {
            JudgeError::Decode { .. } => "DecodeError",
            JudgeError::ToolReported { .. } => "ToolReportedError",
            JudgeError::SegmentNotFound { .. } => "SegmentNotFound",
            JudgeError::Structural { .. } => "StructuralError",
            JudgeError::Capacity { .. } => "CapacityError",
            JudgeError::Timeout { .. } => "TimeoutError",
            JudgeError::ProcessExit { .. } => "ProcessExitError",
            JudgeError::InconsistentResults { .. } => "InconsistentResults",
            JudgeError::NamingConflict { .. } => "NamingConflict",
            JudgeError::Io { .. } => "IoError",
            JudgeError::Config(_) => "ConfigError",
            JudgeError::WorkerPanicked { .. } => "WorkerPanicked",
        }
    }

    /// True for failures that belong to a single case rather than the harness.
    pub fn is_verification_failure(&self) -> bool {
        !matches!(
            self,
            JudgeError::Io { .. } | JudgeError::Config(_) | JudgeError::WorkerPanicked { .. }
        )
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        JudgeError::Io {
            path: path.into(),
            source,
        }
    }
}

fn render_sink(sink: &Option<PathBuf>) -> String {
    match sink {
        Some(p) => format!(", see {}", p.display()),
        None => String::new(),
    }
}

fn render_code(code: Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "no exit code".to_string(),
    }
}

fn render_hint(hint: &Option<String>) -> String {
    match hint {
        Some(h) if !h.is_empty() => format!(", {h}"),
        _ => String::new(),
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha256::digest;
    digest(bytes)
}

/// First ten hex digits of the SHA-256 of `bytes`, used to tag derived files.
pub fn short_hash(bytes: &[u8]) -> String {
    let mut h = sha256_hex(bytes);
    h.truncate(10);
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display_names_sink() {
        let err = JudgeError::Timeout {
            tool: "Logisim".into(),
            secs: 3.0,
            sink: Some(PathBuf::from("tmp/add.asm.out")),
            permitted: false,
        };
        assert_eq!(err.to_string(), "Logisim timed out after 3 secs, see tmp/add.asm.out");
    }

    #[test]
    fn test_process_exit_display_with_hint() {
        let err = JudgeError::ProcessExit {
            tool: "ISim".into(),
            code: Some(2),
            hint: Some("maybe ISE path is incorrect".into()),
        };
        assert_eq!(
            err.to_string(),
            "ISim subprocess returned 2, maybe ISE path is incorrect"
        );
    }

    #[test]
    fn test_verification_failure_classification() {
        assert!(JudgeError::Capacity { count: 9, addr_width: 3 }.is_verification_failure());
        assert!(!JudgeError::Config("bad".into()).is_verification_failure());
        assert!(
            !JudgeError::WorkerPanicked { worker: 0, message: "boom".into() }
                .is_verification_failure()
        );
    }

    #[test]
    fn test_short_hash_is_ten_hex_digits() {
        let h = short_hash(b"3c080000\n");
        assert_eq!(h.len(), 10);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(h, short_hash(b"3c080000\n"));
    }
}
