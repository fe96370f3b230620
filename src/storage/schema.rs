//! CaseRecord schema v1 - one line of the run log per judged case.

use serde::{Deserialize, Serialize};

use crate::engine::{CaseOutcome, Outcome};

/// Schema version for forward compatibility
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub schema_version: u32,
    /// ID of the run this case belonged to
    pub run_id: String,
    /// ISO 8601 timestamp
    pub timestamp: String,
    /// Candidate name (e.g. "Logisim", "ISim")
    pub candidate: String,
    pub program: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub attempts: u32,
    pub elapsed_ms: u64,
}

/// Identifier shared by every record of one run.
pub fn new_run_id() -> String {
    let timestamp = now_rfc3339();
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let compact: String = timestamp.chars().take(19).filter(|c| !matches!(c, ':' | '-' | 'T')).collect();
    format!("{nanos:x}-{compact}")
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

impl CaseRecord {
    pub fn from_outcome(run_id: &str, candidate: &str, outcome: &CaseOutcome) -> Self {
        CaseRecord {
            schema_version: SCHEMA_VERSION,
            run_id: run_id.to_string(),
            timestamp: now_rfc3339(),
            candidate: candidate.to_string(),
            program: outcome.path.to_string_lossy().to_string(),
            identifier: outcome.identifier.clone(),
            outcome: outcome.outcome.clone(),
            attempts: outcome.attempts,
            elapsed_ms: u64::try_from(outcome.elapsed_ms).unwrap_or(u64::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_outcome_is_flattened() {
        let outcome = CaseOutcome {
            index: 0,
            path: PathBuf::from("tests/add.asm"),
            identifier: Some("add.asm".into()),
            outcome: Outcome::Failed { kind: "InconsistentResults".into(), message: "output differs".into() },
            attempts: 1,
            elapsed_ms: 12,
        };
        let record = CaseRecord::from_outcome("run-1", "Logisim", &outcome);
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["kind"], "InconsistentResults");
        assert_eq!(json["program"], "tests/add.asm");
        assert_eq!(json["schema_version"], 1);

        let back: CaseRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_run_id_shape() {
        let id = new_run_id();
        let (_, compact) = id.split_once('-').unwrap();
        assert_eq!(compact.len(), 14);
        assert!(compact.chars().all(|c| c.is_ascii_digit()));
    }
}
