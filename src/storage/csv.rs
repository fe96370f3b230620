//! CSV export for case records.

use std::io::Write;
use std::path::Path;

use crate::{JudgeError, JudgeResult};

use super::ensure_parent;
use super::schema::CaseRecord;

/// CSV column headers in deterministic order.
pub const CSV_HEADERS: &[&str] = &[
    "schema_version",
    "run_id",
    "timestamp",
    "candidate",
    "program",
    "identifier",
    "status",
    "detail",
    "attempts",
    "elapsed_ms",
];

/// Exports case records with one flat row per case.
#[derive(Debug, Clone, Default)]
pub struct CsvExporter;

impl CsvExporter {
    pub fn new() -> Self {
        CsvExporter
    }

    /// Export records to a CSV file.
    pub fn export(&self, records: &[CaseRecord], output: &Path) -> JudgeResult<()> {
        ensure_parent(output)?;
        let file = std::fs::File::create(output).map_err(|e| JudgeError::io(output, e))?;
        self.export_to_writer(records, file)
    }

    /// Export records to any writer implementing Write.
    pub fn export_to_writer<W: Write>(&self, records: &[CaseRecord], writer: W) -> JudgeResult<()> {
        let csv_error = |e: csv::Error| JudgeError::Config(format!("failed to write CSV: {e}"));
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(CSV_HEADERS).map_err(csv_error)?;
        for record in records {
            csv_writer.write_record(Self::record_to_row(record)).map_err(csv_error)?;
        }
        csv_writer
            .flush()
            .map_err(|e| JudgeError::Config(format!("failed to flush CSV writer: {e}")))?;
        Ok(())
    }

    fn record_to_row(record: &CaseRecord) -> Vec<String> {
        vec![
            record.schema_version.to_string(),
            record.run_id.clone(),
            record.timestamp.clone(),
            record.candidate.clone(),
            record.program.clone(),
            record.identifier.clone().unwrap_or_default(),
            record.outcome.label().to_string(),
            record.outcome.detail().to_string(),
            record.attempts.to_string(),
            record.elapsed_ms.to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Outcome;
    use crate::storage::schema::SCHEMA_VERSION;

    #[test]
    fn test_row_per_record_with_header() {
        let records = vec![CaseRecord {
            schema_version: SCHEMA_VERSION,
            run_id: "r1".into(),
            timestamp: "2026-01-01T00:00:00Z".into(),
            candidate: "ISim".into(),
            program: "tests/beq.asm".into(),
            identifier: Some("beq.asm".into()),
            outcome: Outcome::TimedOut { message: "ISim timed out after 5 secs, see tmp/beq.asm.out".into() },
            attempts: 1,
            elapsed_ms: 5003,
        }];
        let mut buf = Vec::new();
        CsvExporter::new().export_to_writer(&records, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], CSV_HEADERS.join(","));
        assert!(lines[1].starts_with("1,r1,2026-01-01T00:00:00Z,ISim,tests/beq.asm,beq.asm,timed_out,"));
        assert!(lines[1].ends_with(",1,5003"));
    }
}
