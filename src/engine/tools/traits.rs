//! Candidate trait shared by every simulator adapter.

use std::path::{Path, PathBuf};

use crate::JudgeResult;
use crate::process::RunStatus;

/// Files one candidate run works with.
#[derive(Debug, Clone, Copy)]
pub struct SimulationRun<'a> {
    /// Program image to load, already extended with any appendix
    pub hex: &'a Path,
    /// Worker scratch directory
    pub slot: &'a Path,
    /// Trace sink
    pub out: &'a Path,
}

/// A design under test (or, in duet mode, the trusted design it is compared
/// against).
pub trait Candidate: Send + Sync {
    /// Name used in messages
    fn name(&self) -> &str;

    /// Where this candidate expects the program image for `identifier`.
    fn hex_path(&self, slot: &Path, identifier: &str) -> PathBuf {
        slot.join(format!("{identifier}.hex"))
    }

    /// Where this candidate expects the exception handler image.
    fn handler_hex_path(&self, slot: &Path, identifier: &str) -> PathBuf {
        slot.join(format!("{identifier}-h.hex"))
    }

    /// Run the program image and write the trace to `run.out`.
    fn simulate(&self, run: &SimulationRun<'_>) -> JudgeResult<RunStatus>;

    /// Kill anything this candidate may have left running.
    fn stop(&self) {}
}
