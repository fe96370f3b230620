//! Mock candidate for testing.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::JudgeResult;
use crate::process::RunStatus;

use super::traits::{Candidate, SimulationRun};

type Behavior = dyn Fn(&SimulationRun<'_>) -> JudgeResult<RunStatus> + Send + Sync;

/// Candidate whose runs are answered by a closure.
pub struct MockCandidate {
    name: String,
    behavior: Box<Behavior>,
    runs: AtomicUsize,
    stops: AtomicUsize,
}

impl MockCandidate {
    pub fn new(
        name: impl Into<String>,
        behavior: impl Fn(&SimulationRun<'_>) -> JudgeResult<RunStatus> + Send + Sync + 'static,
    ) -> Self {
        MockCandidate {
            name: name.into(),
            behavior: Box::new(behavior),
            runs: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        }
    }

    /// Candidate that writes `trace` for every program.
    pub fn with_trace(name: impl Into<String>, trace: impl Into<String>) -> Self {
        let trace = trace.into();
        Self::new(name, move |run| {
            std::fs::write(run.out, &trace).map_err(|e| crate::JudgeError::io(run.out, e))?;
            Ok(RunStatus::Completed)
        })
    }

    /// Candidate that echoes the program image back as its trace.
    pub fn echo(name: impl Into<String>) -> Self {
        Self::new(name, |run| {
            std::fs::copy(run.hex, run.out).map_err(|e| crate::JudgeError::io(run.out, e))?;
            Ok(RunStatus::Completed)
        })
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MockCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCandidate")
            .field("name", &self.name)
            .field("runs", &self.runs())
            .finish()
    }
}

impl Candidate for MockCandidate {
    fn name(&self) -> &str {
        &self.name
    }

    fn simulate(&self, run: &SimulationRun<'_>) -> JudgeResult<RunStatus> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        (self.behavior)(run)
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}
