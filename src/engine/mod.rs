//! Engine module: runs verification cases against external tools.
//!
//! # Architecture
//!
//! - **Tools**: the reference generator (assembles programs, produces the
//!   expected trace) and candidates (simulate the design under test).
//!   Defined in `tools` - examples: `ReferenceGenerator`, `LogisimCandidate`,
//!   `ExecutableCandidate`, `MockCandidate`.
//!
//! - **Pipeline**: one case end to end. Reference trace and image, image into
//!   the candidate, candidate trace, comparison.
//!
//! - **Scheduler**: a fixed pool of workers pulling cases from one queue, each
//!   with its own scratch slot, with identifier collision handling and the
//!   retry/stop/kill policies.
//!
//! # Boundaries
//!
//! - Tools do NOT know about other cases; everything shared lives in the scheduler.
//! - The scheduler does NOT know about tools; it only sees a `CaseJudge`.

pub mod identifiers;
pub mod pipeline;
pub mod scheduler;
pub mod tools;

pub use identifiers::{IdentifierGuard, IdentifierSet};
pub use pipeline::{HandlerSource, Pipeline};
pub use scheduler::{
    CaseJudge, CaseOutcome, KILL_EXIT_CODE, Outcome, RunSummary, Scheduler, SchedulerConfig, WorkerSlot,
    default_workers,
};
pub use tools::{
    Candidate, ExecutableCandidate, ExecutableConfig, LogisimCandidate, LogisimConfig, MarsConfig, MockCandidate,
    ReferenceGenerator, SimulationRun,
};
