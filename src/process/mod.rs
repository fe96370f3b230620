//! Running external tools.
//!
//! Every simulator, assembler and diff tool the judge drives goes through
//! `ProcessRunner`: stdout is streamed line by line through a
//! `LineClassifier`, the run is bounded by a wall-clock timeout, and the exit
//! status is turned into a `JudgeError` when it is not clean.

pub mod env;
pub mod kill;
pub mod runner;

pub use env::{ToolEnv, ToolSettings};
pub use kill::{LiveProcesses, TrackedPid, force_kill, kill_by_name};
pub use runner::{ProcessRunner, RunStatus};
