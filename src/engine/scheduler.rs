//! Fan test cases out to a pool of worker threads.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use sysinfo::{CpuRefreshKind, RefreshKind, System};
use tracing::{debug, info, warn};

use crate::cases::TestCase;
use crate::{JudgeError, JudgeResult};

use super::identifiers::IdentifierSet;

/// Error text of a candidate simulator failing to write its temporary save
/// file. Seen with ISim under parallel load; a rerun usually succeeds.
pub const TRANSIENT_SIGNATURE: &str = "temporary save file";

/// Exit code used when `kill_on_error` ends the process.
pub const KILL_EXIT_CODE: i32 = 3;

/// Default pool size: three quarters of the logical CPUs, at least one.
pub fn default_workers() -> usize {
    let sys = System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::everything()));
    let cpus = match sys.cpus().len() {
        0 => thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        n => n,
    };
    (cpus * 3 / 4).max(1)
}

/// A worker's private scratch area.
#[derive(Debug, Clone)]
pub struct WorkerSlot {
    pub index: usize,
    /// `case0000`, `case0001`, ... under the run directory
    pub dir: PathBuf,
    /// Shared directory for trace files
    pub run_dir: PathBuf,
}

impl WorkerSlot {
    pub fn new(run_dir: &Path, index: usize) -> Self {
        WorkerSlot {
            index,
            dir: run_dir.join(format!("case{index:04}")),
            run_dir: run_dir.to_path_buf(),
        }
    }

    /// Candidate trace for the case identified by `identifier`.
    pub fn out_path(&self, identifier: &str) -> PathBuf {
        self.run_dir.join(format!("{identifier}.out"))
    }

    /// Reference trace for the case identified by `identifier`.
    pub fn ans_path(&self, identifier: &str) -> PathBuf {
        self.run_dir.join(format!("{identifier}.ans"))
    }
}

/// Judges one case. The case's identifier is already unique among running
/// cases when `judge` is called.
pub trait CaseJudge: Send + Sync {
    fn judge(&self, case: &TestCase, slot: &WorkerSlot) -> JudgeResult<()>;

    /// Kill anything still running on behalf of this judge.
    fn stop(&self) {}
}

impl<F> CaseJudge for F
where
    F: Fn(&TestCase, &WorkerSlot) -> JudgeResult<()> + Send + Sync,
{
    fn judge(&self, case: &TestCase, slot: &WorkerSlot) -> JudgeResult<()> {
        self(case, slot)
    }
}

/// What happened to one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed { kind: String, message: String },
    TimedOut { message: String },
    Skipped { reason: String },
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Passed => "passed",
            Outcome::Failed { .. } => "failed",
            Outcome::TimedOut { .. } => "timed_out",
            Outcome::Skipped { .. } => "skipped",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Outcome::Passed => "",
            Outcome::Failed { message, .. } | Outcome::TimedOut { message } => message,
            Outcome::Skipped { reason } => reason,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseOutcome {
    /// Position in the queue
    pub index: usize,
    pub path: PathBuf,
    /// Identifier the case ran under, if it got that far
    pub identifier: Option<String>,
    pub outcome: Outcome,
    pub attempts: u32,
    pub elapsed_ms: u128,
}

/// Counts per outcome, plus every outcome in queue order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub skipped: usize,
    pub outcomes: Vec<CaseOutcome>,
}

impl RunSummary {
    fn from_outcomes(mut outcomes: Vec<CaseOutcome>) -> Self {
        outcomes.sort_by_key(|o| o.index);
        let mut summary = RunSummary::default();
        for o in &outcomes {
            match o.outcome {
                Outcome::Passed => summary.passed += 1,
                Outcome::Failed { .. } => summary.failed += 1,
                Outcome::TimedOut { .. } => summary.timed_out += 1,
                Outcome::Skipped { .. } => summary.skipped += 1,
            }
        }
        summary.outcomes = outcomes;
        summary
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// True when no case failed or timed out.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.timed_out == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub workers: usize,
    /// Stop dequeuing after the first failure
    pub stop_on_error: bool,
    /// Exit the whole process after the first failure
    pub kill_on_error: bool,
    /// Record a missing dump segment as skipped rather than failed
    pub permit_missing_segment: bool,
    /// Rerun a case once after a known transient simulator failure
    pub retry_transient: bool,
    /// Where slots and trace files live
    pub run_dir: PathBuf,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            workers: default_workers(),
            stop_on_error: true,
            kill_on_error: false,
            permit_missing_segment: true,
            retry_transient: true,
            run_dir: PathBuf::from("tmp"),
        }
    }
}

impl SchedulerConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_run_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.run_dir = dir.into();
        self
    }

    pub fn stop_on_error(mut self, enabled: bool) -> Self {
        self.stop_on_error = enabled;
        self
    }

    pub fn kill_on_error(mut self, enabled: bool) -> Self {
        self.kill_on_error = enabled;
        self
    }

    pub fn permit_missing_segment(mut self, enabled: bool) -> Self {
        self.permit_missing_segment = enabled;
        self
    }

    pub fn retry_transient(mut self, enabled: bool) -> Self {
        self.retry_transient = enabled;
        self
    }
}

type PathHook<'a> = Box<dyn Fn(&Path) + Send + Sync + 'a>;
type OutcomeHook<'a> = Box<dyn Fn(&CaseOutcome) + Send + Sync + 'a>;

/// Cross-worker state for one `run`.
struct RunState {
    queue: Mutex<VecDeque<(usize, TestCase)>>,
    outcomes: Mutex<Vec<CaseOutcome>>,
    /// Passed cases so far, also serializes progress output and hooks
    progress: Mutex<usize>,
    fatal: Mutex<Option<JudgeError>>,
    identifiers: IdentifierSet,
    stop: AtomicBool,
    total: usize,
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn is_transient(err: &JudgeError) -> bool {
    err.to_string().to_lowercase().contains(TRANSIENT_SIGNATURE)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs cases through a `CaseJudge` on a fixed pool of threads.
pub struct Scheduler<'a> {
    judge: &'a dyn CaseJudge,
    config: SchedulerConfig,
    on_success: Option<PathHook<'a>>,
    on_error: Option<PathHook<'a>>,
    on_outcome: Option<OutcomeHook<'a>>,
}

impl<'a> Scheduler<'a> {
    pub fn new(judge: &'a dyn CaseJudge, config: SchedulerConfig) -> Self {
        Scheduler { judge, config, on_success: None, on_error: None, on_outcome: None }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Called with the path of every passing case.
    pub fn on_success(mut self, hook: impl Fn(&Path) + Send + Sync + 'a) -> Self {
        self.on_success = Some(Box::new(hook));
        self
    }

    /// Called with the path of every failing case.
    pub fn on_error(mut self, hook: impl Fn(&Path) + Send + Sync + 'a) -> Self {
        self.on_error = Some(Box::new(hook));
        self
    }

    /// Called with every recorded outcome, skipped cases included.
    pub fn on_outcome(mut self, hook: impl Fn(&CaseOutcome) + Send + Sync + 'a) -> Self {
        self.on_outcome = Some(Box::new(hook));
        self
    }

    /// Judge every case and return the summary.
    ///
    /// Verification failures become outcomes. Harness errors (I/O on the run
    /// directory, worker panics) stop the run at once: the failing case is
    /// still recorded, and the error is returned once every worker has been
    /// joined.
    pub fn run(&self, cases: Vec<TestCase>) -> JudgeResult<RunSummary> {
        let total = cases.len();
        std::fs::create_dir_all(&self.config.run_dir)
            .map_err(|e| JudgeError::io(&self.config.run_dir, e))?;

        let state = RunState {
            queue: Mutex::new(cases.into_iter().enumerate().collect()),
            outcomes: Mutex::new(Vec::with_capacity(total)),
            progress: Mutex::new(0),
            fatal: Mutex::new(None),
            identifiers: IdentifierSet::new(),
            stop: AtomicBool::new(false),
            total,
        };
        let workers = self.config.workers.clamp(1, total.max(1));
        info!(cases = total, workers, run_dir = %self.config.run_dir.display(), "starting run");

        let mut panicked = None;
        thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|index| {
                    let state = &state;
                    thread::Builder::new()
                        .name(format!("judge-worker-{index}"))
                        .spawn_scoped(scope, move || self.worker(index, state))
                })
                .collect();
            for (index, handle) in handles.into_iter().enumerate() {
                match handle {
                    Ok(h) => {
                        if let Err(payload) = h.join() {
                            state.stop.store(true, Ordering::SeqCst);
                            panicked.get_or_insert(JudgeError::WorkerPanicked {
                                worker: index,
                                message: panic_message(payload.as_ref()),
                            });
                        }
                    }
                    Err(e) => {
                        state.stop.store(true, Ordering::SeqCst);
                        lock(&state.fatal).get_or_insert(JudgeError::Config(format!(
                            "cannot start worker {index}: {e}"
                        )));
                    }
                }
            }
        });

        if let Some(err) = panicked {
            return Err(err);
        }
        if let Some(err) = lock(&state.fatal).take() {
            return Err(err);
        }

        let leftover: Vec<_> = lock(&state.queue).drain(..).collect();
        for (index, case) in leftover {
            self.record(
                &state,
                CaseOutcome {
                    index,
                    path: case.path,
                    identifier: None,
                    outcome: Outcome::Skipped { reason: "run stopped".to_string() },
                    attempts: 0,
                    elapsed_ms: 0,
                },
            );
        }

        let outcomes = std::mem::take(&mut *lock(&state.outcomes));
        let summary = RunSummary::from_outcomes(outcomes);
        info!(
            passed = summary.passed,
            failed = summary.failed,
            timed_out = summary.timed_out,
            skipped = summary.skipped,
            "run finished"
        );
        Ok(summary)
    }

    fn worker(&self, index: usize, state: &RunState) {
        let slot = WorkerSlot::new(&self.config.run_dir, index);
        if let Err(e) = std::fs::create_dir_all(&slot.dir) {
            self.raise_fatal(state, JudgeError::io(&slot.dir, e));
            return;
        }
        debug!(worker = index, slot = %slot.dir.display(), "worker started");

        loop {
            if state.stop.load(Ordering::SeqCst) {
                break;
            }
            let Some((queue_index, case)) = lock(&state.queue).pop_front() else {
                break;
            };
            let started = Instant::now();
            let judged = panic::catch_unwind(AssertUnwindSafe(|| self.judge_case(state, &case, &slot)));
            let (identifier, attempts, result) = judged.unwrap_or_else(|payload| {
                let err = JudgeError::WorkerPanicked { worker: index, message: panic_message(payload.as_ref()) };
                (None, 1, Err(err))
            });
            let elapsed_ms = started.elapsed().as_millis();

            let outcome = match result {
                Ok(()) => Outcome::Passed,
                Err(e) if !e.is_verification_failure() => {
                    eprintln!("!! {}: {} {}", case.path.display(), e.kind(), e);
                    let outcome = Outcome::Failed { kind: e.kind().to_string(), message: e.to_string() };
                    self.raise_fatal(state, e);
                    self.record(
                        state,
                        CaseOutcome { index: queue_index, path: case.path, identifier, outcome, attempts, elapsed_ms },
                    );
                    break;
                }
                Err(e) => self.classify_failure(state, &case, e),
            };
            self.record(
                state,
                CaseOutcome { index: queue_index, path: case.path, identifier, outcome, attempts, elapsed_ms },
            );
        }
    }

    /// Claim an identifier and judge the case, retrying once on a transient
    /// simulator failure.
    fn judge_case(
        &self,
        state: &RunState,
        case: &TestCase,
        slot: &WorkerSlot,
    ) -> (Option<String>, u32, JudgeResult<()>) {
        let guard = match state.identifiers.claim(case) {
            Ok(g) => g,
            Err(e) => return (None, 0, Err(e)),
        };
        let resolved = TestCase { path: case.path.clone(), identifier: guard.identifier().to_string() };

        let mut attempts = 0;
        let result = loop {
            attempts += 1;
            match self.judge.judge(&resolved, slot) {
                Err(e) if self.config.retry_transient && attempts == 1 && is_transient(&e) => {
                    warn!(case = %case.path.display(), "transient failure, retrying: {e}");
                }
                r => break r,
            }
        };
        (Some(resolved.identifier), attempts, result)
    }

    fn classify_failure(&self, state: &RunState, case: &TestCase, err: JudgeError) -> Outcome {
        eprintln!("!! {}: {} {}", case.path.display(), err.kind(), err);
        if matches!(err, JudgeError::SegmentNotFound { .. }) && self.config.permit_missing_segment {
            eprintln!("!! Permitted");
            return Outcome::Skipped { reason: err.to_string() };
        }

        {
            let _serial = lock(&state.progress);
            if let Some(hook) = &self.on_error {
                hook(&case.path);
            }
        }
        if self.config.kill_on_error {
            warn!("kill on error, exiting");
            self.judge.stop();
            std::process::exit(KILL_EXIT_CODE);
        }
        if self.config.stop_on_error && !state.stop.swap(true, Ordering::SeqCst) {
            info!("stopping after failure of {}", case.path.display());
            self.judge.stop();
        }

        match err {
            JudgeError::Timeout { .. } => Outcome::TimedOut { message: err.to_string() },
            other => Outcome::Failed { kind: other.kind().to_string(), message: other.to_string() },
        }
    }

    fn record(&self, state: &RunState, outcome: CaseOutcome) {
        {
            let mut passed = lock(&state.progress);
            if outcome.outcome == Outcome::Passed {
                *passed += 1;
                eprintln!("{}/{} {} ok", *passed, state.total, outcome.path.display());
                if let Some(hook) = &self.on_success {
                    hook(&outcome.path);
                }
            }
            if let Some(hook) = &self.on_outcome {
                hook(&outcome);
            }
        }
        debug!(case = %outcome.path.display(), outcome = outcome.outcome.label(), "recorded");
        lock(&state.outcomes).push(outcome);
    }

    fn raise_fatal(&self, state: &RunState, err: JudgeError) {
        state.stop.store(true, Ordering::SeqCst);
        lock(&state.fatal).get_or_insert(err);
        self.judge.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn cases(n: usize) -> Vec<TestCase> {
        (0..n).map(|i| TestCase::new(format!("progs/p{i}.asm"))).collect()
    }

    fn config(dir: &Path, workers: usize) -> SchedulerConfig {
        SchedulerConfig::default().with_workers(workers).with_run_dir(dir)
    }

    #[test]
    fn test_every_case_gets_an_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let judge = |case: &TestCase, _: &WorkerSlot| -> JudgeResult<()> {
            if case.identifier.ends_with("3.asm") {
                Err(JudgeError::ToolReported { tool: "MARS".into(), message: "Error".into() })
            } else {
                Ok(())
            }
        };
        let summary = Scheduler::new(&judge, config(dir.path(), 4).stop_on_error(false))
            .run(cases(20))
            .unwrap();
        assert_eq!(summary.total(), 20);
        assert_eq!(summary.passed, 18);
        assert_eq!(summary.failed, 2);
        assert!(!summary.is_success());
        let order: Vec<_> = summary.outcomes.iter().map(|o| o.index).collect();
        assert_eq!(order, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_stop_on_error_skips_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let judge = |case: &TestCase, _: &WorkerSlot| -> JudgeResult<()> {
            if case.identifier == "p0.asm" {
                Err(JudgeError::Capacity { count: 2048, addr_width: 10 })
            } else {
                Ok(())
            }
        };
        let summary = Scheduler::new(&judge, config(dir.path(), 1)).run(cases(5)).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 4);
        assert_eq!(summary.passed, 0);
        assert_eq!(summary.total(), 5);
    }

    #[test]
    fn test_stop_hook_called_once() {
        struct Stopper(AtomicUsize);
        impl CaseJudge for Stopper {
            fn judge(&self, _: &TestCase, _: &WorkerSlot) -> JudgeResult<()> {
                Err(JudgeError::Decode { line: "2".into(), reason: "found 2".into() })
            }
            fn stop(&self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        let dir = tempfile::tempdir().unwrap();
        let judge = Stopper(AtomicUsize::new(0));
        let summary = Scheduler::new(&judge, config(dir.path(), 2)).run(cases(6)).unwrap();
        assert_eq!(judge.0.load(Ordering::SeqCst), 1);
        assert_eq!(summary.total(), 6);
    }

    #[test]
    fn test_missing_segment_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let judge = |_: &TestCase, _: &WorkerSlot| -> JudgeResult<()> {
            Err(JudgeError::SegmentNotFound { tool: "MARS".into(), message: "nothing to dump".into() })
        };
        let summary = Scheduler::new(&judge, config(dir.path(), 2)).run(cases(3)).unwrap();
        assert_eq!(summary.skipped, 3);
        assert!(summary.is_success());

        let strict = config(dir.path(), 2).permit_missing_segment(false).stop_on_error(false);
        let summary = Scheduler::new(&judge, strict).run(cases(3)).unwrap();
        assert_eq!(summary.failed, 3);
    }

    #[test]
    fn test_timeout_counted_separately() {
        let dir = tempfile::tempdir().unwrap();
        let judge = |_: &TestCase, _: &WorkerSlot| -> JudgeResult<()> {
            Err(JudgeError::Timeout { tool: "Logisim".into(), secs: 3.0, sink: None, permitted: false })
        };
        let summary = Scheduler::new(&judge, config(dir.path(), 1).stop_on_error(false))
            .run(cases(2))
            .unwrap();
        assert_eq!(summary.timed_out, 2);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_transient_failure_retried_once() {
        let dir = tempfile::tempdir().unwrap();
        let calls = AtomicUsize::new(0);
        let judge = |_: &TestCase, _: &WorkerSlot| -> JudgeResult<()> {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(JudgeError::ToolReported {
                    tool: "ISim".into(),
                    message: "ERROR: Failed to write Temporary Save File".into(),
                })
            } else {
                Ok(())
            }
        };
        let summary = Scheduler::new(&judge, config(dir.path(), 1)).run(cases(1)).unwrap();
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.outcomes[0].attempts, 2);
    }

    #[test]
    fn test_persistent_transient_failure_not_retried_twice() {
        let dir = tempfile::tempdir().unwrap();
        let calls = AtomicUsize::new(0);
        let judge = |_: &TestCase, _: &WorkerSlot| -> JudgeResult<()> {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(JudgeError::ToolReported { tool: "ISim".into(), message: "temporary save file".into() })
        };
        let summary = Scheduler::new(&judge, config(dir.path(), 1)).run(cases(1)).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_same_base_name_cases_use_distinct_traces() {
        let dir = tempfile::tempdir().unwrap();
        let progs = dir.path().join("progs");
        for sub in ["a", "b", "c"] {
            std::fs::create_dir_all(progs.join(sub)).unwrap();
            std::fs::write(progs.join(sub).join("add.asm"), format!("# {sub}\n")).unwrap();
        }
        let seen = Mutex::new(Vec::new());
        let judge = |case: &TestCase, slot: &WorkerSlot| -> JudgeResult<()> {
            let out = slot.out_path(&case.identifier);
            // a collision would find the file already there
            assert!(!out.exists());
            std::fs::write(&out, "x").unwrap();
            std::thread::sleep(std::time::Duration::from_millis(50));
            std::fs::remove_file(&out).unwrap();
            seen.lock().unwrap().push(case.identifier.clone());
            Ok(())
        };
        let cases: Vec<_> = ["a", "b", "c"].iter().map(|s| TestCase::new(progs.join(s).join("add.asm"))).collect();
        let summary = Scheduler::new(&judge, config(&dir.path().join("run"), 3)).run(cases).unwrap();
        assert_eq!(summary.passed, 3);
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_worker_panic_surfaces_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let judge = |_: &TestCase, _: &WorkerSlot| -> JudgeResult<()> { panic!("simulator adapter bug") };
        let err = Scheduler::new(&judge, config(dir.path(), 2)).run(cases(2)).unwrap_err();
        match err {
            JudgeError::WorkerPanicked { message, .. } => assert_eq!(message, "simulator adapter bug"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_panic_stops_other_workers_promptly() {
        let dir = tempfile::tempdir().unwrap();
        let judged = AtomicUsize::new(0);
        let judge = |_: &TestCase, slot: &WorkerSlot| -> JudgeResult<()> {
            if slot.index == 1 {
                panic!("adapter bug on worker 1");
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
            judged.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };
        let recorded = Mutex::new(Vec::new());
        let err = Scheduler::new(&judge, config(dir.path(), 2))
            .on_outcome(|o| recorded.lock().unwrap().push(o.outcome.clone()))
            .run(cases(40))
            .unwrap_err();
        assert!(matches!(err, JudgeError::WorkerPanicked { worker: 1, .. }));
        assert!(judged.load(Ordering::SeqCst) < 20);
        let recorded = recorded.lock().unwrap();
        assert!(recorded.iter().any(|o| matches!(o, Outcome::Failed { kind, .. } if kind == "WorkerPanicked")));
    }

    #[test]
    fn test_harness_error_records_case_before_stopping() {
        let dir = tempfile::tempdir().unwrap();
        let judge = |_: &TestCase, _: &WorkerSlot| -> JudgeResult<()> {
            Err(JudgeError::Config("run directory vanished".into()))
        };
        let recorded = Mutex::new(Vec::new());
        let err = Scheduler::new(&judge, config(dir.path(), 1))
            .on_outcome(|o| recorded.lock().unwrap().push((o.path.clone(), o.outcome.label())))
            .run(cases(3))
            .unwrap_err();
        assert!(matches!(err, JudgeError::Config(_)));
        assert_eq!(*recorded.lock().unwrap(), vec![(PathBuf::from("progs/p0.asm"), "failed")]);
    }

    #[test]
    fn test_hooks_see_paths() {
        let dir = tempfile::tempdir().unwrap();
        let ok = Mutex::new(Vec::new());
        let bad = Mutex::new(Vec::new());
        let judge = |case: &TestCase, _: &WorkerSlot| -> JudgeResult<()> {
            if case.identifier == "p1.asm" {
                Err(JudgeError::NamingConflict { identifier: "p1.asm".into() })
            } else {
                Ok(())
            }
        };
        Scheduler::new(&judge, config(dir.path(), 1).stop_on_error(false))
            .on_success(|p| ok.lock().unwrap().push(p.to_path_buf()))
            .on_error(|p| bad.lock().unwrap().push(p.to_path_buf()))
            .run(cases(3))
            .unwrap();
        assert_eq!(ok.lock().unwrap().len(), 2);
        assert_eq!(*bad.lock().unwrap(), vec![PathBuf::from("progs/p1.asm")]);
    }

    #[test]
    fn test_slots_are_numbered() {
        let slot = WorkerSlot::new(Path::new("tmp"), 7);
        assert_eq!(slot.dir, PathBuf::from("tmp/case0007"));
        assert_eq!(slot.out_path("add.asm"), PathBuf::from("tmp/add.asm.out"));
        assert_eq!(slot.ans_path("add.asm"), PathBuf::from("tmp/add.asm.ans"));
    }
}
