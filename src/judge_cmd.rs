//! Shared driver behind the `logisim`, `isim`, `duet` and `run` commands.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{info, warn};

use crate::cases::resolve_paths;
use crate::diff::Differ;
use crate::engine::{
    Candidate, ExecutableCandidate, ExecutableConfig, HandlerSource, LogisimCandidate, LogisimConfig, MarsConfig,
    Pipeline, ReferenceGenerator, RunSummary, Scheduler, SchedulerConfig,
};
use crate::image::INFINITE_LOOP;
use crate::storage::{CaseRecord, CsvExporter, JsonlWriter, PassCache, new_run_id};
use crate::JudgeResult;

/// Everything a judge run needs besides the candidates.
#[derive(Debug, Clone)]
pub struct JudgeOptions {
    /// Glob patterns or directories of programs
    pub cases: Vec<String>,
    pub mars: MarsConfig,
    pub differ: Differ,
    /// Append an infinite loop to every image
    pub appendix: bool,
    pub handler: HandlerSource,
    pub scheduler: SchedulerConfig,
    /// Pass cache; cached programs are skipped
    pub passes: Option<PathBuf>,
    /// JSONL run log
    pub log: Option<PathBuf>,
    /// CSV export of this run
    pub csv: Option<PathBuf>,
}

impl JudgeOptions {
    pub fn new(cases: Vec<String>, mars: MarsConfig) -> Self {
        JudgeOptions {
            cases,
            mars,
            differ: Differ::default(),
            appendix: true,
            handler: HandlerSource::None,
            scheduler: SchedulerConfig::default(),
            passes: None,
            log: None,
            csv: None,
        }
    }
}

/// Verify a circuit against the reference.
pub fn run_logisim(opts: JudgeOptions, logisim: LogisimConfig) -> JudgeResult<RunSummary> {
    let candidate = LogisimCandidate::new(logisim)?;
    execute(opts, Box::new(candidate), None)
}

/// Verify a simulation executable against the reference.
pub fn run_isim(opts: JudgeOptions, testbench: ExecutableConfig) -> JudgeResult<RunSummary> {
    let candidate = ExecutableCandidate::new(testbench)?;
    execute(opts, Box::new(candidate), None)
}

/// Verify a simulation executable against a trusted one.
pub fn run_duet(opts: JudgeOptions, testbench: ExecutableConfig, standard: ExecutableConfig) -> JudgeResult<RunSummary> {
    let candidate = ExecutableCandidate::new(testbench)?;
    let standard = ExecutableCandidate::new(standard)?;
    execute(opts, Box::new(candidate), Some(Box::new(standard)))
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Resolve cases, run them, and write the pass cache, run log and CSV.
pub fn execute(
    opts: JudgeOptions,
    candidate: Box<dyn Candidate>,
    standard: Option<Box<dyn Candidate>>,
) -> JudgeResult<RunSummary> {
    let candidate_name = candidate.name().to_string();
    let reference = ReferenceGenerator::new(opts.mars);
    let pipeline = match standard {
        Some(standard) => Pipeline::duet(reference, candidate, standard),
        None => Pipeline::new(reference, candidate),
    };
    let appendix: &[u32] = if opts.appendix { INFINITE_LOOP } else { &[] };
    let pipeline = pipeline
        .with_differ(opts.differ)
        .with_appendix(appendix)
        .with_handler(opts.handler);

    let cache = opts.passes.as_deref().map(PassCache::load);
    let blocklist = cache.as_ref().map(PassCache::entries).unwrap_or_default();
    let cases = resolve_paths(&opts.cases, &blocklist, |p| eprintln!("Omitting {}", p.display()))?;
    if cases.is_empty() {
        info!("nothing to judge");
        return Ok(RunSummary::default());
    }

    let run_id = new_run_id();
    let writer = opts.log.as_deref().map(JsonlWriter::new);
    let records = Mutex::new(Vec::new());
    info!(run_id = %run_id, candidate = %candidate_name, cases = cases.len(), duet = pipeline.is_duet(), "judging");

    let mut scheduler = Scheduler::new(&pipeline, opts.scheduler).on_outcome(|outcome| {
        let record = CaseRecord::from_outcome(&run_id, &candidate_name, outcome);
        if let Some(w) = &writer {
            if let Err(e) = w.append(&record) {
                warn!("cannot append to run log: {e}");
            }
        }
        records.lock().unwrap_or_else(PoisonError::into_inner).push(record);
    });
    if let Some(cache) = &cache {
        scheduler = scheduler
            .on_success(|p| cache.append(path_key(p)))
            .on_error(|_| {
                // keep what passed so far in case the run is killed
                if let Err(e) = cache.save() {
                    warn!("cannot save pass cache: {e}");
                }
            });
    }
    let summary = scheduler.run(cases);
    drop(scheduler);

    if let Some(cache) = &cache {
        cache.save()?;
    }
    let summary = summary?;

    if let Some(csv) = &opts.csv {
        let records = records.into_inner().unwrap_or_else(PoisonError::into_inner);
        CsvExporter::new().export(&records, csv)?;
    }
    eprintln!(
        "{} passed, {} failed, {} timed out, {} skipped",
        summary.passed, summary.failed, summary.timed_out, summary.skipped
    );
    Ok(summary)
}
