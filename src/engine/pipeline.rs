//! Per-case verification: reference, image, candidate, comparison.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::cases::TestCase;
use crate::diff::Differ;
use crate::image::append_words;
use crate::process::RunStatus;
use crate::{JudgeError, JudgeResult};

use super::scheduler::{CaseJudge, WorkerSlot};
use super::tools::{Candidate, ReferenceGenerator, SimulationRun};

/// Where exception handler images come from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HandlerSource {
    /// Programs carry no handler
    #[default]
    None,
    /// Dump each program's own handler segment, falling back to `fallback`
    /// when a program has none
    PerProgram { fallback: Option<PathBuf> },
    /// Use the handler of one fixed program for every case
    Fixed(PathBuf),
}

/// Reference-versus-candidate judge, or candidate-versus-standard in duet
/// mode.
pub struct Pipeline {
    reference: ReferenceGenerator,
    candidate: Box<dyn Candidate>,
    standard: Option<Box<dyn Candidate>>,
    differ: Differ,
    appendix: Vec<u32>,
    handler: HandlerSource,
}

impl Pipeline {
    pub fn new(reference: ReferenceGenerator, candidate: Box<dyn Candidate>) -> Self {
        Pipeline {
            reference,
            candidate,
            standard: None,
            differ: Differ::default(),
            appendix: Vec::new(),
            handler: HandlerSource::None,
        }
    }

    /// Compare against a trusted candidate instead of the reference trace.
    /// The reference generator is then only used to assemble programs.
    pub fn duet(reference: ReferenceGenerator, candidate: Box<dyn Candidate>, standard: Box<dyn Candidate>) -> Self {
        let mut pipeline = Self::new(reference, candidate);
        pipeline.standard = Some(standard);
        pipeline
    }

    pub fn with_differ(mut self, differ: Differ) -> Self {
        self.differ = differ;
        self
    }

    /// Words appended to every program image before simulation.
    pub fn with_appendix(mut self, words: &[u32]) -> Self {
        self.appendix = words.to_vec();
        self
    }

    pub fn with_handler(mut self, handler: HandlerSource) -> Self {
        self.handler = handler;
        self
    }

    pub fn is_duet(&self) -> bool {
        self.standard.is_some()
    }

    fn candidates(&self) -> impl Iterator<Item = &dyn Candidate> {
        std::iter::once(self.candidate.as_ref()).chain(self.standard.as_deref())
    }

    /// Dump the handler of `asm` where every candidate expects it. Returns
    /// false when `asm` has no handler.
    fn dump_handler(&self, asm: &Path, slot: &Path, identifier: &str) -> JudgeResult<bool> {
        let mut source: Option<PathBuf> = None;
        for candidate in self.candidates() {
            let target = candidate.handler_hex_path(slot, identifier);
            match &source {
                None => {
                    if !self.reference.dump_handler(asm, &target)? {
                        return Ok(false);
                    }
                    source = Some(target);
                }
                Some(src) => sync_file(src, &target)?,
            }
        }
        Ok(true)
    }

    fn load_handler(&self, case: &TestCase, slot: &Path) -> JudgeResult<()> {
        match &self.handler {
            HandlerSource::None => Ok(()),
            HandlerSource::Fixed(asm) => {
                if !self.dump_handler(asm, slot, &case.identifier)? {
                    return Err(JudgeError::SegmentNotFound {
                        tool: self.reference.config().settings.name.clone(),
                        message: format!("no handler in {}", asm.display()),
                    });
                }
                Ok(())
            }
            HandlerSource::PerProgram { fallback } => {
                if self.dump_handler(&case.path, slot, &case.identifier)? {
                    debug!("loaded handler from {}", case.path.display());
                    return Ok(());
                }
                if let Some(fb) = fallback.as_ref().filter(|p| p.exists()) {
                    info!("fallback to handler {}", fb.display());
                    if self.dump_handler(fb, slot, &case.identifier)? {
                        return Ok(());
                    }
                }
                warn!("no valid handlers found for {}, keeping the previous one", case.path.display());
                Ok(())
            }
        }
    }

    fn simulate(&self, candidate: &dyn Candidate, hex: &Path, slot: &Path, out: &Path) -> JudgeResult<RunStatus> {
        if !self.appendix.is_empty() {
            append_words(hex, &self.appendix)?;
        }
        debug!(candidate = candidate.name(), out = %out.display(), "running simulation");
        candidate.simulate(&SimulationRun { hex, slot, out })
    }
}

/// Copy `src` to `dst` unless they are the same file.
fn sync_file(src: &Path, dst: &Path) -> JudgeResult<()> {
    if src == dst {
        return Ok(());
    }
    std::fs::copy(src, dst).map_err(|e| JudgeError::io(dst, e))?;
    Ok(())
}

impl CaseJudge for Pipeline {
    fn judge(&self, case: &TestCase, slot: &WorkerSlot) -> JudgeResult<()> {
        let id = &case.identifier;
        let out = slot.out_path(id);
        let ans = slot.ans_path(id);
        let hex = self.candidate.hex_path(&slot.dir, id);

        match &self.standard {
            None => {
                self.reference.generate(&case.path, &ans, &hex)?;
                self.load_handler(case, &slot.dir)?;
                self.simulate(self.candidate.as_ref(), &hex, &slot.dir, &out)?;
            }
            Some(standard) => {
                self.reference.assemble(&case.path, &hex)?;
                let std_hex = standard.hex_path(&slot.dir, id);
                sync_file(&hex, &std_hex)?;
                self.load_handler(case, &slot.dir)?;
                // the appendix must land once per distinct image file
                let shared = std_hex == hex;
                self.simulate(standard.as_ref(), &std_hex, &slot.dir, &ans)?;
                if shared {
                    self.candidate.simulate(&SimulationRun { hex: &hex, slot: &slot.dir, out: &out })?;
                } else {
                    self.simulate(self.candidate.as_ref(), &hex, &slot.dir, &out)?;
                }
            }
        }

        self.differ.compare(&out, &ans, None)
    }

    fn stop(&self) {
        self.reference.stop();
        for candidate in self.candidates() {
            candidate.stop();
        }
    }
}
