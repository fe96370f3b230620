use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::trace::LineClassifier;
use crate::{JudgeError, JudgeResult};

use super::env::ToolSettings;
use super::kill::{LiveProcesses, force_kill};

/// How long to keep draining output after a timed-out process is killed.
const DRAIN_GRACE: Duration = Duration::from_millis(200);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How a run that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The process exited with status 0
    Completed,
    /// The process hit its timeout and the settings permit that
    TruncatedByTimeout,
}

struct TraceSink {
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
}

impl TraceSink {
    fn open(path: Option<&Path>) -> JudgeResult<Self> {
        let writer = match path {
            Some(p) => Some(BufWriter::new(File::create(p).map_err(|e| JudgeError::io(p, e))?)),
            None => None,
        };
        Ok(TraceSink { path: path.map(Path::to_path_buf), writer })
    }

    fn push(&mut self, line: &str) -> JudgeResult<()> {
        if let Some(w) = self.writer.as_mut() {
            writeln!(w, "{line}").map_err(|e| self.io_error(e))?;
        }
        Ok(())
    }

    fn push_raw(&mut self, bytes: &[u8]) -> JudgeResult<()> {
        if let Some(w) = self.writer.as_mut() {
            w.write_all(bytes).map_err(|e| self.io_error(e))?;
        }
        Ok(())
    }

    fn finish(&mut self) -> JudgeResult<()> {
        if let Some(w) = self.writer.as_mut() {
            w.flush().map_err(|e| self.io_error(e))?;
        }
        Ok(())
    }

    fn io_error(&self, e: std::io::Error) -> JudgeError {
        JudgeError::io(self.path.clone().unwrap_or_default(), e)
    }
}

/// Runs one external tool under the given settings.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    settings: ToolSettings,
    live: Option<LiveProcesses>,
}

impl ProcessRunner {
    pub fn new(settings: ToolSettings) -> Self {
        ProcessRunner { settings, live: None }
    }

    /// Register each spawned child in `live` while it runs.
    pub fn tracked(mut self, live: &LiveProcesses) -> Self {
        self.live = Some(live.clone());
        self
    }

    pub fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    /// Run `cmd`, classifying each stdout line and appending the kept lines
    /// to `sink` (or discarding them when `sink` is `None`).
    ///
    /// Classifier errors kill the process and are returned as-is. On timeout
    /// the process is killed, output already produced is still classified,
    /// and the run either fails with `JudgeError::Timeout` or, if timeouts are
    /// permitted, ends with `RunStatus::TruncatedByTimeout`.
    pub fn run(
        &self,
        mut cmd: Command,
        classifier: &dyn LineClassifier,
        sink: Option<&Path>,
    ) -> JudgeResult<RunStatus> {
        let s = &self.settings;
        let program = cmd.get_program().to_string_lossy().to_string();
        s.env.apply(&mut cmd)?;
        if let Some(cwd) = &s.cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut out = TraceSink::open(sink)?;
        let mut raw = TraceSink::open(s.raw_output.as_deref())?;

        debug!(tool = %s.name, cmd = ?cmd, "spawning");
        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| JudgeError::ProcessExit {
            tool: s.name.clone(),
            code: None,
            hint: Some(match &s.error_hint {
                Some(h) => format!("failed to spawn {program}: {e}, {h}"),
                None => format!("failed to spawn {program}: {e}"),
            }),
        })?;
        let _tracked = self.live.as_ref().map(|live| live.track(child.id()));
        let kill_hint = s.kill_by_name.then_some(program.as_str());
        let lines = match spawn_line_reader(&mut child, &s.name) {
            Ok(lines) => lines,
            Err(e) => {
                force_kill(&mut child, None);
                let _ = child.wait();
                return Err(e);
            }
        };
        let deadline = start + s.timeout;

        let mut feed = |bytes: &[u8], out: &mut TraceSink| -> JudgeResult<()> {
            raw.push_raw(bytes)?;
            let line = String::from_utf8_lossy(bytes);
            if let Some(kept) = classifier.classify(line.trim())? {
                out.push(&kept)?;
            }
            Ok(())
        };

        let mut timed_out = false;
        loop {
            let now = Instant::now();
            if now >= deadline {
                timed_out = true;
                break;
            }
            match lines.recv_timeout(deadline - now) {
                Ok(bytes) => {
                    if let Err(e) = feed(&bytes, &mut out) {
                        force_kill(&mut child, kill_hint);
                        let _ = child.wait();
                        let _ = out.finish();
                        return Err(e);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    timed_out = true;
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let status = if timed_out {
            None
        } else {
            wait_until(&mut child, deadline)?
        };

        let Some(status) = status else {
            force_kill(&mut child, kill_hint);
            let _ = child.wait();
            // whatever was buffered before the kill is still part of the trace
            while let Ok(bytes) = lines.recv_timeout(DRAIN_GRACE) {
                if let Err(e) = feed(&bytes, &mut out) {
                    debug!(tool = %s.name, "stopped draining after timeout: {e}");
                    break;
                }
            }
            out.finish()?;
            raw.finish()?;

            let err = JudgeError::Timeout {
                tool: s.name.clone(),
                secs: s.timeout.as_secs_f64(),
                sink: sink.map(Path::to_path_buf),
                permitted: s.permit_timeout,
            };
            if s.permit_timeout {
                warn!("Permitted: {err}");
                return Ok(RunStatus::TruncatedByTimeout);
            }
            return Err(err);
        };

        out.finish()?;
        raw.finish()?;
        if !status.success() {
            return Err(JudgeError::ProcessExit {
                tool: s.name.clone(),
                code: status.code(),
                hint: s.error_hint.clone(),
            });
        }
        debug!(tool = %s.name, elapsed_ms = start.elapsed().as_millis() as u64, "finished");
        Ok(RunStatus::Completed)
    }
}

/// Read stdout on a separate thread so the caller can enforce the deadline
/// while the child is silent.
fn spawn_line_reader(child: &mut Child, tool: &str) -> JudgeResult<Receiver<Vec<u8>>> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| JudgeError::Config(format!("{tool} stdout stream unavailable")))?;
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name(format!("{tool}-stdout"))
        .spawn(move || {
            let mut reader = BufReader::new(stdout);
            loop {
                let mut buf = Vec::new();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if tx.send(buf).is_err() {
                            break;
                        }
                    }
                }
            }
        })
        .map_err(|e| JudgeError::Config(format!("cannot start reader thread: {e}")))?;
    Ok(rx)
}

/// Wait for the child to exit, `None` if the deadline passes first.
fn wait_until(child: &mut Child, deadline: Instant) -> JudgeResult<Option<ExitStatus>> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) => {
                if Instant::now() >= deadline {
                    return Ok(None);
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(JudgeError::Config(format!("wait on child failed: {e}")));
            }
        }
    }
}
