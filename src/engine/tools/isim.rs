//! Prebuilt simulation executable (an ISim testbench, for example).

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::debug;

use crate::process::{LiveProcesses, ProcessRunner, RunStatus, ToolEnv, ToolSettings, kill_by_name};
use crate::trace::TestbenchClassifier;
use crate::{JudgeError, JudgeResult};

use super::traits::{Candidate, SimulationRun};

pub const DEFAULT_DURATION: &str = "1000 us";
pub const DEFAULT_TESTBENCH_TIMEOUT: Duration = Duration::from_secs(5);

/// File the testbench loads the program image from.
pub const CODE_FILE: &str = "code.txt";
/// File the testbench loads the exception handler from.
pub const HANDLER_FILE: &str = "code_handler.txt";

#[derive(Debug, Clone)]
pub struct ExecutableConfig {
    pub executable: PathBuf,
    /// Simulated time passed to `run`
    pub duration: String,
    /// Xilinx ISE install the executable was built with
    pub ise_dir: Option<PathBuf>,
    pub settings: ToolSettings,
}

impl ExecutableConfig {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        ExecutableConfig {
            executable: executable.into(),
            duration: DEFAULT_DURATION.to_string(),
            ise_dir: None,
            settings: ToolSettings::new("ISim").with_timeout(DEFAULT_TESTBENCH_TIMEOUT),
        }
    }

    pub fn with_duration(mut self, duration: impl Into<String>) -> Self {
        self.duration = duration.into();
        self
    }

    pub fn with_ise_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ise_dir = Some(dir.into());
        self
    }

    pub fn with_settings(mut self, settings: ToolSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// Runs a testbench executable inside the worker slot.
///
/// The slot directory is the working directory, so the testbench finds its
/// program in `code.txt` (and `code_handler.txt`) next to the control script.
#[derive(Debug, Clone)]
pub struct ExecutableCandidate {
    config: ExecutableConfig,
    executable: PathBuf,
    classifier: TestbenchClassifier,
    live: LiveProcesses,
}

impl ExecutableCandidate {
    pub fn new(config: ExecutableConfig) -> JudgeResult<Self> {
        // runs from the slot directory, so relative paths must be resolved now
        let executable = std::path::absolute(&config.executable)
            .map_err(|e| JudgeError::io(&config.executable, e))?;
        if !executable.is_file() {
            return Err(JudgeError::Config(format!(
                "simulation executable {} does not exist",
                executable.display()
            )));
        }
        let classifier = TestbenchClassifier { tool: config.settings.name.clone() };
        Ok(ExecutableCandidate { config, executable, classifier, live: LiveProcesses::new() })
    }

    fn settings_for(&self, slot: &Path) -> ToolSettings {
        let mut settings = self.config.settings.clone().with_cwd(slot);
        if let Some(ise) = &self.config.ise_dir {
            settings = settings.with_env(ToolEnv::ise(ise));
            if settings.error_hint.is_none() {
                settings.error_hint = Some(format!("maybe ISE path is incorrect ({})", ise.display()));
            }
        }
        settings
    }

    /// Write the control script for `slot`, named after the slot.
    fn write_script(&self, slot: &Path) -> JudgeResult<PathBuf> {
        let name = slot
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "run".to_string());
        let script = slot.join(format!("{name}.tcl"));
        std::fs::write(&script, format!("run {}\nexit", self.config.duration))
            .map_err(|e| JudgeError::io(&script, e))?;
        Ok(script)
    }
}

impl Candidate for ExecutableCandidate {
    fn name(&self) -> &str {
        &self.config.settings.name
    }

    fn hex_path(&self, slot: &Path, _identifier: &str) -> PathBuf {
        slot.join(CODE_FILE)
    }

    fn handler_hex_path(&self, slot: &Path, _identifier: &str) -> PathBuf {
        slot.join(HANDLER_FILE)
    }

    fn simulate(&self, run: &SimulationRun<'_>) -> JudgeResult<RunStatus> {
        let expected = run.slot.join(CODE_FILE);
        if run.hex != expected {
            debug!(from = %run.hex.display(), "copying image into slot");
            std::fs::copy(run.hex, &expected).map_err(|e| JudgeError::io(&expected, e))?;
        }
        let script = self.write_script(run.slot)?;
        let mut cmd = Command::new(&self.executable);
        cmd.arg("-tclbatch").arg(&script);
        ProcessRunner::new(self.settings_for(run.slot))
            .tracked(&self.live)
            .run(cmd, &self.classifier, Some(run.out))
    }

    fn stop(&self) {
        self.live.kill_all();
        // forked simulator kernels are not our children
        if self.config.settings.kill_by_name {
            kill_by_name(&self.executable.to_string_lossy());
        }
    }
}
