//! Circuit candidate run under a generic circuit simulator.

use std::path::PathBuf;
use std::process::Command;

use crate::image::patch_circuit;
use crate::process::{LiveProcesses, ProcessRunner, RunStatus, ToolSettings};
use crate::trace::{BitLineClassifier, DecodeConfig};
use crate::{JudgeError, JudgeResult};

use super::traits::{Candidate, SimulationRun};

#[derive(Debug, Clone)]
pub struct LogisimConfig {
    /// Circuit description holding the CPU
    pub circuit: PathBuf,
    pub jar: PathBuf,
    pub java: PathBuf,
    /// Sub-circuit holding the instruction ROM; the first circuit when unset
    pub im_circuit: Option<String>,
    pub decode: DecodeConfig,
    pub settings: ToolSettings,
}

impl LogisimConfig {
    pub fn new(circuit: impl Into<PathBuf>, jar: impl Into<PathBuf>) -> Self {
        LogisimConfig {
            circuit: circuit.into(),
            jar: jar.into(),
            java: PathBuf::from("java"),
            im_circuit: None,
            decode: DecodeConfig::default(),
            settings: ToolSettings::new("Logisim").kill_by_name(false),
        }
    }

    pub fn with_java(mut self, java: impl Into<PathBuf>) -> Self {
        self.java = java.into();
        self
    }

    pub fn with_im_circuit(mut self, name: impl Into<String>) -> Self {
        self.im_circuit = Some(name.into());
        self
    }

    pub fn with_decode(mut self, decode: DecodeConfig) -> Self {
        self.decode = decode;
        self
    }

    pub fn with_settings(mut self, settings: ToolSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// Patches each program into the circuit's ROM and decodes the simulator's
/// `-tty table` rows.
#[derive(Debug, Clone)]
pub struct LogisimCandidate {
    config: LogisimConfig,
    classifier: BitLineClassifier,
    live: LiveProcesses,
}

impl LogisimCandidate {
    pub fn new(config: LogisimConfig) -> JudgeResult<Self> {
        config.decode.validate()?;
        if !config.circuit.is_file() {
            return Err(JudgeError::Config(format!(
                "circuit {} does not exist",
                config.circuit.display()
            )));
        }
        let classifier = BitLineClassifier::new(config.decode);
        Ok(LogisimCandidate { config, classifier, live: LiveProcesses::new() })
    }
}

impl Candidate for LogisimCandidate {
    fn name(&self) -> &str {
        &self.config.settings.name
    }

    fn simulate(&self, run: &SimulationRun<'_>) -> JudgeResult<RunStatus> {
        let c = &self.config;
        let patched = patch_circuit(&c.circuit, run.hex, c.im_circuit.as_deref(), run.slot)?;
        let mut cmd = Command::new(&c.java);
        cmd.arg("-jar").arg(&c.jar).arg(&patched.path).args(["-tty", "table"]);
        ProcessRunner::new(c.settings.clone())
            .tracked(&self.live)
            .run(cmd, &self.classifier, Some(run.out))
    }

    fn stop(&self) {
        self.live.kill_all();
    }
}
