//! TOML run files for the `run` subcommand.
//!
//! ```toml
//! cases = ["cases/interrupts"]
//! passes = "passes.json"
//!
//! [mars]
//! jar = "kits/mars.jar"
//! delayed_branching = true
//!
//! [candidate]
//! kind = "executable"
//! executable = "ise-projects/mips7/tb_isim_beh.exe"
//! duration = "all"
//!
//! [handler]
//! per_program = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::diff::{DiffMode, Differ};
use crate::engine::{
    Candidate, ExecutableCandidate, ExecutableConfig, HandlerSource, LogisimCandidate, LogisimConfig, MarsConfig,
    SchedulerConfig,
};
use crate::process::ToolSettings;
use crate::trace::DecodeConfig;
use crate::{JudgeError, JudgeResult};

/// Per-tool process options shared by every tool table.
#[derive(Debug, Clone, Default)]
pub struct ToolOptions {
    pub timeout_secs: Option<f64>,
    pub permit_timeout: Option<bool>,
    pub kill_by_name: Option<bool>,
    pub raw_output: Option<PathBuf>,
}

impl ToolOptions {
    /// Apply the options over `settings`, leaving unset fields alone.
    pub fn apply(&self, mut settings: ToolSettings) -> JudgeResult<ToolSettings> {
        if let Some(secs) = self.timeout_secs {
            settings.timeout = duration_from_secs(secs)?;
        }
        if let Some(p) = self.permit_timeout {
            settings.permit_timeout = p;
        }
        if let Some(k) = self.kill_by_name {
            settings.kill_by_name = k;
        }
        if let Some(raw) = &self.raw_output {
            settings.raw_output = Some(raw.clone());
        }
        Ok(settings)
    }
}

pub fn duration_from_secs(secs: f64) -> JudgeResult<Duration> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| !d.is_zero())
        .ok_or_else(|| JudgeError::Config(format!("timeout must be a positive number of seconds, got {secs}")))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarsSection {
    pub jar: PathBuf,
    #[serde(default = "default_java")]
    pub java: PathBuf,
    #[serde(default)]
    pub delayed_branching: bool,
    #[serde(default)]
    pub no_pseudo: bool,
    #[serde(default)]
    pub timeout_secs: Option<f64>,
    #[serde(default)]
    pub permit_timeout: Option<bool>,
    #[serde(default)]
    pub raw_output: Option<PathBuf>,
}

fn default_java() -> PathBuf {
    PathBuf::from("java")
}

impl MarsSection {
    pub fn to_config(&self) -> JudgeResult<MarsConfig> {
        let mut config = MarsConfig::new(&self.jar)
            .with_java(&self.java)
            .with_delayed_branching(self.delayed_branching)
            .with_no_pseudo(self.no_pseudo);
        let tool = ToolOptions {
            timeout_secs: self.timeout_secs,
            permit_timeout: self.permit_timeout,
            kill_by_name: None,
            raw_output: self.raw_output.clone(),
        };
        config.settings = tool.apply(config.settings)?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", deny_unknown_fields)]
pub enum CandidateSection {
    Logisim {
        circuit: PathBuf,
        jar: PathBuf,
        #[serde(default = "default_java")]
        java: PathBuf,
        #[serde(default)]
        im_circuit: Option<String>,
        #[serde(default)]
        decode: DecodeConfig,
        #[serde(default)]
        timeout_secs: Option<f64>,
        #[serde(default)]
        permit_timeout: Option<bool>,
    },
    Executable {
        executable: PathBuf,
        #[serde(default)]
        duration: Option<String>,
        #[serde(default)]
        ise_dir: Option<PathBuf>,
        #[serde(default)]
        timeout_secs: Option<f64>,
        #[serde(default)]
        permit_timeout: Option<bool>,
        #[serde(default)]
        kill_by_name: Option<bool>,
    },
}

impl CandidateSection {
    pub fn build(&self) -> JudgeResult<Box<dyn Candidate>> {
        match self {
            CandidateSection::Logisim { circuit, jar, java, im_circuit, decode, timeout_secs, permit_timeout } => {
                let tool = ToolOptions {
                    timeout_secs: *timeout_secs,
                    permit_timeout: *permit_timeout,
                    ..Default::default()
                };
                let mut config = LogisimConfig::new(circuit, jar).with_java(java).with_decode(*decode);
                if let Some(im) = im_circuit {
                    config = config.with_im_circuit(im);
                }
                config.settings = tool.apply(config.settings)?;
                Ok(Box::new(LogisimCandidate::new(config)?))
            }
            CandidateSection::Executable {
                executable,
                duration,
                ise_dir,
                timeout_secs,
                permit_timeout,
                kill_by_name,
            } => {
                let tool = ToolOptions {
                    timeout_secs: *timeout_secs,
                    permit_timeout: *permit_timeout,
                    kill_by_name: *kill_by_name,
                    raw_output: None,
                };
                let mut config = ExecutableConfig::new(executable);
                if let Some(d) = duration {
                    config = config.with_duration(d);
                }
                if let Some(dir) = ise_dir {
                    config = config.with_ise_dir(dir);
                }
                config.settings = tool.apply(config.settings)?;
                Ok(Box::new(ExecutableCandidate::new(config)?))
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiffSection {
    pub command: Option<String>,
    pub mode: DiffMode,
    pub keep_output_files: bool,
}

impl DiffSection {
    pub fn to_differ(&self) -> JudgeResult<Differ> {
        let mut differ = Differ::new()
            .with_mode(self.mode)
            .keep_output_files(self.keep_output_files);
        if let Some(cmd) = &self.command {
            differ = differ.with_command(cmd)?;
        }
        Ok(differ)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HandlerSection {
    /// Dump each program's own handler
    pub per_program: bool,
    /// Handler program used when a program has none, or for every program
    /// when `per_program` is off
    pub fallback: Option<PathBuf>,
}

impl HandlerSection {
    pub fn to_source(&self) -> HandlerSource {
        match (self.per_program, &self.fallback) {
            (true, fallback) => HandlerSource::PerProgram { fallback: fallback.clone() },
            (false, Some(asm)) => HandlerSource::Fixed(asm.clone()),
            (false, None) => HandlerSource::None,
        }
    }
}

/// A complete run description.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Glob patterns or directories of programs
    pub cases: Vec<String>,
    /// Pass cache; passed programs are skipped on later runs
    #[serde(default)]
    pub passes: Option<PathBuf>,
    /// JSONL run log
    #[serde(default)]
    pub log: Option<PathBuf>,
    /// CSV export of this run's records
    #[serde(default)]
    pub csv: Option<PathBuf>,
    /// Append an infinite loop to every image
    #[serde(default = "default_true")]
    pub infinite_loop_appendix: bool,
    pub mars: MarsSection,
    pub candidate: CandidateSection,
    /// Trusted candidate for duet runs
    #[serde(default)]
    pub standard: Option<CandidateSection>,
    #[serde(default)]
    pub diff: DiffSection,
    #[serde(default)]
    pub handler: HandlerSection,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

fn default_true() -> bool {
    true
}

impl RunConfig {
    pub fn parse(text: &str) -> JudgeResult<Self> {
        let config: RunConfig = toml::from_str(text).map_err(|e| JudgeError::Config(e.to_string()))?;
        if config.cases.is_empty() {
            return Err(JudgeError::Config("no cases given".to_string()));
        }
        Ok(config)
    }

    /// Load a run file. Relative paths inside it stay relative to the current
    /// directory, like paths given on the command line.
    pub fn load(path: &Path) -> JudgeResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| JudgeError::io(path, e))?;
        Self::parse(&text)
    }
}
