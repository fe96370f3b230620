use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::{JudgeError, JudgeResult};

/// Default wall-clock bound for a tool run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Environment a tool runs with, on top of the inherited one.
///
/// Values are applied to each `Command` individually; the judge's own process
/// environment is never modified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolEnv {
    vars: Vec<(String, OsString)>,
    path_prefix: Vec<PathBuf>,
}

impl ToolEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable for the tool.
    pub fn var(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.vars.push((key.into(), value.into()));
        self
    }

    /// Put `dir` in front of the inherited `PATH`.
    pub fn prepend_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.path_prefix.push(dir.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty() && self.path_prefix.is_empty()
    }

    /// Environment expected by executables built with a Xilinx ISE install.
    ///
    /// `install_dir` may point at the install root or at its `ISE` subdirectory.
    pub fn ise(install_dir: &Path) -> Self {
        let ise = if install_dir.join("bin").is_dir() {
            install_dir.to_path_buf()
        } else {
            install_dir.join("ISE")
        };
        let bin = ise.join("bin");
        let (mut platform, exe) = if cfg!(windows) { ("nt".to_string(), ".exe") } else { ("lin".to_string(), "") };
        if bin.join(format!("{platform}64")).is_dir() {
            platform.push_str("64");
        }
        let platform_bin = bin.join(&platform);

        ToolEnv::new()
            .var("XILINX", ise.as_os_str())
            .var("EXE", exe)
            .var("XILINX_PLATFORM", platform)
            .prepend_path(platform_bin)
    }

    /// Apply the variables and the derived `PATH` to `cmd`.
    pub fn apply(&self, cmd: &mut Command) -> JudgeResult<()> {
        for (k, v) in &self.vars {
            cmd.env(k, v);
        }
        if !self.path_prefix.is_empty() {
            let inherited = std::env::var_os("PATH").unwrap_or_default();
            let dirs = self
                .path_prefix
                .iter()
                .cloned()
                .chain(std::env::split_paths(&inherited));
            let path = std::env::join_paths(dirs)
                .map_err(|e| JudgeError::Config(format!("cannot build PATH for tool: {e}")))?;
            cmd.env("PATH", path);
        }
        Ok(())
    }
}

/// How one external tool is invoked.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    /// Name used in messages (e.g. "MARS", "Logisim")
    pub name: String,
    /// Wall-clock bound measured from spawn
    pub timeout: Duration,
    /// Working directory
    pub cwd: Option<PathBuf>,
    /// Extra environment
    pub env: ToolEnv,
    /// Treat a timeout as expected truncation instead of a failure
    pub permit_timeout: bool,
    /// Also kill every process with the tool's executable name on timeout
    pub kill_by_name: bool,
    /// Copy of the unclassified stdout, for postmortems
    pub raw_output: Option<PathBuf>,
    /// Appended to nonzero-exit errors
    pub error_hint: Option<String>,
}

impl ToolSettings {
    pub fn new(name: impl Into<String>) -> Self {
        ToolSettings {
            name: name.into(),
            timeout: DEFAULT_TIMEOUT,
            cwd: None,
            env: ToolEnv::default(),
            permit_timeout: false,
            kill_by_name: cfg!(windows),
            raw_output: None,
            error_hint: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, env: ToolEnv) -> Self {
        self.env = env;
        self
    }

    pub fn permit_timeout(mut self, permit: bool) -> Self {
        self.permit_timeout = permit;
        self
    }

    pub fn kill_by_name(mut self, enabled: bool) -> Self {
        self.kill_by_name = enabled;
        self
    }

    pub fn with_raw_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.raw_output = Some(path.into());
        self
    }

    pub fn with_error_hint(mut self, hint: impl Into<String>) -> Self {
        self.error_hint = Some(hint.into());
        self
    }
}
