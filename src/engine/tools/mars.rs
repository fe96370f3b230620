//! MARS-compatible reference generator.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::{debug, warn};

use crate::process::{LiveProcesses, ProcessRunner, RunStatus, ToolSettings};
use crate::trace::ReferenceClassifier;
use crate::{JudgeError, JudgeResult};

/// Memory range holding an exception handler.
pub const HANDLER_SEGMENT: &str = "0x4180-0x4ffc";
/// Segment holding the program text.
pub const TEXT_SEGMENT: &str = ".text";

/// How to invoke the reference simulator.
#[derive(Debug, Clone)]
pub struct MarsConfig {
    pub jar: PathBuf,
    pub java: PathBuf,
    /// Simulate delayed branching (`db`)
    pub delayed_branching: bool,
    /// Reject pseudo instructions (`np`)
    pub no_pseudo: bool,
    /// Assemble without simulating (`a`)
    pub assemble_only: bool,
    pub settings: ToolSettings,
}

impl Default for MarsConfig {
    fn default() -> Self {
        MarsConfig {
            jar: PathBuf::from("kits/mars.jar"),
            java: PathBuf::from("java"),
            delayed_branching: false,
            no_pseudo: false,
            assemble_only: false,
            // every worker runs its own java; killing by name would take out the others
            settings: ToolSettings::new("MARS")
                .with_error_hint("maybe an infinite loop")
                .kill_by_name(false),
        }
    }
}

impl MarsConfig {
    pub fn new(jar: impl Into<PathBuf>) -> Self {
        MarsConfig { jar: jar.into(), ..Default::default() }
    }

    pub fn with_java(mut self, java: impl Into<PathBuf>) -> Self {
        self.java = java.into();
        self
    }

    pub fn with_delayed_branching(mut self, enabled: bool) -> Self {
        self.delayed_branching = enabled;
        self
    }

    pub fn with_no_pseudo(mut self, enabled: bool) -> Self {
        self.no_pseudo = enabled;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout = timeout;
        self
    }

    pub fn permit_timeout(mut self, permit: bool) -> Self {
        self.settings.permit_timeout = permit;
        self
    }
}

/// Produces reference traces and program images.
#[derive(Debug, Clone)]
pub struct ReferenceGenerator {
    config: MarsConfig,
    classifier: ReferenceClassifier,
    live: LiveProcesses,
}

impl ReferenceGenerator {
    pub fn new(config: MarsConfig) -> Self {
        let classifier = ReferenceClassifier { tool: config.settings.name.clone() };
        ReferenceGenerator { config, classifier, live: LiveProcesses::new() }
    }

    /// Kill every reference run still in progress.
    pub fn stop(&self) {
        self.live.kill_all();
    }

    pub fn config(&self) -> &MarsConfig {
        &self.config
    }

    /// Build the command line for one invocation.
    pub fn command(&self, asm: &Path, assemble_only: bool, dump: Option<(&str, &Path)>) -> Command {
        let c = &self.config;
        let mut args: Vec<OsString> = vec!["-jar".into(), c.jar.clone().into(), asm.into(), "nc".into()];
        if c.delayed_branching {
            args.push("db".into());
        }
        if c.no_pseudo {
            args.push("np".into());
        }
        if assemble_only || c.assemble_only {
            args.push("a".into());
        }
        args.push("mc".into());
        args.push("CompactDataAtZero".into());
        if let Some((segment, hex)) = dump {
            args.push("dump".into());
            args.push(segment.into());
            args.push("HexText".into());
            args.push(hex.into());
        }
        let mut cmd = Command::new(&c.java);
        cmd.args(args);
        cmd
    }

    fn invoke(&self, cmd: Command, sink: Option<&Path>) -> JudgeResult<RunStatus> {
        ProcessRunner::new(self.config.settings.clone())
            .tracked(&self.live)
            .run(cmd, &self.classifier, sink)
    }

    /// Write the reference trace of `asm` to `ans` and its text segment to
    /// `hex`.
    ///
    /// When the reference run is allowed to time out, the image is dumped by a
    /// separate assemble-only invocation first so a truncated run cannot lose
    /// it.
    pub fn generate(&self, asm: &Path, ans: &Path, hex: &Path) -> JudgeResult<RunStatus> {
        if self.config.settings.permit_timeout {
            self.assemble(asm, hex)?;
            self.invoke(self.command(asm, false, None), Some(ans))
        } else {
            self.invoke(self.command(asm, false, Some((TEXT_SEGMENT, hex))), Some(ans))
        }
    }

    /// Dump the text segment of `asm` to `hex` without simulating it.
    pub fn assemble(&self, asm: &Path, hex: &Path) -> JudgeResult<()> {
        self.dump_segment(asm, TEXT_SEGMENT, hex)
    }

    pub fn dump_segment(&self, asm: &Path, segment: &str, hex: &Path) -> JudgeResult<()> {
        debug!(asm = %asm.display(), segment, "dumping segment");
        self.invoke(self.command(asm, true, Some((segment, hex))), None)?;
        Ok(())
    }

    /// Dump the exception handler of `asm` to `hex`. Returns false when the
    /// program has no handler.
    pub fn dump_handler(&self, asm: &Path, hex: &Path) -> JudgeResult<bool> {
        match self.dump_segment(asm, HANDLER_SEGMENT, hex) {
            Ok(()) => Ok(true),
            Err(JudgeError::SegmentNotFound { .. }) => {
                warn!("no handler found in {}", asm.display());
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args().map(|a| a.to_string_lossy().to_string()).collect()
    }

    #[test]
    fn test_trace_command_with_dump() {
        let mars = ReferenceGenerator::new(MarsConfig::new("kits/mars.jar"));
        let cmd = mars.command(Path::new("add.asm"), false, Some((TEXT_SEGMENT, Path::new("add.hex"))));
        assert_eq!(cmd.get_program(), "java");
        assert_eq!(
            args(&cmd),
            ["-jar", "kits/mars.jar", "add.asm", "nc", "mc", "CompactDataAtZero", "dump", ".text", "HexText", "add.hex"]
        );
    }

    #[test]
    fn test_flags_in_order() {
        let mars = ReferenceGenerator::new(
            MarsConfig::new("m.jar").with_delayed_branching(true).with_no_pseudo(true),
        );
        let cmd = mars.command(Path::new("p.asm"), true, None);
        assert_eq!(
            args(&cmd),
            ["-jar", "m.jar", "p.asm", "nc", "db", "np", "a", "mc", "CompactDataAtZero"]
        );
    }

    #[test]
    fn test_java_runs_never_kill_by_name() {
        assert!(!MarsConfig::default().settings.kill_by_name);
    }

    #[cfg(unix)]
    #[test]
    fn test_stop_kills_running_reference() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::Instant;

        let dir = tempfile::tempdir().unwrap();
        let java = dir.path().join("java");
        std::fs::write(&java, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&java, std::fs::Permissions::from_mode(0o755)).unwrap();
        let mars = ReferenceGenerator::new(
            MarsConfig::new("m.jar").with_java(&java).with_timeout(Duration::from_secs(30)),
        );

        let started = Instant::now();
        let result = std::thread::scope(|scope| {
            let run = scope.spawn(|| {
                mars.generate(Path::new("p.asm"), &dir.path().join("p.ans"), &dir.path().join("p.hex"))
            });
            while mars.live.is_empty() && started.elapsed() < Duration::from_secs(5) {
                std::thread::sleep(Duration::from_millis(10));
            }
            mars.stop();
            run.join().unwrap()
        });
        assert!(matches!(result, Err(JudgeError::ProcessExit { .. })));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_handler_is_not_an_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let java = dir.path().join("java");
        std::fs::write(&java, "#!/bin/sh\necho 'This segment has nothing to dump'\n").unwrap();
        std::fs::set_permissions(&java, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mars = ReferenceGenerator::new(MarsConfig::new("m.jar").with_java(&java));
        let found = mars
            .dump_handler(Path::new("p.asm"), &dir.path().join("h.hex"))
            .unwrap();
        assert!(!found);
    }
}
