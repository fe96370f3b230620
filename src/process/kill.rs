//! Forced termination of tool processes.
//!
//! Some simulators fork a worker that survives when the process we spawned is
//! killed (notably ISim on Windows), so on timeout or stop the judge can also
//! kill every process with the same executable name. This is non-portable and
//! best effort: it relies on process enumeration, and it will also hit
//! unrelated processes that share the name.
//!
//! `LiveProcesses` is the precise alternative: runners register the children
//! they spawn, and a stop request from another thread kills exactly those.

use std::collections::HashSet;
use std::path::Path;
use std::process::Child;
use std::sync::{Arc, Mutex, PoisonError};

use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, System};
use tracing::{debug, warn};

/// Executable name as it appears in the process table.
fn process_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| name.to_string());
    if cfg!(windows) && Path::new(&base).extension().is_none() {
        format!("{base}.exe")
    } else {
        base
    }
}

/// Kill every process whose executable name is `name`. Returns how many were
/// signalled.
pub fn kill_by_name(name: &str) -> usize {
    let name = process_name(name);
    let sys = System::new_with_specifics(
        RefreshKind::new().with_processes(ProcessRefreshKind::new()),
    );
    let mut killed = 0;
    for process in sys.processes_by_exact_name(&name) {
        if process.kill() {
            killed += 1;
        }
    }
    if killed > 0 {
        warn!(name = %name, killed, "force-killed processes by name");
    }
    killed
}

/// Kill `child`, then, if a name hint is given, anything else running that
/// executable.
pub fn force_kill(child: &mut Child, name_hint: Option<&str>) {
    if let Err(e) = child.kill() {
        debug!("kill of pid {} failed: {e}", child.id());
    }
    if let Some(name) = name_hint {
        kill_by_name(name);
    }
}

/// Children currently running on behalf of one tool. Clones share the set.
#[derive(Debug, Clone, Default)]
pub struct LiveProcesses {
    pids: Arc<Mutex<HashSet<u32>>>,
}

/// Keeps a pid registered until dropped. Drop it only after the child has
/// been reaped, so the pid cannot have been reused.
#[must_use]
pub struct TrackedPid<'a> {
    live: &'a LiveProcesses,
    pid: u32,
}

impl Drop for TrackedPid<'_> {
    fn drop(&mut self) {
        self.live.lock().remove(&self.pid);
    }
}

impl LiveProcesses {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<u32>> {
        self.pids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn track(&self, pid: u32) -> TrackedPid<'_> {
        self.lock().insert(pid);
        TrackedPid { live: self, pid }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Kill every registered process. Returns how many were signalled.
    pub fn kill_all(&self) -> usize {
        let pids: Vec<u32> = self.lock().iter().copied().collect();
        if pids.is_empty() {
            return 0;
        }
        let sys = System::new_with_specifics(
            RefreshKind::new().with_processes(ProcessRefreshKind::new()),
        );
        let mut killed = 0;
        for pid in pids {
            match sys.process(Pid::from_u32(pid)) {
                Some(process) if process.kill() => killed += 1,
                _ => debug!("pid {pid} already gone"),
            }
        }
        if killed > 0 {
            warn!(killed, "force-killed running tool processes");
        }
        killed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_name_strips_directories() {
        let name = process_name("/opt/ise/bin/lin64/tb_isim_beh.exe");
        assert_eq!(name, "tb_isim_beh.exe");
    }

    #[test]
    #[cfg(unix)]
    fn test_force_kill_child() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        force_kill(&mut child, None);
        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    #[test]
    #[cfg(unix)]
    fn test_kill_all_reaches_tracked_children() {
        let live = LiveProcesses::new();
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let status = {
            let _tracked = live.track(child.id());
            assert_eq!(live.len(), 1);
            assert_eq!(live.clone().kill_all(), 1);
            child.wait().unwrap()
        };
        assert!(!status.success());
        assert!(live.is_empty());
        assert_eq!(live.kill_all(), 0);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_kill_by_name_hits_every_instance() {
        use std::os::unix::fs::PermissionsExt;

        // the kernel truncates process names to 15 bytes
        let name = format!("cj{}", std::process::id() % 1_000_000);
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join(&name);
        std::fs::write(&script, "#!/bin/sh\nsleep 30\nexit 0\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut children: Vec<_> = (0..2)
            .map(|_| std::process::Command::new(&script).spawn().unwrap())
            .collect();
        assert_eq!(kill_by_name(&script.to_string_lossy()), 2);
        for child in &mut children {
            assert!(!child.wait().unwrap().success());
        }
    }

    #[test]
    fn test_kill_by_unknown_name_is_noop() {
        assert_eq!(kill_by_name("cpu-judge-no-such-process"), 0);
    }
}
