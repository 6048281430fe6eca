//! OS process plumbing: launching, terminating and scanning processes
//!
//! Every spawn receives its environment explicitly through [`SpawnEnv`];
//! nothing here reads or writes the process-wide environment after startup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::error::{FleetError, Result};

/// Environment handed to a spawned process, replacing the inherited one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpawnEnv {
    vars: BTreeMap<String, String>,
}

impl SpawnEnv {
    /// Snapshot of the current process environment
    pub fn inherit() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Copy of this environment with every pair of `extra` applied on top
    pub fn merged<'a>(&self, extra: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        let mut env = self.clone();
        for (key, value) in extra {
            env.set(key.clone(), value.clone());
        }
        env
    }

    /// Copy of this environment targeting the Wayland display `socket`
    pub fn for_display(&self, socket: &str) -> Self {
        let mut env = self.clone();
        env.set("WAYLAND_DISPLAY", socket);
        env
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn vars(&self) -> impl Iterator<Item = (&String, &String)> {
        self.vars.iter()
    }
}

/// A process to launch with suppressed standard streams
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: SpawnEnv,
}

impl SpawnSpec {
    pub fn new(program: impl Into<String>, env: SpawnEnv) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Creates and terminates OS processes
pub trait Launcher: Send + Sync {
    /// Launch without waiting; returns the new process id
    fn spawn(&self, spec: &SpawnSpec) -> Result<u32>;

    /// Send SIGTERM. `Ok(false)` when the process was already gone.
    fn terminate(&self, pid: u32) -> Result<bool>;
}

/// [`Launcher`] backed by real processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn spawn(&self, spec: &SpawnSpec) -> Result<u32> {
        let child = tokio::process::Command::new(&spec.program)
            .args(&spec.args)
            .env_clear()
            .envs(spec.env.vars())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| spawn_error(&spec.program, e))?;

        // Dropping the handle leaves the process running; tokio reaps it on exit.
        child.id().ok_or_else(|| {
            FleetError::Other(anyhow::anyhow!("{} exited immediately", spec.program))
        })
    }

    fn terminate(&self, pid: u32) -> Result<bool> {
        send_signal(pid, libc::SIGTERM)
    }
}

pub(crate) fn spawn_error(program: &str, e: std::io::Error) -> FleetError {
    if matches!(
        e.kind(),
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
    ) {
        FleetError::MissingBinary {
            binary: program.to_string(),
            source: e,
        }
    } else {
        FleetError::Io(e)
    }
}

fn send_signal(pid: u32, signal: libc::c_int) -> Result<bool> {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return Ok(false);
    };
    if pid <= 0 {
        return Ok(false);
    }
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid, signal) };
    if rc == 0 {
        return Ok(true);
    }
    let err = std::io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::ESRCH) => Ok(false),
        _ => Err(FleetError::Io(err)),
    }
}

/// Whether a process with this pid exists
pub fn is_alive(pid: u32) -> bool {
    match send_signal(pid, 0) {
        Ok(alive) => alive,
        // EPERM: exists but belongs to someone else
        Err(_) => true,
    }
}

/// A live process as seen through procfs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub args: Vec<String>,
    /// `WAYLAND_DISPLAY` from the process environment, when readable
    pub wayland_display: Option<String>,
}

impl ProcessInfo {
    /// File name of `argv[0]`
    pub fn program_name(&self) -> Option<&str> {
        self.args
            .first()
            .map(|arg0| arg0.rsplit('/').next().unwrap_or(arg0.as_str()))
    }

    /// Value following `flag` in the argument list
    pub fn arg_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

/// Enumerates processes under a procfs root
#[derive(Debug, Clone)]
pub struct ProcScanner {
    root: PathBuf,
}

impl Default for ProcScanner {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// All processes whose command line could be read. Processes that exit
    /// mid-scan are skipped.
    pub fn processes(&self) -> Result<Vec<ProcessInfo>> {
        let mut processes = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let Ok(entry) = entry else { continue };
            let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };
            let dir = entry.path();
            let Some(args) = read_nul_separated(&dir.join("cmdline")) else {
                continue;
            };
            if args.is_empty() {
                // kernel thread or zombie
                continue;
            }
            let wayland_display = read_nul_separated(&dir.join("environ")).and_then(|vars| {
                vars.into_iter()
                    .find_map(|v| v.strip_prefix("WAYLAND_DISPLAY=").map(str::to_string))
            });
            processes.push(ProcessInfo {
                pid,
                args,
                wayland_display,
            });
        }
        processes.sort_by_key(|p| p.pid);
        Ok(processes)
    }
}

fn read_nul_separated(path: &Path) -> Option<Vec<String>> {
    let raw = std::fs::read(path).ok()?;
    Some(
        raw.split(|b| *b == 0)
            .filter(|part| !part.is_empty())
            .map(|part| String::from_utf8_lossy(part).into_owned())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_process(root: &Path, pid: u32, args: &[&str], environ: &[&str]) {
        let dir = root.join(pid.to_string());
        std::fs::create_dir_all(&dir).unwrap();
        let mut cmdline = args.join("\0");
        cmdline.push('\0');
        std::fs::write(dir.join("cmdline"), cmdline).unwrap();
        std::fs::write(dir.join("environ"), environ.join("\0")).unwrap();
    }

    #[test]
    fn scanner_reads_args_and_display() {
        let root = tempfile::tempdir().unwrap();
        fake_process(
            root.path(),
            42,
            &["/usr/bin/kwin_wayland", "--socket", "cell-3"],
            &["HOME=/root", "WAYLAND_DISPLAY=cell-parent"],
        );
        fake_process(root.path(), 7, &["swaybg"], &[]);
        std::fs::create_dir_all(root.path().join("self")).unwrap();
        std::fs::create_dir_all(root.path().join("99")).unwrap();

        let processes = ProcScanner::new(root.path()).processes().unwrap();
        assert_eq!(processes.len(), 2);
        assert_eq!(processes[0].pid, 7);
        assert_eq!(processes[0].wayland_display, None);

        let kwin = &processes[1];
        assert_eq!(kwin.program_name(), Some("kwin_wayland"));
        assert_eq!(kwin.arg_value("--socket"), Some("cell-3"));
        assert_eq!(kwin.wayland_display.as_deref(), Some("cell-parent"));
    }

    #[test]
    fn display_override_does_not_touch_source() {
        let mut base = SpawnEnv::default();
        base.set("WAYLAND_DISPLAY", "wayland-0");
        let cell = base.for_display("cell-1");
        assert_eq!(cell.get("WAYLAND_DISPLAY"), Some("cell-1"));
        assert_eq!(base.get("WAYLAND_DISPLAY"), Some("wayland-0"));
    }

    #[test]
    fn terminating_a_missing_pid_is_not_an_error() {
        // pid_max on Linux is at most 2^22
        assert!(!SystemLauncher.terminate(4_194_304 + 17).unwrap());
        assert!(!is_alive(4_194_304 + 17));
    }
}
