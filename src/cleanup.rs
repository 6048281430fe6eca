//! Teardown of everything a run may have left behind
//!
//! Matches processes by what they are (the compositor or painter binary)
//! and whether they belong to one of our sockets, so leftovers from a
//! crashed run are found as well. Processes that vanish before they are
//! signalled are ignored, which makes cleanup idempotent.

use crate::config::Config;
use crate::error::Result;
use crate::fleet::binary_name;
use crate::process::{Launcher, ProcScanner, ProcessInfo};
use crate::session::SessionDescriptor;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Compositor and painter pids that were signalled
    pub terminated: Vec<u32>,
    /// Bus daemon pid that was signalled
    pub bus_daemon: Option<u32>,
    /// Whether a session descriptor was deleted
    pub descriptor_removed: bool,
}

impl CleanupReport {
    pub fn is_noop(&self) -> bool {
        self.terminated.is_empty() && self.bus_daemon.is_none() && !self.descriptor_removed
    }
}

/// Whether `process` is one of our compositors or painters
pub fn is_stray(config: &Config, process: &ProcessInfo) -> bool {
    let ours = |socket: &str| socket.starts_with(&config.socket_prefix);
    match process.program_name() {
        Some(name) if name == binary_name(&config.compositor) => {
            process.arg_value("--socket").is_some_and(ours)
        }
        Some(name) if name == binary_name(&config.painter) => {
            process.wayland_display.as_deref().is_some_and(ours)
        }
        _ => false,
    }
}

/// Terminate stray compositors and painters, then the persisted bus daemon
pub fn kill_stray(
    config: &Config,
    scanner: &ProcScanner,
    launcher: &dyn Launcher,
) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();
    let own_pid = std::process::id();

    let processes = match scanner.processes() {
        Ok(processes) => processes,
        Err(e) => {
            tracing::warn!("Could not scan processes: {}", e);
            Vec::new()
        }
    };

    for process in processes.iter().filter(|p| p.pid != own_pid && is_stray(config, p)) {
        match launcher.terminate(process.pid) {
            Ok(true) => {
                tracing::debug!("Terminated {} ({:?})", process.pid, process.program_name());
                report.terminated.push(process.pid);
            }
            Ok(false) => {}
            Err(e) => tracing::warn!("Could not terminate {}: {}", process.pid, e),
        }
    }

    let path = config.session_path();
    if path.exists() {
        match SessionDescriptor::load(&path) {
            Ok(Some(descriptor)) => {
                if let Some(pid) = descriptor.daemon_pid() {
                    match launcher.terminate(pid) {
                        Ok(true) => report.bus_daemon = Some(pid),
                        Ok(false) => {}
                        Err(e) => tracing::warn!("Could not terminate bus daemon {}: {}", pid, e),
                    }
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Ignoring unreadable session descriptor: {}", e),
        }
        match std::fs::remove_file(&path) {
            Ok(()) => report.descriptor_removed = true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    tracing::info!(
        "Cleanup: {} processes, bus daemon {:?}, descriptor removed: {}",
        report.terminated.len(),
        report.bus_daemon,
        report.descriptor_removed
    );
    Ok(report)
}
