//! KWin backend for a nested kwin_wayland parent
//!
//! KWin only accepts scripts as files, so every operation writes a small
//! JavaScript snippet to the scratch directory, loads it through the
//! `org.kde.kwin.Scripting` D-Bus interface and starts it.
//!
//! Scripts cannot return values over that interface. To enumerate windows,
//! the script calls back into a probe object served on our own connection
//! (`callDBus`) with a comma separated pid list.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use zbus::Connection;

use super::{PlacementBackend, WindowHandle};
use crate::core::grid::Geometry;
use crate::error::{FleetError, Result};

const KWIN_SERVICE: &str = "org.kde.KWin";
const SCRIPTING_PATH: &str = "/Scripting";
const SCRIPTING_INTERFACE: &str = "org.kde.kwin.Scripting";

const PROBE_PATH: &str = "/org/pixelfleet/WindowProbe";
const PROBE_INTERFACE: &str = "org.pixelfleet.WindowProbe";

/// How long a probe script may take to call back
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
/// Time a started script gets before it is unloaded
const SCRIPT_RUN_DELAY: Duration = Duration::from_millis(50);

/// KDE 6 exposes windowList(), KDE 5 clientList()
const WINDOW_LIST_JS: &str = "(typeof workspace.windowList === 'function' \
     ? workspace.windowList() : workspace.clientList())";

/// Receives pid reports from probe scripts
struct WindowProbe {
    tx: mpsc::UnboundedSender<String>,
}

#[zbus::interface(name = "org.pixelfleet.WindowProbe")]
impl WindowProbe {
    async fn report(&self, pids: String) {
        let _ = self.tx.send(pids);
    }
}

/// Placement through KWin's scripting D-Bus API
pub struct KWinBackend {
    dbus: Connection,
    scratch_dir: PathBuf,
    script_prefix: String,
    probe_rx: Mutex<mpsc::UnboundedReceiver<String>>,
    /// Pids seen by the most recent probe
    known: std::sync::Mutex<HashSet<u32>>,
}

impl KWinBackend {
    /// Create a backend on the fleet's bus connection and register the probe
    pub async fn new(dbus: Connection, scratch_dir: &Path, script_prefix: &str) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        dbus.object_server().at(PROBE_PATH, WindowProbe { tx }).await?;

        Ok(Self {
            dbus,
            scratch_dir: scratch_dir.to_path_buf(),
            script_prefix: script_prefix.to_string(),
            probe_rx: Mutex::new(rx),
            known: std::sync::Mutex::new(HashSet::new()),
        })
    }

    fn script_path(&self, name: &str) -> PathBuf {
        self.scratch_dir.join(format!("{}{}.js", self.script_prefix, name))
    }

    /// Write, load and start a script under the plugin name `name`
    async fn run_script(&self, name: &str, source: &str) -> Result<()> {
        let script_path = self.script_path(name);
        tokio::fs::write(&script_path, source).await?;
        let script_path_str = script_path.to_string_lossy().into_owned();
        let plugin = format!("{}{}", self.script_prefix, name);

        // A plugin name can only be loaded once; drop any leftover.
        let _ = self
            .dbus
            .call_method(
                Some(KWIN_SERVICE),
                SCRIPTING_PATH,
                Some(SCRIPTING_INTERFACE),
                "unloadScript",
                &(plugin.as_str(),),
            )
            .await;

        let reply = self
            .dbus
            .call_method(
                Some(KWIN_SERVICE),
                SCRIPTING_PATH,
                Some(SCRIPTING_INTERFACE),
                "loadScript",
                &(script_path_str.as_str(), plugin.as_str()),
            )
            .await?;

        let script_id: i32 = reply.body().deserialize()?;
        if script_id < 0 {
            return Err(FleetError::bus(format!(
                "KWin refused script {}",
                script_path.display()
            )));
        }

        self.dbus
            .call_method(
                Some(KWIN_SERVICE),
                SCRIPTING_PATH,
                Some(SCRIPTING_INTERFACE),
                "start",
                &(),
            )
            .await?;

        tokio::time::sleep(SCRIPT_RUN_DELAY).await;

        // Unload (ignore errors); the file stays and is overwritten next run.
        let _ = self
            .dbus
            .call_method(
                Some(KWIN_SERVICE),
                SCRIPTING_PATH,
                Some(SCRIPTING_INTERFACE),
                "unloadScript",
                &(plugin.as_str(),),
            )
            .await;

        Ok(())
    }
}

/// Script reporting every window pid to the probe served by `unique_name`
fn probe_script(unique_name: &str) -> String {
    format!(
        "callDBus('{}', '{}', '{}', 'Report', \
         {}.map(function (w) {{ return String(w.pid); }}).join(','));",
        unique_name, PROBE_PATH, PROBE_INTERFACE, WINDOW_LIST_JS
    )
}

/// Script moving the window owned by `pid`, keeping its size
fn move_script(pid: u32, geometry: Geometry) -> String {
    format!(
        "{}.some(function (w) {{ if (w.pid !== {}) return false; \
         w.frameGeometry = {{x: {}, y: {}, width: w.width, height: w.height}}; return true; }});",
        WINDOW_LIST_JS, pid, geometry.x, geometry.y
    )
}

fn parse_pid_report(report: &str) -> Vec<u32> {
    report
        .split(',')
        .filter_map(|pid| pid.trim().parse().ok())
        .collect()
}

#[async_trait]
impl PlacementBackend for KWinBackend {
    async fn list_window_pids(&self) -> Result<Vec<u32>> {
        let unique_name = self
            .dbus
            .unique_name()
            .map(|name| name.to_string())
            .ok_or_else(|| FleetError::bus("connection has no unique name"))?;

        // One probe at a time so reports cannot be mixed up.
        let mut rx = self.probe_rx.lock().await;
        while rx.try_recv().is_ok() {}

        self.run_script("probe", &probe_script(&unique_name)).await?;

        let report = tokio::time::timeout(PROBE_TIMEOUT, rx.recv())
            .await
            .map_err(|_| FleetError::bus("window probe did not report back"))?
            .ok_or_else(|| FleetError::bus("window probe channel closed"))?;

        let pids = parse_pid_report(&report);
        tracing::debug!("KWin reports {} windows", pids.len());
        if let Ok(mut known) = self.known.lock() {
            *known = pids.iter().copied().collect();
        }
        Ok(pids)
    }

    async fn find_by_pid(&self, pid: u32) -> Result<Option<WindowHandle>> {
        let cached = self.known.lock().map(|k| k.contains(&pid)).unwrap_or(false);
        if cached {
            return Ok(Some(WindowHandle { pid }));
        }
        let pids = self.list_window_pids().await?;
        Ok(pids.contains(&pid).then_some(WindowHandle { pid }))
    }

    async fn reposition(
        &self,
        cell: usize,
        window: &WindowHandle,
        geometry: Geometry,
    ) -> Result<()> {
        self.run_script(&format!("move-{}", cell), &move_script(window.pid, geometry))
            .await?;
        tracing::debug!(
            "Moved window of pid {} (cell {}) to {},{}",
            window.pid,
            cell,
            geometry.x,
            geometry.y
        );
        Ok(())
    }
}
