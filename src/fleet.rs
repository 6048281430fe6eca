//! Compositor fleet manager
//!
//! Spawns the parent compositor (the virtual screen) and one nested child
//! compositor per cell. Children connect to the parent socket as clients,
//! which makes each of them a window on it, and listen on their own socket
//! so painters can address them individually.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::core::grid::Grid;
use crate::core::registry::{CompositorHandle, FleetRegistry};
use crate::error::{FleetError, Result};
use crate::process::{Launcher, ProcScanner, SpawnEnv, SpawnSpec};

/// How often to look for the parent socket while it starts
const SOCKET_POLL: Duration = Duration::from_millis(50);

pub struct FleetManager {
    launcher: Arc<dyn Launcher>,
    config: Config,
}

impl FleetManager {
    pub fn new(launcher: Arc<dyn Launcher>, config: Config) -> Self {
        Self { launcher, config }
    }

    fn compositor(&self, socket: &str, width: u32, height: u32, env: SpawnEnv) -> SpawnSpec {
        SpawnSpec::new(&self.config.compositor, env).args([
            "--socket".to_string(),
            socket.to_string(),
            "--width".to_string(),
            width.to_string(),
            "--height".to_string(),
            height.to_string(),
        ])
    }

    /// Launch the parent compositor on the parent socket
    pub fn spawn_parent(&self, width: u32, height: u32, env: &SpawnEnv) -> Result<u32> {
        let socket = self.config.parent_socket();
        let pid = self
            .launcher
            .spawn(&self.compositor(&socket, width, height, env.clone()))?;
        tracing::info!("Parent compositor {} on {} ({}x{})", pid, socket, width, height);
        Ok(pid)
    }

    /// Launch the child compositor of cell `index`, nested in the parent
    pub fn spawn_child(
        &self,
        index: usize,
        cell_size: u32,
        env: &SpawnEnv,
    ) -> Result<CompositorHandle> {
        let socket = self.config.cell_socket(index);
        let mut child_env = env.for_display(&self.config.parent_socket());
        child_env.set("QT_QPA_PLATFORM", "wayland");

        let pid = self
            .launcher
            .spawn(&self.compositor(&socket, cell_size, cell_size, child_env))?;
        tracing::debug!("Cell {} compositor {} on {}", index, pid, socket);
        Ok(CompositorHandle { index, pid, socket })
    }

    /// Paint the parent background so unplaced cells stand out
    pub fn paint_backdrop(&self, env: &SpawnEnv) -> Result<u32> {
        let env = env.for_display(&self.config.parent_socket());
        let spec = SpawnSpec::new(&self.config.painter, env).args([
            "-c",
            self.config.parent_color.as_str(),
            "-m",
            "solid_color",
        ]);
        self.launcher.spawn(&spec)
    }

    /// Wait for the parent socket to appear under `XDG_RUNTIME_DIR`.
    /// Without a runtime dir this falls back to a short fixed delay.
    pub async fn wait_for_parent(&self, env: &SpawnEnv) -> Result<()> {
        let Some(runtime_dir) = env.get("XDG_RUNTIME_DIR") else {
            tracing::debug!("No XDG_RUNTIME_DIR, giving the parent compositor a moment");
            tokio::time::sleep(SOCKET_POLL * 10).await;
            return Ok(());
        };
        let socket = PathBuf::from(runtime_dir).join(self.config.parent_socket());
        let deadline = tokio::time::Instant::now() + self.config.settle_timeout();

        loop {
            if tokio::fs::try_exists(&socket).await.unwrap_or(false) {
                tracing::debug!("Parent socket {} is up", socket.display());
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(FleetError::ParentUnavailable { socket });
            }
            tokio::time::sleep(SOCKET_POLL).await;
        }
    }

    /// Spawn the parent and every child, throttled by the spawn delay
    pub async fn spawn_all(&self, grid: &Grid, env: &SpawnEnv) -> Result<FleetRegistry> {
        self.spawn_parent(self.config.display_width, self.config.display_height, env)?;
        self.wait_for_parent(env).await?;
        self.paint_backdrop(env)?;

        tracing::info!("Creating {} cell compositors", grid.pixel_count());
        let mut registry = FleetRegistry::new();
        for index in grid.indices() {
            registry.push(self.spawn_child(index, grid.cell_size(), env)?);
            tokio::time::sleep(self.config.spawn_delay()).await;
        }
        Ok(registry)
    }

    /// Rebuild the registry of an already running fleet from the process table
    pub fn discover(&self, grid: &Grid, scanner: &ProcScanner) -> Result<FleetRegistry> {
        let compositor = binary_name(&self.config.compositor);
        let found = scanner
            .processes()?
            .into_iter()
            .filter(|p| p.program_name() == Some(compositor))
            .filter_map(|p| {
                let socket = p.arg_value("--socket")?.to_string();
                let index = socket.strip_prefix(&self.config.socket_prefix)?.parse().ok()?;
                Some(CompositorHandle {
                    index,
                    pid: p.pid,
                    socket,
                })
            });
        let registry = FleetRegistry::from_discovered(grid.pixel_count(), found)?;
        tracing::info!("Found {} running cell compositors", registry.len());
        Ok(registry)
    }
}

/// File name part of a configured binary
pub(crate) fn binary_name(binary: &str) -> &str {
    binary.rsplit('/').next().unwrap_or(binary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingLauncher {
        spawned: Mutex<Vec<SpawnSpec>>,
    }

    impl Launcher for RecordingLauncher {
        fn spawn(&self, spec: &SpawnSpec) -> Result<u32> {
            let mut spawned = self.spawned.lock().unwrap();
            spawned.push(spec.clone());
            Ok(1000 + spawned.len() as u32)
        }

        fn terminate(&self, _pid: u32) -> Result<bool> {
            Ok(true)
        }
    }

    fn fast_config() -> Config {
        Config {
            display_width: 96,
            display_height: 64,
            spawn_delay_ms: 0,
            settle_timeout_ms: 20,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn spawns_parent_backdrop_and_one_child_per_cell() {
        let launcher = Arc::new(RecordingLauncher::default());
        let config = fast_config();
        let grid = config.grid().unwrap();
        let fleet = FleetManager::new(launcher.clone(), config);

        let mut env = SpawnEnv::default();
        env.set("WAYLAND_DISPLAY", "wayland-0");
        let registry = fleet.spawn_all(&grid, &env).await.unwrap();

        assert_eq!(registry.len(), 6);
        assert_eq!(registry.get(0).unwrap().pid, 1003);

        let spawned = launcher.spawned.lock().unwrap();
        assert_eq!(spawned.len(), 2 + 6);

        let parent = &spawned[0];
        assert_eq!(parent.args, ["--socket", "cell-parent", "--width", "96", "--height", "64"]);
        assert_eq!(parent.env.get("WAYLAND_DISPLAY"), Some("wayland-0"));

        let backdrop = &spawned[1];
        assert_eq!(backdrop.program, "swaybg");
        assert_eq!(backdrop.env.get("WAYLAND_DISPLAY"), Some("cell-parent"));

        let child = &spawned[2 + 4];
        assert_eq!(child.args, ["--socket", "cell-4", "--width", "32", "--height", "32"]);
        assert_eq!(child.env.get("WAYLAND_DISPLAY"), Some("cell-parent"));
        assert_eq!(child.env.get("QT_QPA_PLATFORM"), Some("wayland"));
        assert_eq!(registry.get(4).unwrap().socket, "cell-4");
    }

    #[tokio::test]
    async fn missing_parent_socket_aborts_spawning() {
        let runtime_dir = tempfile::tempdir().unwrap();
        let launcher = Arc::new(RecordingLauncher::default());
        let config = fast_config();
        let grid = config.grid().unwrap();
        let fleet = FleetManager::new(launcher.clone(), config);

        let mut env = SpawnEnv::default();
        env.set("XDG_RUNTIME_DIR", runtime_dir.path().to_str().unwrap());
        let err = fleet.spawn_all(&grid, &env).await.unwrap_err();

        match err {
            FleetError::ParentUnavailable { socket } => {
                assert_eq!(socket, runtime_dir.path().join("cell-parent"));
            }
            other => panic!("unexpected error: {}", other),
        }
        // Only the parent was launched; no children into a dead socket.
        assert_eq!(launcher.spawned.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn parent_socket_in_runtime_dir_counts_as_ready() {
        let runtime_dir = tempfile::tempdir().unwrap();
        std::fs::write(runtime_dir.path().join("cell-parent"), "").unwrap();
        let fleet = FleetManager::new(Arc::new(RecordingLauncher::default()), fast_config());

        let mut env = SpawnEnv::default();
        env.set("XDG_RUNTIME_DIR", runtime_dir.path().to_str().unwrap());
        fleet.wait_for_parent(&env).await.unwrap();
    }

    fn fake_process(root: &std::path::Path, pid: u32, args: &[&str]) {
        let dir = root.join(pid.to_string());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("cmdline"), args.join("\0")).unwrap();
    }

    #[test]
    fn discovers_running_fleet() {
        let root = tempfile::tempdir().unwrap();
        let config = Config {
            display_width: 64,
            display_height: 32,
            ..Config::default()
        };
        for (pid, socket) in [(11, "cell-0"), (12, "cell-1"), (10, "cell-parent")] {
            fake_process(root.path(), pid, &["/usr/bin/kwin_wayland", "--socket", socket]);
        }
        fake_process(root.path(), 13, &["kwin_wayland", "--socket", "wayland-1"]);
        fake_process(root.path(), 14, &["vim", "--socket", "cell-1"]);

        let fleet = FleetManager::new(Arc::new(RecordingLauncher::default()), config.clone());
        let registry = fleet
            .discover(&config.grid().unwrap(), &ProcScanner::new(root.path()))
            .unwrap();
        assert_eq!(registry.pids(), vec![11, 12]);
    }

    #[test]
    fn discovery_without_fleet_is_incomplete() {
        let root = tempfile::tempdir().unwrap();
        let config = Config::default();
        let fleet = FleetManager::new(Arc::new(RecordingLauncher::default()), config.clone());
        let err = fleet
            .discover(&config.grid().unwrap(), &ProcScanner::new(root.path()))
            .unwrap_err();
        assert!(matches!(err, FleetError::FleetIncomplete { missing: 300, .. }));
    }
}
