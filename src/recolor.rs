//! Recoloring: paint changed cells
//!
//! Each recolor launches a fresh painter process on the cell's socket. Once
//! it is launched, the painter it replaces is terminated, so at most one
//! painter per cell stays alive.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::core::frame::Diff;
use crate::core::registry::FleetRegistry;
use crate::error::{FleetError, Result};
use crate::process::{Launcher, SpawnEnv, SpawnSpec};

/// Hex RGB code of a cell color
pub fn color_code(white: bool) -> &'static str {
    if white { "FFFFFF" } else { "000000" }
}

/// Outcome of applying one diff
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Painters launched
    pub dispatched: usize,
    /// Painters that failed to launch
    pub failed: usize,
}

pub struct Recolorer {
    launcher: Arc<dyn Launcher>,
    painter: String,
    env: SpawnEnv,
    max_workers: usize,
    /// Live painter pid per cell
    painters: Arc<Mutex<HashMap<usize, u32>>>,
}

impl Recolorer {
    pub fn new(
        launcher: Arc<dyn Launcher>,
        painter: impl Into<String>,
        env: SpawnEnv,
        max_workers: usize,
    ) -> Self {
        Self {
            launcher,
            painter: painter.into(),
            env,
            max_workers: max_workers.max(1),
            painters: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Launch a painter for every changed cell and wait until all launches
    /// have returned. Rendering by the painters is not awaited.
    pub async fn apply(&self, registry: &FleetRegistry, diff: &Diff) -> Result<ApplyReport> {
        if diff.len() != registry.len() {
            return Err(FleetError::ShapeMismatch {
                expected: registry.len(),
                actual: diff.len(),
            });
        }

        let permits = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks = JoinSet::new();

        for (index, white) in diff.changes() {
            let Some(handle) = registry.get(index) else { continue };
            let spec = SpawnSpec::new(&self.painter, self.env.for_display(&handle.socket))
                .args(["-c", color_code(white), "-m", "solid_color"]);
            let launcher = Arc::clone(&self.launcher);
            let painters = Arc::clone(&self.painters);
            let permits = Arc::clone(&permits);

            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let pid = launcher.spawn(&spec)?;
                let previous = painters
                    .lock()
                    .map_err(|_| anyhow::anyhow!("painter table poisoned"))?
                    .insert(index, pid);
                if let Some(previous) = previous {
                    // Already gone is fine.
                    if let Err(e) = launcher.terminate(previous) {
                        tracing::debug!(
                            "Could not retire painter {} of cell {}: {}",
                            previous,
                            index,
                            e
                        );
                    }
                }
                Ok::<usize, FleetError>(index)
            });
        }

        let mut report = ApplyReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(_)) => report.dispatched += 1,
                Ok(Err(e @ FleetError::MissingBinary { .. })) => return Err(e),
                Ok(Err(e)) => {
                    tracing::warn!("Recolor failed: {}", e);
                    report.failed += 1;
                }
                Err(e) => {
                    tracing::warn!("Recolor task aborted: {}", e);
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frame::{Frame, diff};
    use crate::core::registry::CompositorHandle;

    #[derive(Default)]
    struct RecordingLauncher {
        spawned: Mutex<Vec<SpawnSpec>>,
        terminated: Mutex<Vec<u32>>,
    }

    impl Launcher for RecordingLauncher {
        fn spawn(&self, spec: &SpawnSpec) -> Result<u32> {
            let mut spawned = self.spawned.lock().unwrap();
            spawned.push(spec.clone());
            Ok(5000 + spawned.len() as u32)
        }

        fn terminate(&self, pid: u32) -> Result<bool> {
            self.terminated.lock().unwrap().push(pid);
            Ok(true)
        }
    }

    fn registry(count: usize) -> FleetRegistry {
        let mut registry = FleetRegistry::new();
        for index in 0..count {
            registry.push(CompositorHandle {
                index,
                pid: 100 + index as u32,
                socket: format!("cell-{}", index),
            });
        }
        registry
    }

    #[tokio::test]
    async fn paints_only_changed_cells_on_their_socket() {
        let launcher = Arc::new(RecordingLauncher::default());
        let recolorer = Recolorer::new(launcher.clone(), "swaybg", SpawnEnv::default(), 2);
        let registry = registry(4);

        let before = Frame::new(vec![true, true, false, false]);
        let after = Frame::new(vec![true, false, false, true]);
        let report = recolorer
            .apply(&registry, &diff(Some(&before), &after).unwrap())
            .await
            .unwrap();
        assert_eq!(report, ApplyReport { dispatched: 2, failed: 0 });

        let mut spawned = launcher.spawned.lock().unwrap().clone();
        spawned.sort_by(|a, b| a.env.get("WAYLAND_DISPLAY").cmp(&b.env.get("WAYLAND_DISPLAY")));
        assert_eq!(spawned[0].env.get("WAYLAND_DISPLAY"), Some("cell-1"));
        assert_eq!(spawned[0].args, ["-c", "000000", "-m", "solid_color"]);
        assert_eq!(spawned[1].env.get("WAYLAND_DISPLAY"), Some("cell-3"));
        assert_eq!(spawned[1].args, ["-c", "FFFFFF", "-m", "solid_color"]);
    }

    #[tokio::test]
    async fn repainting_retires_previous_painter() {
        let launcher = Arc::new(RecordingLauncher::default());
        let recolorer = Recolorer::new(launcher.clone(), "swaybg", SpawnEnv::default(), 4);
        let registry = registry(3);

        let white = Frame::filled(3, true);
        let black = Frame::filled(3, false);
        recolorer.apply(&registry, &diff(None, &white).unwrap()).await.unwrap();
        assert!(launcher.terminated.lock().unwrap().is_empty());

        recolorer
            .apply(&registry, &diff(Some(&white), &black).unwrap())
            .await
            .unwrap();
        let mut terminated = launcher.terminated.lock().unwrap().clone();
        terminated.sort_unstable();
        assert_eq!(terminated, vec![5001, 5002, 5003]);

        // The next repaint retires the painters started just now.
        recolorer
            .apply(&registry, &diff(Some(&black), &white).unwrap())
            .await
            .unwrap();
        let mut terminated = launcher.terminated.lock().unwrap().clone();
        terminated.sort_unstable();
        assert_eq!(terminated, vec![5001, 5002, 5003, 5004, 5005, 5006]);
    }

    #[tokio::test]
    async fn diff_must_match_fleet_size() {
        let launcher = Arc::new(RecordingLauncher::default());
        let recolorer = Recolorer::new(launcher, "swaybg", SpawnEnv::default(), 1);
        let err = recolorer
            .apply(&registry(3), &diff(None, &Frame::filled(4, true)).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::ShapeMismatch { expected: 3, actual: 4 }));
    }
}
