//! Window placement coordinator
//!
//! Waits until the parent compositor sees every cell window, then moves all
//! of them concurrently and returns only when every move has finished.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::backend::PlacementBackend;
use crate::core::grid::Grid;
use crate::core::registry::FleetRegistry;
use crate::error::{FleetError, Result};

/// Outcome of one `place_all` pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlacementReport {
    /// Cells whose window was moved
    pub placed: usize,
    /// Cells whose window never became visible
    pub missing: Vec<usize>,
    /// Cells whose move call failed
    pub failed: Vec<usize>,
}

pub struct PlacementCoordinator {
    backend: Arc<dyn PlacementBackend>,
    grid: Grid,
    max_workers: usize,
    settle_timeout: Duration,
    settle_poll: Duration,
}

impl PlacementCoordinator {
    pub fn new(
        backend: Arc<dyn PlacementBackend>,
        grid: Grid,
        max_workers: usize,
        settle_timeout: Duration,
        settle_poll: Duration,
    ) -> Self {
        Self {
            backend,
            grid,
            max_workers: max_workers.max(1),
            settle_timeout,
            settle_poll,
        }
    }

    /// Poll the backend until every pid owns a window or the settle timeout
    /// elapses. Returns the pids still missing. Fails if the backend never
    /// managed to enumerate windows at all.
    pub async fn wait_until_visible(&self, pids: &[u32]) -> Result<Vec<u32>> {
        let mut pending: Vec<u32> = pids.to_vec();
        if pending.is_empty() {
            return Ok(pending);
        }
        let deadline = tokio::time::Instant::now() + self.settle_timeout;
        let mut enumerated = false;
        let mut last_error = None;

        loop {
            match self.backend.list_window_pids().await {
                Ok(visible) => {
                    enumerated = true;
                    let visible: HashSet<u32> = visible.into_iter().collect();
                    pending.retain(|pid| !visible.contains(pid));
                }
                Err(e) => {
                    tracing::warn!("Window enumeration failed: {}", e);
                    last_error = Some(e);
                }
            }

            if pending.is_empty() {
                tracing::info!("All {} cell windows are visible", pids.len());
                return Ok(pending);
            }
            if tokio::time::Instant::now() + self.settle_poll > deadline {
                if !enumerated {
                    return Err(FleetError::PlacementFailed {
                        total: pids.len(),
                        reason: last_error.map_or_else(
                            || "window enumeration never ran".to_string(),
                            |e| e.to_string(),
                        ),
                    });
                }
                tracing::warn!(
                    "{} of {} cell windows still not visible after {:?}",
                    pending.len(),
                    pids.len(),
                    self.settle_timeout
                );
                return Ok(pending);
            }
            tracing::debug!("Waiting for {} cell windows", pending.len());
            tokio::time::sleep(self.settle_poll).await;
        }
    }

    /// Move every cell window to its grid position. Fails when not a single
    /// window of a non-empty fleet could be placed.
    pub async fn place_all(&self, registry: &FleetRegistry) -> Result<PlacementReport> {
        let not_visible: HashSet<u32> = self
            .wait_until_visible(&registry.pids())
            .await?
            .into_iter()
            .collect();

        let mut report = PlacementReport::default();
        let permits = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks = JoinSet::new();

        for handle in registry.handles() {
            if not_visible.contains(&handle.pid) {
                report.missing.push(handle.index);
                continue;
            }

            let backend = Arc::clone(&self.backend);
            let permits = Arc::clone(&permits);
            let geometry = self.grid.geometry(handle.index);
            let (index, pid) = (handle.index, handle.pid);

            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let outcome = match backend.find_by_pid(pid).await {
                    Ok(Some(window)) => backend
                        .reposition(index, &window, geometry)
                        .await
                        .map(|_| true),
                    Ok(None) => Ok(false),
                    Err(e) => Err(e),
                };
                (index, outcome)
            });
        }

        let mut last_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(true))) => report.placed += 1,
                Ok((index, Ok(false))) => report.missing.push(index),
                Ok((index, Err(e))) => {
                    tracing::warn!("Placing cell {} failed: {}", index, e);
                    report.failed.push(index);
                    last_error = Some(e);
                }
                Err(e) => tracing::warn!("Placement task aborted: {}", e),
            }
        }

        report.missing.sort_unstable();
        report.failed.sort_unstable();
        tracing::info!(
            "Placed {} windows ({} missing, {} failed)",
            report.placed,
            report.missing.len(),
            report.failed.len()
        );

        if report.placed == 0 && !registry.is_empty() {
            return Err(FleetError::PlacementFailed {
                total: registry.len(),
                reason: last_error.map_or_else(
                    || "no cell window became visible".to_string(),
                    |e| e.to_string(),
                ),
            });
        }
        Ok(report)
    }
}
