//! Window placement backend abstraction
//!
//! The placement coordinator only needs to find a cell window by the pid of
//! its compositor and move it. How that is done depends on the parent
//! compositor; [`kwin::KWinBackend`] drives KWin's scripting interface.

pub mod kwin;

use async_trait::async_trait;

use crate::core::grid::Geometry;
use crate::error::Result;

/// A window on the parent display, addressed by its owning process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowHandle {
    pub pid: u32,
}

/// Trait for parent compositor placement implementations
#[async_trait]
pub trait PlacementBackend: Send + Sync {
    /// Pids of every window the parent compositor currently manages
    async fn list_window_pids(&self) -> Result<Vec<u32>>;

    /// Find the window owned by `pid`
    async fn find_by_pid(&self, pid: u32) -> Result<Option<WindowHandle>> {
        let pids = self.list_window_pids().await?;
        Ok(pids.contains(&pid).then_some(WindowHandle { pid }))
    }

    /// Move the window of cell `cell` to `geometry`
    async fn reposition(
        &self,
        cell: usize,
        window: &WindowHandle,
        geometry: Geometry,
    ) -> Result<()>;
}
