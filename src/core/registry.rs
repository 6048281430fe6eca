//! Compositor registry - the handles of every spawned cell compositor
//!
//! Built once by the fleet manager, then shared read-only with placement
//! and recoloring.

use std::collections::HashMap;

use crate::error::{FleetError, Result};

/// One child compositor owning exactly one cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositorHandle {
    /// Cell index
    pub index: usize,
    /// Process id of the child compositor
    pub pid: u32,
    /// Wayland socket the child listens on
    pub socket: String,
}

/// Handles ordered by cell index
#[derive(Debug, Clone, Default)]
pub struct FleetRegistry {
    handles: Vec<CompositorHandle>,
}

impl FleetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the handle of the next cell. Handles must arrive in index order.
    pub fn push(&mut self, handle: CompositorHandle) {
        debug_assert_eq!(handle.index, self.handles.len());
        self.handles.push(handle);
    }

    /// Rebuild a registry from `(index, pid, socket)` entries found on a live
    /// system. Every index in `0..pixel_count` must be present.
    pub fn from_discovered(
        pixel_count: usize,
        found: impl IntoIterator<Item = CompositorHandle>,
    ) -> Result<Self> {
        let mut by_index: HashMap<usize, CompositorHandle> = HashMap::new();
        for handle in found {
            if handle.index < pixel_count {
                // Keep the newest process if a socket was reused.
                let newer = by_index
                    .get(&handle.index)
                    .is_none_or(|existing| existing.pid < handle.pid);
                if newer {
                    by_index.insert(handle.index, handle);
                }
            }
        }

        let missing = (0..pixel_count).filter(|i| !by_index.contains_key(i)).count();
        if missing > 0 {
            return Err(FleetError::FleetIncomplete {
                missing,
                total: pixel_count,
            });
        }

        let mut registry = Self::new();
        for index in 0..pixel_count {
            if let Some(handle) = by_index.remove(&index) {
                registry.push(handle);
            }
        }
        Ok(registry)
    }

    pub fn get(&self, index: usize) -> Option<&CompositorHandle> {
        self.handles.get(index)
    }

    pub fn handles(&self) -> &[CompositorHandle] {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.handles.iter().map(|h| h.pid).collect()
    }
}
