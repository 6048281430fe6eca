//! Frames and per-cell diffs

use crate::error::{FleetError, Result};

/// One full-grid snapshot: `true` is a white cell, `false` a black one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    cells: Vec<bool>,
}

impl Frame {
    pub fn new(cells: Vec<bool>) -> Self {
        Self { cells }
    }

    /// A frame with every cell set to `color`
    pub fn filled(len: usize, color: bool) -> Self {
        Self {
            cells: vec![color; len],
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[bool] {
        &self.cells
    }

    pub fn get(&self, index: usize) -> Option<bool> {
        self.cells.get(index).copied()
    }
}

/// Per-cell update set between two frames; `None` means unchanged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    updates: Vec<Option<bool>>,
}

impl Diff {
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn updates(&self) -> &[Option<bool>] {
        &self.updates
    }

    /// `(index, new_color)` for every changed cell, in index order
    pub fn changes(&self) -> impl Iterator<Item = (usize, bool)> + '_ {
        self.updates
            .iter()
            .enumerate()
            .filter_map(|(index, update)| update.map(|color| (index, color)))
    }

    pub fn change_count(&self) -> usize {
        self.updates.iter().filter(|u| u.is_some()).count()
    }

    /// Apply this diff on top of `base`, producing the frame it was computed towards
    pub fn apply_to(&self, base: &Frame) -> Result<Frame> {
        check_shape(base.len(), self.len())?;
        let cells = base
            .cells
            .iter()
            .zip(&self.updates)
            .map(|(old, update)| update.unwrap_or(*old))
            .collect();
        Ok(Frame { cells })
    }
}

/// Compute the cells that changed from `previous` to `current`.
///
/// Without a previous frame every cell counts as changed.
pub fn diff(previous: Option<&Frame>, current: &Frame) -> Result<Diff> {
    let updates = match previous {
        None => current.cells.iter().map(|c| Some(*c)).collect(),
        Some(previous) => {
            check_shape(previous.len(), current.len())?;
            previous
                .cells
                .iter()
                .zip(&current.cells)
                .map(|(old, new)| (old != new).then_some(*new))
                .collect()
        }
    };
    Ok(Diff { updates })
}

fn check_shape(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(FleetError::ShapeMismatch { expected, actual });
    }
    Ok(())
}
