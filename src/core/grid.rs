//! Grid geometry
//!
//! Cells are numbered row-major: `column = index % width`, `row = index / width`.

use crate::error::{FleetError, Result};

/// Geometry of a window on the parent display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// A `width x height` grid of square cells covering the parent display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    width: u32,
    height: u32,
    cell_size: u32,
}

impl Grid {
    /// Build the grid that fits a `display_width x display_height` display.
    /// Partial cells at the right and bottom edges are dropped.
    pub fn new(display_width: u32, display_height: u32, cell_size: u32) -> Result<Self> {
        if cell_size == 0 {
            return Err(FleetError::invalid_grid("cell size is zero"));
        }
        let width = display_width / cell_size;
        let height = display_height / cell_size;
        if width == 0 || height == 0 {
            return Err(FleetError::invalid_grid(format!(
                "{}x{} display holds no {}px cell",
                display_width, display_height, cell_size
            )));
        }
        Ok(Self {
            width,
            height,
            cell_size,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn cell_size(&self) -> u32 {
        self.cell_size
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// `(column, row)` of a cell index
    pub fn cell(&self, index: usize) -> (u32, u32) {
        let width = self.width as usize;
        ((index % width) as u32, (index / width) as u32)
    }

    /// Top-left pixel of a cell index
    pub fn origin(&self, index: usize) -> (i32, i32) {
        let (column, row) = self.cell(index);
        (
            (column * self.cell_size) as i32,
            (row * self.cell_size) as i32,
        )
    }

    /// Target window geometry of a cell index
    pub fn geometry(&self, index: usize) -> Geometry {
        let (x, y) = self.origin(index);
        Geometry {
            x,
            y,
            width: self.cell_size,
            height: self.cell_size,
        }
    }

    pub fn indices(&self) -> std::ops::Range<usize> {
        0..self.pixel_count()
    }
}
