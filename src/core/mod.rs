//! Pure data model: grid geometry, frames and diffs, compositor handles

pub mod frame;
pub mod grid;
pub mod registry;
