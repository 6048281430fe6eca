//! pixel-fleet - play a video on a grid of nested Wayland compositors
//!
//! Every output pixel is a whole compositor: a parent `kwin_wayland` acts as
//! the screen, one nested child compositor per cell is moved into a grid on
//! it, and each frame repaints the changed cells by launching a solid-color
//! wallpaper client on that cell's socket.
//!
//! ## Pipeline
//!
//! - [`session`] - private session bus, persisted for reuse
//! - [`fleet`] - parent and child compositor processes
//! - [`placement`] + [`backend`] - moving cell windows via KWin scripting
//! - [`render`] + [`core::frame`] - images to black/white frames, frame diffs
//! - [`recolor`] + [`scheduler`] - paced per-frame repainting
//! - [`cleanup`] - teardown, including leftovers of crashed runs
//!
//! [`lid`] is an independent lid-switch guard that keeps the machine awake
//! while plasma inhibits sleep.

pub mod audio;
pub mod backend;
pub mod cleanup;
pub mod config;
pub mod core;
pub mod error;
pub mod fleet;
pub mod lid;
pub mod pipeline;
pub mod placement;
pub mod process;
pub mod recolor;
pub mod render;
pub mod scheduler;
pub mod session;

pub use error::{FleetError, Result};
