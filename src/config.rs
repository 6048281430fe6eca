//! Runtime configuration
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! describes the stock 20x15 grid on a 640x480 parent display.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::grid::Grid;
use crate::error::{FleetError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Parent compositor width in pixels
    pub display_width: u32,
    /// Parent compositor height in pixels
    pub display_height: u32,
    /// Edge length of one cell window
    pub cell_size: u32,

    /// Nested compositor binary (parent and children)
    pub compositor: String,
    /// Solid-color wallpaper binary used to paint a cell
    pub painter: String,
    /// Program that starts a private session bus and prints its descriptor
    pub bus_launcher: String,

    /// Prefix of every socket this system creates (`<prefix><index>`)
    pub socket_prefix: String,
    /// Directory for the session descriptor and placement scripts
    pub scratch_dir: PathBuf,
    /// File name of the persisted session descriptor inside `scratch_dir`
    pub session_file: String,

    /// Directory of numbered frame images
    pub frames_dir: PathBuf,
    /// Audio track started together with the first frame
    pub audio: Option<PathBuf>,
    /// Frame rate the frames directory was exported at
    pub source_fps: f64,
    /// Play every n-th frame at `source_fps / n`
    pub playback_divisor: u32,

    /// Pause between consecutive compositor spawns
    pub spawn_delay_ms: u64,
    /// Upper bound on waiting for child windows to become visible
    pub settle_timeout_ms: u64,
    /// Interval between visibility polls
    pub settle_poll_ms: u64,
    /// Concurrency bound for placement and recoloring fan-out
    pub max_workers: usize,

    /// Background color of the parent display (hex RGB)
    pub parent_color: String,
    /// Paint every cell white once the fleet is placed
    pub test_pattern: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display_width: 640,
            display_height: 480,
            cell_size: 32,
            compositor: "kwin_wayland".to_string(),
            painter: "swaybg".to_string(),
            bus_launcher: "dbus-launch".to_string(),
            socket_prefix: "cell-".to_string(),
            scratch_dir: PathBuf::from("/tmp"),
            session_file: "pixel-fleet-session".to_string(),
            frames_dir: PathBuf::from("frames"),
            audio: None,
            source_fps: 30.0,
            playback_divisor: 1,
            spawn_delay_ms: 50,
            settle_timeout_ms: 10_000,
            settle_poll_ms: 250,
            max_workers: 64,
            parent_color: "FF0000".to_string(),
            test_pattern: true,
        }
    }
}

impl Config {
    /// Load from a JSON file, or defaults when `path` is `None`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                serde_json::from_str(&raw)
                    .map_err(|e| FleetError::config(format!("{}: {}", path.display(), e)))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cell_size == 0 {
            return Err(FleetError::config("cell_size must be positive"));
        }
        if self.cell_size > self.display_width || self.cell_size > self.display_height {
            return Err(FleetError::config(format!(
                "cell_size {} does not fit a {}x{} display",
                self.cell_size, self.display_width, self.display_height
            )));
        }
        if self.playback_divisor == 0 {
            return Err(FleetError::config("playback_divisor must be at least 1"));
        }
        if !(self.source_fps.is_finite() && self.source_fps > 0.0) {
            return Err(FleetError::config("source_fps must be positive and finite"));
        }
        self.frame_interval()?;
        if self.max_workers == 0 {
            return Err(FleetError::config("max_workers must be at least 1"));
        }
        if self.socket_prefix.is_empty() {
            return Err(FleetError::config("socket_prefix must not be empty"));
        }
        Ok(())
    }

    pub fn grid(&self) -> Result<Grid> {
        Grid::new(self.display_width, self.display_height, self.cell_size)
    }

    /// Socket of the cell at `index`
    pub fn cell_socket(&self, index: usize) -> String {
        format!("{}{}", self.socket_prefix, index)
    }

    /// Socket of the parent compositor
    pub fn parent_socket(&self) -> String {
        format!("{}parent", self.socket_prefix)
    }

    pub fn session_path(&self) -> PathBuf {
        self.scratch_dir.join(&self.session_file)
    }

    pub fn target_fps(&self) -> f64 {
        self.source_fps / f64::from(self.playback_divisor)
    }

    /// Time budget of one played frame
    pub fn frame_interval(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(1.0 / self.target_fps()).map_err(|e| {
            FleetError::config(format!(
                "source_fps {} / playback_divisor {} gives no usable frame interval: {}",
                self.source_fps, self.playback_divisor, e
            ))
        })
    }

    pub fn spawn_delay(&self) -> Duration {
        Duration::from_millis(self.spawn_delay_ms)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    pub fn settle_poll(&self) -> Duration {
        Duration::from_millis(self.settle_poll_ms)
    }
}
