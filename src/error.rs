//! Error taxonomy shared by the fleet pipeline

use std::path::PathBuf;

/// Convenience result type used across the crate.
pub type Result<T> = std::result::Result<T, FleetError>;

/// Errors raised while bootstrapping, driving or tearing down the fleet.
#[derive(thiserror::Error, Debug)]
pub enum FleetError {
    /// A required external program could not be launched.
    #[error("required binary `{binary}` not found or not executable: {source}")]
    MissingBinary {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The message bus refused the connection or a call failed.
    #[error("bus error: {0}")]
    Bus(String),

    /// Two frames of different length were compared.
    #[error("frame shape mismatch: expected {expected} cells, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// The persisted session descriptor holds a line that is not `key=value`.
    #[error("malformed session descriptor {path}:{line}: {content:?}")]
    SessionDescriptor {
        path: PathBuf,
        line: usize,
        content: String,
    },

    /// No usable bus session after the single permitted retry.
    #[error("bus session unavailable: {0}")]
    SessionUnavailable(String),

    /// The parent compositor socket never appeared.
    #[error("parent compositor socket {} did not appear", .socket.display())]
    ParentUnavailable { socket: PathBuf },

    /// Not a single cell window could be placed.
    #[error("placement failed for all {total} cells: {reason}")]
    PlacementFailed { total: usize, reason: String },

    /// Play-only was requested but some cells have no running compositor.
    #[error("fleet incomplete: {missing} of {total} cells have no compositor")]
    FleetIncomplete { missing: usize, total: usize },

    /// Display and cell dimensions do not produce a usable grid.
    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    /// Invalid configuration value.
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    DBus(#[from] zbus::Error),

    /// Wrapped lower-level error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FleetError {
    pub fn bus(msg: impl Into<String>) -> Self {
        Self::Bus(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_grid(msg: impl Into<String>) -> Self {
        Self::InvalidGrid(msg.into())
    }
}
