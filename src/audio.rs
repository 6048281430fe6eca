//! Audio track playback
//!
//! With the `audio` feature the track is decoded and played in-process with
//! rodio. Without it, playback runs silently.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// An audio file to start alongside the first frame
#[derive(Debug, Clone)]
pub struct AudioTrack {
    path: PathBuf,
}

/// Keeps the track playing until dropped
pub struct AudioPlayback {
    #[cfg(feature = "audio")]
    _stream: rodio::OutputStream,
    #[cfg(feature = "audio")]
    sink: rodio::Sink,
}

impl AudioTrack {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(feature = "audio")]
    pub fn start(&self) -> Result<AudioPlayback> {
        use std::io::BufReader;

        let file = std::fs::File::open(&self.path)?;
        let (stream, handle) = rodio::OutputStream::try_default()
            .map_err(|e| anyhow::anyhow!("no audio output: {}", e))?;
        let sink = rodio::Sink::try_new(&handle)
            .map_err(|e| anyhow::anyhow!("audio sink: {}", e))?;
        let source = rodio::Decoder::new(BufReader::new(file))
            .map_err(|e| anyhow::anyhow!("decode {}: {}", self.path.display(), e))?;
        sink.append(source);
        tracing::info!("Playing audio {}", self.path.display());

        Ok(AudioPlayback {
            _stream: stream,
            sink,
        })
    }

    #[cfg(not(feature = "audio"))]
    pub fn start(&self) -> Result<AudioPlayback> {
        tracing::warn!(
            "Built without the `audio` feature, not playing {}",
            self.path.display()
        );
        Ok(AudioPlayback {})
    }
}

impl AudioPlayback {
    #[cfg(feature = "audio")]
    pub fn stop(self) {
        self.sink.stop();
    }

    #[cfg(not(feature = "audio"))]
    pub fn stop(self) {}
}
