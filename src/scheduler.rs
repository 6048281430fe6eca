//! Playback scheduler
//!
//! Drives frames strictly in order: frame N is diffed against frame N-1 and
//! fully dispatched before frame N+1 is rendered. Each frame gets a fixed
//! time budget; time left over is slept off, overruns are not caught up.

use std::time::Duration;
use tokio::time::Instant;

use crate::audio::{AudioPlayback, AudioTrack};
use crate::core::frame::{Frame, diff};
use crate::core::registry::FleetRegistry;
use crate::error::{FleetError, Result};
use crate::recolor::Recolorer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Running,
    Done,
}

/// Timing and work of one played frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    /// Cells recolored
    pub dispatched: usize,
    /// Render + diff + apply time
    pub elapsed: Duration,
    /// Whether `elapsed` exceeded the frame budget
    pub overrun: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PlaybackReport {
    pub frames: Vec<FrameStats>,
}

impl PlaybackReport {
    pub fn total_dispatched(&self) -> usize {
        self.frames.iter().map(|f| f.dispatched).sum()
    }

    pub fn overruns(&self) -> usize {
        self.frames.iter().filter(|f| f.overrun).count()
    }
}

pub struct Scheduler<'a> {
    recolorer: &'a Recolorer,
    registry: &'a FleetRegistry,
    interval: Duration,
    audio: Option<AudioTrack>,
    state: PlaybackState,
    previous: Option<Frame>,
}

impl<'a> Scheduler<'a> {
    pub fn new(recolorer: &'a Recolorer, registry: &'a FleetRegistry, interval: Duration) -> Self {
        Self {
            recolorer,
            registry,
            interval,
            audio: None,
            state: PlaybackState::Idle,
            previous: None,
        }
    }

    /// Start `track` together with the first frame
    pub fn with_audio(mut self, track: Option<AudioTrack>) -> Self {
        self.audio = track;
        self
    }

    /// Treat `frame` as already on screen, so the first played frame is
    /// diffed against it instead of repainting every cell
    pub fn with_previous(mut self, frame: Option<Frame>) -> Self {
        self.previous = frame;
        self
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Play `frames` in order. Frames are pulled lazily, so rendering counts
    /// against each frame's budget.
    pub async fn play<I>(&mut self, frames: I) -> Result<PlaybackReport>
    where
        I: IntoIterator<Item = Result<Frame>>,
    {
        if self.state != PlaybackState::Idle {
            return Err(FleetError::Other(anyhow::anyhow!(
                "scheduler already played ({:?})",
                self.state
            )));
        }
        self.state = PlaybackState::Running;
        tracing::info!("Playback started at {:.2} fps", 1.0 / self.interval.as_secs_f64());

        let result = self.run(frames.into_iter()).await;
        self.state = PlaybackState::Done;

        if let Ok(report) = &result {
            tracing::info!(
                "Playback done: {} frames, {} recolors, {} over budget",
                report.frames.len(),
                report.total_dispatched(),
                report.overruns()
            );
        }
        result
    }

    async fn run(
        &mut self,
        mut frames: impl Iterator<Item = Result<Frame>>,
    ) -> Result<PlaybackReport> {
        let mut report = PlaybackReport::default();
        let mut playback: Option<AudioPlayback> = None;

        loop {
            let start = Instant::now();
            let Some(frame) = frames.next() else { break };
            let frame = frame?;

            if let Some(track) = self.audio.take() {
                match track.start() {
                    Ok(p) => playback = Some(p),
                    Err(e) => tracing::warn!("Audio {} unavailable: {}", track.path().display(), e),
                }
            }

            let changes = diff(self.previous.as_ref(), &frame)?;
            let applied = self.recolorer.apply(self.registry, &changes).await?;
            self.previous = Some(frame);

            let elapsed = start.elapsed();
            let overrun = elapsed >= self.interval;
            if overrun {
                tracing::debug!(
                    "Frame {} over budget by {:?}",
                    report.frames.len(),
                    elapsed - self.interval
                );
            } else {
                tokio::time::sleep_until(start + self.interval).await;
            }

            report.frames.push(FrameStats {
                dispatched: applied.dispatched,
                elapsed,
                overrun,
            });
        }

        if let Some(playback) = playback {
            playback.stop();
        }
        Ok(report)
    }
}
