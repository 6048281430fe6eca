//! The linear pipeline: bootstrap -> spawn -> place -> render/diff/apply

use std::sync::Arc;

use crate::audio::AudioTrack;
use crate::backend::kwin::KWinBackend;
use crate::config::Config;
use crate::core::frame::{Frame, diff};
use crate::core::registry::FleetRegistry;
use crate::error::Result;
use crate::fleet::FleetManager;
use crate::placement::PlacementCoordinator;
use crate::process::{Launcher, ProcScanner, SpawnEnv};
use crate::recolor::Recolorer;
use crate::render::FrameSource;
use crate::scheduler::{PlaybackReport, Scheduler};
use crate::session::{SessionDescriptor, ensure_session};

/// A fleet ready for playback
pub struct RunningFleet {
    pub registry: FleetRegistry,
    pub recolorer: Recolorer,
    /// Frame known to be on screen, if any
    pub shown: Option<Frame>,
}

/// Start the bus session, spawn and place the fleet, paint the test pattern
pub async fn bootstrap(config: &Config, launcher: Arc<dyn Launcher>) -> Result<RunningFleet> {
    let grid = config.grid()?;
    let session = ensure_session(config).await?;

    let fleet = FleetManager::new(Arc::clone(&launcher), config.clone());
    let registry = fleet.spawn_all(&grid, &session.env).await?;

    tracing::info!("Moving windows");
    let backend = KWinBackend::new(
        session.connection.clone(),
        &config.scratch_dir,
        &config.socket_prefix,
    )
    .await?;
    let coordinator = PlacementCoordinator::new(
        Arc::new(backend),
        grid,
        config.max_workers,
        config.settle_timeout(),
        config.settle_poll(),
    );
    coordinator.place_all(&registry).await?;

    let recolorer = Recolorer::new(
        launcher,
        &config.painter,
        session.env.clone(),
        config.max_workers,
    );
    let mut shown = None;
    if config.test_pattern {
        let white = Frame::filled(grid.pixel_count(), true);
        recolorer.apply(&registry, &diff(None, &white)?).await?;
        shown = Some(white);
    }

    Ok(RunningFleet {
        registry,
        recolorer,
        shown,
    })
}

/// Attach to a fleet bootstrapped by an earlier run
pub fn attach(
    config: &Config,
    launcher: Arc<dyn Launcher>,
    scanner: &ProcScanner,
) -> Result<RunningFleet> {
    let grid = config.grid()?;
    let fleet = FleetManager::new(Arc::clone(&launcher), config.clone());
    let registry = fleet.discover(&grid, scanner)?;

    let mut env = SpawnEnv::inherit();
    if let Some(descriptor) = SessionDescriptor::load(&config.session_path())? {
        env = env.merged(descriptor.vars());
    }

    Ok(RunningFleet {
        registry,
        recolorer: Recolorer::new(launcher, &config.painter, env, config.max_workers),
        shown: None,
    })
}

/// Play the configured frames directory on `fleet`
pub async fn play(config: &Config, fleet: &RunningFleet) -> Result<PlaybackReport> {
    let grid = config.grid()?;
    let source = FrameSource::scan(&config.frames_dir)?;
    let stride = config.playback_divisor as usize;

    let interval = config.frame_interval()?;
    let mut scheduler = Scheduler::new(&fleet.recolorer, &fleet.registry, interval)
        .with_audio(config.audio.as_ref().map(AudioTrack::new))
        .with_previous(fleet.shown.clone());
    scheduler.play(source.frames(&grid, stride)).await
}
