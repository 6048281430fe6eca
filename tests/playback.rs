//! End-to-end playback scenarios against a recording launcher

use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{GrayImage, Luma};
use pixel_fleet::config::Config;
use pixel_fleet::core::frame::{Frame, diff};
use pixel_fleet::core::registry::{CompositorHandle, FleetRegistry};
use pixel_fleet::process::{Launcher, SpawnEnv, SpawnSpec};
use pixel_fleet::recolor::Recolorer;
use pixel_fleet::render::FrameSource;
use pixel_fleet::scheduler::{PlaybackState, Scheduler};

#[derive(Default)]
struct RecordingLauncher {
    spawned: Mutex<Vec<SpawnSpec>>,
}

impl Launcher for RecordingLauncher {
    fn spawn(&self, spec: &SpawnSpec) -> pixel_fleet::Result<u32> {
        let mut spawned = self.spawned.lock().unwrap();
        spawned.push(spec.clone());
        Ok(10_000 + spawned.len() as u32)
    }

    fn terminate(&self, _pid: u32) -> pixel_fleet::Result<bool> {
        Ok(true)
    }
}

impl RecordingLauncher {
    fn count(&self) -> usize {
        self.spawned.lock().unwrap().len()
    }
}

fn fleet(config: &Config) -> FleetRegistry {
    let grid = config.grid().unwrap();
    let mut registry = FleetRegistry::new();
    for index in grid.indices() {
        registry.push(CompositorHandle {
            index,
            pid: 100 + index as u32,
            socket: config.cell_socket(index),
        });
    }
    registry
}

#[test]
fn white_then_black_changes_all_300_cells_to_black() {
    let grid = Config::default().grid().unwrap();
    assert_eq!(grid.pixel_count(), 300);

    let white = Frame::filled(grid.pixel_count(), true);
    let black = Frame::filled(grid.pixel_count(), false);
    let changes = diff(Some(&white), &black).unwrap();

    assert_eq!(changes.change_count(), 300);
    assert!(changes.changes().all(|(_, color)| !color));
}

#[tokio::test]
async fn repeated_frame_dispatches_nothing() {
    let config = Config::default();
    let registry = fleet(&config);
    let launcher = Arc::new(RecordingLauncher::default());
    let recolorer = Recolorer::new(launcher.clone(), &config.painter, SpawnEnv::default(), 16);

    let frame = Frame::new((0..300).map(|i| i % 3 == 0).collect());
    let mut scheduler = Scheduler::new(&recolorer, &registry, Duration::from_millis(1));
    let report = scheduler
        .play(vec![Ok(frame.clone()), Ok(frame)])
        .await
        .unwrap();

    assert_eq!(report.frames.len(), 2);
    assert_eq!(report.frames[0].dispatched, 300);
    assert_eq!(report.frames[1].dispatched, 0);
    assert_eq!(launcher.count(), 300);
    assert_eq!(scheduler.state(), PlaybackState::Done);
}

#[tokio::test]
async fn plays_numbered_images_with_stride() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        frames_dir: dir.path().to_path_buf(),
        source_fps: 1000.0,
        playback_divisor: 2,
        ..Config::default()
    };
    let grid = config.grid().unwrap();

    // Frame n has its first n cells white.
    for n in 0..6u32 {
        let img = GrayImage::from_fn(20, 15, |x, y| {
            if y * 20 + x < n { Luma([255]) } else { Luma([0]) }
        });
        img.save(dir.path().join(format!("ba-{}.png", n))).unwrap();
    }

    let registry = fleet(&config);
    let launcher = Arc::new(RecordingLauncher::default());
    let recolorer = Recolorer::new(launcher.clone(), &config.painter, SpawnEnv::default(), 16);
    let source = FrameSource::scan(&config.frames_dir).unwrap();

    let interval = config.frame_interval().unwrap();
    let mut scheduler = Scheduler::new(&recolorer, &registry, interval);
    let report = scheduler
        .play(source.frames(&grid, config.playback_divisor as usize))
        .await
        .unwrap();

    // Frames 0, 2, 4: full paint, then two new white cells each time.
    let dispatched: Vec<usize> = report.frames.iter().map(|f| f.dispatched).collect();
    assert_eq!(dispatched, vec![300, 2, 2]);

    let spawned = launcher.spawned.lock().unwrap();
    let mut repaints: Vec<(String, String)> = spawned[300..]
        .iter()
        .map(|s| (s.env.get("WAYLAND_DISPLAY").unwrap().to_string(), s.args[1].clone()))
        .collect();
    repaints.sort();
    let expected: Vec<(String, String)> = (0..4)
        .map(|i| (format!("cell-{}", i), "FFFFFF".to_string()))
        .collect();
    assert_eq!(repaints, expected);
}
