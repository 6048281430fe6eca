//! Frame renderer
//!
//! Turns a source image into one black/white sample per cell. Sampling is
//! nearest-neighbour: every cell is a solid window, so there is nothing to
//! anti-alias.

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::path::{Path, PathBuf};

use crate::core::frame::Frame;
use crate::core::grid::Grid;
use crate::error::Result;

/// Luma at or above this is white. A hard cut, not Floyd-Steinberg
/// dithering, so mid-grey areas come out solid rather than speckled.
const WHITE_THRESHOLD: u8 = 128;

/// Sample `image` down to the grid and threshold it to black/white
pub fn image_to_frame(image: &DynamicImage, grid: &Grid) -> Frame {
    let luma = image.to_luma8();
    let sampled = if luma.dimensions() == (grid.width(), grid.height()) {
        luma
    } else {
        image::imageops::resize(&luma, grid.width(), grid.height(), FilterType::Nearest)
    };
    Frame::new(sampled.pixels().map(|p| p.0[0] >= WHITE_THRESHOLD).collect())
}

/// Load and render one frame image
pub fn load_frame(path: &Path, grid: &Grid) -> Result<Frame> {
    let image = image::open(path)?;
    Ok(image_to_frame(&image, grid))
}

/// Numbered frame images of a directory, in playback order
#[derive(Debug, Clone, Default)]
pub struct FrameSource {
    paths: Vec<PathBuf>,
}

impl FrameSource {
    /// Collect every image in `dir`, ordered by the number in its file stem
    /// (`frame-2.png` before `frame-10.png`), then by name.
    pub fn scan(dir: &Path) -> Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && ImageFormat::from_path(path).is_ok())
            .collect();
        paths.sort_by(|a, b| {
            frame_number(a)
                .cmp(&frame_number(b))
                .then_with(|| a.file_name().cmp(&b.file_name()))
        });
        tracing::info!("Found {} frames in {}", paths.len(), dir.display());
        Ok(Self { paths })
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Lazily rendered frames, keeping every `stride`-th image. Skipped
    /// images are never decoded.
    pub fn frames<'a>(
        &'a self,
        grid: &'a Grid,
        stride: usize,
    ) -> impl Iterator<Item = Result<Frame>> + 'a {
        self.paths
            .iter()
            .step_by(stride.max(1))
            .map(move |path| load_frame(path, grid))
    }
}

/// Last run of digits in the file stem
fn frame_number(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    let digits: String = stem
        .chars()
        .rev()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.chars().rev().collect::<String>().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn grid() -> Grid {
        Grid::new(640, 480, 32).unwrap()
    }

    #[test]
    fn exact_size_image_maps_pixel_per_cell() {
        let mut img = GrayImage::new(20, 15);
        img.put_pixel(0, 0, Luma([255]));
        img.put_pixel(19, 14, Luma([200]));
        img.put_pixel(5, 1, Luma([127]));
        let frame = image_to_frame(&DynamicImage::ImageLuma8(img), &grid());

        assert_eq!(frame.len(), 300);
        assert_eq!(frame.get(0), Some(true));
        assert_eq!(frame.get(299), Some(true));
        assert_eq!(frame.get(25), Some(false));
        assert_eq!(frame.cells().iter().filter(|c| **c).count(), 2);
    }

    #[test]
    fn larger_image_is_sampled_nearest() {
        // Left half white, right half black, at 4x the grid resolution.
        let img = RgbImage::from_fn(80, 60, |x, _| {
            if x < 40 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) }
        });
        let frame = image_to_frame(&DynamicImage::ImageRgb8(img), &grid());
        for index in 0..300 {
            let column = index % 20;
            assert_eq!(frame.get(index), Some(column < 10), "cell {}", index);
        }
    }

    #[test]
    fn rendering_is_deterministic() {
        let img = RgbImage::from_fn(37, 23, |x, y| {
            let v = ((x * 31 + y * 17) % 256) as u8;
            Rgb([v, v / 2, 255 - v])
        });
        let img = DynamicImage::ImageRgb8(img);
        assert_eq!(image_to_frame(&img, &grid()), image_to_frame(&img, &grid()));
    }

    #[test]
    fn scan_orders_numerically_and_skips_non_images() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["frame-10.png", "frame-2.png", "frame-1.png"] {
            GrayImage::new(20, 15).save(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("audio.txt"), "x").unwrap();

        let source = FrameSource::scan(dir.path()).unwrap();
        let names: Vec<_> = source
            .paths()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["frame-1.png", "frame-2.png", "frame-10.png"]);

        let grid = grid();
        assert_eq!(source.frames(&grid, 2).count(), 2);
        assert!(source.frames(&grid, 1).all(|f| !f.unwrap().cells().contains(&true)));
    }

    #[test]
    fn frame_numbers() {
        assert_eq!(frame_number(Path::new("ba-0042.png")), Some(42));
        assert_eq!(frame_number(Path::new("7-final.png")), Some(7));
        assert_eq!(frame_number(Path::new("cover.png")), None);
    }
}
