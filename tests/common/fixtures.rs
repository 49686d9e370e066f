//! Test images and a scratch directory for PNG files.

use std::path::{Path, PathBuf};

use greyc::models::AppConfig;
use greyc::services;
use greyc_engine::image::noise;
use greyc_engine::ImageBuffer;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;

/// Temporary directory holding inputs and outputs of one test
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Save `image` as a PNG and return its path
    pub fn write_png(&self, name: &str, image: &ImageBuffer) -> PathBuf {
        let path = self.path(name);
        services::save_png(&path, image).expect("Failed to write PNG");
        path
    }

    pub fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }

    pub fn read_png(&self, path: &Path) -> ImageBuffer {
        services::load_png(path).expect("Failed to read PNG")
    }
}

/// Horizontal ramp, with each channel shifted so they differ
pub fn gradient(width: usize, height: usize, channels: usize) -> ImageBuffer {
    let mut image = ImageBuffer::new(width, height, channels).unwrap();
    for c in 0..channels {
        for y in 0..height {
            for x in 0..width {
                let value = 20 * c + x * 200 / width.max(1);
                image.set(x, y, c, value.min(255) as u8);
            }
        }
    }
    image
}

/// Dark left half, bright right half
pub fn step_edge(width: usize, height: usize) -> ImageBuffer {
    let mut image = ImageBuffer::new(width, height, 1).unwrap();
    for y in 0..height {
        for x in width / 2..width {
            image.set(x, y, 0, 200);
        }
    }
    image
}

/// `clean` with seeded Gaussian noise of deviation `sigma`
pub fn noisy(clean: &ImageBuffer, sigma: f32, seed: u64) -> ImageBuffer {
    let mut image = clean.clone();
    noise::add_gaussian_noise(&mut image, sigma, &mut StdRng::seed_from_u64(seed)).unwrap();
    image
}

/// Single-channel mask image with a filled square at `(x, y)`
pub fn square_mask(width: usize, height: usize, x: usize, y: usize, side: usize) -> ImageBuffer {
    let mut mask = ImageBuffer::new(width, height, 1).unwrap();
    for my in y..(y + side).min(height) {
        for mx in x..(x + side).min(width) {
            mask.set(mx, my, 0, 255);
        }
    }
    mask
}

/// Untiled single-worker configuration with light smoothing for fast tests
pub fn quick_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.tiling.tile_size = 0;
    config.tiling.workers = 1;
    config.run.iterations = Some(1);
    config.run.poll_interval_ms = 5;
    config.diffusion.amplitude = 20.0;
    config
}
